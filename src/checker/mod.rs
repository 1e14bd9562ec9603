//! Fetches a watched endpoint and compares its fingerprint against the stored hash.

pub mod hash;

// self
use crate::{_prelude::*, auth::TokenProvider, http::Transport, model::HashType, model::HttpRequest};

/// Result of one [`Checker::check`] call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckOutcome {
	/// Whether the computed fingerprint differs from the previously stored one.
	pub changed: bool,
	/// The newly computed fingerprint, regardless of whether it changed.
	pub new_hash: String,
}

/// Issues the watch request and computes its fingerprint.
#[derive(Clone)]
pub struct Checker {
	transport: Transport,
	tokens: Arc<dyn TokenProvider>,
}
impl Checker {
	/// Build a checker sharing `transport` and `tokens` with the rest of the service.
	pub fn new(transport: Transport, tokens: Arc<dyn TokenProvider>) -> Self {
		Self { transport, tokens }
	}

	/// Fetch `request` on behalf of `user_id`, hash the response under `hash_type`, and report
	/// whether it differs from `last_hash`.
	///
	/// A response status `>= 300` is reported as [`crate::Error::Upstream`].
	#[tracing::instrument(skip(self, request), fields(user_id))]
	pub async fn check(
		&self,
		user_id: &str,
		request: &HttpRequest,
		hash_type: HashType,
		last_hash: &str,
	) -> Result<CheckOutcome> {
		#[cfg(feature = "metrics")] let started = std::time::Instant::now();

		let (status, body) = self.transport.execute(user_id, request, self.tokens.as_ref()).await?;

		if status.as_u16() >= 300 {
			return Err(Error::Upstream {
				endpoint: request.endpoint.to_string(),
				reason: format!("status {status}"),
			});
		}

		let new_hash = hash::fingerprint(hash_type, &body)?;
		let changed = new_hash != last_hash;

		#[cfg(feature = "metrics")]
		crate::metrics::record_check(user_id, changed, started.elapsed());

		Ok(CheckOutcome { changed, new_hash })
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use wiremock::{
		Mock, MockServer, ResponseTemplate,
		matchers::{method, path},
	};
	// self
	use super::*;
	use crate::{auth::NoopTokenProvider, security::GuardedResolver};

	fn request(endpoint: Url) -> HttpRequest {
		HttpRequest {
			method: reqwest::Method::GET,
			endpoint,
			body: Vec::new(),
			header: reqwest::header::HeaderMap::new(),
			add_auth_token: false,
			isolated: false,
		}
	}

	async fn checker() -> (Checker, MockServer) {
		let server = MockServer::start().await;
		let transport = Transport::new(GuardedResolver::system()).unwrap();

		(Checker::new(transport, Arc::new(NoopTokenProvider)), server)
	}

	#[tokio::test]
	async fn first_check_always_reports_changed() {
		let (checker, server) = checker().await;
		Mock::given(method("GET"))
			.and(path("/w"))
			.respond_with(ResponseTemplate::new(200).set_body_string("foobar123"))
			.mount(&server)
			.await;

		let endpoint = Url::parse(&format!("{}/w", server.uri())).unwrap();
		let outcome =
			checker.check("user-1", &request(endpoint), HashType::Md5, "").await.unwrap();

		assert!(outcome.changed);
		assert_eq!(outcome.new_hash, "ae2d699aca20886f6bed96a0425c6168");
	}

	#[tokio::test]
	async fn unchanged_payload_reports_unchanged() {
		let (checker, server) = checker().await;
		Mock::given(method("GET"))
			.and(path("/w"))
			.respond_with(ResponseTemplate::new(200).set_body_string("foobar123"))
			.mount(&server)
			.await;

		let endpoint = Url::parse(&format!("{}/w", server.uri())).unwrap();
		let outcome = checker
			.check("user-1", &request(endpoint), HashType::Md5, "ae2d699aca20886f6bed96a0425c6168")
			.await
			.unwrap();

		assert!(!outcome.changed);
	}

	#[tokio::test]
	async fn server_error_is_upstream_error() {
		let (checker, server) = checker().await;
		Mock::given(method("GET"))
			.and(path("/w"))
			.respond_with(ResponseTemplate::new(503))
			.mount(&server)
			.await;

		let endpoint = Url::parse(&format!("{}/w", server.uri())).unwrap();
		let err =
			checker.check("user-1", &request(endpoint), HashType::Md5, "").await.unwrap_err();

		assert!(matches!(err, Error::Upstream { .. }));
	}
}

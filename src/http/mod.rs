//! Shared request construction and transport selection for the checker and trigger.

// crates.io
use reqwest::{Client, redirect::Policy};
// self
use crate::{_prelude::*, auth::TokenProvider, model::HttpRequest, security::GuardedResolver};

/// Fixed per-request timeout. Configurable only by rebuilding the [`Transport`] with a different
/// value; every outgoing request carries one, so it is never optional.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// The two reqwest clients the checker and trigger share: a plain one for ordinary requests and an
/// egress-hardened one for `isolated` requests.
///
/// Cheap to clone: both `Client`s pool their own connections and the resolver is an `Arc`
/// underneath.
#[derive(Clone)]
pub struct Transport {
	plain: Client,
	isolated: Client,
	guard: GuardedResolver,
}
impl Transport {
	/// Build a transport pair. `guard` resolves hosts for `isolated` requests against the
	/// public-IP-only policy before any connection is attempted.
	pub fn new(guard: GuardedResolver) -> Result<Self> {
		let plain = Client::builder()
			.redirect(Policy::limited(10))
			.user_agent(concat!("watchcast/", env!("CARGO_PKG_VERSION")))
			.build()?;
		let isolated = Client::builder()
			.redirect(Policy::none())
			.user_agent(concat!("watchcast/", env!("CARGO_PKG_VERSION")))
			.build()?;

		Ok(Self { plain, isolated, guard })
	}

	/// Issue `request` on behalf of `user_id`, returning the response status and full body.
	///
	/// Copies `request.header` verbatim, resolves `Authorization` via `tokens` when
	/// `add_auth_token` is set, refuses non-public destinations up front for `isolated` requests,
	/// and applies [`REQUEST_TIMEOUT`] to the exchange.
	pub async fn execute(
		&self,
		user_id: &str,
		request: &HttpRequest,
		tokens: &dyn TokenProvider,
	) -> Result<(reqwest::StatusCode, Vec<u8>)> {
		let host = request.endpoint.host_str().unwrap_or_default().to_string();
		let port = request.endpoint.port_or_known_default().unwrap_or(80);

		let client = if request.isolated {
			self.guard.guard(&host, port).await?;

			&self.isolated
		} else {
			&self.plain
		};

		let mut builder =
			client.request(request.method.clone(), request.endpoint.clone()).timeout(REQUEST_TIMEOUT);

		for (name, value) in request.header.iter() {
			builder = builder.header(name, value);
		}

		if !request.body.is_empty() {
			builder = builder.body(request.body.clone());
		}

		if request.add_auth_token {
			let token = tokens.token(user_id).await?;

			builder = builder.header(reqwest::header::AUTHORIZATION, token);
		}

		let response = builder.send().await?;
		let status = response.status();
		let body = response.bytes().await?.to_vec();

		Ok((status, body))
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
	use crate::{auth::NoopTokenProvider, model::HttpRequest};

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

	#[tokio::test]
	async fn plain_request_round_trips_body() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/ping"))
			.respond_with(ResponseTemplate::new(200).set_body_string("pong"))
			.mount(&server)
			.await;

		let transport = Transport::new(GuardedResolver::system()).unwrap();
		let endpoint = Url::parse(&format!("{}/ping", server.uri())).unwrap();
		let (status, body) =
			transport.execute("user-1", &request(endpoint), &NoopTokenProvider).await.unwrap();

		assert_eq!(status, reqwest::StatusCode::OK);
		assert_eq!(body, b"pong");
	}

	#[tokio::test]
	async fn isolated_request_to_loopback_is_refused() {
		let transport = Transport::new(GuardedResolver::system()).unwrap();
		let mut req = request(Url::parse("http://127.0.0.1:9/ping").unwrap());
		req.isolated = true;

		let err = transport.execute("user-1", &req, &NoopTokenProvider).await.unwrap_err();
		assert!(matches!(err, Error::EgressForbidden { .. }));
	}
}

//! Fires the callback endpoint for a watcher whose payload changed.

// self
use crate::{_prelude::*, auth::TokenProvider, http::Transport, model::HttpRequest};

/// Invokes the `trigger` endpoint of a changed [`crate::model::WatchedEntity`].
///
/// Shares the same request-construction path as [`crate::checker::Checker`]. There is no retry
/// here: the scheduler commits `last_hash` before calling [`Trigger::run`], so a failed trigger is
/// consumed rather than retried on the next tick unless the watched payload changes again.
#[derive(Clone)]
pub struct Trigger {
	transport: Transport,
	tokens: Arc<dyn TokenProvider>,
}
impl Trigger {
	/// Build a trigger sharing `transport` and `tokens` with the rest of the service.
	pub fn new(transport: Transport, tokens: Arc<dyn TokenProvider>) -> Self {
		Self { transport, tokens }
	}

	/// Issue `request` on behalf of `user_id`. A response status `>= 300` is reported as
	/// [`crate::Error::TriggerFailed`] with the status and body for diagnostics.
	#[tracing::instrument(skip(self, request), fields(user_id))]
	pub async fn run(&self, user_id: &str, request: &HttpRequest) -> Result<()> {
		let (status, body) = self.transport.execute(user_id, request, self.tokens.as_ref()).await?;

		if status.as_u16() >= 300 {
			#[cfg(feature = "metrics")]
			crate::metrics::record_trigger(user_id, false);

			return Err(Error::TriggerFailed {
				status,
				body: String::from_utf8_lossy(&body).into_owned(),
			});
		}

		#[cfg(feature = "metrics")]
		crate::metrics::record_trigger(user_id, true);

		Ok(())
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
			method: reqwest::Method::POST,
			endpoint,
			body: b"{}".to_vec(),
			header: reqwest::header::HeaderMap::new(),
			add_auth_token: false,
			isolated: false,
		}
	}

	async fn trigger() -> (Trigger, MockServer) {
		let server = MockServer::start().await;
		let transport = Transport::new(GuardedResolver::system()).unwrap();

		(Trigger::new(transport, Arc::new(NoopTokenProvider)), server)
	}

	#[tokio::test]
	async fn success_response_returns_ok() {
		let (trigger, server) = trigger().await;
		Mock::given(method("POST"))
			.and(path("/t"))
			.respond_with(ResponseTemplate::new(204))
			.mount(&server)
			.await;

		let endpoint = Url::parse(&format!("{}/t", server.uri())).unwrap();
		trigger.run("user-1", &request(endpoint)).await.unwrap();
	}

	#[tokio::test]
	async fn error_response_is_trigger_failed() {
		let (trigger, server) = trigger().await;
		Mock::given(method("POST"))
			.and(path("/t"))
			.respond_with(ResponseTemplate::new(500).set_body_string("boom"))
			.mount(&server)
			.await;

		let endpoint = Url::parse(&format!("{}/t", server.uri())).unwrap();
		let err = trigger.run("user-1", &request(endpoint)).await.unwrap_err();

		match err {
			Error::TriggerFailed { status, body } => {
				assert_eq!(status, reqwest::StatusCode::INTERNAL_SERVER_ERROR);
				assert_eq!(body, "boom");
			},
			other => panic!("unexpected error: {other:?}"),
		}
	}
}

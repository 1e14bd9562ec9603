//! Authentication token exchange, an external collaborator specified only by interface.

// self
use crate::_prelude::*;

/// Resolves a bearer token for a given user id.
///
/// This crate never implements the exchange itself (out of scope, per the outer framework's
/// responsibility); callers supply a concrete implementation at composition time.
#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync {
	/// Return the `Authorization` header value (e.g. `"Bearer <jwt>"`) for `user_id`.
	async fn token(&self, user_id: &str) -> Result<String>;
}

/// A [`TokenProvider`] that always fails; useful as a default when a deployment never sets
/// `add_auth_token` on any request.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTokenProvider;
#[async_trait::async_trait]
impl TokenProvider for NoopTokenProvider {
	async fn token(&self, user_id: &str) -> Result<String> {
		Err(Error::AuthFailure(format!("no token provider configured for user '{user_id}'")))
	}
}

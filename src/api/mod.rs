//! HTTP admin surface: a single `DELETE /watcher/:id` route (feature `server`).
//!
//! Route registration is explicit rather than reflective: [`register`] is called once at boot
//! with a concrete controller.

// crates.io
use axum::{
	Router,
	extract::{Path, State},
	http::{HeaderMap, StatusCode, header::AUTHORIZATION},
	routing::delete,
};
// self
use crate::_prelude::*;

/// Validates an incoming bearer token and extracts the owning user id.
///
/// Out-of-scope collaborator, specified only by interface; mirrors [`crate::auth::TokenProvider`]
/// but for the inbound direction (verifying a caller's token rather than minting one).
#[async_trait::async_trait]
pub trait BearerAuthenticator: Send + Sync {
	/// Validate `bearer` (the raw `Authorization` header value) and return the caller's user id.
	async fn authenticate(&self, bearer: &str) -> Result<String>;
}

/// Deletes a watcher on behalf of an authenticated caller.
#[async_trait::async_trait]
pub trait RegistrationController: Send + Sync {
	/// Delete the watcher identified by `id`, scoped to `user_id`. Returns whether a record was
	/// actually removed.
	async fn delete_watcher(&self, user_id: &str, id: &str) -> Result<bool>;
}

struct ApiState {
	controller: Arc<dyn RegistrationController>,
	authenticator: Arc<dyn BearerAuthenticator>,
}

/// Register the `DELETE /watcher/:id` route on `router`.
pub fn register(
	router: Router,
	controller: Arc<dyn RegistrationController>,
	authenticator: Arc<dyn BearerAuthenticator>,
) -> Router {
	let state = Arc::new(ApiState { controller, authenticator });
	let watcher_routes = Router::new()
		.route("/watcher/:id", delete(delete_watcher))
		.layer(tower_http::trace::TraceLayer::new_for_http())
		.with_state(state);

	router.merge(watcher_routes)
}

async fn delete_watcher(
	State(state): State<Arc<ApiState>>,
	Path(id): Path<String>,
	headers: HeaderMap,
) -> StatusCode {
	if id.is_empty() {
		return StatusCode::BAD_REQUEST;
	}

	let Some(bearer) = headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok()) else {
		return StatusCode::UNAUTHORIZED;
	};

	let user_id = match state.authenticator.authenticate(bearer).await {
		Ok(user_id) => user_id,
		Err(_) => return StatusCode::UNAUTHORIZED,
	};

	match state.controller.delete_watcher(&user_id, &id).await {
		Ok(_) => StatusCode::OK,
		Err(_) => StatusCode::BAD_REQUEST,
	}
}

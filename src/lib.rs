//! Durable, multi-tenant change-detection scheduler: polls HTTP endpoints, fingerprints their
//! responses, and fires HTTP callbacks when a fingerprint changes.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

#[cfg(feature = "server")] pub mod api;
pub mod auth;
pub mod checker;
pub mod cleanup;
pub mod config;
pub mod http;
#[cfg(feature = "metrics")] pub mod metrics;
pub mod model;
pub mod registration;
pub mod scheduler;
pub mod security;
pub mod store;
pub mod trigger;

mod error;

/// Install a default `tracing-subscriber` formatter reading `RUST_LOG`, matching the binary's
/// expectations for an out-of-the-box deployment.
#[cfg(feature = "server")]
pub fn init_tracing() {
	tracing_subscriber::fmt::init();
}

mod _prelude {
	pub use std::sync::Arc;

	pub use chrono::{DateTime, TimeDelta, Utc};
	pub use std::time::Duration;
	pub use url::Url;

	pub use crate::{Error, Result};
}
pub use crate::error::{Error, Result};

#[cfg(test)]
mod _test {
	use metrics_util as _;
	use tower as _;
	use tracing_subscriber as _;
	use wiremock as _;
}

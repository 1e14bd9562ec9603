//! Crate-wide error types and `Result` alias.

/// Library-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the watcher crate.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Io(#[from] std::io::Error),
	#[error(transparent)]
	Addr(#[from] std::net::AddrParseError),

	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	Serde(#[from] serde_json::Error),
	#[error(transparent)]
	Url(#[from] url::ParseError),
	#[error(transparent)]
	Resolve(#[from] hickory_resolver::error::ResolveError),

	#[cfg(feature = "mongodb")]
	#[error(transparent)]
	Mongodb(#[from] mongodb::error::Error),
	#[cfg(feature = "prometheus")]
	#[error(transparent)]
	PrometheusBuild(#[from] metrics_exporter_prometheus::BuildError),

	#[error("No watcher registered for id '{id}' and user '{user_id}'.")]
	NotFound { id: String, user_id: String },
	#[error("Watch request to {endpoint} failed: {reason}")]
	Upstream { endpoint: String, reason: String },
	#[error("Trigger request returned status {status}: {body}")]
	TriggerFailed { status: reqwest::StatusCode, body: String },
	#[error("Failed to resolve an auth token for user '{0}'.")]
	AuthFailure(String),
	#[error("Egress to '{host}' refused: {reason}")]
	EgressForbidden { host: String, reason: String },
	#[error("Invalid configuration for {field}: {reason}")]
	ConfigInvalid { field: &'static str, reason: String },
}

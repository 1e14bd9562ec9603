//! Flat process configuration, loaded from environment variables with a `WATCHCAST_` prefix.

// crates.io
use serde::Deserialize;
// self
use crate::_prelude::*;

/// Process-wide configuration. Flat and dotted-free, mirroring the outer framework's own
/// configuration convention; every field maps to one `WATCHCAST_<FIELD_NAME>` environment variable.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
	/// Externally reachable base URL of this service, used when constructing self-referential
	/// callback URLs.
	pub advertised_url: String,
	/// Mongo connection string; only consulted when the `mongodb` feature is enabled.
	pub mongo_url: String,
	/// Mongo database name.
	pub mongo_table: String,
	/// Mongo collection holding `WatchedEntity` documents.
	pub mongo_collection_watched_entity: String,
	/// Whether the Mongo backend may assume snapshot transactions are available.
	pub mongo_use_rel_set: bool,
	/// Outer ticker period, as a duration string (e.g. `"1s"`, `"300ms"`).
	pub watch_interval: String,
	/// Maximum entities claimed per `Store::fetch` call.
	pub batch_size: i64,
	/// Prefix applied to every outer-framework task-parameter key this service reads.
	pub worker_param_prefix: String,
	/// Lower bound clamp applied to a registration's requested interval.
	pub min_watch_interval: String,
	/// Interval used when a registration's requested interval is absent or unparseable.
	pub default_watch_interval: String,
	/// Hash type used when a registration doesn't specify one.
	pub default_hash_type: String,
	/// Base URL of the device-selection service consulted by criteria-based registrations.
	pub device_selection_url: String,
	/// Whether `watch_request` task parameters are honored (as opposed to only criteria-based
	/// selection).
	pub allow_generic_watch_requests: bool,
	/// Whether the checker resolves hosts via a dedicated external resolver instead of the system
	/// resolver.
	pub use_external_dns_for_checker: bool,
	/// `host:port` of the external DNS resolver, consulted only when
	/// `use_external_dns_for_checker` is set.
	pub external_dns_address: String,
}
impl Default for Config {
	fn default() -> Self {
		Self {
			advertised_url: String::new(),
			mongo_url: String::new(),
			mongo_table: "watchcast".into(),
			mongo_collection_watched_entity: "watched_entities".into(),
			mongo_use_rel_set: false,
			watch_interval: "1s".into(),
			batch_size: 100,
			worker_param_prefix: String::new(),
			min_watch_interval: "1s".into(),
			default_watch_interval: "1h".into(),
			default_hash_type: "md5".into(),
			device_selection_url: String::new(),
			allow_generic_watch_requests: true,
			use_external_dns_for_checker: false,
			external_dns_address: String::new(),
		}
	}
}
impl Config {
	/// Load configuration from `WATCHCAST_`-prefixed environment variables, falling back to
	/// [`Config::default`] for anything unset.
	pub fn from_env() -> Result<Self> {
		envy::prefixed("WATCHCAST_").from_env::<Self>().map_err(|err| Error::ConfigInvalid {
			field: "environment",
			reason: err.to_string(),
		})
	}

	/// Parse [`Config::watch_interval`], failing fast at startup rather than per-tick.
	pub fn watch_interval(&self) -> Result<Duration> {
		crate::store::humantime_like_parse(&self.watch_interval).ok_or_else(|| Error::ConfigInvalid {
			field: "watch_interval",
			reason: format!("'{}' is not a valid duration", self.watch_interval),
		})
	}

	/// Parse [`Config::min_watch_interval`], failing fast at startup rather than per-tick.
	pub fn min_watch_interval(&self) -> Result<Duration> {
		crate::store::humantime_like_parse(&self.min_watch_interval).ok_or_else(|| {
			Error::ConfigInvalid {
				field: "min_watch_interval",
				reason: format!("'{}' is not a valid duration", self.min_watch_interval),
			}
		})
	}

	/// Parse [`Config::default_watch_interval`], failing fast at startup rather than per-tick.
	pub fn default_watch_interval(&self) -> Result<Duration> {
		crate::store::humantime_like_parse(&self.default_watch_interval).ok_or_else(|| {
			Error::ConfigInvalid {
				field: "default_watch_interval",
				reason: format!("'{}' is not a valid duration", self.default_watch_interval),
			}
		})
	}
}

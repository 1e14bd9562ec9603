//! Persistent data model shared by the store, checker, and trigger.

// crates.io
use reqwest::{Method, header::HeaderMap};
use serde::{Deserialize, Serialize};
// self
use crate::_prelude::*;

/// Fingerprint scheme applied to a watched endpoint's response body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashType {
	/// Lowercase hex MD5 of the raw response body.
	#[default]
	Md5,
	/// Lowercase hex SHA-256 of the raw response body.
	Sha256,
	/// MD5 of the canonical JSON encoding of the sorted device-id set found in the body.
	DeviceIds,
}
impl HashType {
	/// Parse a wire value, falling back to [`HashType::Md5`] for anything unrecognized.
	pub fn parse(value: &str) -> Self {
		match value {
			"sha256" => Self::Sha256,
			"deviceids" => Self::DeviceIds,
			_ => Self::Md5,
		}
	}
}

/// A single outgoing HTTP request, as configured by the watcher's owner.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpRequest {
	/// HTTP method to issue.
	#[serde(with = "method_serde")]
	pub method: Method,
	/// Target URL.
	pub endpoint: Url,
	/// Raw request body.
	#[serde(default)]
	pub body: Vec<u8>,
	/// Headers copied verbatim onto the outgoing request.
	#[serde(default, with = "header_map_serde")]
	pub header: HeaderMap,
	/// Whether to resolve and attach a bearer token via the auth collaborator.
	#[serde(default)]
	pub add_auth_token: bool,
	/// Whether this request must be routed through the egress-hardened transport.
	#[serde(default)]
	pub isolated: bool,
}

/// The single persistent record describing one watched endpoint and its callback.
///
/// Uniquely identified by `(id, user_id)`. See [`crate::store::Store`] for lifecycle operations.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WatchedEntity {
	/// Opaque identifier, unique per `user_id`, assigned by the outer framework.
	pub id: String,
	/// Owning user; every store operation is scoped by it.
	pub user_id: String,
	/// Time between checks for this entity.
	pub interval: Duration,
	/// Fingerprint scheme applied to the watch response.
	pub hash_type: HashType,
	/// Endpoint polled for change detection.
	pub watch: HttpRequest,
	/// Endpoint invoked when change is detected.
	pub trigger: HttpRequest,
	/// Creation timestamp; entities younger than 60s are cleanup-exempt.
	pub created_at: DateTime<Utc>,
	/// Entities become due when this timestamp is in the past.
	pub timestamp_of_next_check: DateTime<Utc>,
	/// Fingerprint from the most recent successful check; empty before the first check.
	#[serde(default)]
	pub last_hash: String,
}
impl WatchedEntity {
	/// Whether this entity is eligible for cleanup evaluation.
	pub fn cleanup_eligible(&self, now: DateTime<Utc>) -> bool {
		now - self.created_at >= TimeDelta::seconds(60)
	}
}

/// Payload accepted by [`crate::store::Store::set`]; the store fills in the remaining fields.
///
/// The first check against a freshly-set entity always observes `last_hash == ""`, which differs
/// from any real fingerprint, so it always fires a trigger. This is intentional source behavior
/// (documented, not a bug): callers who want "trigger on change from baseline" should pre-seed
/// `last_hash` out of band, which this crate does not currently expose a way to do.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WatchedEntityInit {
	/// Opaque identifier, unique per `user_id`.
	pub id: String,
	/// Owning user.
	pub user_id: String,
	/// Time between checks, as a duration string (e.g. `"1h"`, `"300ms"`).
	///
	/// Unparseable values are treated as one hour by [`crate::store::Store::fetch`], with a
	/// warning logged; the record itself is never rejected for this.
	pub interval: String,
	/// Fingerprint scheme; unrecognized values fall back to [`HashType::Md5`].
	#[serde(default)]
	pub hash_type: HashType,
	/// Endpoint to poll.
	pub watch: HttpRequest,
	/// Endpoint to call on change.
	pub trigger: HttpRequest,
	/// Creation timestamp to stamp on the record; defaults to now when absent.
	///
	/// Re-registering an existing `(id, user_id)` replaces the whole record, so an upsert that
	/// omits this resets `created_at` to now rather than preserving the prior value.
	#[serde(default)]
	pub created_at: Option<DateTime<Utc>>,
}

mod method_serde {
	// crates.io
	use reqwest::Method;
	use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

	pub fn serialize<S: Serializer>(method: &Method, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(method.as_str())
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Method, D::Error> {
		let raw = String::deserialize(deserializer)?;

		Method::from_bytes(raw.as_bytes()).map_err(D::Error::custom)
	}
}

mod header_map_serde {
	// std
	use std::collections::HashMap;
	// crates.io
	use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
	use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

	pub fn serialize<S: Serializer>(map: &HeaderMap, serializer: S) -> Result<S::Ok, S::Error> {
		let mut plain: HashMap<String, Vec<String>> = HashMap::new();

		for (name, value) in map.iter() {
			plain
				.entry(name.as_str().to_string())
				.or_default()
				.push(value.to_str().unwrap_or_default().to_string());
		}

		serde::Serialize::serialize(&plain, serializer)
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<HeaderMap, D::Error> {
		let plain: HashMap<String, Vec<String>> = HashMap::deserialize(deserializer)?;
		let mut map = HeaderMap::new();

		for (name, values) in plain {
			let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(D::Error::custom)?;

			for value in values {
				let header_value = HeaderValue::from_str(&value).map_err(D::Error::custom)?;

				map.append(header_name.clone(), header_value);
			}
		}

		Ok(map)
	}
}

//! Translates the outer job-worker framework's create/delete commands into `Store` operations.

// crates.io
use serde::{Deserialize, Serialize};
// self
use crate::{
	_prelude::*,
	config::Config,
	model::{HashType, HttpRequest, WatchedEntityInit},
	store::{Store, humantime_like_parse},
};

/// One input parameter forwarded to the maintenance procedure, mirroring the outer framework's
/// `{id, label, valueLabel, value}` shape.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SmartServiceParameter {
	/// Parameter identifier, taken from the task-variable key suffix.
	pub id: String,
	/// Human-readable label; defaults to `id`.
	pub label: String,
	/// Display form of the value.
	pub value_label: String,
	/// The value itself, JSON-decoded when the raw variable parsed as JSON, else the raw string.
	pub value: serde_json::Value,
}

/// Device-selection criteria forwarded to `device_selection_url`.
pub type DeviceCriteria = serde_json::Value;

/// Which of the three mutually exclusive watch sources a task supplied.
#[derive(Clone, Debug)]
pub enum WatchSource {
	/// An explicit `HttpRequest`, honored only when `allow_generic_watch_requests` is set.
	Request(Box<HttpRequest>),
	/// Criteria resolved against `{device_selection_url}/v2/query/selectables?include_devices=true`.
	DevicesByCriteria(Vec<DeviceCriteria>),
	/// As above, with `&include_id_modified=true` appended.
	ModifiedDevicesByCriteria(Vec<DeviceCriteria>),
}

/// Everything needed to register one watcher, already extracted from the outer framework's
/// namespaced task parameters (see [`crate::config::Config::worker_param_prefix`]).
#[derive(Clone, Debug)]
pub struct SetWatcherInput {
	/// Process instance id; combined with `task_id` to synthesize the watcher's `id`.
	pub process_instance_id: String,
	/// Task id; combined with `process_instance_id` to synthesize the watcher's `id`.
	pub task_id: String,
	/// Owning user.
	pub user_id: String,
	/// Smart-service instance id the trigger endpoint is scoped to.
	pub smart_service_instance_id: String,
	/// Maintenance-procedure event name (`maintenance_procedure` task parameter).
	pub maintenance_procedure: String,
	/// Maintenance-procedure input parameters (`maintenance_procedure_inputs.<key>`).
	pub maintenance_procedure_inputs: Vec<SmartServiceParameter>,
	/// Requested poll interval (`watch_interval` task parameter), pre-clamp.
	pub requested_interval: Option<String>,
	/// Requested hash type (`hash_type` task parameter).
	pub requested_hash_type: Option<String>,
	/// Exactly one watch source, already resolved by priority
	/// (`watch_request` > `watch_devices_by_criteria` > `watch_modified_devices_by_criteria`).
	pub watch_source: WatchSource,
}

/// Thin translator from outer-framework registration commands to [`Store`] operations.
#[derive(Clone)]
pub struct Registration {
	store: Arc<dyn Store>,
	config: Config,
}
impl Registration {
	/// Build a registration API over `store`, using `config` to resolve defaults and clamps.
	pub fn new(store: Arc<dyn Store>, config: Config) -> Self {
		Self { store, config }
	}

	/// Translate `input` into a `WatchedEntity` and upsert it into the store.
	pub async fn set_watcher(&self, input: SetWatcherInput) -> Result<()> {
		let id = format!("{}.{}", input.process_instance_id, input.task_id);
		let interval = self.resolve_interval(input.requested_interval.as_deref())?;
		let hash_type = input
			.requested_hash_type
			.as_deref()
			.map(HashType::parse)
			.unwrap_or_else(|| HashType::parse(&self.config.default_hash_type));
		let trigger = self.build_trigger_request(&input.smart_service_instance_id, &input);
		let user_id = input.user_id.clone();
		let watch = self.resolve_watch(input.watch_source).await?;

		self.store
			.set(WatchedEntityInit { id, user_id, interval, hash_type, watch, trigger, created_at: None })
			.await
	}

	/// Remove a watcher by id; idempotent, matching [`Store::delete`].
	pub async fn delete_watcher(&self, user_id: &str, id: &str) -> Result<bool> {
		self.store.delete(id, user_id).await
	}

	fn resolve_interval(&self, requested: Option<&str>) -> Result<String> {
		let min = humantime_like_parse(&self.config.min_watch_interval).ok_or_else(|| {
			Error::ConfigInvalid {
				field: "min_watch_interval",
				reason: format!("'{}' is not a valid duration", self.config.min_watch_interval),
			}
		})?;

		let requested = requested.and_then(humantime_like_parse).unwrap_or_else(|| {
			humantime_like_parse(&self.config.default_watch_interval).unwrap_or(min)
		});

		let clamped = requested.max(min);

		Ok(format!("{}ms", clamped.as_millis()))
	}

	async fn resolve_watch(&self, source: WatchSource) -> Result<HttpRequest> {
		match source {
			WatchSource::Request(request) => {
				if !self.config.allow_generic_watch_requests {
					return Err(Error::ConfigInvalid {
						field: "watch_request",
						reason: "generic watch requests are disabled".into(),
					});
				}

				Ok(*request)
			},
			WatchSource::DevicesByCriteria(criteria) => {
				self.criteria_request(criteria, "include_devices=true")
			},
			WatchSource::ModifiedDevicesByCriteria(criteria) => {
				self.criteria_request(criteria, "include_devices=true&include_id_modified=true")
			},
		}
	}

	fn criteria_request(&self, criteria: Vec<DeviceCriteria>, query: &str) -> Result<HttpRequest> {
		let endpoint = Url::parse(&format!(
			"{}/v2/query/selectables?{query}",
			self.config.device_selection_url.trim_end_matches('/')
		))?;
		let body = serde_json::to_vec(&criteria)?;

		Ok(HttpRequest {
			method: reqwest::Method::POST,
			endpoint,
			body,
			header: reqwest::header::HeaderMap::new(),
			add_auth_token: true,
			isolated: false,
		})
	}

	fn build_trigger_request(&self, smart_service_instance_id: &str, input: &SetWatcherInput) -> HttpRequest {
		let endpoint = Url::parse(&format!(
			"{}/instances/{}/maintenance-procedures/{}/start",
			self.config.advertised_url.trim_end_matches('/'),
			smart_service_instance_id,
			input.maintenance_procedure,
		))
		.unwrap_or_else(|_| Url::parse("about:blank").expect("static fallback URL is valid"));
		let body = serde_json::to_vec(&input.maintenance_procedure_inputs).unwrap_or_default();

		HttpRequest {
			method: reqwest::Method::POST,
			endpoint,
			body,
			header: reqwest::header::HeaderMap::new(),
			add_auth_token: true,
			isolated: false,
		}
	}
}

/// Extract task-parameter keys namespaced by `prefix`, as described by the
/// `maintenance_procedure_inputs.<key>` convention.
pub fn parse_maintenance_procedure_inputs(
	prefix: &str,
	variables: &std::collections::HashMap<String, serde_json::Value>,
) -> Vec<SmartServiceParameter> {
	let marker = format!("{prefix}maintenance_procedure_inputs.");
	let mut parameters = Vec::new();

	for (key, value) in variables {
		let Some(id) = key.strip_prefix(&marker) else { continue };
		let value_label = match value {
			serde_json::Value::String(s) => s.clone(),
			other => other.to_string(),
		};
		let decoded = match value {
			serde_json::Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| value.clone()),
			other => other.clone(),
		};

		parameters.push(SmartServiceParameter {
			id: id.to_string(),
			label: id.to_string(),
			value_label,
			value: decoded,
		});
	}

	parameters
}

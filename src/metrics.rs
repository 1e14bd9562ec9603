//! Metrics helpers and per-watcher telemetry bookkeeping.

// std
use std::sync::OnceLock;
// crates.io
use metrics::Label;
#[cfg(feature = "prometheus")] use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use smallvec::SmallVec;
// self
use crate::_prelude::*;

type LabelSet = SmallVec<[Label; 4]>;

const METRIC_CHECKS_TOTAL: &str = "watchcast_checks_total";
const METRIC_CHANGES_TOTAL: &str = "watchcast_changes_total";
const METRIC_TRIGGERS_TOTAL: &str = "watchcast_triggers_total";
const METRIC_CHECK_DURATION: &str = "watchcast_check_duration_seconds";
const METRIC_CLEANUP_DELETIONS_TOTAL: &str = "watchcast_cleanup_deletions_total";

/// Shared Prometheus handle installed by [`install_default_exporter`].
#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the default Prometheus recorder backed by `metrics`.
///
/// Multiple invocations are safe; subsequent calls become no-ops once the recorder is installed.
#[cfg(feature = "prometheus")]
pub fn install_default_exporter() -> Result<()> {
	if PROMETHEUS_HANDLE.get().is_some() {
		return Ok(());
	}

	let handle = PrometheusBuilder::new().install_recorder()?;
	let _ = PROMETHEUS_HANDLE.set(handle);

	Ok(())
}

/// Access the global Prometheus exporter handle when installed.
#[cfg(feature = "prometheus")]
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
	PROMETHEUS_HANDLE.get()
}

/// Record the outcome of one [`crate::checker::Checker::check`] call.
pub fn record_check(user_id: &str, changed: bool, duration: Duration) {
	let labels = base_labels(user_id);

	metrics::counter!(METRIC_CHECKS_TOTAL, labels.iter()).increment(1);
	metrics::histogram!(METRIC_CHECK_DURATION, labels.iter()).record(duration.as_secs_f64());

	if changed {
		metrics::counter!(METRIC_CHANGES_TOTAL, labels.iter()).increment(1);
	}
}

/// Record the outcome of one [`crate::trigger::Trigger::run`] call.
pub fn record_trigger(user_id: &str, success: bool) {
	let mut labels = base_labels(user_id);

	labels.push(Label::new("status", if success { "success" } else { "error" }));

	metrics::counter!(METRIC_TRIGGERS_TOTAL, labels.iter()).increment(1);
}

/// Record a cleanup-probe deletion.
pub fn record_cleanup_deletion(user_id: &str) {
	metrics::counter!(METRIC_CLEANUP_DELETIONS_TOTAL, base_labels(user_id).iter()).increment(1);
}

fn base_labels(user_id: &str) -> LabelSet {
	let mut labels = LabelSet::with_capacity(1);

	labels.push(Label::new("user_id", user_id.to_owned()));

	labels
}

#[cfg(test)]
mod tests {
	// crates.io
	use metrics_util::{
		CompositeKey, MetricKind,
		debugging::{DebugValue, DebuggingRecorder},
	};
	// self
	use super::*;

	fn capture_metrics<F>(f: F) -> Vec<(CompositeKey, DebugValue)>
	where
		F: FnOnce(),
	{
		let recorder = DebuggingRecorder::new();
		let snapshotter = recorder.snapshotter();

		metrics::with_local_recorder(&recorder, f);

		snapshotter
			.snapshot()
			.into_vec()
			.into_iter()
			.map(|(key, _, _, value)| (key, value))
			.collect()
	}

	fn counter_value(snapshot: &[(CompositeKey, DebugValue)], name: &str) -> u64 {
		snapshot
			.iter()
			.filter(|(key, _)| key.kind() == MetricKind::Counter && key.key().name() == name)
			.map(|(_, value)| match value {
				DebugValue::Counter(value) => *value,
				_ => 0,
			})
			.sum()
	}

	#[test]
	fn records_checks_and_changes() {
		let snapshot = capture_metrics(|| {
			record_check("user-1", true, Duration::from_millis(10));
			record_check("user-1", false, Duration::from_millis(5));
		});

		assert_eq!(counter_value(&snapshot, METRIC_CHECKS_TOTAL), 2);
		assert_eq!(counter_value(&snapshot, METRIC_CHANGES_TOTAL), 1);
	}

	#[test]
	fn records_trigger_outcomes() {
		let snapshot = capture_metrics(|| {
			record_trigger("user-1", true);
			record_trigger("user-1", false);
		});

		assert_eq!(counter_value(&snapshot, METRIC_TRIGGERS_TOTAL), 2);
	}
}

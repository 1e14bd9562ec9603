//! Outer ticker and inner drain loop: the fan-out execution engine.

// crates.io
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
// self
use crate::{_prelude::*, checker::Checker, store::Store, trigger::Trigger};

/// Ties together the store, checker, and trigger and runs two nested loops: an outer ticker and an
/// inner drain that keeps claiming batches until none are due.
#[derive(Clone)]
pub struct Scheduler {
	store: Arc<dyn Store>,
	checker: Checker,
	trigger: Trigger,
	batch_size: usize,
}
impl Scheduler {
	/// Build a scheduler over the given collaborators.
	pub fn new(store: Arc<dyn Store>, checker: Checker, trigger: Trigger, batch_size: usize) -> Self {
		Self { store, checker, trigger, batch_size }
	}

	/// Run the outer ticker until `cancel` fires.
	///
	/// On cancellation, the ticker stops accepting new ticks and in-flight drain work is awaited to
	/// completion — no task is aborted mid-flight, matching the graceful-shutdown requirement.
	pub async fn run(&self, watch_interval: Duration, cancel: CancellationToken) {
		let mut ticker = tokio::time::interval(watch_interval);
		ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

		loop {
			tokio::select! {
				_ = cancel.cancelled() => {
					tracing::info!("scheduler received shutdown signal");

					return;
				},
				_ = ticker.tick() => {
					if let Err(err) = self.drain().await {
						tracing::warn!(error = %err, "drain iteration aborted");
					}
				},
			}
		}
	}

	/// Repeatedly claim due batches and process them concurrently until none remain.
	async fn drain(&self) -> Result<()> {
		loop {
			let claimed = self.store.fetch(self.batch_size).await?;

			if claimed.is_empty() {
				return Ok(());
			}

			let mut tasks = JoinSet::new();

			for entity in claimed {
				let store = self.store.clone();
				let checker = self.checker.clone();
				let trigger = self.trigger.clone();

				tasks.spawn(async move { process_entity(store, checker, trigger, entity).await });
			}

			while let Some(result) = tasks.join_next().await {
				if let Err(join_err) = result {
					tracing::warn!(error = %join_err, "per-entity task panicked");
				}
			}
		}
	}
}

#[tracing::instrument(skip(store, checker, trigger, entity), fields(id = %entity.id, user_id = %entity.user_id))]
async fn process_entity(
	store: Arc<dyn Store>,
	checker: Checker,
	trigger: Trigger,
	entity: crate::model::WatchedEntity,
) {
	let outcome =
		match checker.check(&entity.user_id, &entity.watch, entity.hash_type, &entity.last_hash).await
		{
			Ok(outcome) => outcome,
			Err(err) => {
				tracing::warn!(error = %err, "check failed");

				return;
			},
		};

	if !outcome.changed {
		return;
	}

	if let Err(err) = store.update_hash(&entity.id, &entity.user_id, outcome.new_hash).await {
		tracing::warn!(error = %err, "failed to persist updated hash");

		return;
	}

	if let Err(err) = trigger.run(&entity.user_id, &entity.trigger).await {
		tracing::warn!(error = %err, "trigger failed");
	}
}

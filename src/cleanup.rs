//! Periodic sweep that removes watchers whose parent no longer exists.

// crates.io
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	store::{ListFilter, ListOptions, Store},
};

/// Asks an external registry whether a watcher's parent still exists.
///
/// Out-of-scope collaborator, specified only by interface; `Ok(false)` means the parent is gone and
/// the watcher should be removed.
#[async_trait::async_trait]
pub trait ParentRegistry: Send + Sync {
	/// Whether the parent of watcher `id` (owned by `user_id`) still exists.
	async fn parent_exists(&self, user_id: &str, id: &str) -> Result<bool>;
}

/// Minimum age before an entity is considered for cleanup, mirroring
/// [`crate::model::WatchedEntity::cleanup_eligible`].
pub const GRACE_PERIOD: TimeDelta = TimeDelta::seconds(60);

/// How much coarser the cleanup ticker runs than the scheduler's `watch_interval`: the sweep lists
/// every entity and probes an external registry for each one, so it has no business running at the
/// scheduler's cadence.
pub const TICKER_MULTIPLE: u32 = 60;

/// Derive the cleanup ticker period from the scheduler's `watch_interval`.
pub fn interval_from_watch_interval(watch_interval: Duration) -> Duration {
	watch_interval * TICKER_MULTIPLE
}

/// Independent, coarser ticker than the [`crate::scheduler::Scheduler`]'s.
#[derive(Clone)]
pub struct Cleanup {
	store: Arc<dyn Store>,
	registry: Arc<dyn ParentRegistry>,
}
impl Cleanup {
	/// Build a cleanup sweep over `store`, consulting `registry` for each eligible entity.
	pub fn new(store: Arc<dyn Store>, registry: Arc<dyn ParentRegistry>) -> Self {
		Self { store, registry }
	}

	/// Run the ticker until `cancel` fires.
	pub async fn run(&self, interval: Duration, cancel: CancellationToken) {
		let mut ticker = tokio::time::interval(interval);
		ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

		loop {
			tokio::select! {
				_ = cancel.cancelled() => {
					tracing::info!("cleanup probe received shutdown signal");

					return;
				},
				_ = ticker.tick() => self.sweep().await,
			}
		}
	}

	/// One full pass over every listed entity.
	///
	/// A probe error for one entity is logged and never aborts the sweep; it simply leaves that
	/// entity untouched until the next pass.
	pub async fn sweep(&self) {
		let mut offset = 0i64;
		let page = 200i64;

		loop {
			let entities = match self
				.store
				.list(ListFilter::default(), ListOptions { limit: page, offset, ..Default::default() })
				.await
			{
				Ok(entities) => entities,
				Err(err) => {
					tracing::warn!(error = %err, "cleanup sweep failed to list entities");

					return;
				},
			};

			if entities.is_empty() {
				return;
			}

			let now = Utc::now();

			for entity in &entities {
				if !entity.cleanup_eligible(now) {
					continue;
				}

				match self.registry.parent_exists(&entity.user_id, &entity.id).await {
					Ok(false) => {
						if let Err(err) = self.store.delete(&entity.id, &entity.user_id).await {
							tracing::warn!(id = %entity.id, error = %err, "failed to delete orphaned watcher");
						} else {
							#[cfg(feature = "metrics")]
							crate::metrics::record_cleanup_deletion(&entity.user_id);
						}
					},
					Ok(true) => {},
					Err(err) => {
						tracing::warn!(id = %entity.id, error = %err, "parent-exists probe failed");
					},
				}
			}

			offset += entities.len() as i64;
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::model::{HashType, HttpRequest, WatchedEntityInit};

	struct AlwaysGone;
	#[async_trait::async_trait]
	impl ParentRegistry for AlwaysGone {
		async fn parent_exists(&self, _user_id: &str, _id: &str) -> Result<bool> {
			Ok(false)
		}
	}

	fn sample_init(id: &str, created_at: Option<DateTime<Utc>>) -> WatchedEntityInit {
		let request = HttpRequest {
			method: reqwest::Method::GET,
			endpoint: Url::parse("https://example.com").unwrap(),
			body: Vec::new(),
			header: reqwest::header::HeaderMap::new(),
			add_auth_token: false,
			isolated: false,
		};

		WatchedEntityInit {
			id: id.to_string(),
			user_id: "user-1".to_string(),
			interval: "1h".to_string(),
			hash_type: HashType::Md5,
			watch: request.clone(),
			trigger: request,
			created_at,
		}
	}

	#[tokio::test]
	async fn fresh_entities_survive_the_grace_period() {
		let store = Arc::new(crate::store::MemoryStore::new());
		store.set(sample_init("fresh", Some(Utc::now()))).await.unwrap();

		let cleanup = Cleanup::new(store.clone(), Arc::new(AlwaysGone));
		cleanup.sweep().await;

		assert!(store.read("fresh", "user-1").await.is_ok());
	}

	#[tokio::test]
	async fn stale_orphans_are_deleted() {
		let store = Arc::new(crate::store::MemoryStore::new());
		let old = Utc::now() - TimeDelta::seconds(120);
		store.set(sample_init("stale", Some(old))).await.unwrap();

		let cleanup = Cleanup::new(store.clone(), Arc::new(AlwaysGone));
		cleanup.sweep().await;

		assert!(store.read("stale", "user-1").await.is_err());
	}
}

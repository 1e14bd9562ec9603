//! In-process reference [`Store`] implementation.
//!
//! Backed by a single `RwLock<HashMap>`. `fetch` takes the write lock once and performs selection
//! plus advancement inside that single critical section, which is what gives the "observed as one
//! transaction" guarantee the trait documents without needing real MVCC — a non-transactional
//! compare-and-set path suitable for backends that cannot do snapshot transactions.

// std
use std::collections::HashMap;
// crates.io
use tokio::sync::RwLock;
// self
use crate::{
	_prelude::*,
	error::Error,
	model::{WatchedEntity, WatchedEntityInit},
	store::{ListFilter, ListOptions, SortField, Store, parse_interval_or_warn},
};

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
struct Key {
	id: String,
	user_id: String,
}
impl Key {
	fn new(id: impl Into<String>, user_id: impl Into<String>) -> Self {
		Self { id: id.into(), user_id: user_id.into() }
	}
}

/// In-memory [`Store`]; the default backend and the one exercised by the invariant test suite.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
	entities: Arc<RwLock<HashMap<Key, WatchedEntity>>>,
}
impl MemoryStore {
	/// Construct an empty store.
	pub fn new() -> Self {
		Self::default()
	}
}
#[async_trait::async_trait]
impl Store for MemoryStore {
	async fn fetch(&self, max: usize) -> Result<Vec<WatchedEntity>> {
		let now = Utc::now();
		let mut entities = self.entities.write().await;
		let due: Vec<Key> = entities
			.iter()
			.filter(|(_, entity)| entity.timestamp_of_next_check < now)
			.take(max)
			.map(|(key, _)| key.clone())
			.collect();
		let mut claimed = Vec::with_capacity(due.len());

		for key in due {
			if let Some(entity) = entities.get_mut(&key) {
				let interval_str = humantime_string(entity.interval);
				let advance = parse_interval_or_warn(&entity.id, &interval_str);

				entity.interval = advance;
				entity.timestamp_of_next_check = now + to_chrono(advance);
				claimed.push(entity.clone());
			}
		}

		Ok(claimed)
	}

	async fn update_hash(&self, id: &str, user_id: &str, hash: String) -> Result<()> {
		let mut entities = self.entities.write().await;
		let key = Key::new(id, user_id);

		match entities.get_mut(&key) {
			Some(entity) => {
				entity.last_hash = hash;

				Ok(())
			},
			None => Err(Error::NotFound { id: id.to_string(), user_id: user_id.to_string() }),
		}
	}

	async fn set(&self, init: WatchedEntityInit) -> Result<()> {
		let key = Key::new(init.id.clone(), init.user_id.clone());
		let now = Utc::now();
		let entity = WatchedEntity {
			id: init.id,
			user_id: init.user_id,
			interval: parse_interval_or_warn("(unpersisted)", &init.interval),
			hash_type: init.hash_type,
			watch: init.watch,
			trigger: init.trigger,
			created_at: init.created_at.unwrap_or(now),
			timestamp_of_next_check: DateTime::<Utc>::UNIX_EPOCH,
			last_hash: String::new(),
		};

		self.entities.write().await.insert(key, entity);

		Ok(())
	}

	async fn read(&self, id: &str, user_id: &str) -> Result<WatchedEntity> {
		let entities = self.entities.read().await;

		entities
			.get(&Key::new(id, user_id))
			.cloned()
			.ok_or_else(|| Error::NotFound { id: id.to_string(), user_id: user_id.to_string() })
	}

	async fn delete(&self, id: &str, user_id: &str) -> Result<bool> {
		let removed = self.entities.write().await.remove(&Key::new(id, user_id)).is_some();

		Ok(removed)
	}

	async fn list(&self, filter: ListFilter, opts: ListOptions) -> Result<Vec<WatchedEntity>> {
		let entities = self.entities.read().await;
		let mut matched: Vec<WatchedEntity> = entities
			.values()
			.filter(|entity| {
				filter.user_id.as_deref().is_none_or(|user_id| entity.user_id == user_id)
			})
			.cloned()
			.collect();

		match opts.sort {
			SortField::Id => matched.sort_by(|a, b| a.id.cmp(&b.id)),
		}

		let offset = opts.offset.max(0) as usize;
		let limit = opts.limit.max(0) as usize;

		Ok(matched.into_iter().skip(offset).take(limit).collect())
	}
}

pub(crate) fn to_chrono(duration: Duration) -> TimeDelta {
	TimeDelta::from_std(duration).unwrap_or(TimeDelta::hours(1))
}

pub(crate) fn humantime_string(duration: Duration) -> String {
	format!("{}ms", duration.as_millis())
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::Arc;
	// crates.io
	use reqwest::{Method, header::HeaderMap};
	use tokio::task::JoinSet;
	// self
	use super::*;
	use crate::model::HttpRequest;

	fn sample_init(id: &str, interval: &str) -> WatchedEntityInit {
		let request = HttpRequest {
			method: Method::GET,
			endpoint: Url::parse("https://example.com").unwrap(),
			body: Vec::new(),
			header: HeaderMap::new(),
			add_auth_token: false,
			isolated: false,
		};

		WatchedEntityInit {
			id: id.to_string(),
			user_id: "user-1".to_string(),
			interval: interval.to_string(),
			hash_type: Default::default(),
			watch: request.clone(),
			trigger: request,
			created_at: None,
		}
	}

	#[tokio::test]
	async fn set_then_read_round_trips_and_upserts() {
		let store = MemoryStore::new();

		store.set(sample_init("w1", "1h")).await.unwrap();

		let read = store.read("w1", "user-1").await.unwrap();
		assert_eq!(read.last_hash, "");
		assert_eq!(read.timestamp_of_next_check, DateTime::<Utc>::UNIX_EPOCH);

		store.set(sample_init("w1", "2h")).await.unwrap();
		let read = store.read("w1", "user-1").await.unwrap();
		assert_eq!(read.interval, Duration::from_secs(7200));
	}

	#[tokio::test]
	async fn delete_is_idempotent() {
		let store = MemoryStore::new();
		store.set(sample_init("w1", "1h")).await.unwrap();

		assert!(store.delete("w1", "user-1").await.unwrap());
		assert!(!store.delete("w1", "user-1").await.unwrap());
	}

	#[tokio::test]
	async fn fetch_advances_timestamp_and_claims_exclusively() {
		let store = Arc::new(MemoryStore::new());

		for i in 0..50 {
			store.set(sample_init(&format!("w{i}"), "1h")).await.unwrap();
		}

		let mut set = JoinSet::new();
		for _ in 0..2 {
			let store = store.clone();
			set.spawn(async move { store.fetch(10).await.unwrap() });
		}

		let mut all_ids = Vec::new();
		while let Some(result) = set.join_next().await {
			all_ids.extend(result.unwrap().into_iter().map(|e| e.id));
		}

		assert_eq!(all_ids.len(), 20);

		let unique: std::collections::HashSet<_> = all_ids.iter().collect();
		assert_eq!(unique.len(), 20, "claimed entities must be disjoint across concurrent fetches");

		let now = Utc::now();
		for id in &all_ids {
			let entity = store.read(id, "user-1").await.unwrap();
			assert!(entity.timestamp_of_next_check > now);
		}

		let listed = store.list(ListFilter::default(), ListOptions::default()).await.unwrap();
		let not_due = listed.iter().filter(|e| e.timestamp_of_next_check > now).count();
		let due = listed.iter().filter(|e| e.timestamp_of_next_check <= now).count();

		assert_eq!(not_due, 20);
		assert_eq!(due, 30);
	}

	#[tokio::test]
	async fn fetch_falls_back_to_one_hour_on_bad_interval() {
		let store = MemoryStore::new();
		store.set(sample_init("w1", "not-a-duration")).await.unwrap();

		let claimed = store.fetch(10).await.unwrap();
		assert_eq!(claimed.len(), 1);
		assert_eq!(claimed[0].interval, Duration::from_secs(3600));
	}
}

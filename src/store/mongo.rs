//! Durable [`Store`] backend (feature `mongodb`): a compound `(id, user_id)` unique index and an
//! ascending `timestamp_of_next_check` index, with a transaction-vs-best-effort split driven by
//! [`crate::config::Config::mongo_use_rel_set`]. Either way, claiming an entity is a
//! compare-and-set on the exact `timestamp_of_next_check` observed at find time, so two concurrent
//! `fetch` calls never both claim the same entity.

// crates.io
use bson::{DateTime as BsonDateTime, doc};
use mongodb::{
	Client, ClientSession, Collection, IndexModel,
	options::{IndexOptions, ReadConcern, WriteConcern},
};
// self
use crate::{
	_prelude::*,
	model::WatchedEntity,
	store::{ListFilter, ListOptions, Store, parse_interval_or_warn},
};

/// Durable store backed by a single MongoDB collection of [`WatchedEntity`] documents.
pub struct MongoStore {
	collection: Collection<WatchedEntity>,
	use_transactions: bool,
}
impl MongoStore {
	/// Connect to `mongo_url` and open `mongo_table.mongo_collection_watched_entity`.
	pub async fn connect(config: &crate::config::Config) -> Result<Self> {
		let client = Client::with_uri_str(&config.mongo_url).await?;
		let collection = client
			.database(&config.mongo_table)
			.collection(&config.mongo_collection_watched_entity);
		let store = Self { collection, use_transactions: config.mongo_use_rel_set };

		store.ensure_indexes().await?;

		Ok(store)
	}

	async fn ensure_indexes(&self) -> Result<()> {
		let unique_id_user = IndexModel::builder()
			.keys(doc! { "id": 1, "user_id": 1 })
			.options(IndexOptions::builder().unique(true).build())
			.build();
		let next_check = IndexModel::builder().keys(doc! { "timestamp_of_next_check": 1 }).build();

		self.collection.create_index(unique_id_user).await?;
		self.collection.create_index(next_check).await?;

		Ok(())
	}

	/// Claim `max` due entities inside a majority-write, snapshot-read session transaction,
	/// committing on success and aborting on any error.
	async fn fetch_with_transaction(&self, max: usize) -> Result<Vec<WatchedEntity>> {
		let client = self.collection.client().clone();
		let mut session = client.start_session().await?;

		session
			.start_transaction()
			.write_concern(WriteConcern::majority())
			.read_concern(ReadConcern::snapshot())
			.await?;

		match self.claim_due_in_session(max, &mut session).await {
			Ok(claimed) => {
				session.commit_transaction().await?;

				Ok(claimed)
			},
			Err(err) => {
				let _ = session.abort_transaction().await;

				Err(err)
			},
		}
	}

	/// Find up to `max` due entities and claim each with a filter on the exact
	/// `timestamp_of_next_check` observed at find time, dropping any entity whose update matched
	/// zero documents (claimed by a concurrent `fetch` in between the find and the update).
	async fn fetch_best_effort(&self, max: usize) -> Result<Vec<WatchedEntity>> {
		let now = Utc::now();
		let filter = doc! { "timestamp_of_next_check": { "$lt": BsonDateTime::from_chrono(now) } };
		let options = mongodb::options::FindOptions::builder().limit(max as i64).build();

		let mut cursor = self.collection.find(filter).with_options(options).await?;
		let mut due = Vec::new();

		while cursor.advance().await? {
			due.push(cursor.deserialize_current()?);
		}

		let mut claimed = Vec::with_capacity(due.len());

		for entity in due {
			let (cas_filter, update, next_check) = cas_advance(&entity, now);
			let result = self.collection.update_one(cas_filter, update).await?;

			if result.modified_count == 0 {
				continue;
			}

			claimed.push(claim(entity, next_check));
		}

		Ok(claimed)
	}

	/// Same claim logic as [`MongoStore::fetch_best_effort`], with every collection call
	/// threaded through `session` so it participates in the caller's transaction.
	async fn claim_due_in_session(&self, max: usize, session: &mut ClientSession) -> Result<Vec<WatchedEntity>> {
		let now = Utc::now();
		let filter = doc! { "timestamp_of_next_check": { "$lt": BsonDateTime::from_chrono(now) } };
		let options = mongodb::options::FindOptions::builder().limit(max as i64).build();

		let mut cursor =
			self.collection.find(filter).with_options(options).session(&mut *session).await?;
		let mut due = Vec::new();

		while let Some(entity) = cursor.next(session).await.transpose()? {
			due.push(entity);
		}

		let mut claimed = Vec::with_capacity(due.len());

		for entity in due {
			let (cas_filter, update, next_check) = cas_advance(&entity, now);
			let result =
				self.collection.update_one(cas_filter, update).session(&mut *session).await?;

			if result.modified_count == 0 {
				continue;
			}

			claimed.push(claim(entity, next_check));
		}

		Ok(claimed)
	}
}

/// Build the compare-and-set filter/update pair for claiming `entity`: the filter pins
/// `timestamp_of_next_check` to the value observed at find time, so a concurrent claim of the same
/// entity fails to match and is dropped by the caller.
fn cas_advance(entity: &WatchedEntity, now: DateTime<Utc>) -> (bson::Document, bson::Document, DateTime<Utc>) {
	let advance = parse_interval_or_warn(&entity.id, &crate::store::memory::humantime_string(entity.interval));
	let next_check = now + crate::store::memory::to_chrono(advance);
	let filter = doc! {
		"id": &entity.id,
		"user_id": &entity.user_id,
		"timestamp_of_next_check": BsonDateTime::from_chrono(entity.timestamp_of_next_check),
	};
	let update = doc! { "$set": { "timestamp_of_next_check": BsonDateTime::from_chrono(next_check) } };

	(filter, update, next_check)
}

fn claim(mut entity: WatchedEntity, next_check: DateTime<Utc>) -> WatchedEntity {
	entity.timestamp_of_next_check = next_check;

	entity
}

#[async_trait::async_trait]
impl Store for MongoStore {
	async fn fetch(&self, max: usize) -> Result<Vec<WatchedEntity>> {
		if self.use_transactions {
			self.fetch_with_transaction(max).await
		} else {
			self.fetch_best_effort(max).await
		}
	}

	async fn update_hash(&self, id: &str, user_id: &str, hash: String) -> Result<()> {
		self.collection
			.update_one(doc! { "id": id, "user_id": user_id }, doc! { "$set": { "last_hash": hash } })
			.await?;

		Ok(())
	}

	async fn set(&self, init: crate::model::WatchedEntityInit) -> Result<()> {
		let now = Utc::now();
		let entity = WatchedEntity {
			id: init.id.clone(),
			user_id: init.user_id.clone(),
			interval: crate::store::humantime_like_parse(&init.interval)
				.unwrap_or(crate::store::FALLBACK_INTERVAL),
			hash_type: init.hash_type,
			watch: init.watch,
			trigger: init.trigger,
			created_at: init.created_at.unwrap_or(now),
			timestamp_of_next_check: DateTime::<Utc>::UNIX_EPOCH,
			last_hash: String::new(),
		};

		self.collection
			.replace_one(doc! { "id": &init.id, "user_id": &init.user_id }, entity)
			.upsert(true)
			.await?;

		Ok(())
	}

	async fn read(&self, id: &str, user_id: &str) -> Result<WatchedEntity> {
		self.collection
			.find_one(doc! { "id": id, "user_id": user_id })
			.await?
			.ok_or_else(|| Error::NotFound { id: id.to_string(), user_id: user_id.to_string() })
	}

	async fn delete(&self, id: &str, user_id: &str) -> Result<bool> {
		let result = self.collection.delete_many(doc! { "id": id, "user_id": user_id }).await?;

		Ok(result.deleted_count > 0)
	}

	async fn list(&self, filter: ListFilter, opts: ListOptions) -> Result<Vec<WatchedEntity>> {
		let mongo_filter = match filter.user_id {
			Some(user_id) => doc! { "user_id": user_id },
			None => doc! {},
		};
		let options = mongodb::options::FindOptions::builder()
			.skip(opts.offset as u64)
			.limit(opts.limit)
			.sort(doc! { "id": 1 })
			.build();

		let mut cursor = self.collection.find(mongo_filter).with_options(options).await?;
		let mut entities = Vec::new();

		while cursor.advance().await? {
			entities.push(cursor.deserialize_current()?);
		}

		Ok(entities)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::model::{HashType, HttpRequest, WatchedEntityInit};

	fn sample_entity() -> WatchedEntity {
		let request = HttpRequest {
			method: reqwest::Method::GET,
			endpoint: Url::parse("https://example.com").unwrap(),
			body: Vec::new(),
			header: reqwest::header::HeaderMap::new(),
			add_auth_token: false,
			isolated: false,
		};

		WatchedEntity {
			id: "w1".into(),
			user_id: "user-1".into(),
			interval: Duration::from_secs(3600),
			hash_type: HashType::Md5,
			watch: request.clone(),
			trigger: request,
			created_at: Utc::now(),
			timestamp_of_next_check: DateTime::<Utc>::UNIX_EPOCH,
			last_hash: String::new(),
		}
	}

	// No live server is exercised here; this checks the same encode/decode path `fetch` and
	// `set` rely on (bson's typed (de)serialization of `WatchedEntity`) round-trips without a
	// connection, and that the transaction-vs-CAS branch at least compiles for both settings of
	// `mongo_use_rel_set`.
	#[test]
	fn watched_entity_round_trips_through_bson() {
		let entity = sample_entity();
		let document = bson::to_document(&entity).unwrap();
		let decoded: WatchedEntity = bson::from_document(document).unwrap();

		assert_eq!(decoded.id, entity.id);
		assert_eq!(decoded.user_id, entity.user_id);
		assert_eq!(decoded.interval, entity.interval);
		assert_eq!(decoded.last_hash, entity.last_hash);
	}

	#[test]
	fn watcher_init_upsert_document_round_trips() {
		let init = WatchedEntityInit {
			id: "w2".into(),
			user_id: "user-1".into(),
			interval: "1h".into(),
			hash_type: HashType::Sha256,
			watch: sample_entity().watch,
			trigger: sample_entity().trigger,
			created_at: None,
		};
		let filter = doc! { "id": &init.id, "user_id": &init.user_id };

		assert_eq!(filter.get_str("id").unwrap(), "w2");
		assert_eq!(filter.get_str("user_id").unwrap(), "user-1");
	}
}

//! Durable collection of [`WatchedEntity`] records and the lease-claim scheduler primitive.

pub mod memory;
#[cfg(feature = "mongodb")] pub mod mongo;

// self
use crate::{_prelude::*, model::WatchedEntity};

pub use crate::store::memory::MemoryStore;
#[cfg(feature = "mongodb")] pub use crate::store::mongo::MongoStore;

/// Field to sort [`Store::list`] results by. `Id` is the only supported sort today, an ascending
/// `id` order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortField {
	/// Ascending by `id`.
	#[default]
	Id,
}

/// Pagination and ordering applied to [`Store::list`].
#[derive(Clone, Copy, Debug)]
pub struct ListOptions {
	/// Maximum number of entities to return.
	pub limit: i64,
	/// Number of entities to skip before collecting `limit`.
	pub offset: i64,
	/// Sort field; always ascending.
	pub sort: SortField,
}
impl Default for ListOptions {
	fn default() -> Self {
		Self { limit: 100, offset: 0, sort: SortField::Id }
	}
}

/// Optional scoping filter applied to [`Store::list`].
#[derive(Clone, Debug, Default)]
pub struct ListFilter {
	/// Restrict to a single owning user, when present.
	pub user_id: Option<String>,
}

/// Durable, multi-tenant collection of [`WatchedEntity`] records.
///
/// Implementations must guarantee the "exclusive claim" invariant: two concurrent [`Store::fetch`]
/// calls against the same backing store never return overlapping entities, and the returned
/// entities' `timestamp_of_next_check` has already been advanced by the time `fetch` returns.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
	/// Atomically select up to `max` due entities and advance their next-check timestamp.
	///
	/// An entity is due when `timestamp_of_next_check < now`. Each claimed entity's
	/// `timestamp_of_next_check` is advanced to `now + interval` as part of the same operation
	/// that selects it, so no concurrent `fetch` can return it again before `interval` elapses.
	/// An entity whose `interval` fails to parse is treated as one hour; a warning is logged and
	/// the record is not rejected.
	async fn fetch(&self, max: usize) -> Result<Vec<WatchedEntity>>;

	/// Record the fingerprint from the most recent successful check.
	async fn update_hash(&self, id: &str, user_id: &str, hash: String) -> Result<()>;

	/// Upsert on `(id, user_id)`. Resets `timestamp_of_next_check` to the epoch (immediately due)
	/// and `last_hash` to empty. `created_at` is taken from `init.created_at`, defaulting to now;
	/// because this is a full-record replace, re-registering an existing entity without supplying
	/// `created_at` resets it rather than preserving the prior value.
	async fn set(&self, init: crate::model::WatchedEntityInit) -> Result<()>;

	/// Point lookup; returns [`crate::Error::NotFound`] when absent.
	async fn read(&self, id: &str, user_id: &str) -> Result<WatchedEntity>;

	/// Idempotent removal. Returns whether an entity was actually removed.
	async fn delete(&self, id: &str, user_id: &str) -> Result<bool>;

	/// Administrative listing, sorted by `id` ascending.
	async fn list(&self, filter: ListFilter, opts: ListOptions) -> Result<Vec<WatchedEntity>>;
}

/// Fallback interval applied when an entity's stored `interval` string fails to parse.
pub const FALLBACK_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Parse a duration string, logging a warning and falling back to one hour on failure.
///
/// Shared by every [`Store`] backend so the "invalid interval" behavior documented on
/// [`Store::fetch`] is implemented exactly once.
pub fn parse_interval_or_warn(id: &str, raw: &str) -> Duration {
	match humantime_like_parse(raw) {
		Some(duration) => duration,
		None => {
			tracing::warn!(id, interval = raw, "invalid interval; treating as 1 hour");

			FALLBACK_INTERVAL
		},
	}
}

/// Minimal duration-string parser: an optional sequence of `<number><unit>` pairs (`ms`, `s`, `m`,
/// `h`), e.g. `"300ms"`, `"1h"`, `"1h30m"`.
pub fn humantime_like_parse(raw: &str) -> Option<Duration> {
	if raw.is_empty() {
		return None;
	}

	let mut total = Duration::ZERO;
	let mut rest = raw;
	let mut consumed_any = false;

	while !rest.is_empty() {
		let digits_end = rest.find(|c: char| !c.is_ascii_digit() && c != '.').unwrap_or(0);

		if digits_end == 0 {
			return None;
		}

		let (number, tail) = rest.split_at(digits_end);
		let unit_end = tail.find(|c: char| c.is_ascii_digit()).unwrap_or(tail.len());
		let (unit, remaining) = tail.split_at(unit_end);
		let value: f64 = number.parse().ok()?;
		let unit_duration = match unit {
			"ns" => Duration::from_nanos(1),
			"us" | "µs" => Duration::from_micros(1),
			"ms" => Duration::from_millis(1),
			"s" => Duration::from_secs(1),
			"m" => Duration::from_secs(60),
			"h" => Duration::from_secs(3600),
			_ => return None,
		};

		total += unit_duration.mul_f64(value);
		rest = remaining;
		consumed_any = true;
	}

	consumed_any.then_some(total)
}

//! Durable, keyed store of previously received responses.
//!
//! This module provides:
//! - [`ResponseStore`]: the raw backend contract (bytes in, bytes out)
//! - [`PersistentResponseStore`]: the typed façade repositories use, which
//!   treats unreadable or expired entries as misses instead of errors
//! - backends: [`SqliteStore`], [`MemoryStore`], [`NoopStore`]

mod memory;
mod sqlite;

pub use memory::{MemoryStore, NoopStore};
pub use sqlite::SqliteStore;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use color_eyre::Result;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

/// Identity of a cached response: who asked, and for what.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
  /// Principal (user) the entry belongs to
  pub principal: String,
  /// Request fingerprint, see `EndpointDescriptor::fingerprint`
  pub fingerprint: String,
}

impl CacheKey {
  pub fn new(principal: impl Into<String>, fingerprint: impl Into<String>) -> Self {
    Self {
      principal: principal.into(),
      fingerprint: fingerprint.into(),
    }
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.principal, self.fingerprint)
  }
}

/// A stored response as the backend hands it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
  /// Serialized value (JSON)
  pub data: Vec<u8>,
  /// When the entry was last written
  pub cached_at: DateTime<Utc>,
}

/// Trait for storage backends. Synchronous and local; never touches the
/// network.
pub trait ResponseStore: Send + Sync {
  fn lookup(&self, key: &CacheKey) -> Result<Option<StoredEntry>>;

  /// Insert or overwrite the entry for `key`.
  fn store(&self, key: &CacheKey, data: &[u8]) -> Result<()>;

  fn delete(&self, key: &CacheKey) -> Result<()>;

  /// Delete every entry whose key matches; returns how many went.
  fn delete_where(&self, predicate: &dyn Fn(&CacheKey) -> bool) -> Result<usize>;
}

/// Typed access to a [`ResponseStore`].
///
/// The network stays the source of truth: a backend failure, an entry that
/// no longer decodes, or one older than `max_age` all read as a miss.
#[derive(Clone)]
pub struct PersistentResponseStore {
  backend: Arc<dyn ResponseStore>,
  max_age: Option<Duration>,
}

impl PersistentResponseStore {
  pub fn new(backend: impl ResponseStore + 'static) -> Self {
    Self::from_shared(Arc::new(backend))
  }

  pub fn from_shared(backend: Arc<dyn ResponseStore>) -> Self {
    Self {
      backend,
      max_age: None,
    }
  }

  /// A store that never holds anything, for when caching is switched off.
  pub fn disabled() -> Self {
    Self::new(NoopStore)
  }

  /// Treat entries older than `max_age` as misses (and drop them).
  pub fn with_max_age(mut self, max_age: Duration) -> Self {
    self.max_age = Some(max_age);
    self
  }

  pub fn lookup<V: DeserializeOwned>(&self, key: &CacheKey) -> Option<V> {
    let entry = match self.backend.lookup(key) {
      Ok(Some(entry)) => entry,
      Ok(None) => return None,
      Err(error) => {
        warn!(key = %key, error = %error, "cache lookup failed, treating as miss");
        return None;
      }
    };

    if let Some(max_age) = self.max_age {
      if Utc::now() - entry.cached_at > max_age {
        debug!(key = %key, cached_at = %entry.cached_at, "cache entry expired");
        if let Err(error) = self.backend.delete(key) {
          warn!(key = %key, error = %error, "failed to drop expired cache entry");
        }
        return None;
      }
    }

    match serde_json::from_slice(&entry.data) {
      Ok(value) => Some(value),
      Err(error) => {
        warn!(key = %key, error = %error, "unreadable cache entry, treating as miss");
        None
      }
    }
  }

  pub fn store<V: Serialize>(&self, key: &CacheKey, value: &V) -> Result<()> {
    let data = serde_json::to_vec(value)?;
    self.backend.store(key, &data)
  }

  pub fn delete(&self, key: &CacheKey) -> Result<()> {
    self.backend.delete(key)
  }

  pub fn delete_where(&self, predicate: impl Fn(&CacheKey) -> bool) -> Result<usize> {
    self.backend.delete_where(&predicate)
  }

  /// Drop everything cached for `principal` (sign-out).
  pub fn delete_principal(&self, principal: &str) -> Result<usize> {
    self.delete_where(|key| key.principal == principal)
  }
}

#[cfg(test)]
mod tests {
  use serde::{Deserialize, Serialize};

  use super::*;

  #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
  struct Item {
    id: u32,
    label: String,
  }

  fn item(id: u32) -> Item {
    Item {
      id,
      label: format!("item {}", id),
    }
  }

  #[test]
  fn test_store_then_lookup_round_trips() {
    let store = PersistentResponseStore::new(MemoryStore::new());
    let key = CacheKey::new("u1", "abc");

    store.store(&key, &vec![item(1), item(2)]).unwrap();

    assert_eq!(store.lookup::<Vec<Item>>(&key), Some(vec![item(1), item(2)]));
  }

  #[test]
  fn test_delete_then_lookup_misses() {
    let store = PersistentResponseStore::new(MemoryStore::new());
    let key = CacheKey::new("u1", "abc");
    store.store(&key, &item(1)).unwrap();

    store.delete(&key).unwrap();

    assert_eq!(store.lookup::<Item>(&key), None);
  }

  #[test]
  fn test_corrupt_entry_is_a_miss() {
    let backend = Arc::new(MemoryStore::new());
    let key = CacheKey::new("u1", "abc");
    backend.store(&key, b"{not json").unwrap();
    let store = PersistentResponseStore::from_shared(backend.clone());

    assert_eq!(store.lookup::<Item>(&key), None);

    // Shape mismatch counts as corruption too
    store.store(&key, &"just a string").unwrap();
    assert_eq!(store.lookup::<Item>(&key), None);
  }

  #[test]
  fn test_delete_principal_leaves_other_users() {
    let store = PersistentResponseStore::new(MemoryStore::new());
    store.store(&CacheKey::new("ana", "a"), &item(1)).unwrap();
    store.store(&CacheKey::new("ana", "b"), &item(2)).unwrap();
    store.store(&CacheKey::new("bob", "a"), &item(3)).unwrap();

    assert_eq!(store.delete_principal("ana").unwrap(), 2);

    assert_eq!(store.lookup::<Item>(&CacheKey::new("ana", "a")), None);
    assert_eq!(store.lookup::<Item>(&CacheKey::new("ana", "b")), None);
    assert_eq!(
      store.lookup::<Item>(&CacheKey::new("bob", "a")),
      Some(item(3))
    );
  }

  #[test]
  fn test_expired_entries_are_dropped() {
    let backend = Arc::new(MemoryStore::new());
    let key = CacheKey::new("u1", "abc");
    backend.insert_at(&key, serde_json::to_vec(&item(1)).unwrap(), Utc::now() - Duration::hours(2));
    let store = PersistentResponseStore::from_shared(backend.clone()).with_max_age(Duration::hours(1));

    assert_eq!(store.lookup::<Item>(&key), None);
    assert_eq!(backend.lookup(&key).unwrap(), None);
  }

  #[test]
  fn test_fresh_entries_survive_max_age() {
    let store =
      PersistentResponseStore::new(MemoryStore::new()).with_max_age(Duration::hours(1));
    let key = CacheKey::new("u1", "abc");
    store.store(&key, &item(4)).unwrap();

    assert_eq!(store.lookup::<Item>(&key), Some(item(4)));
  }

  #[test]
  fn test_disabled_store_never_hits() {
    let store = PersistentResponseStore::disabled();
    let key = CacheKey::new("u1", "abc");
    store.store(&key, &item(1)).unwrap();
    assert_eq!(store.lookup::<Item>(&key), None);
  }
}

//! In-process backends.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};

use super::{CacheKey, ResponseStore, StoredEntry};

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStore;

impl ResponseStore for NoopStore {
  fn lookup(&self, _key: &CacheKey) -> Result<Option<StoredEntry>> {
    Ok(None) // Always miss
  }

  fn store(&self, _key: &CacheKey, _data: &[u8]) -> Result<()> {
    Ok(()) // Discard
  }

  fn delete(&self, _key: &CacheKey) -> Result<()> {
    Ok(())
  }

  fn delete_where(&self, _predicate: &dyn Fn(&CacheKey) -> bool) -> Result<usize> {
    Ok(0)
  }
}

/// Hash-map backend; lives as long as the process.
#[derive(Default)]
pub struct MemoryStore {
  entries: Mutex<HashMap<CacheKey, StoredEntry>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.entries.lock().map(|e| e.len()).unwrap_or(0)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  #[cfg(test)]
  pub(crate) fn insert_at(&self, key: &CacheKey, data: Vec<u8>, cached_at: chrono::DateTime<Utc>) {
    self
      .entries
      .lock()
      .unwrap()
      .insert(key.clone(), StoredEntry { data, cached_at });
  }
}

impl ResponseStore for MemoryStore {
  fn lookup(&self, key: &CacheKey) -> Result<Option<StoredEntry>> {
    let entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(entries.get(key).cloned())
  }

  fn store(&self, key: &CacheKey, data: &[u8]) -> Result<()> {
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    entries.insert(
      key.clone(),
      StoredEntry {
        data: data.to_vec(),
        cached_at: Utc::now(),
      },
    );
    Ok(())
  }

  fn delete(&self, key: &CacheKey) -> Result<()> {
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    entries.remove(key);
    Ok(())
  }

  fn delete_where(&self, predicate: &dyn Fn(&CacheKey) -> bool) -> Result<usize> {
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let before = entries.len();
    entries.retain(|key, _| !predicate(key));
    Ok(before - entries.len())
  }
}

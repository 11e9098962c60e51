//! SQLite-based response store.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::{CacheKey, ResponseStore, StoredEntry};

/// SQLite-based cache storage implementation.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open the store at the default location.
  pub fn open() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  /// Open (or create) the store at `path`.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;
    debug!(path = %path.display(), "opened response cache");

    Self::with_connection(conn)
  }

  /// Non-durable store, mostly for tests.
  pub fn in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory cache: {}", e))?;
    Self::with_connection(conn)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("datapipe").join("cache.db"))
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- Last successfully decoded response per principal and request fingerprint
CREATE TABLE IF NOT EXISTS response_cache (
    principal TEXT NOT NULL,
    fingerprint TEXT NOT NULL,
    data BLOB NOT NULL,
    cached_at TEXT NOT NULL,
    PRIMARY KEY (principal, fingerprint)
);

CREATE INDEX IF NOT EXISTS idx_response_cache_principal
    ON response_cache(principal);
"#;

impl ResponseStore for SqliteStore {
  fn lookup(&self, key: &CacheKey) -> Result<Option<StoredEntry>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let row: Option<(Vec<u8>, String)> = conn
      .query_row(
        "SELECT data, cached_at FROM response_cache
         WHERE principal = ? AND fingerprint = ?",
        params![key.principal, key.fingerprint],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to query cache entry: {}", e))?;

    match row {
      Some((data, cached_at)) => Ok(Some(StoredEntry {
        data,
        cached_at: parse_datetime(&cached_at)?,
      })),
      None => Ok(None),
    }
  }

  fn store(&self, key: &CacheKey, data: &[u8]) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO response_cache (principal, fingerprint, data, cached_at)
         VALUES (?, ?, ?, ?)",
        params![key.principal, key.fingerprint, data, Utc::now().to_rfc3339()],
      )
      .map_err(|e| eyre!("Failed to store cache entry: {}", e))?;

    Ok(())
  }

  fn delete(&self, key: &CacheKey) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "DELETE FROM response_cache WHERE principal = ? AND fingerprint = ?",
        params![key.principal, key.fingerprint],
      )
      .map_err(|e| eyre!("Failed to delete cache entry: {}", e))?;

    Ok(())
  }

  fn delete_where(&self, predicate: &dyn Fn(&CacheKey) -> bool) -> Result<usize> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    let keys: Vec<CacheKey> = {
      let mut stmt = tx
        .prepare("SELECT principal, fingerprint FROM response_cache")
        .map_err(|e| eyre!("Failed to prepare query: {}", e))?;
      let rows = stmt
        .query_map([], |row| Ok(CacheKey::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
        .map_err(|e| eyre!("Failed to list cache keys: {}", e))?;
      rows
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| eyre!("Failed to read cache key: {}", e))?
    };

    let mut deleted = 0;
    for key in keys.iter().filter(|key| predicate(key)) {
      deleted += tx
        .execute(
          "DELETE FROM response_cache WHERE principal = ? AND fingerprint = ?",
          params![key.principal, key.fingerprint],
        )
        .map_err(|e| eyre!("Failed to delete cache entry: {}", e))?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(deleted)
  }
}

/// Parse a timestamp written by `store`.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

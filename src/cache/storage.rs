//! Partition store trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::traits::Snapshot;
use crate::http::{RequestKey, Response};

/// Trait for partition store backends.
///
/// Every operation is atomic for a single entry; nothing spans entries.
pub trait PartitionStore: Send + Sync + 'static {
  /// Create the partition if it does not exist yet.
  fn open(&self, partition: &str) -> Result<()>;

  /// Names of all live partitions, in creation order.
  fn partitions(&self) -> Result<Vec<String>>;

  /// Store a snapshot, replacing any previous entry for its key.
  /// Creates the partition on first write.
  fn put(&self, partition: &str, snapshot: &Snapshot) -> Result<()>;

  /// Look up a key in one partition.
  fn lookup(&self, partition: &str, key: &RequestKey) -> Result<Option<Snapshot>>;

  /// Look up a key across all partitions, oldest partition first.
  fn lookup_any(&self, key: &RequestKey) -> Result<Option<Snapshot>>;

  /// Delete every partition not named in `keep`. Returns the deleted names.
  fn retain_only(&self, keep: &[String]) -> Result<Vec<String>>;

  /// Number of entries in a partition (0 if it does not exist).
  fn entry_count(&self, partition: &str) -> Result<usize>;
}

/// SQLite-based partition store.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open the store at the default location.
  pub fn open_default() -> Result<Self> {
    let path = Self::default_path()?;
    Self::open_at(&path)
  }

  /// Open or create the store at a specific path.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;

    Ok(store)
  }

  /// Get the default database path.
  fn default_path() -> Result<std::path::PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("hors-ligne").join("cache.db"))
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Run database migrations for partition tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute_batch(PARTITION_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for partition tables.
const PARTITION_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- Named partitions; rowid order is creation order
CREATE TABLE IF NOT EXISTS partitions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

-- One snapshot per (partition, request key)
CREATE TABLE IF NOT EXISTS snapshots (
    partition_id INTEGER NOT NULL,
    key_hash TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    status_text TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL,
    PRIMARY KEY (partition_id, key_hash),
    FOREIGN KEY (partition_id) REFERENCES partitions(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_snapshots_key ON snapshots(key_hash);
"#;

const SNAPSHOT_COLUMNS: &str = "s.method, s.url, s.status, s.status_text, s.headers, s.body, s.cached_at";

fn ensure_partition(conn: &Connection, partition: &str) -> Result<i64> {
  conn
    .execute(
      "INSERT OR IGNORE INTO partitions (name) VALUES (?)",
      params![partition],
    )
    .map_err(|e| eyre!("Failed to create partition {}: {}", partition, e))?;

  conn
    .query_row(
      "SELECT id FROM partitions WHERE name = ?",
      params![partition],
      |row| row.get(0),
    )
    .map_err(|e| eyre!("Failed to look up partition {}: {}", partition, e))
}

/// Raw column values of a snapshot row, decoded outside the rusqlite closure.
struct SnapshotRow {
  method: String,
  url: String,
  status: u16,
  status_text: String,
  headers: String,
  body: Vec<u8>,
  cached_at: String,
}

impl SnapshotRow {
  fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      method: row.get(0)?,
      url: row.get(1)?,
      status: row.get(2)?,
      status_text: row.get(3)?,
      headers: row.get(4)?,
      body: row.get(5)?,
      cached_at: row.get(6)?,
    })
  }

  fn into_snapshot(self) -> Result<Snapshot> {
    let headers: Vec<(String, String)> = serde_json::from_str(&self.headers)
      .map_err(|e| eyre!("Failed to deserialize headers: {}", e))?;
    let cached_at = parse_datetime(&self.cached_at)?;

    Ok(Snapshot {
      key: RequestKey {
        method: self.method,
        url: self.url,
      },
      response: Response {
        status: self.status,
        status_text: self.status_text,
        headers,
        body: self.body,
      },
      cached_at,
    })
  }
}

impl PartitionStore for SqliteStore {
  fn open(&self, partition: &str) -> Result<()> {
    let conn = self.lock()?;
    ensure_partition(&conn, partition)?;
    Ok(())
  }

  fn partitions(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT name FROM partitions ORDER BY id")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list partitions: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read partition name: {}", e))?;

    Ok(names)
  }

  fn put(&self, partition: &str, snapshot: &Snapshot) -> Result<()> {
    let conn = self.lock()?;
    let partition_id = ensure_partition(&conn, partition)?;
    let headers = serde_json::to_string(&snapshot.response.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO snapshots
           (partition_id, key_hash, method, url, status, status_text, headers, body, cached_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
          partition_id,
          snapshot.key.digest(),
          snapshot.key.method,
          snapshot.key.url,
          snapshot.response.status,
          snapshot.response.status_text,
          headers,
          snapshot.response.body,
          snapshot.cached_at.to_rfc3339(),
        ],
      )
      .map_err(|e| eyre!("Failed to store snapshot for {}: {}", snapshot.key, e))?;

    Ok(())
  }

  fn lookup(&self, partition: &str, key: &RequestKey) -> Result<Option<Snapshot>> {
    let conn = self.lock()?;

    let row = conn
      .query_row(
        &format!(
          "SELECT {} FROM snapshots s
           INNER JOIN partitions p ON p.id = s.partition_id
           WHERE p.name = ? AND s.key_hash = ?",
          SNAPSHOT_COLUMNS
        ),
        params![partition, key.digest()],
        SnapshotRow::from_row,
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up {} in {}: {}", key, partition, e))?;

    row.map(SnapshotRow::into_snapshot).transpose()
  }

  fn lookup_any(&self, key: &RequestKey) -> Result<Option<Snapshot>> {
    let conn = self.lock()?;

    let row = conn
      .query_row(
        &format!(
          "SELECT {} FROM snapshots s
           WHERE s.key_hash = ?
           ORDER BY s.partition_id
           LIMIT 1",
          SNAPSHOT_COLUMNS
        ),
        params![key.digest()],
        SnapshotRow::from_row,
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up {}: {}", key, e))?;

    row.map(SnapshotRow::into_snapshot).transpose()
  }

  fn retain_only(&self, keep: &[String]) -> Result<Vec<String>> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    let orphaned: Vec<(i64, String)> = {
      let mut stmt = tx
        .prepare("SELECT id, name FROM partitions ORDER BY id")
        .map_err(|e| eyre!("Failed to prepare query: {}", e))?;
      let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .map_err(|e| eyre!("Failed to list partitions: {}", e))?
        .collect::<rusqlite::Result<Vec<(i64, String)>>>()
        .map_err(|e| eyre!("Failed to read partition: {}", e))?;
      rows
        .into_iter()
        .filter(|(_, name)| !keep.contains(name))
        .collect()
    };

    for (id, name) in &orphaned {
      tx.execute("DELETE FROM snapshots WHERE partition_id = ?", params![id])
        .map_err(|e| eyre!("Failed to clear partition {}: {}", name, e))?;
      tx.execute("DELETE FROM partitions WHERE id = ?", params![id])
        .map_err(|e| eyre!("Failed to delete partition {}: {}", name, e))?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(orphaned.into_iter().map(|(_, name)| name).collect())
  }

  fn entry_count(&self, partition: &str) -> Result<usize> {
    let conn = self.lock()?;

    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM snapshots s
         INNER JOIN partitions p ON p.id = s.partition_id
         WHERE p.name = ?",
        params![partition],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count entries in {}: {}", partition, e))?;

    Ok(count as usize)
  }
}

/// Parse an RFC 3339 timestamp written by `put`.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

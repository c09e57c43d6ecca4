use crate::error::{ChatQuotaError, Result};
use crate::storage::KeyValueStore;
use anyhow::Context;
use chrono::Utc;
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

/// SQLite-backed key-value store
///
/// A single `kv` table in a file under the user's data directory. Each call
/// opens its own connection, so the store is cheap to share between threads.
pub struct SqliteStore {
    db_path: PathBuf,
}

impl SqliteStore {
    /// Create a new store in the default location
    ///
    /// The database lives in the user's data directory unless
    /// `CHATQUOTA_STORE_DB` points elsewhere.
    pub fn new() -> Result<Self> {
        if let Ok(override_path) = std::env::var("CHATQUOTA_STORE_DB") {
            return Self::new_with_path(override_path);
        }

        let proj_dirs = ProjectDirs::from("com", "chatquota", "chatquota")
            .ok_or_else(|| ChatQuotaError::Storage("Could not determine data directory".into()))?;

        Self::new_with_path(proj_dirs.data_dir().join("store.db"))
    }

    /// Create a store backed by the database file at `db_path`
    ///
    /// # Examples
    ///
    /// ```
    /// use chatquota::storage::{KeyValueStore, SqliteStore};
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let store = SqliteStore::new_with_path(dir.path().join("store.db")).unwrap();
    /// store.set("k", "v").unwrap();
    /// ```
    pub fn new_with_path<P: Into<PathBuf>>(db_path: P) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create parent directory for database")
                .map_err(|e| ChatQuotaError::Storage(e.to_string()))?;
        }

        let store = Self { db_path };
        store.init()?;
        tracing::debug!(path = %store.db_path.display(), "Opened local store");
        Ok(store)
    }

    /// Path of the backing database file
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> Result<Connection> {
        Connection::open(&self.db_path)
            .context("Failed to open database")
            .map_err(|e| ChatQuotaError::Storage(e.to_string()).into())
    }

    fn init(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create tables")
        .map_err(|e| ChatQuotaError::Storage(e.to_string()))?;
        Ok(())
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.connect()?;
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()
            .context("Failed to query key")
            .map_err(|e| ChatQuotaError::Storage(e.to_string()))?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.connect()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )
        .context("Failed to write key")
        .map_err(|e| ChatQuotaError::Storage(e.to_string()))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let conn = self.connect()?;
        conn.execute("DELETE FROM kv WHERE key = ?", params![key])
            .context("Failed to delete key")
            .map_err(|e| ChatQuotaError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tempfile::tempdir;

    fn create_test_store() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempdir().expect("failed to create tempdir");
        let store =
            SqliteStore::new_with_path(dir.path().join("store.db")).expect("failed to create store");
        (store, dir)
    }

    #[test]
    fn test_init_creates_table() {
        let (store, _dir) = create_test_store();
        let conn = Connection::open(store.path()).expect("open connection");
        let count: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name='kv'",
                [],
                |r| r.get(0),
            )
            .expect("query row");
        assert_eq!(count, 1);
    }

    #[test]
    fn test_get_missing_key_returns_none() {
        let (store, _dir) = create_test_store();
        assert!(store.get("nope").expect("get failed").is_none());
    }

    #[test]
    fn test_set_overwrites_existing_value() {
        let (store, _dir) = create_test_store();
        store.set("quota:u1", "first").expect("set failed");
        store.set("quota:u1", "second").expect("set failed");
        assert_eq!(
            store.get("quota:u1").expect("get failed").as_deref(),
            Some("second")
        );
    }

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempdir().expect("failed to create tempdir");
        let path = dir.path().join("store.db");
        {
            let store = SqliteStore::new_with_path(&path).expect("create");
            store.set("conversations", "{}").expect("set failed");
        }
        let store = SqliteStore::new_with_path(&path).expect("reopen");
        assert_eq!(
            store.get("conversations").expect("get failed").as_deref(),
            Some("{}")
        );
    }

    #[test]
    fn test_remove_is_idempotent() {
        let (store, _dir) = create_test_store();
        store.set("k", "v").expect("set failed");
        store.remove("k").expect("first remove failed");
        store.remove("k").expect("second remove failed");
        assert!(store.get("k").expect("get failed").is_none());
    }

    #[test]
    #[serial]
    fn test_new_respects_env_override() {
        let dir = tempdir().expect("failed to create tempdir");
        let db_path = dir.path().join("nested").join("store.db");
        env::set_var("CHATQUOTA_STORE_DB", db_path.to_string_lossy().to_string());

        let store = SqliteStore::new().expect("new failed with env override");
        assert_eq!(store.path(), db_path.as_path());
        assert!(db_path.parent().unwrap().exists());

        env::remove_var("CHATQUOTA_STORE_DB");
    }
}

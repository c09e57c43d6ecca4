use chatquota::clock::ManualClock;
use chatquota::storage::SqliteStore;
use chrono::{DateTime, TimeZone, Utc};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

#[allow(dead_code)]
pub fn create_temp_store() -> (Arc<SqliteStore>, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let db_path = tmp.path().join("store.db");
    let store = SqliteStore::new_with_path(db_path).expect("failed to create sqlite store with path");
    (Arc::new(store), tmp)
}

#[allow(dead_code)]
pub fn reopen_store(tmp: &TempDir) -> Arc<SqliteStore> {
    Arc::new(SqliteStore::new_with_path(tmp.path().join("store.db")).expect("failed to reopen store"))
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

#[allow(dead_code)]
pub fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

#[allow(dead_code)]
pub fn manual_clock(now: DateTime<Utc>) -> Arc<ManualClock> {
    Arc::new(ManualClock::new(now))
}

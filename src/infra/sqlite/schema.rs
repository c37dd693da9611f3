use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

pub fn open_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)
        .with_context(|| format!("failed to open db: {}", db_path.display()))?;
    conn.execute("PRAGMA foreign_keys = ON", [])
        .context("failed to enable foreign key enforcement")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .context("failed to set busy timeout")?;
    Ok(conn)
}

pub fn init_db(db_path: &Path) -> Result<()> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create parent dir: {}", parent.display()))?;
    }

    let conn = open_connection(db_path)?;

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS data_source (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            name            TEXT NOT NULL,
            url             TEXT NOT NULL,
            kind            TEXT NOT NULL,
            selected_sheets TEXT,
            added_at        TEXT NOT NULL,
            last_used_at    TEXT
        );

        CREATE TABLE IF NOT EXISTS cache_blob (
            cache_key   TEXT PRIMARY KEY,
            payload     BLOB NOT NULL
        );

        CREATE TABLE IF NOT EXISTS cache_meta (
            cache_key         TEXT PRIMARY KEY,
            file_name         TEXT NOT NULL,
            active_sheet_name TEXT NOT NULL,
            last_refreshed_at TEXT NOT NULL,
            cached_at         TEXT NOT NULL,
            size              INTEGER NOT NULL,
            has_blob          INTEGER NOT NULL,
            modified_at       TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_data_source_url
            ON data_source(url);
        ",
    )
    .context("failed to initialize schema")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_db_creates_required_tables() {
        let temp_dir = tempfile::tempdir().expect("should create temp dir");
        let db_path = temp_dir.path().join("nested").join("app.sqlite");

        let result = init_db(&db_path);

        assert!(result.is_ok(), "init_db should succeed: {result:?}");

        let conn = Connection::open(&db_path).expect("should open sqlite db");
        let table_count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('data_source','cache_blob','cache_meta')",
                [],
                |row| row.get(0),
            )
            .expect("table count query should succeed");

        assert_eq!(table_count, 3, "required tables should exist");
    }

    #[test]
    fn init_db_is_idempotent() {
        let temp_dir = tempfile::tempdir().expect("should create temp dir");
        let db_path = temp_dir.path().join("app.sqlite");

        init_db(&db_path).expect("first init should succeed");
        init_db(&db_path).expect("second init should succeed");
    }
}

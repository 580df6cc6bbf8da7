//! Local SQLite database layer for the drink stand.
//!
//! Uses rusqlite with WAL mode. Provides schema migrations, settings helpers,
//! and the `kv_store` table that backs the local key-value collections
//! (menu, orders, costs, extra income, counters).

use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info, warn};

use crate::error::{PosError, PosResult};

/// Managed state holding the database connection.
pub struct DbState {
    pub conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 2;

const DB_FILE_NAME: &str = "drink-stand.db";

/// Initialize the database at `{app_data_dir}/drink-stand.db`.
///
/// Creates the directory if needed, opens the connection, sets pragmas,
/// and runs any pending migrations. On corruption or open failure,
/// deletes the file and retries once.
pub fn init(app_data_dir: &Path) -> PosResult<DbState> {
    fs::create_dir_all(app_data_dir)
        .map_err(|e| PosError::Storage(format!("Failed to create data dir: {e}")))?;

    let db_path = app_data_dir.join(DB_FILE_NAME);
    info!("Opening database at {}", db_path.display());

    let conn = match open_and_configure(&db_path) {
        Ok(c) => c,
        Err(first_err) => {
            warn!(
                "Database open failed ({}), deleting and retrying once",
                first_err
            );
            if db_path.exists() {
                let _ = fs::remove_file(&db_path);
                // Also remove WAL/SHM files if present
                let _ = fs::remove_file(db_path.with_extension("db-wal"));
                let _ = fs::remove_file(db_path.with_extension("db-shm"));
            }
            open_and_configure(&db_path)?
        }
    };

    run_migrations(&conn)?;

    info!("Database initialized (schema v{CURRENT_SCHEMA_VERSION})");

    Ok(DbState {
        conn: Mutex::new(conn),
        db_path,
    })
}

/// Open a migrated in-memory database. Used by tests and as a fallback when
/// the data directory is not writable.
pub fn open_in_memory() -> PosResult<DbState> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )?;
    run_migrations(&conn)?;
    Ok(DbState {
        conn: Mutex::new(conn),
        db_path: PathBuf::from(":memory:"),
    })
}

/// Open the database file and apply pragmas.
fn open_and_configure(path: &Path) -> PosResult<Connection> {
    let conn = Connection::open(path)?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;

    Ok(conn)
}

/// Run all pending migrations up to `CURRENT_SCHEMA_VERSION`.
fn run_migrations(conn: &Connection) -> PosResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current >= CURRENT_SCHEMA_VERSION {
        info!("Database schema up to date (v{current})");
        return Ok(());
    }

    info!("Migrating database from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Migration v1: settings and the key-value collection store.
fn migrate_v1(conn: &Connection) -> PosResult<()> {
    conn.execute_batch(
        "
        -- local_settings (category/key/value store)
        CREATE TABLE IF NOT EXISTS local_settings (
            id TEXT PRIMARY KEY DEFAULT (lower(hex(randomblob(16)))),
            setting_category TEXT NOT NULL,
            setting_key TEXT NOT NULL,
            setting_value TEXT NOT NULL,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now')),
            UNIQUE(setting_category, setting_key)
        );

        -- kv_store (fixed string keys -> JSON documents)
        CREATE TABLE IF NOT EXISTS kv_store (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT DEFAULT (datetime('now'))
        );

        INSERT INTO schema_version (version) VALUES (1);
        ",
    )
    .map_err(|e| {
        error!("Migration v1 failed: {e}");
        PosError::Storage(format!("migration v1: {e}"))
    })?;

    info!("Applied migration v1 (local_settings, kv_store)");
    Ok(())
}

/// Migration v2: journal of remote sync outcomes shown in the sync panel.
fn migrate_v2(conn: &Connection) -> PosResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS sync_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            operation TEXT NOT NULL,
            success INTEGER NOT NULL,
            message TEXT,
            created_at TEXT DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_sync_log_created_at ON sync_log(created_at);

        INSERT INTO schema_version (version) VALUES (2);
        ",
    )
    .map_err(|e| {
        error!("Migration v2 failed: {e}");
        PosError::Storage(format!("migration v2: {e}"))
    })?;

    info!("Applied migration v2 (sync_log)");
    Ok(())
}

// ---------------------------------------------------------------------------
// Settings helpers
// ---------------------------------------------------------------------------

/// Get a single setting value.
pub fn get_setting(conn: &Connection, category: &str, key: &str) -> Option<String> {
    conn.query_row(
        "SELECT setting_value FROM local_settings WHERE setting_category = ?1 AND setting_key = ?2",
        params![category, key],
        |row| row.get(0),
    )
    .ok()
}

/// Insert or update a setting.
pub fn set_setting(conn: &Connection, category: &str, key: &str, value: &str) -> PosResult<()> {
    conn.execute(
        "INSERT INTO local_settings (setting_category, setting_key, setting_value, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(setting_category, setting_key) DO UPDATE SET
            setting_value = excluded.setting_value,
            updated_at = excluded.updated_at",
        params![category, key, value],
    )?;
    Ok(())
}

/// Delete a single setting. Missing settings are not an error.
pub fn delete_setting(conn: &Connection, category: &str, key: &str) -> PosResult<()> {
    conn.execute(
        "DELETE FROM local_settings WHERE setting_category = ?1 AND setting_key = ?2",
        params![category, key],
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Key-value helpers
// ---------------------------------------------------------------------------

/// Read the raw document stored under `key`.
pub fn kv_get(conn: &Connection, key: &str) -> PosResult<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM kv_store WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

/// Insert or replace the document stored under `key`.
pub fn kv_set(conn: &Connection, key: &str, value: &str) -> PosResult<()> {
    conn.execute(
        "INSERT INTO kv_store (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            updated_at = excluded.updated_at",
        params![key, value],
    )?;
    Ok(())
}

pub fn kv_remove(conn: &Connection, key: &str) -> PosResult<()> {
    conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Sync journal
// ---------------------------------------------------------------------------

const SYNC_LOG_KEEP: i64 = 200;

/// Append a remote sync outcome and keep only the most recent entries.
pub fn append_sync_log(
    conn: &Connection,
    operation: &str,
    success: bool,
    message: Option<&str>,
) -> PosResult<()> {
    conn.execute(
        "INSERT INTO sync_log (operation, success, message) VALUES (?1, ?2, ?3)",
        params![operation, success, message],
    )?;
    conn.execute(
        "DELETE FROM sync_log WHERE id NOT IN (
            SELECT id FROM sync_log ORDER BY id DESC LIMIT ?1
         )",
        params![SYNC_LOG_KEEP],
    )?;
    Ok(())
}

/// Most recent sync journal entries, newest first.
pub fn recent_sync_log(conn: &Connection, limit: i64) -> PosResult<Vec<serde_json::Value>> {
    let mut stmt = conn.prepare(
        "SELECT operation, success, message, created_at
         FROM sync_log ORDER BY id DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit], |row| {
        Ok(serde_json::json!({
            "operation": row.get::<_, String>(0)?,
            "success": row.get::<_, bool>(1)?,
            "message": row.get::<_, Option<String>>(2)?,
            "createdAt": row.get::<_, String>(3)?,
        }))
    })?;
    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?);
    }
    Ok(entries)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper: list table names in the database.
    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .expect("prepare table list");
        stmt.query_map([], |row| row.get(0))
            .expect("query tables")
            .filter_map(|r| r.ok())
            .collect()
    }

    #[test]
    fn test_migrations_create_tables() {
        let db = open_in_memory().expect("open");
        let conn = db.conn.lock().unwrap();
        let tables = table_names(&conn);
        for expected in ["kv_store", "local_settings", "schema_version", "sync_log"] {
            assert!(
                tables.iter().any(|t| t == expected),
                "missing table {expected}: {tables:?}"
            );
        }
        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let db = open_in_memory().expect("open");
        let conn = db.conn.lock().unwrap();
        run_migrations(&conn).expect("second run");
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, i64::from(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_file_database_uses_wal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = init(dir.path()).expect("init");
        assert!(db.db_path.ends_with(DB_FILE_NAME));
        let conn = db.conn.lock().unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn test_settings_crud() {
        let db = open_in_memory().expect("open");
        let conn = db.conn.lock().unwrap();

        set_setting(&conn, "sync", "interval_secs", "300").expect("set");
        assert_eq!(
            get_setting(&conn, "sync", "interval_secs"),
            Some("300".to_string())
        );

        set_setting(&conn, "sync", "interval_secs", "60").expect("update");
        assert_eq!(
            get_setting(&conn, "sync", "interval_secs"),
            Some("60".to_string())
        );

        delete_setting(&conn, "sync", "interval_secs").expect("delete");
        assert!(get_setting(&conn, "sync", "interval_secs").is_none());
    }

    #[test]
    fn test_kv_roundtrip_and_remove() {
        let db = open_in_memory().expect("open");
        let conn = db.conn.lock().unwrap();

        assert!(kv_get(&conn, "drink_shop_orders").unwrap().is_none());
        kv_set(&conn, "drink_shop_orders", "[]").unwrap();
        kv_set(&conn, "drink_shop_orders", "[1]").unwrap();
        assert_eq!(
            kv_get(&conn, "drink_shop_orders").unwrap().as_deref(),
            Some("[1]")
        );
        kv_remove(&conn, "drink_shop_orders").unwrap();
        assert!(kv_get(&conn, "drink_shop_orders").unwrap().is_none());
    }

    #[test]
    fn test_sync_log_is_capped() {
        let db = open_in_memory().expect("open");
        let conn = db.conn.lock().unwrap();
        for i in 0..(SYNC_LOG_KEEP + 5) {
            append_sync_log(&conn, "push_all", i % 2 == 0, None).unwrap();
        }
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM sync_log", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, SYNC_LOG_KEEP);

        let recent = recent_sync_log(&conn, 3).unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0]["operation"], "push_all");
    }
}

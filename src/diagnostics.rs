//! Diagnostics for the drink stand.
//!
//! Provides:
//! - **About info**: version, git SHA, platform
//! - **System health**: schema version, database size, local record counts,
//!   sync status and the most recent sync outcomes
//! - **Log rotation helpers**: used by `lib.rs` to configure rolling log files.

use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::PosResult;
use crate::storage::Storage;
use crate::sync::SyncStatus;

/// Maximum number of log files to retain.
pub const MAX_LOG_FILES: usize = 14;

/// Prefix of the daily log files written by the rolling appender.
pub const LOG_FILE_PREFIX: &str = "pos";

const APP_IDENTIFIER: &str = "com.drinkstand.pos";

/// Returns version, git SHA, and platform info.
pub fn get_about_info() -> Value {
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "gitSha": env!("BUILD_GIT_SHA"),
        "platform": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
    })
}

/// Collects what the sync panel's health section shows.
pub fn get_system_health(storage: &Storage, status: &SyncStatus) -> PosResult<Value> {
    let (schema_version, db_path) = {
        let conn = storage.db().conn.lock()?;
        let version: i64 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);
        (version, storage.db().db_path.clone())
    };
    let db_size = fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    Ok(json!({
        "schemaVersion": schema_version,
        "dbPath": db_path.display().to_string(),
        "dbSizeBytes": db_size,
        "localData": storage.local_summary()?,
        "sync": status,
        "recentSync": storage.recent_sync_log(20)?,
        "logDir": get_log_dir().display().to_string(),
    }))
}

// ---------------------------------------------------------------------------
// Logs
// ---------------------------------------------------------------------------

/// Directory for the rolling log files.
pub fn get_log_dir() -> PathBuf {
    let base = std::env::var("LOCALAPPDATA")
        .or_else(|_| std::env::var("XDG_DATA_HOME"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            #[cfg(target_os = "windows")]
            {
                PathBuf::from(std::env::var("USERPROFILE").unwrap_or_else(|_| ".".into()))
                    .join("AppData")
                    .join("Local")
            }
            #[cfg(not(target_os = "windows"))]
            {
                PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()))
                    .join(".local")
                    .join("share")
            }
        });
    base.join(APP_IDENTIFIER).join("logs")
}

/// Prune old log files, keeping only the most recent `MAX_LOG_FILES`.
pub fn prune_old_logs() {
    prune_logs_in(&get_log_dir(), MAX_LOG_FILES);
}

fn prune_logs_in(log_dir: &Path, keep: usize) {
    if !log_dir.exists() {
        return;
    }

    let mut log_files: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();
    if let Ok(entries) = fs::read_dir(log_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let is_log = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| name.starts_with(&format!("{LOG_FILE_PREFIX}.")));
            if is_log {
                let modified = entry
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .unwrap_or(std::time::UNIX_EPOCH);
                log_files.push((path, modified));
            }
        }
    }

    // Newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    for (path, _) in log_files.iter().skip(keep) {
        if let Err(e) = fs::remove_file(path) {
            warn!("Failed to prune log file {}: {e}", path.display());
        }
    }
}

//! Runtime configuration: where the cloud backend lives and how often the
//! sync engine talks to it.

use rusqlite::Connection;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::api::normalize_backend_url;
use crate::credentials::{self, KEY_SUPABASE_ANON_KEY, KEY_SUPABASE_URL};
use crate::db;
use crate::error::{PosError, PosResult};

pub const ENV_SUPABASE_URL: &str = "DRINK_POS_SUPABASE_URL";
pub const ENV_SUPABASE_ANON_KEY: &str = "DRINK_POS_SUPABASE_ANON_KEY";

const CLOUD_CATEGORY: &str = "cloud";
const SYNC_CATEGORY: &str = "sync";

const DEFAULT_PUSH_INTERVAL_SECS: u64 = 300;
const DEFAULT_PROBE_INTERVAL_SECS: u64 = 15;
const DEFAULT_RECONNECT_DELAY_MS: u64 = 1_000;

/// Where the active cloud settings came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    Environment,
    Keyring,
    LocalSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudSettings {
    pub url: String,
    pub anon_key: String,
    pub source: ConfigSource,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn pair(
    url: Option<String>,
    key: Option<String>,
    source: ConfigSource,
) -> Option<CloudSettings> {
    match (non_empty(url), non_empty(key)) {
        (Some(url), Some(anon_key)) => Some(CloudSettings {
            url: normalize_backend_url(&url),
            anon_key,
            source,
        }),
        _ => None,
    }
}

/// Resolve the backend URL and anon key: environment first, then the OS
/// credential store, then `local_settings`. `None` keeps the stand
/// local-only.
pub fn resolve_cloud_settings(conn: &Connection) -> Option<CloudSettings> {
    let resolved = pair(
        std::env::var(ENV_SUPABASE_URL).ok(),
        std::env::var(ENV_SUPABASE_ANON_KEY).ok(),
        ConfigSource::Environment,
    )
    .or_else(|| {
        pair(
            credentials::get_credential(KEY_SUPABASE_URL),
            credentials::get_credential(KEY_SUPABASE_ANON_KEY),
            ConfigSource::Keyring,
        )
    })
    .or_else(|| {
        pair(
            db::get_setting(conn, CLOUD_CATEGORY, KEY_SUPABASE_URL),
            db::get_setting(conn, CLOUD_CATEGORY, KEY_SUPABASE_ANON_KEY),
            ConfigSource::LocalSettings,
        )
    });
    match &resolved {
        Some(settings) => debug!(source = ?settings.source, url = %settings.url, "cloud settings resolved"),
        None => debug!("no cloud settings found"),
    }
    resolved
}

/// Persist new cloud settings in the credential store, falling back to
/// `local_settings` when the platform store is unavailable.
pub fn save_cloud_settings(
    conn: &Connection,
    url: &str,
    anon_key: &str,
) -> PosResult<CloudSettings> {
    let url = normalize_backend_url(url);
    let anon_key = anon_key.trim();
    if url.is_empty() || anon_key.is_empty() {
        return Err(PosError::Invalid(
            "both the backend URL and the anon key are required".into(),
        ));
    }

    let stored = credentials::set_credential(KEY_SUPABASE_URL, &url)
        .and_then(|_| credentials::set_credential(KEY_SUPABASE_ANON_KEY, anon_key));
    let source = match stored {
        Ok(()) => {
            db::delete_setting(conn, CLOUD_CATEGORY, KEY_SUPABASE_URL)?;
            db::delete_setting(conn, CLOUD_CATEGORY, KEY_SUPABASE_ANON_KEY)?;
            ConfigSource::Keyring
        }
        Err(e) => {
            warn!(error = %e, "credential store unavailable, keeping cloud settings in the database");
            db::set_setting(conn, CLOUD_CATEGORY, KEY_SUPABASE_URL, &url)?;
            db::set_setting(conn, CLOUD_CATEGORY, KEY_SUPABASE_ANON_KEY, anon_key)?;
            ConfigSource::LocalSettings
        }
    };
    info!(url = %url, source = ?source, "cloud settings saved");
    Ok(CloudSettings {
        url,
        anon_key: anon_key.to_string(),
        source,
    })
}

/// Forget the stored cloud settings. Environment variables still apply.
pub fn clear_cloud_settings(conn: &Connection) -> PosResult<()> {
    if let Err(e) = credentials::clear_all() {
        warn!(error = %e, "failed to clear credential store");
    }
    db::delete_setting(conn, CLOUD_CATEGORY, KEY_SUPABASE_URL)?;
    db::delete_setting(conn, CLOUD_CATEGORY, KEY_SUPABASE_ANON_KEY)?;
    info!("cloud settings cleared");
    Ok(())
}

// ---------------------------------------------------------------------------
// Sync tunables
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub push_interval: Duration,
    pub probe_interval: Duration,
    pub reconnect_delay: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            push_interval: Duration::from_secs(DEFAULT_PUSH_INTERVAL_SECS),
            probe_interval: Duration::from_secs(DEFAULT_PROBE_INTERVAL_SECS),
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
        }
    }
}

fn setting_u64(conn: &Connection, key: &str, default: u64) -> u64 {
    match db::get_setting(conn, SYNC_CATEGORY, key) {
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(v) if v > 0 => v,
            _ => {
                warn!(key, value = %raw, "ignoring invalid sync setting");
                default
            }
        },
        None => default,
    }
}

impl SyncSettings {
    /// Read overrides from `local_settings` (category `sync`).
    pub fn load(conn: &Connection) -> Self {
        Self {
            push_interval: Duration::from_secs(setting_u64(
                conn,
                "push_interval_secs",
                DEFAULT_PUSH_INTERVAL_SECS,
            )),
            probe_interval: Duration::from_secs(setting_u64(
                conn,
                "probe_interval_secs",
                DEFAULT_PROBE_INTERVAL_SECS,
            )),
            reconnect_delay: Duration::from_millis(setting_u64(
                conn,
                "reconnect_delay_ms",
                DEFAULT_RECONNECT_DELAY_MS,
            )),
        }
    }
}

use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::config::{self, CloudSettings};
use crate::diagnostics;
use crate::store::Store;
use crate::sync::{SyncEngine, SyncReport, SyncStatus};
use crate::tables::CloudApi;

use super::object_payload;

const DEFAULT_HISTORY_LIMIT: i64 = 50;
const MAX_HISTORY_LIMIT: i64 = 500;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncConfigPayload {
    #[serde(alias = "supabaseUrl", alias = "supabase_url", alias = "backendUrl")]
    url: String,
    #[serde(alias = "anon_key", alias = "supabaseAnonKey", alias = "supabase_anon_key")]
    anon_key: String,
}

fn parse_config_payload(arg0: Option<Value>) -> Result<SyncConfigPayload, String> {
    let parsed: SyncConfigPayload = serde_json::from_value(object_payload(arg0))
        .map_err(|e| format!("Invalid sync config payload: {e}"))?;
    if parsed.url.trim().is_empty() || parsed.anon_key.trim().is_empty() {
        return Err("Backend URL and anon key are both required".into());
    }
    Ok(parsed)
}

fn parse_history_limit(arg0: Option<Value>) -> i64 {
    let raw = match &arg0 {
        Some(Value::Number(n)) => n.as_i64(),
        Some(obj @ Value::Object(_)) => obj.get("limit").and_then(Value::as_i64),
        _ => None,
    };
    raw.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, MAX_HISTORY_LIMIT)
}

/// The anon key is public by nature but still only shown masked.
fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{tail}", "*".repeat(8))
}

fn config_view(settings: Option<&CloudSettings>) -> Value {
    match settings {
        Some(s) => json!({
            "configured": true,
            "url": s.url,
            "anonKey": mask_key(&s.anon_key),
            "source": s.source,
        }),
        None => json!({ "configured": false }),
    }
}

// ---------------------------------------------------------------------------
// Status and manual sync
// ---------------------------------------------------------------------------

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn sync_get_status(
    engine: tauri::State<'_, Arc<SyncEngine>>,
) -> Result<SyncStatus, String> {
    Ok(engine.status())
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn sync_get_network_status(
    engine: tauri::State<'_, Arc<SyncEngine>>,
) -> Result<SyncStatus, String> {
    engine.probe().await;
    Ok(engine.status())
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn sync_push_all(
    engine: tauri::State<'_, Arc<SyncEngine>>,
) -> Result<SyncReport, String> {
    Ok(engine.push_all().await)
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn sync_pull_all(
    engine: tauri::State<'_, Arc<SyncEngine>>,
) -> Result<SyncReport, String> {
    Ok(engine.pull_all().await)
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn sync_get_local_summary(
    store: tauri::State<'_, Arc<Store>>,
) -> Result<crate::storage::LocalSummary, String> {
    store.storage().local_summary().map_err(|e| e.to_string())
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn sync_get_history(
    arg0: Option<Value>,
    store: tauri::State<'_, Arc<Store>>,
) -> Result<Vec<Value>, String> {
    store
        .storage()
        .recent_sync_log(parse_history_limit(arg0))
        .map_err(|e| e.to_string())
}

// ---------------------------------------------------------------------------
// Backend configuration
// ---------------------------------------------------------------------------

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn sync_get_config(store: tauri::State<'_, Arc<Store>>) -> Result<Value, String> {
    let conn = store.storage().db().conn.lock().map_err(|e| e.to_string())?;
    Ok(config_view(config::resolve_cloud_settings(&conn).as_ref()))
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn sync_save_config(
    arg0: Option<Value>,
    store: tauri::State<'_, Arc<Store>>,
    engine: tauri::State<'_, Arc<SyncEngine>>,
) -> Result<Value, String> {
    let payload = parse_config_payload(arg0)?;
    let settings = {
        let conn = store.storage().db().conn.lock().map_err(|e| e.to_string())?;
        config::save_cloud_settings(&conn, &payload.url, &payload.anon_key)
            .map_err(|e| e.to_string())?
    };
    let cloud = CloudApi::from_settings(&settings).map_err(|e| e.to_string())?;
    engine.set_cloud(Some(cloud));
    engine.probe().await;
    info!(url = %settings.url, "Cloud backend configured");
    Ok(config_view(Some(&settings)))
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn sync_clear_config(
    store: tauri::State<'_, Arc<Store>>,
    engine: tauri::State<'_, Arc<SyncEngine>>,
) -> Result<Value, String> {
    let remaining = {
        let conn = store.storage().db().conn.lock().map_err(|e| e.to_string())?;
        config::clear_cloud_settings(&conn).map_err(|e| e.to_string())?;
        config::resolve_cloud_settings(&conn)
    };
    // Environment variables still win after the stored settings are gone.
    let cloud = match &remaining {
        Some(settings) => Some(CloudApi::from_settings(settings).map_err(|e| e.to_string())?),
        None => None,
    };
    engine.set_cloud(cloud);
    Ok(config_view(remaining.as_ref()))
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn system_get_health(
    store: tauri::State<'_, Arc<Store>>,
    engine: tauri::State<'_, Arc<SyncEngine>>,
) -> Result<Value, String> {
    diagnostics::get_system_health(store.storage(), &engine.status()).map_err(|e| e.to_string())
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn app_get_about() -> Result<Value, String> {
    Ok(diagnostics::get_about_info())
}

#[cfg(test)]
mod dto_tests {
    use super::*;
    use crate::config::ConfigSource;

    #[test]
    fn parse_config_payload_accepts_aliases() {
        let parsed = parse_config_payload(Some(serde_json::json!({
            "supabaseUrl": "https://abc.supabase.co",
            "supabase_anon_key": "public-key"
        })))
        .unwrap();
        assert_eq!(parsed.url, "https://abc.supabase.co");
        assert_eq!(parsed.anon_key, "public-key");

        assert!(parse_config_payload(Some(serde_json::json!({ "url": "x", "anonKey": " " }))).is_err());
        assert!(parse_config_payload(None).is_err());
    }

    #[test]
    fn parse_history_limit_defaults_and_clamps() {
        assert_eq!(parse_history_limit(None), DEFAULT_HISTORY_LIMIT);
        assert_eq!(parse_history_limit(Some(serde_json::json!(5))), 5);
        assert_eq!(parse_history_limit(Some(serde_json::json!({ "limit": 0 }))), 1);
        assert_eq!(
            parse_history_limit(Some(serde_json::json!({ "limit": 10_000 }))),
            MAX_HISTORY_LIMIT
        );
    }

    #[test]
    fn config_view_masks_the_key() {
        let settings = CloudSettings {
            url: "https://abc.supabase.co".into(),
            anon_key: "eyJhbGciOiJIUzI1NiJ9.abcd".into(),
            source: ConfigSource::Keyring,
        };
        let view = config_view(Some(&settings));
        assert_eq!(view["configured"], true);
        assert_eq!(view["anonKey"], "********abcd");
        assert_eq!(view["source"], "keyring");
        assert_eq!(config_view(None), serde_json::json!({ "configured": false }));
        assert_eq!(mask_key("short"), "*****");
    }
}

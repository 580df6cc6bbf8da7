//! Drink Stand POS - Tauri v2 Backend
//!
//! Core of a small drink-stand point of sale: menu, cart, orders, costs and
//! extra income kept in a local SQLite key-value store, mirrored to a hosted
//! Supabase project when one is configured. The webview calls the IPC
//! handlers registered in [`run`] through `@tauri-apps/api/core::invoke()`.

pub mod analytics;
pub mod api;
pub mod config;
pub mod credentials;
pub mod db;
pub mod diagnostics;
pub mod error;
pub mod export;
pub mod ledger;
pub mod menu;
pub mod models;
pub mod storage;
pub mod store;
pub mod sync;
pub mod tables;

#[cfg_attr(not(feature = "desktop"), allow(dead_code, unused_imports))]
mod commands;

// ============================================================================
// Payload helpers
// ============================================================================

/// First non-empty string found under any of `keys`, trimmed.
pub(crate) fn value_str(v: &serde_json::Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(s) = v.get(*key).and_then(|x| x.as_str()) {
            let trimmed = s.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

// ============================================================================
// App entry point
// ============================================================================

#[cfg(feature = "desktop")]
pub fn run() {
    use std::sync::Arc;
    use tauri::{Emitter, Manager};
    use tracing::{error, info};
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    // Initialize structured logging (console + rolling file)
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,drink_stand_pos_lib=debug"));

    // Prune old log files before setting up the appender
    diagnostics::prune_old_logs();

    let log_dir = diagnostics::get_log_dir();
    std::fs::create_dir_all(&log_dir).ok();

    let file_appender = tracing_appender::rolling::daily(&log_dir, diagnostics::LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    // Dropping the guard flushes and stops the writer; the app runs until exit.
    std::mem::forget(guard);

    info!("Starting Drink Stand POS v{}", env!("CARGO_PKG_VERSION"));

    let result = tauri::Builder::default()
        .setup(|app| {
            let app_data_dir = app.path().app_data_dir()?;
            let db_state = Arc::new(db::init(&app_data_dir)?);

            let (outbox, outbox_rx) = sync::SyncOutbox::channel();
            let storage = storage::Storage::new(db_state.clone()).with_outbox(outbox);
            let store = Arc::new(store::Store::load(storage)?);

            let (cloud, sync_settings) = {
                let conn = db_state.conn.lock().map_err(error::PosError::from)?;
                let cloud = match config::resolve_cloud_settings(&conn) {
                    Some(settings) => match tables::CloudApi::from_settings(&settings) {
                        Ok(api) => Some(api),
                        Err(e) => {
                            error!(error = %e, "Cloud settings rejected, running local-only");
                            None
                        }
                    },
                    None => {
                        info!("No cloud backend configured, running local-only");
                        None
                    }
                };
                (cloud, config::SyncSettings::load(&conn))
            };

            let app_handle = app.handle().clone();
            let engine = Arc::new(
                sync::SyncEngine::new(store.clone(), cloud, sync_settings).with_status_sink(
                    move |status| {
                        let _ = app_handle.emit("sync_status", status);
                    },
                ),
            );

            app.manage(store);
            app.manage(engine.clone());

            tauri::async_runtime::spawn(engine.clone().run_outbox(outbox_rx));
            tauri::async_runtime::spawn(engine.clone().run_connectivity_loop());
            tauri::async_runtime::spawn(async move {
                engine.init_auto_sync().await;
            });

            info!(db = %db_state.db_path.display(), "Store and sync engine registered");
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            // Menu
            commands::menu::menu_get_drinks,
            commands::menu::menu_get_available,
            commands::menu::menu_get_categories,
            commands::menu::menu_search,
            commands::menu::menu_add_drink,
            commands::menu::menu_update_drink,
            commands::menu::menu_toggle_availability,
            commands::menu::menu_delete_drink,
            // Cart
            commands::orders::cart_get,
            commands::orders::cart_add_item,
            commands::orders::cart_update_item,
            commands::orders::cart_remove_item,
            commands::orders::cart_clear,
            commands::orders::cart_submit,
            // Orders
            commands::orders::orders_list,
            commands::orders::orders_get_counts,
            commands::orders::orders_update_status,
            commands::orders::orders_delete,
            commands::orders::orders_clear_all,
            commands::orders::orders_export_csv,
            // Costs
            commands::ledger::costs_list,
            commands::ledger::costs_save,
            commands::ledger::costs_update,
            commands::ledger::costs_delete,
            commands::ledger::costs_category_totals,
            // Extra income
            commands::ledger::incomes_list,
            commands::ledger::incomes_save,
            commands::ledger::incomes_update,
            commands::ledger::incomes_delete,
            commands::ledger::incomes_category_totals,
            // Analytics
            commands::analytics::analytics_sales,
            commands::analytics::analytics_profit,
            // Sync
            commands::sync::sync_get_status,
            commands::sync::sync_get_network_status,
            commands::sync::sync_push_all,
            commands::sync::sync_pull_all,
            commands::sync::sync_get_local_summary,
            commands::sync::sync_get_history,
            commands::sync::sync_get_config,
            commands::sync::sync_save_config,
            commands::sync::sync_clear_config,
            // Diagnostics
            commands::sync::system_get_health,
            commands::sync::app_get_about,
        ])
        .run(tauri::generate_context!());

    if let Err(e) = result {
        error!("error while running Drink Stand POS: {e}");
        std::process::exit(1);
    }
}

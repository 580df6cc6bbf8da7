//! Local persistence of the stand's collections.
//!
//! Every collection lives as one JSON document in `kv_store` under a fixed
//! key. Mutations persist locally first and then hand a [`SyncOp`] to the
//! sync outbox (when one is attached); the remote call is fire-and-forget.

use chrono::Utc;
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::db::{self, DbState};
use crate::error::PosResult;
use crate::menu;
use crate::models::{
    Cost, CostCategory, CostPatch, Drink, ExtraIncome, IncomeCategory, IncomePatch, LedgerEntry,
    LedgerKind, LedgerPatch, Order, OrderStatus,
};
use crate::sync::{LedgerSync, SyncOp, SyncOutbox};

pub const KEY_DRINKS: &str = "drink_shop_drinks";
pub const KEY_ORDERS: &str = "drink_shop_orders";
pub const KEY_ORDER_COUNTER: &str = "drink_shop_order_counter";
pub const KEY_COSTS: &str = <CostCategory as LedgerKind>::STORAGE_KEY;
pub const KEY_EXTRA_INCOMES: &str = <IncomeCategory as LedgerKind>::STORAGE_KEY;
pub const KEY_LAST_SYNC: &str = "last_sync_time";
pub const KEY_SYNC_INITIALIZED: &str = "supabase_sync_initialized";

/// Counts per local collection, shown in the sync panel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalSummary {
    pub drinks: usize,
    pub orders: usize,
    pub order_items: usize,
    pub costs: usize,
    pub extra_incomes: usize,
}

/// Every local collection at once, as uploaded by a full push or written
/// by a full pull.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalData {
    pub drinks: Vec<Drink>,
    pub orders: Vec<Order>,
    pub costs: Vec<Cost>,
    pub extra_incomes: Vec<ExtraIncome>,
}

#[derive(Clone)]
pub struct Storage {
    db: Arc<DbState>,
    outbox: Option<SyncOutbox>,
}

// ---------------------------------------------------------------------------
// Document helpers
// ---------------------------------------------------------------------------

fn read_vec<T: DeserializeOwned>(conn: &Connection, key: &str) -> PosResult<Option<Vec<T>>> {
    match db::kv_get(conn, key)? {
        Some(raw) => match serde_json::from_str::<Vec<T>>(&raw) {
            Ok(items) => Ok(Some(items)),
            Err(e) => {
                error!(key, error = %e, "kv_store document is not a valid array");
                Err(e.into())
            }
        },
        None => Ok(None),
    }
}

fn write_vec<T: Serialize>(conn: &Connection, key: &str, items: &[T]) -> PosResult<()> {
    let raw = serde_json::to_string(items)?;
    db::kv_set(conn, key, &raw)
}

impl Storage {
    pub fn new(db: Arc<DbState>) -> Self {
        Self { db, outbox: None }
    }

    /// Attach the outbox that carries mutations to the cloud backend.
    pub fn with_outbox(mut self, outbox: SyncOutbox) -> Self {
        self.outbox = Some(outbox);
        self
    }

    pub fn db(&self) -> &Arc<DbState> {
        &self.db
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> PosResult<T>) -> PosResult<T> {
        let conn = self.db.conn.lock()?;
        f(&conn)
    }

    fn notify(&self, op: SyncOp) {
        match &self.outbox {
            Some(outbox) => outbox.send(op),
            None => debug!(operation = op.name(), "no sync outbox attached, kept local only"),
        }
    }

    // -- Drinks ---------------------------------------------------------------

    /// Menu drinks. Seeds and persists the default menu on first use.
    pub fn get_drinks(&self) -> PosResult<Vec<Drink>> {
        let stored = self.with_conn(|conn| read_vec::<Drink>(conn, KEY_DRINKS))?;
        match stored {
            Some(drinks) => Ok(drinks),
            None => {
                let defaults = menu::default_drinks();
                info!(count = defaults.len(), "Seeding default menu");
                self.save_drinks(&defaults)?;
                Ok(defaults)
            }
        }
    }

    /// Persist the whole menu and upsert every drink remotely.
    pub fn save_drinks(&self, drinks: &[Drink]) -> PosResult<()> {
        self.with_conn(|conn| write_vec(conn, KEY_DRINKS, drinks))?;
        self.notify(SyncOp::UpsertDrinks(drinks.to_vec()));
        Ok(())
    }

    /// Persist the menu after `drink_id` was removed from it.
    pub fn remove_drink(&self, remaining: &[Drink], drink_id: &str) -> PosResult<()> {
        self.with_conn(|conn| write_vec(conn, KEY_DRINKS, remaining))?;
        self.notify(SyncOp::DeleteDrink(drink_id.to_string()));
        Ok(())
    }

    // -- Orders ---------------------------------------------------------------

    pub fn get_orders(&self) -> PosResult<Vec<Order>> {
        Ok(self
            .with_conn(|conn| read_vec::<Order>(conn, KEY_ORDERS))?
            .unwrap_or_default())
    }

    /// Append a submitted order.
    pub fn save_order(&self, order: &Order) -> PosResult<()> {
        self.with_conn(|conn| {
            let mut orders = read_vec::<Order>(conn, KEY_ORDERS)?.unwrap_or_default();
            orders.push(order.clone());
            write_vec(conn, KEY_ORDERS, &orders)
        })?;
        self.notify(SyncOp::SaveOrder(order.clone()));
        Ok(())
    }

    /// Returns `false` when no local order has `order_id`; nothing is sent
    /// remotely in that case.
    pub fn update_order_status(&self, order_id: &str, status: OrderStatus) -> PosResult<bool> {
        let found = self.with_conn(|conn| {
            let mut orders = read_vec::<Order>(conn, KEY_ORDERS)?.unwrap_or_default();
            let Some(order) = orders.iter_mut().find(|o| o.id == order_id) else {
                return Ok(false);
            };
            order.status = status;
            write_vec(conn, KEY_ORDERS, &orders)?;
            Ok(true)
        })?;
        if found {
            self.notify(SyncOp::UpdateOrderStatus {
                order_id: order_id.to_string(),
                status,
            });
        }
        Ok(found)
    }

    /// Remove an order locally and remotely. The remote delete is sent even
    /// when the order is unknown locally, so a stale mirror row goes too.
    pub fn delete_order(&self, order_id: &str) -> PosResult<bool> {
        let removed = self.with_conn(|conn| {
            let mut orders = read_vec::<Order>(conn, KEY_ORDERS)?.unwrap_or_default();
            let before = orders.len();
            orders.retain(|o| o.id != order_id);
            write_vec(conn, KEY_ORDERS, &orders)?;
            Ok(orders.len() != before)
        })?;
        self.notify(SyncOp::DeleteOrder(order_id.to_string()));
        Ok(removed)
    }

    /// Drop every local order and reset the order counter. Local only.
    pub fn clear_all_orders(&self) -> PosResult<()> {
        self.with_conn(|conn| {
            db::kv_remove(conn, KEY_ORDERS)?;
            db::kv_remove(conn, KEY_ORDER_COUNTER)
        })?;
        info!("Cleared all local orders and the order counter");
        Ok(())
    }

    /// Advance the persisted counter and render it zero-padded to three
    /// digits ("001", "002", ...).
    pub fn next_order_number(&self) -> PosResult<String> {
        self.with_conn(|conn| {
            let current = db::kv_get(conn, KEY_ORDER_COUNTER)?
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(0);
            let next = current + 1;
            db::kv_set(conn, KEY_ORDER_COUNTER, &next.to_string())?;
            Ok(format!("{next:03}"))
        })
    }

    // -- Ledger (costs and extra income) -------------------------------------

    pub fn get_ledger<C: LedgerSync>(&self) -> PosResult<Vec<LedgerEntry<C>>> {
        Ok(self
            .with_conn(|conn| read_vec::<LedgerEntry<C>>(conn, C::STORAGE_KEY))?
            .unwrap_or_default())
    }

    pub fn save_ledger_entry<C: LedgerSync>(&self, entry: &LedgerEntry<C>) -> PosResult<()> {
        self.with_conn(|conn| {
            let mut entries = read_vec::<LedgerEntry<C>>(conn, C::STORAGE_KEY)?.unwrap_or_default();
            entries.push(entry.clone());
            write_vec(conn, C::STORAGE_KEY, &entries)
        })?;
        self.notify(C::save_op(entry.clone()));
        Ok(())
    }

    /// Merge `patch` onto the entry with `id`. Returns the updated entry, or
    /// `None` when it does not exist.
    pub fn update_ledger_entry<C: LedgerSync>(
        &self,
        id: &str,
        patch: &LedgerPatch<C>,
    ) -> PosResult<Option<LedgerEntry<C>>> {
        let updated = self.with_conn(|conn| {
            let mut entries = read_vec::<LedgerEntry<C>>(conn, C::STORAGE_KEY)?.unwrap_or_default();
            let Some(entry) = entries.iter_mut().find(|e| e.id == id) else {
                return Ok(None);
            };
            patch.apply(entry);
            let updated = entry.clone();
            write_vec(conn, C::STORAGE_KEY, &entries)?;
            Ok(Some(updated))
        })?;
        if let Some(entry) = &updated {
            self.notify(C::save_op(entry.clone()));
        }
        Ok(updated)
    }

    pub fn delete_ledger_entry<C: LedgerSync>(&self, id: &str) -> PosResult<bool> {
        let removed = self.with_conn(|conn| {
            let mut entries = read_vec::<LedgerEntry<C>>(conn, C::STORAGE_KEY)?.unwrap_or_default();
            let before = entries.len();
            entries.retain(|e| e.id != id);
            write_vec(conn, C::STORAGE_KEY, &entries)?;
            Ok(entries.len() != before)
        })?;
        self.notify(C::delete_op(id.to_string()));
        Ok(removed)
    }

    pub fn get_costs(&self) -> PosResult<Vec<Cost>> {
        self.get_ledger::<CostCategory>()
    }

    pub fn save_cost(&self, cost: &Cost) -> PosResult<()> {
        self.save_ledger_entry(cost)
    }

    pub fn update_cost(&self, id: &str, patch: &CostPatch) -> PosResult<Option<Cost>> {
        self.update_ledger_entry(id, patch)
    }

    pub fn delete_cost(&self, id: &str) -> PosResult<bool> {
        self.delete_ledger_entry::<CostCategory>(id)
    }

    pub fn get_extra_incomes(&self) -> PosResult<Vec<ExtraIncome>> {
        self.get_ledger::<IncomeCategory>()
    }

    pub fn save_extra_income(&self, income: &ExtraIncome) -> PosResult<()> {
        self.save_ledger_entry(income)
    }

    pub fn update_extra_income(
        &self,
        id: &str,
        patch: &IncomePatch,
    ) -> PosResult<Option<ExtraIncome>> {
        self.update_ledger_entry(id, patch)
    }

    pub fn delete_extra_income(&self, id: &str) -> PosResult<bool> {
        self.delete_ledger_entry::<IncomeCategory>(id)
    }

    // -- Whole-store helpers --------------------------------------------------

    pub fn all_local_data(&self) -> PosResult<LocalData> {
        Ok(LocalData {
            drinks: self.get_drinks()?,
            orders: self.get_orders()?,
            costs: self.get_costs()?,
            extra_incomes: self.get_extra_incomes()?,
        })
    }

    pub fn local_summary(&self) -> PosResult<LocalSummary> {
        let data = self.all_local_data()?;
        Ok(LocalSummary {
            drinks: data.drinks.len(),
            orders: data.orders.len(),
            order_items: data.orders.iter().map(|o| o.items.len()).sum(),
            costs: data.costs.len(),
            extra_incomes: data.extra_incomes.len(),
        })
    }

    /// Overwrite every local collection (used after a cloud pull). Nothing
    /// is sent back to the cloud.
    pub fn replace_all(&self, data: &LocalData) -> PosResult<()> {
        self.with_conn(|conn| {
            conn.execute_batch("BEGIN IMMEDIATE")?;
            let result = (|| {
                write_vec(conn, KEY_DRINKS, &data.drinks)?;
                write_vec(conn, KEY_ORDERS, &data.orders)?;
                write_vec(conn, KEY_COSTS, &data.costs)?;
                write_vec(conn, KEY_EXTRA_INCOMES, &data.extra_incomes)
            })();
            match result {
                Ok(()) => {
                    conn.execute_batch("COMMIT")?;
                    Ok(())
                }
                Err(e) => {
                    let _ = conn.execute_batch("ROLLBACK");
                    Err(e)
                }
            }
        })
    }

    // -- Sync bookkeeping ----------------------------------------------------

    pub fn last_sync(&self) -> Option<String> {
        self.with_conn(|conn| db::kv_get(conn, KEY_LAST_SYNC))
            .ok()
            .flatten()
    }

    pub fn set_last_sync(&self, at: &str) -> PosResult<()> {
        self.with_conn(|conn| db::kv_set(conn, KEY_LAST_SYNC, at))
    }

    pub fn sync_initialized(&self) -> bool {
        self.with_conn(|conn| db::kv_get(conn, KEY_SYNC_INITIALIZED))
            .ok()
            .flatten()
            .is_some_and(|v| v == "true")
    }

    pub fn mark_sync_initialized(&self) -> PosResult<()> {
        self.with_conn(|conn| db::kv_set(conn, KEY_SYNC_INITIALIZED, "true"))
    }

    pub fn record_sync_outcome(&self, operation: &str, result: &Result<(), String>) {
        let message = result.as_ref().err().map(String::as_str);
        let outcome =
            self.with_conn(|conn| db::append_sync_log(conn, operation, result.is_ok(), message));
        if let Err(e) = outcome {
            error!(operation, error = %e, "Failed to record sync outcome");
        }
    }

    pub fn recent_sync_log(&self, limit: i64) -> PosResult<Vec<serde_json::Value>> {
        self.with_conn(|conn| db::recent_sync_log(conn, limit))
    }
}

/// Current time as stored in `last_sync_time` and row timestamps.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
pub(crate) fn memory_storage() -> Storage {
    Storage::new(Arc::new(db::open_in_memory().expect("in-memory db")))
}

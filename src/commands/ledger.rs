use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::ledger::{self, CategoryTotal, LedgerInput};
use crate::models::{CostCategory, IncomeCategory, LedgerEntry, LedgerKind, LedgerPatch};
use crate::store::Store;
use crate::sync::LedgerSync;

use super::{object_payload, parse_id_payload};

const ENTRY_ID_KEYS: &[&str] = &["id", "costId", "cost_id", "incomeId", "income_id"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(deserialize = "C: LedgerKind"))]
struct LedgerUpdatePayload<C> {
    id: String,
    #[serde(flatten)]
    patch: LedgerPatch<C>,
}

fn parse_input<C: LedgerKind>(arg0: Option<Value>) -> Result<LedgerInput<C>, String> {
    serde_json::from_value(object_payload(arg0))
        .map_err(|e| format!("Invalid {} payload: {e}", C::REMOTE_TABLE))
}

/// Accepts `{ id, ...fields }` or `{ id, updates: { ...fields } }`.
fn parse_update<C: LedgerKind>(arg0: Option<Value>) -> Result<(String, LedgerPatch<C>), String> {
    let payload = match object_payload(arg0) {
        Value::Object(mut obj) => {
            if let Some(Value::Object(updates)) = obj.remove("updates") {
                for (k, v) in updates {
                    obj.entry(k).or_insert(v);
                }
            }
            Value::Object(obj)
        }
        other => other,
    };
    let parsed: LedgerUpdatePayload<C> = serde_json::from_value(payload)
        .map_err(|e| format!("Invalid {} update payload: {e}", C::REMOTE_TABLE))?;
    let id = parsed.id.trim().to_string();
    if id.is_empty() {
        return Err("Missing entry id".into());
    }
    Ok((id, parsed.patch))
}

fn list<C: LedgerSync>(store: &Store) -> Result<Vec<LedgerEntry<C>>, String> {
    ledger::list_entries::<C>(store.storage()).map_err(|e| e.to_string())
}

fn save<C: LedgerSync>(store: &Store, arg0: Option<Value>) -> Result<LedgerEntry<C>, String> {
    ledger::create_entry(store.storage(), parse_input::<C>(arg0)?).map_err(|e| e.to_string())
}

fn update<C: LedgerSync>(store: &Store, arg0: Option<Value>) -> Result<LedgerEntry<C>, String> {
    let (id, patch) = parse_update::<C>(arg0)?;
    ledger::update_entry(store.storage(), &id, &patch).map_err(|e| e.to_string())
}

fn delete<C: LedgerSync>(store: &Store, arg0: Option<Value>) -> Result<bool, String> {
    let id = parse_id_payload(arg0, ENTRY_ID_KEYS, "entry id")?;
    ledger::delete_entry::<C>(store.storage(), &id).map_err(|e| e.to_string())
}

fn totals<C: LedgerSync>(store: &Store) -> Result<Vec<CategoryTotal<C>>, String> {
    Ok(ledger::category_totals(&list::<C>(store)?))
}

// ---------------------------------------------------------------------------
// Costs
// ---------------------------------------------------------------------------

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn costs_list(
    store: tauri::State<'_, Arc<Store>>,
) -> Result<Vec<LedgerEntry<CostCategory>>, String> {
    list::<CostCategory>(&store)
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn costs_save(
    arg0: Option<Value>,
    store: tauri::State<'_, Arc<Store>>,
) -> Result<LedgerEntry<CostCategory>, String> {
    save::<CostCategory>(&store, arg0)
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn costs_update(
    arg0: Option<Value>,
    store: tauri::State<'_, Arc<Store>>,
) -> Result<LedgerEntry<CostCategory>, String> {
    update::<CostCategory>(&store, arg0)
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn costs_delete(
    arg0: Option<Value>,
    store: tauri::State<'_, Arc<Store>>,
) -> Result<bool, String> {
    delete::<CostCategory>(&store, arg0)
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn costs_category_totals(
    store: tauri::State<'_, Arc<Store>>,
) -> Result<Vec<CategoryTotal<CostCategory>>, String> {
    totals::<CostCategory>(&store)
}

// ---------------------------------------------------------------------------
// Extra income
// ---------------------------------------------------------------------------

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn incomes_list(
    store: tauri::State<'_, Arc<Store>>,
) -> Result<Vec<LedgerEntry<IncomeCategory>>, String> {
    list::<IncomeCategory>(&store)
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn incomes_save(
    arg0: Option<Value>,
    store: tauri::State<'_, Arc<Store>>,
) -> Result<LedgerEntry<IncomeCategory>, String> {
    save::<IncomeCategory>(&store, arg0)
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn incomes_update(
    arg0: Option<Value>,
    store: tauri::State<'_, Arc<Store>>,
) -> Result<LedgerEntry<IncomeCategory>, String> {
    update::<IncomeCategory>(&store, arg0)
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn incomes_delete(
    arg0: Option<Value>,
    store: tauri::State<'_, Arc<Store>>,
) -> Result<bool, String> {
    delete::<IncomeCategory>(&store, arg0)
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn incomes_category_totals(
    store: tauri::State<'_, Arc<Store>>,
) -> Result<Vec<CategoryTotal<IncomeCategory>>, String> {
    totals::<IncomeCategory>(&store)
}

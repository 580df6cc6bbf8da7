use chrono::Local;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::export;
use crate::models::{CurrentOrder, IceLevel, Order, OrderStatus, SugarLevel, MAX_LINE_QUANTITY};
use crate::store::{Action, Store};

use super::{object_payload, parse_id_payload};

const ORDER_ID_KEYS: &[&str] = &["orderId", "order_id", "id"];
const ITEM_ID_KEYS: &[&str] = &["itemId", "item_id", "id"];

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CartAddItemPayload {
    #[serde(alias = "drink_id", alias = "id")]
    drink_id: String,
    #[serde(default = "one", alias = "qty")]
    quantity: u32,
    #[serde(default)]
    sugar: SugarLevel,
    #[serde(default)]
    ice: IceLevel,
}

fn one() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CartUpdateItemPayload {
    #[serde(alias = "item_id", alias = "id")]
    item_id: String,
    #[serde(default, alias = "qty")]
    quantity: Option<u32>,
    #[serde(default)]
    sugar: Option<SugarLevel>,
    #[serde(default)]
    ice: Option<IceLevel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderUpdateStatusPayload {
    #[serde(alias = "order_id", alias = "id")]
    order_id: String,
    status: OrderStatus,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct OrderListPayload {
    #[serde(default, alias = "filter")]
    status: Option<String>,
}

/// Order counts shown on the status filter tabs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCounts {
    pub all: usize,
    pub pending: usize,
    pub completed: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvExport {
    pub file_name: String,
    pub content: String,
}

fn parse_cart_add_payload(arg0: Option<serde_json::Value>) -> Result<CartAddItemPayload, String> {
    let payload = match arg0 {
        Some(serde_json::Value::String(drink_id)) => serde_json::json!({ "drinkId": drink_id }),
        other => object_payload(other),
    };
    let mut parsed: CartAddItemPayload =
        serde_json::from_value(payload).map_err(|e| format!("Invalid cart item payload: {e}"))?;
    parsed.drink_id = parsed.drink_id.trim().to_string();
    if parsed.drink_id.is_empty() {
        return Err("Missing drink id".into());
    }
    if parsed.quantity == 0 {
        return Err("Quantity must be at least 1".into());
    }
    if parsed.quantity > MAX_LINE_QUANTITY {
        return Err(format!("Quantity cannot exceed {MAX_LINE_QUANTITY}"));
    }
    Ok(parsed)
}

fn parse_cart_update_payload(
    arg0: Option<serde_json::Value>,
) -> Result<CartUpdateItemPayload, String> {
    let mut parsed: CartUpdateItemPayload = serde_json::from_value(object_payload(arg0))
        .map_err(|e| format!("Invalid cart update payload: {e}"))?;
    parsed.item_id = parsed.item_id.trim().to_string();
    if parsed.item_id.is_empty() {
        return Err("Missing item id".into());
    }
    if parsed.quantity.is_some_and(|q| q > MAX_LINE_QUANTITY) {
        return Err(format!("Quantity cannot exceed {MAX_LINE_QUANTITY}"));
    }
    Ok(parsed)
}

fn parse_update_status_payload(
    arg0: Option<serde_json::Value>,
) -> Result<OrderUpdateStatusPayload, String> {
    let mut parsed: OrderUpdateStatusPayload = serde_json::from_value(object_payload(arg0))
        .map_err(|e| format!("Invalid order status payload: {e}"))?;
    parsed.order_id = parsed.order_id.trim().to_string();
    if parsed.order_id.is_empty() {
        return Err("Missing order id".into());
    }
    Ok(parsed)
}

/// `None` or `"all"` lists every order.
fn parse_status_filter(arg0: Option<serde_json::Value>) -> Result<Option<OrderStatus>, String> {
    let payload = match arg0 {
        Some(serde_json::Value::String(status)) => serde_json::json!({ "status": status }),
        other => object_payload(other),
    };
    let parsed: OrderListPayload =
        serde_json::from_value(payload).map_err(|e| format!("Invalid order filter: {e}"))?;
    match parsed.status.as_deref().map(str::trim) {
        None | Some("") | Some("all") => Ok(None),
        Some(status) => serde_json::from_value(serde_json::Value::String(status.to_string()))
            .map(Some)
            .map_err(|_| format!("Unknown order status: {status}")),
    }
}

pub fn filter_by_status(orders: &[Order], status: Option<OrderStatus>) -> Vec<Order> {
    orders
        .iter()
        .filter(|o| status.map_or(true, |s| o.status == s))
        .cloned()
        .collect()
}

pub fn status_counts(orders: &[Order]) -> OrderCounts {
    OrderCounts {
        all: orders.len(),
        pending: orders
            .iter()
            .filter(|o| o.status == OrderStatus::Pending)
            .count(),
        completed: orders
            .iter()
            .filter(|o| o.status == OrderStatus::Completed)
            .count(),
    }
}

// ---------------------------------------------------------------------------
// Cart
// ---------------------------------------------------------------------------

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn cart_get(store: tauri::State<'_, Arc<Store>>) -> Result<CurrentOrder, String> {
    Ok(store.snapshot().current_order)
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn cart_add_item(
    arg0: Option<serde_json::Value>,
    store: tauri::State<'_, Arc<Store>>,
) -> Result<CurrentOrder, String> {
    let payload = parse_cart_add_payload(arg0)?;
    store
        .add_drink_to_cart(&payload.drink_id, payload.quantity, payload.sugar, payload.ice)
        .map(|s| s.current_order)
        .map_err(|e| e.to_string())
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn cart_update_item(
    arg0: Option<serde_json::Value>,
    store: tauri::State<'_, Arc<Store>>,
) -> Result<CurrentOrder, String> {
    let payload = parse_cart_update_payload(arg0)?;
    store
        .dispatch(Action::UpdateOrderItem {
            id: payload.item_id,
            quantity: payload.quantity,
            sugar: payload.sugar,
            ice: payload.ice,
        })
        .map(|s| s.current_order)
        .map_err(|e| e.to_string())
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn cart_remove_item(
    arg0: Option<serde_json::Value>,
    store: tauri::State<'_, Arc<Store>>,
) -> Result<CurrentOrder, String> {
    let id = parse_id_payload(arg0, ITEM_ID_KEYS, "item id")?;
    store
        .dispatch(Action::RemoveOrderItem(id))
        .map(|s| s.current_order)
        .map_err(|e| e.to_string())
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn cart_clear(store: tauri::State<'_, Arc<Store>>) -> Result<CurrentOrder, String> {
    store
        .dispatch(Action::ClearCurrentOrder)
        .map(|s| s.current_order)
        .map_err(|e| e.to_string())
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn cart_submit(store: tauri::State<'_, Arc<Store>>) -> Result<Order, String> {
    let state = store
        .dispatch(Action::SubmitOrder)
        .map_err(|e| e.to_string())?;
    state
        .orders
        .into_iter()
        .next()
        .ok_or_else(|| "Order was not recorded".to_string())
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn orders_list(
    arg0: Option<serde_json::Value>,
    store: tauri::State<'_, Arc<Store>>,
) -> Result<Vec<Order>, String> {
    let status = parse_status_filter(arg0)?;
    Ok(filter_by_status(&store.snapshot().orders, status))
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn orders_get_counts(store: tauri::State<'_, Arc<Store>>) -> Result<OrderCounts, String> {
    Ok(status_counts(&store.snapshot().orders))
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn orders_update_status(
    arg0: Option<serde_json::Value>,
    store: tauri::State<'_, Arc<Store>>,
) -> Result<(), String> {
    let payload = parse_update_status_payload(arg0)?;
    store
        .dispatch(Action::UpdateOrderStatus {
            id: payload.order_id,
            status: payload.status,
        })
        .map_err(|e| e.to_string())?;
    Ok(())
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn orders_delete(
    arg0: Option<serde_json::Value>,
    store: tauri::State<'_, Arc<Store>>,
) -> Result<(), String> {
    let id = parse_id_payload(arg0, ORDER_ID_KEYS, "order id")?;
    store
        .dispatch(Action::DeleteOrder(id))
        .map_err(|e| e.to_string())?;
    Ok(())
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn orders_clear_all(store: tauri::State<'_, Arc<Store>>) -> Result<(), String> {
    store.clear_all_orders().map_err(|e| e.to_string())?;
    Ok(())
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn orders_export_csv(store: tauri::State<'_, Arc<Store>>) -> Result<CsvExport, String> {
    let orders = store.snapshot().orders;
    Ok(CsvExport {
        file_name: export::export_file_name(Local::now().date_naive()),
        content: export::orders_to_csv(&orders),
    })
}

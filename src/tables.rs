//! Typed rows of the cloud tables and the per-entity remote operations.
//!
//! Remote rows use snake_case columns; orders are stored without their
//! items, which live in `order_items` keyed by `order_id`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::api::{CloudBackend, SupabaseRest};
use crate::config::CloudSettings;
use crate::error::{PosError, PosResult};
use crate::models::{
    Drink, IceLevel, LedgerEntry, LedgerKind, Order, OrderItem, OrderStatus, SugarLevel,
};
use crate::storage::now_iso;

pub const TABLE_DRINKS: &str = "drinks";
pub const TABLE_ORDERS: &str = "orders";
pub const TABLE_ORDER_ITEMS: &str = "order_items";

// ---------------------------------------------------------------------------
// Lenient column decoding
// ---------------------------------------------------------------------------

/// Numeric columns may come back as JSON numbers or as strings
/// (`numeric` columns are rendered as strings by some gateways).
fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    match Value::deserialize(d)? {
        Value::Number(n) => Ok(n.as_f64().unwrap_or(0.0)),
        Value::String(s) => Ok(s.trim().parse::<f64>().unwrap_or(0.0)),
        _ => Ok(0.0),
    }
}

fn lenient_u32<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    let n = lenient_f64(d)?;
    Ok(if n.is_finite() && n > 0.0 { n.round() as u32 } else { 0 })
}

/// Order numbers were numeric in early schemas.
fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match Value::deserialize(d)? {
        Value::String(s) => Ok(s),
        Value::Null => Ok(String::new()),
        other => Ok(other.to_string()),
    }
}

/// `date` columns, tolerating a full timestamp.
fn lenient_date<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDate, D::Error> {
    let raw = String::deserialize(d)?;
    let day = raw.get(..10).unwrap_or(&raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(serde::de::Error::custom)
}

/// `timestamptz` columns arrive as RFC 3339; plain `timestamp` columns come
/// back without an offset and are read as UTC.
fn lenient_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(d)?;
    parse_timestamp(raw.trim()).ok_or_else(|| {
        serde::de::Error::custom(format!("unrecognised timestamp: {raw}"))
    })
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    // Postgres renders offsets as `+00` and separates with a space.
    for format in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
        if let Ok(ts) = DateTime::parse_from_str(raw, format) {
            return Some(ts.with_timezone(&Utc));
        }
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrinkRow {
    pub id: String,
    pub name: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub price: f64,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_true")]
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl DrinkRow {
    pub fn stamped(drink: &Drink, now: &str) -> Self {
        Self {
            id: drink.id.clone(),
            name: drink.name.clone(),
            price: drink.price,
            image: Some(drink.image.clone()),
            category: Some(drink.category.clone()),
            available: drink.available,
            updated_at: Some(now.to_string()),
        }
    }
}

impl From<DrinkRow> for Drink {
    fn from(row: DrinkRow) -> Self {
        Drink {
            id: row.id,
            name: row.name,
            price: row.price,
            image: row.image.unwrap_or_default(),
            category: row.category.unwrap_or_default(),
            available: row.available,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRow {
    pub id: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub total: f64,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(deserialize_with = "lenient_string")]
    pub order_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl OrderRow {
    pub fn stamped(order: &Order, now: &str) -> Self {
        Self {
            id: order.id.clone(),
            total: order.total,
            status: order.status,
            timestamp: order.timestamp,
            order_number: order.order_number.clone(),
            updated_at: Some(now.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItemRow {
    pub id: String,
    pub order_id: String,
    pub drink_id: String,
    pub drink_name: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub price: f64,
    #[serde(deserialize_with = "lenient_u32")]
    pub quantity: u32,
    #[serde(default)]
    pub sugar: SugarLevel,
    #[serde(default)]
    pub ice: IceLevel,
    #[serde(deserialize_with = "lenient_f64")]
    pub subtotal: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl OrderItemRow {
    /// `order_items` has no `updated_at` column.
    pub fn new(order_id: &str, item: &OrderItem) -> Self {
        Self {
            id: item.id.clone(),
            order_id: order_id.to_string(),
            drink_id: item.drink_id.clone(),
            drink_name: item.drink_name.clone(),
            price: item.price,
            quantity: item.quantity,
            sugar: item.sugar,
            ice: item.ice,
            subtotal: item.subtotal,
            updated_at: None,
        }
    }
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        OrderItem {
            id: row.id,
            drink_id: row.drink_id,
            drink_name: row.drink_name,
            price: row.price,
            quantity: row.quantity,
            sugar: row.sugar,
            ice: row.ice,
            subtotal: row.subtotal,
        }
    }
}

/// Row of `costs` or `extra_incomes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "C: LedgerKind"))]
pub struct LedgerRow<C> {
    pub id: String,
    pub name: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub amount: f64,
    pub category: C,
    #[serde(deserialize_with = "lenient_date")]
    pub date: NaiveDate,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl<C: LedgerKind> LedgerRow<C> {
    pub fn stamped(entry: &LedgerEntry<C>, now: &str) -> Self {
        Self {
            id: entry.id.clone(),
            name: entry.name.clone(),
            amount: entry.amount,
            category: entry.category,
            date: entry.date,
            description: entry.description.clone(),
            created_at: entry.created_at,
            updated_at: Some(now.to_string()),
        }
    }
}

impl<C: LedgerKind> From<LedgerRow<C>> for LedgerEntry<C> {
    fn from(row: LedgerRow<C>) -> Self {
        LedgerEntry {
            id: row.id,
            name: row.name,
            amount: row.amount,
            category: row.category,
            date: row.date,
            description: row.description.filter(|d| !d.trim().is_empty()),
            created_at: row.created_at,
        }
    }
}

/// Decode every row of `table`. Any malformed row fails the whole read, so a
/// pull never mistakes a partial table for the full one.
fn decode_rows<T: DeserializeOwned>(table: &str, rows: Vec<Value>) -> PosResult<Vec<T>> {
    let total = rows.len();
    let mut decoded = Vec::with_capacity(total);
    let mut failed = 0usize;
    let mut first_error = None;
    for row in rows {
        match serde_json::from_value::<T>(row) {
            Ok(value) => decoded.push(value),
            Err(e) => {
                failed += 1;
                first_error.get_or_insert_with(|| e.to_string());
            }
        }
    }
    match first_error {
        None => Ok(decoded),
        Some(error) => {
            warn!(table, failed, total, error = %error, "Malformed cloud rows");
            Err(PosError::Remote(format!(
                "{failed} of {total} rows in {table} could not be read: {error}"
            )))
        }
    }
}

fn encode_rows<T: Serialize>(rows: &[T]) -> PosResult<Vec<Value>> {
    rows.iter()
        .map(|r| serde_json::to_value(r).map_err(Into::into))
        .collect()
}

// ---------------------------------------------------------------------------
// Per-entity operations
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct CloudApi {
    backend: Arc<dyn CloudBackend>,
}

impl CloudApi {
    pub fn new(backend: Arc<dyn CloudBackend>) -> Self {
        Self { backend }
    }

    /// REST client for the resolved cloud settings.
    pub fn from_settings(settings: &CloudSettings) -> PosResult<Self> {
        let rest = SupabaseRest::new(&settings.url, &settings.anon_key)?;
        Ok(Self::new(Arc::new(rest)))
    }

    pub async fn ping(&self) -> bool {
        self.backend.ping().await
    }

    // -- Drinks ---------------------------------------------------------------

    pub async fn get_drinks(&self) -> PosResult<Vec<Drink>> {
        let rows = self.backend.select(TABLE_DRINKS, "created_at", true).await?;
        Ok(decode_rows::<DrinkRow>(TABLE_DRINKS, rows)?
            .into_iter()
            .map(Drink::from)
            .collect())
    }

    pub async fn upsert_drinks(&self, drinks: &[Drink]) -> PosResult<()> {
        if drinks.is_empty() {
            return Ok(());
        }
        let now = now_iso();
        let rows: Vec<DrinkRow> = drinks.iter().map(|d| DrinkRow::stamped(d, &now)).collect();
        self.backend.upsert(TABLE_DRINKS, encode_rows(&rows)?).await
    }

    pub async fn delete_drink(&self, drink_id: &str) -> PosResult<()> {
        self.backend.delete_eq(TABLE_DRINKS, "id", drink_id).await
    }

    // -- Orders ---------------------------------------------------------------

    pub async fn get_orders(&self) -> PosResult<Vec<OrderRow>> {
        let rows = self.backend.select(TABLE_ORDERS, "timestamp", false).await?;
        decode_rows(TABLE_ORDERS, rows)
    }

    /// Upsert the order row only.
    pub async fn upsert_order(&self, order: &Order) -> PosResult<()> {
        let row = OrderRow::stamped(order, &now_iso());
        self.backend
            .upsert(TABLE_ORDERS, vec![serde_json::to_value(row)?])
            .await
    }

    pub async fn get_order_items(&self) -> PosResult<Vec<OrderItemRow>> {
        let rows = self
            .backend
            .select(TABLE_ORDER_ITEMS, "created_at", true)
            .await?;
        decode_rows(TABLE_ORDER_ITEMS, rows)
    }

    /// Upsert the item rows of every given order in one request.
    pub async fn upsert_order_items(&self, orders: &[Order]) -> PosResult<()> {
        let rows: Vec<OrderItemRow> = orders
            .iter()
            .flat_map(|o| o.items.iter().map(|i| OrderItemRow::new(&o.id, i)))
            .collect();
        if rows.is_empty() {
            return Ok(());
        }
        self.backend
            .upsert(TABLE_ORDER_ITEMS, encode_rows(&rows)?)
            .await
    }

    /// Order row first, then its items.
    pub async fn save_order(&self, order: &Order) -> PosResult<()> {
        self.upsert_order(order).await?;
        self.upsert_order_items(std::slice::from_ref(order)).await
    }

    pub async fn update_order_status(&self, order_id: &str, status: OrderStatus) -> PosResult<()> {
        let patch = serde_json::json!({
            "status": status.as_str(),
            "updated_at": now_iso(),
        });
        self.backend
            .update_eq(TABLE_ORDERS, "id", order_id, patch)
            .await
    }

    /// Items first; a failure there is logged and the order row is still
    /// deleted.
    pub async fn delete_order(&self, order_id: &str) -> PosResult<()> {
        if let Err(e) = self
            .backend
            .delete_eq(TABLE_ORDER_ITEMS, "order_id", order_id)
            .await
        {
            warn!(order_id, error = %e, "Failed to delete remote order items");
        }
        self.backend.delete_eq(TABLE_ORDERS, "id", order_id).await
    }

    // -- Ledger ---------------------------------------------------------------

    /// Costs or extra incomes, newest date first.
    pub async fn get_ledger<C: LedgerKind>(&self) -> PosResult<Vec<LedgerEntry<C>>> {
        let rows = self.backend.select(C::REMOTE_TABLE, "date", false).await?;
        Ok(decode_rows::<LedgerRow<C>>(C::REMOTE_TABLE, rows)?
            .into_iter()
            .map(LedgerEntry::from)
            .collect())
    }

    pub async fn upsert_ledger<C: LedgerKind>(&self, entry: &LedgerEntry<C>) -> PosResult<()> {
        let row = LedgerRow::stamped(entry, &now_iso());
        self.backend
            .upsert(C::REMOTE_TABLE, vec![serde_json::to_value(row)?])
            .await
    }

    pub async fn delete_ledger<C: LedgerKind>(&self, id: &str) -> PosResult<()> {
        debug!(table = C::REMOTE_TABLE, id, "Deleting remote ledger row");
        self.backend.delete_eq(C::REMOTE_TABLE, "id", id).await
    }
}

/// Nest item rows under their order rows. Orders keep their row order;
/// items keep theirs within each order. Items of unknown orders are dropped.
pub fn assemble_orders(orders: Vec<OrderRow>, items: Vec<OrderItemRow>) -> Vec<Order> {
    let mut by_order: HashMap<String, Vec<OrderItem>> = HashMap::new();
    for item in items {
        by_order
            .entry(item.order_id.clone())
            .or_default()
            .push(OrderItem::from(item));
    }
    orders
        .into_iter()
        .map(|row| Order {
            items: by_order.remove(&row.id).unwrap_or_default(),
            id: row.id,
            total: row.total,
            status: row.status,
            timestamp: row.timestamp,
            order_number: row.order_number,
        })
        .collect()
}

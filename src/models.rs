//! Domain types for the drink stand: menu, orders and bookkeeping records.
//!
//! Local JSON (key-value store and IPC payloads) uses camelCase field names.
//! Enumerations serialize to short snake_case wire values and still accept
//! the legacy labels written by earlier releases of the stand.

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::hash::Hash;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Menu
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Drink {
    pub id: String,
    pub name: String,
    pub price: f64,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub category: String,
    #[serde(default = "default_true")]
    pub available: bool,
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Drink options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SugarLevel {
    #[serde(alias = "无糖")]
    None,
    #[serde(alias = "少糖")]
    Less,
    #[serde(alias = "半糖")]
    Half,
    #[default]
    #[serde(alias = "正常")]
    Normal,
}

impl SugarLevel {
    pub const ALL: [SugarLevel; 4] = [Self::None, Self::Less, Self::Half, Self::Normal];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Less => "less",
            Self::Half => "half",
            Self::Normal => "normal",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "No sugar",
            Self::Less => "Less sugar",
            Self::Half => "Half sugar",
            Self::Normal => "Normal sugar",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IceLevel {
    #[serde(alias = "去冰")]
    None,
    #[serde(alias = "少冰")]
    Less,
    #[default]
    #[serde(alias = "正常冰")]
    Normal,
}

impl IceLevel {
    pub const ALL: [IceLevel; 3] = [Self::None, Self::Less, Self::Normal];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Less => "less",
            Self::Normal => "normal",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "No ice",
            Self::Less => "Less ice",
            Self::Normal => "Normal ice",
        }
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: String,
    pub drink_id: String,
    pub drink_name: String,
    pub price: f64,
    pub quantity: u32,
    pub sugar: SugarLevel,
    pub ice: IceLevel,
    pub subtotal: f64,
}

/// Largest quantity a single cart line may hold.
pub const MAX_LINE_QUANTITY: u32 = 999;

impl OrderItem {
    /// Build a new line for `drink`, copying its name and current price.
    pub fn for_drink(drink: &Drink, quantity: u32, sugar: SugarLevel, ice: IceLevel) -> Self {
        let mut item = Self {
            id: format!("{}-{}", drink.id, Uuid::new_v4().simple()),
            drink_id: drink.id.clone(),
            drink_name: drink.name.clone(),
            price: drink.price,
            quantity,
            sugar,
            ice,
            subtotal: 0.0,
        };
        item.recompute();
        item
    }

    pub fn recompute(&mut self) {
        self.subtotal = self.price * f64::from(self.quantity);
    }

    /// Lines with the same drink and options are merged in the cart.
    pub fn same_options(&self, other: &OrderItem) -> bool {
        self.drink_id == other.drink_id && self.sugar == other.sugar && self.ice == other.ice
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    #[serde(alias = "待处理")]
    Pending,
    #[serde(alias = "已完成")]
    Completed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Completed => "Completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub items: Vec<OrderItem>,
    pub total: f64,
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
    pub order_number: String,
}

impl Order {
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }
}

/// The order being assembled on the ordering screen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentOrder {
    pub items: Vec<OrderItem>,
    pub total: f64,
}

impl CurrentOrder {
    pub fn recompute_total(&mut self) {
        self.total = self.items.iter().map(|i| i.subtotal).sum();
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Bookkeeping
// ---------------------------------------------------------------------------

/// Category enumeration of a ledger collection. Ties the record type to its
/// local storage key and remote table.
pub trait LedgerKind:
    Copy + Default + Debug + PartialEq + Eq + Hash + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const STORAGE_KEY: &'static str;
    const REMOTE_TABLE: &'static str;
    const ALL: &'static [Self];

    fn as_str(&self) -> &'static str;
    fn label(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostCategory {
    #[default]
    #[serde(alias = "原料成本")]
    Ingredients,
    #[serde(alias = "人工成本")]
    Labor,
    #[serde(alias = "租金成本")]
    Rent,
    #[serde(alias = "设备成本")]
    Equipment,
    #[serde(alias = "其他成本")]
    Other,
}

impl LedgerKind for CostCategory {
    const STORAGE_KEY: &'static str = "drink_shop_costs";
    const REMOTE_TABLE: &'static str = "costs";
    const ALL: &'static [Self] = &[
        Self::Ingredients,
        Self::Labor,
        Self::Rent,
        Self::Equipment,
        Self::Other,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            Self::Ingredients => "ingredients",
            Self::Labor => "labor",
            Self::Rent => "rent",
            Self::Equipment => "equipment",
            Self::Other => "other",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Ingredients => "Ingredients",
            Self::Labor => "Labor",
            Self::Rent => "Rent",
            Self::Equipment => "Equipment",
            Self::Other => "Other costs",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncomeCategory {
    #[default]
    #[serde(alias = "服务费")]
    ServiceFee,
    #[serde(alias = "配送费")]
    DeliveryFee,
    #[serde(alias = "其他收入")]
    Other,
}

impl LedgerKind for IncomeCategory {
    const STORAGE_KEY: &'static str = "drink_shop_extra_incomes";
    const REMOTE_TABLE: &'static str = "extra_incomes";
    const ALL: &'static [Self] = &[Self::ServiceFee, Self::DeliveryFee, Self::Other];

    fn as_str(&self) -> &'static str {
        match self {
            Self::ServiceFee => "service_fee",
            Self::DeliveryFee => "delivery_fee",
            Self::Other => "other",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::ServiceFee => "Service fee",
            Self::DeliveryFee => "Delivery fee",
            Self::Other => "Other income",
        }
    }
}

/// A cost or extra-income record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(deserialize = "C: LedgerKind"))]
pub struct LedgerEntry<C> {
    pub id: String,
    pub name: String,
    pub amount: f64,
    pub category: C,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub type Cost = LedgerEntry<CostCategory>;
pub type ExtraIncome = LedgerEntry<IncomeCategory>;

/// Partial update merged onto an existing ledger record.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(deserialize = "C: LedgerKind"))]
pub struct LedgerPatch<C> {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub category: Option<C>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    /// `Some("")` clears the description.
    #[serde(default)]
    pub description: Option<String>,
}

pub type CostPatch = LedgerPatch<CostCategory>;
pub type IncomePatch = LedgerPatch<IncomeCategory>;

impl<C: LedgerKind> LedgerPatch<C> {
    pub fn apply(&self, entry: &mut LedgerEntry<C>) {
        if let Some(name) = &self.name {
            entry.name = name.clone();
        }
        if let Some(amount) = self.amount {
            entry.amount = amount;
        }
        if let Some(category) = self.category {
            entry.category = category;
        }
        if let Some(date) = self.date {
            entry.date = date;
        }
        if let Some(description) = &self.description {
            let trimmed = description.trim();
            entry.description = if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drink() -> Drink {
        Drink {
            id: "lemon-tea".into(),
            name: "Lemon Tea".into(),
            price: 12.0,
            image: String::new(),
            category: "Tea".into(),
            available: true,
        }
    }

    #[test]
    fn test_order_item_for_drink_computes_subtotal() {
        let item = OrderItem::for_drink(&drink(), 3, SugarLevel::Half, IceLevel::Less);
        assert_eq!(item.subtotal, 36.0);
        assert!(item.id.starts_with("lemon-tea-"));
        assert_eq!(item.drink_name, "Lemon Tea");
    }

    #[test]
    fn test_legacy_labels_deserialize() {
        let item: OrderItem = serde_json::from_value(serde_json::json!({
            "id": "x",
            "drinkId": "coffee",
            "drinkName": "Coffee",
            "price": 18,
            "quantity": 2,
            "sugar": "少糖",
            "ice": "去冰",
            "subtotal": 36
        }))
        .expect("legacy item");
        assert_eq!(item.sugar, SugarLevel::Less);
        assert_eq!(item.ice, IceLevel::None);

        let status: OrderStatus = serde_json::from_str("\"已完成\"").expect("legacy status");
        assert_eq!(status, OrderStatus::Completed);
        let category: CostCategory = serde_json::from_str("\"租金成本\"").expect("legacy cost");
        assert_eq!(category, CostCategory::Rent);
    }

    #[test]
    fn test_enums_serialize_to_wire_values() {
        assert_eq!(
            serde_json::to_value(IncomeCategory::DeliveryFee).unwrap(),
            serde_json::json!("delivery_fee")
        );
        assert_eq!(serde_json::to_value(SugarLevel::None).unwrap(), "none");
        assert_eq!(OrderStatus::Completed.as_str(), "completed");
    }

    #[test]
    fn test_ledger_patch_merges_fields() {
        let mut cost = Cost {
            id: "c1".into(),
            name: "Milk".into(),
            amount: 30.0,
            category: CostCategory::Ingredients,
            date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            description: Some("two cartons".into()),
            created_at: Utc::now(),
        };
        let patch = CostPatch {
            amount: Some(42.5),
            description: Some("  ".into()),
            ..Default::default()
        };
        patch.apply(&mut cost);
        assert_eq!(cost.amount, 42.5);
        assert_eq!(cost.name, "Milk");
        assert!(cost.description.is_none());
    }

    #[test]
    fn test_current_order_total() {
        let mut current = CurrentOrder::default();
        current
            .items
            .push(OrderItem::for_drink(&drink(), 2, SugarLevel::Normal, IceLevel::Normal));
        current
            .items
            .push(OrderItem::for_drink(&drink(), 1, SugarLevel::None, IceLevel::Normal));
        current.recompute_total();
        assert_eq!(current.total, 36.0);
    }
}

//! Bookkeeping forms: costs and extra income.

use chrono::{Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{PosError, PosResult};
use crate::models::{LedgerEntry, LedgerKind, LedgerPatch};
use crate::storage::Storage;
use crate::sync::LedgerSync;

/// Fields of the add cost / add income form.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(deserialize = "C: LedgerKind"))]
pub struct LedgerInput<C> {
    pub name: String,
    pub amount: f64,
    #[serde(default)]
    pub category: C,
    /// Defaults to today (local date).
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub description: Option<String>,
}

pub type CostInput = LedgerInput<crate::models::CostCategory>;
pub type IncomeInput = LedgerInput<crate::models::IncomeCategory>;

fn validate_name(name: &str) -> PosResult<()> {
    if name.trim().is_empty() {
        return Err(PosError::Invalid("name is required".into()));
    }
    Ok(())
}

fn validate_amount(amount: f64) -> PosResult<()> {
    if !amount.is_finite() {
        return Err(PosError::Invalid(format!("amount must be a number, got {amount}")));
    }
    Ok(())
}

impl<C: LedgerKind> LedgerInput<C> {
    fn into_entry(self, today: NaiveDate) -> PosResult<LedgerEntry<C>> {
        validate_name(&self.name)?;
        validate_amount(self.amount)?;
        Ok(LedgerEntry {
            id: Uuid::new_v4().to_string(),
            name: self.name.trim().to_string(),
            amount: self.amount,
            category: self.category,
            date: self.date.unwrap_or(today),
            description: self
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            created_at: Utc::now(),
        })
    }
}

pub fn list_entries<C: LedgerSync>(storage: &Storage) -> PosResult<Vec<LedgerEntry<C>>> {
    storage.get_ledger::<C>()
}

pub fn create_entry<C: LedgerSync>(
    storage: &Storage,
    input: LedgerInput<C>,
) -> PosResult<LedgerEntry<C>> {
    let entry = input.into_entry(Local::now().date_naive())?;
    storage.save_ledger_entry(&entry)?;
    info!(
        table = C::REMOTE_TABLE,
        id = %entry.id,
        amount = entry.amount,
        category = entry.category.as_str(),
        "ledger entry recorded"
    );
    Ok(entry)
}

pub fn update_entry<C: LedgerSync>(
    storage: &Storage,
    id: &str,
    patch: &LedgerPatch<C>,
) -> PosResult<LedgerEntry<C>> {
    if let Some(name) = &patch.name {
        validate_name(name)?;
    }
    if let Some(amount) = patch.amount {
        validate_amount(amount)?;
    }
    storage
        .update_ledger_entry(id, patch)?
        .ok_or_else(|| PosError::NotFound(format!("{} entry {id}", C::REMOTE_TABLE)))
}

pub fn delete_entry<C: LedgerSync>(storage: &Storage, id: &str) -> PosResult<bool> {
    storage.delete_ledger_entry::<C>(id)
}

/// Amount per category, in category order. Categories without entries are
/// left out.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryTotal<C> {
    pub category: C,
    pub label: &'static str,
    pub amount: f64,
    pub count: usize,
}

pub fn category_totals<C: LedgerKind>(entries: &[LedgerEntry<C>]) -> Vec<CategoryTotal<C>> {
    C::ALL
        .iter()
        .filter_map(|category| {
            let matching: Vec<&LedgerEntry<C>> =
                entries.iter().filter(|e| e.category == *category).collect();
            if matching.is_empty() {
                return None;
            }
            Some(CategoryTotal {
                category: *category,
                label: category.label(),
                amount: matching.iter().map(|e| e.amount).sum(),
                count: matching.len(),
            })
        })
        .collect()
}

pub fn total_amount<C>(entries: &[LedgerEntry<C>]) -> f64 {
    entries.iter().map(|e| e.amount).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CostCategory, CostPatch, IncomeCategory};
    use crate::storage::memory_storage;

    fn cost(name: &str, amount: f64, category: CostCategory) -> CostInput {
        CostInput {
            name: name.into(),
            amount,
            category,
            date: None,
            description: Some("  ".into()),
        }
    }

    #[test]
    fn test_create_defaults_date_and_trims() {
        let storage = memory_storage();
        let entry = create_entry(&storage, cost("  Ice  ", 12.0, CostCategory::Ingredients)).unwrap();
        assert_eq!(entry.name, "Ice");
        assert_eq!(entry.date, Local::now().date_naive());
        assert!(entry.description.is_none());
        assert_eq!(list_entries::<CostCategory>(&storage).unwrap(), vec![entry]);
    }

    #[test]
    fn test_create_validates() {
        let storage = memory_storage();
        assert!(matches!(
            create_entry(&storage, cost("", 1.0, CostCategory::Rent)),
            Err(PosError::Invalid(_))
        ));
        assert!(create_entry(&storage, cost("Rent", f64::INFINITY, CostCategory::Rent)).is_err());
        assert!(list_entries::<CostCategory>(&storage).unwrap().is_empty());
    }

    #[test]
    fn test_input_parses_from_form_json() {
        let input: IncomeInput = serde_json::from_value(serde_json::json!({
            "name": "Catering fee",
            "amount": 80,
            "category": "service_fee",
            "date": "2026-09-12"
        }))
        .unwrap();
        assert_eq!(input.category, IncomeCategory::ServiceFee);
        assert_eq!(input.date, NaiveDate::from_ymd_opt(2026, 9, 12));
    }

    #[test]
    fn test_update_and_delete() {
        let storage = memory_storage();
        let entry = create_entry(&storage, cost("Cups", 10.0, CostCategory::Other)).unwrap();

        let patch = CostPatch {
            name: Some(" ".into()),
            ..Default::default()
        };
        assert!(update_entry(&storage, &entry.id, &patch).is_err());

        let patch = CostPatch {
            amount: Some(11.5),
            ..Default::default()
        };
        assert_eq!(update_entry(&storage, &entry.id, &patch).unwrap().amount, 11.5);
        assert!(matches!(
            update_entry(&storage, "missing", &patch),
            Err(PosError::NotFound(_))
        ));

        assert!(delete_entry::<CostCategory>(&storage, &entry.id).unwrap());
        assert!(list_entries::<CostCategory>(&storage).unwrap().is_empty());
    }

    #[test]
    fn test_category_totals() {
        let storage = memory_storage();
        create_entry(&storage, cost("Rent", 300.0, CostCategory::Rent)).unwrap();
        create_entry(&storage, cost("Milk", 20.0, CostCategory::Ingredients)).unwrap();
        create_entry(&storage, cost("Tea", 15.0, CostCategory::Ingredients)).unwrap();
        let entries = list_entries::<CostCategory>(&storage).unwrap();

        let totals = category_totals(&entries);
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[0].category, CostCategory::Ingredients);
        assert_eq!(totals[0].amount, 35.0);
        assert_eq!(totals[0].count, 2);
        assert_eq!(totals[1].label, "Rent");
        assert_eq!(total_amount(&entries), 335.0);
    }
}

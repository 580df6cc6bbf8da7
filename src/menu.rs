//! Drink menu: the default seed, admin form handling, and the filters the
//! ordering screen uses.

use serde::Deserialize;
use uuid::Uuid;

use crate::error::{PosError, PosResult};
use crate::models::Drink;

// ---------------------------------------------------------------------------
// Default menu
// ---------------------------------------------------------------------------

const DEFAULT_MENU: &[(&str, &str, f64, &str, &str)] = &[
    ("bubble-tea", "Bubble Milk Tea", 15.0, "/images/bubble-tea.jpg", "Milk Tea"),
    ("lemon-tea", "Lemon Tea", 12.0, "/images/lemon-tea.jpg", "Tea"),
    ("black-tea", "Black Tea", 8.0, "/images/black-tea.jpg", "Tea"),
    ("green-tea", "Green Tea", 8.0, "/images/green-tea.jpg", "Tea"),
    ("coffee", "Fresh Ground Coffee", 18.0, "/images/coffee.jpg", "Coffee"),
    ("milkshake", "Milkshake", 20.0, "/images/milkshake.jpg", "Dairy"),
    ("fruit-juice", "Fresh Fruit Juice", 16.0, "/images/fruit-juice.jpg", "Juice"),
    ("taro-drink", "Taro Ball Milk Tea", 18.0, "/images/taro-drink.jpeg", "Milk Tea"),
];

/// Menu written on first launch.
pub fn default_drinks() -> Vec<Drink> {
    DEFAULT_MENU
        .iter()
        .map(|(id, name, price, image, category)| Drink {
            id: (*id).to_string(),
            name: (*name).to_string(),
            price: *price,
            image: (*image).to_string(),
            category: (*category).to_string(),
            available: true,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Admin form
// ---------------------------------------------------------------------------

/// Fields of the add/edit drink form.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrinkInput {
    pub name: String,
    pub price: f64,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub category: String,
    #[serde(default = "available_by_default")]
    pub available: bool,
}

fn available_by_default() -> bool {
    true
}

impl DrinkInput {
    fn validate(&self) -> PosResult<()> {
        if self.name.trim().is_empty() {
            return Err(PosError::Invalid("drink name is required".into()));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(PosError::Invalid(format!(
                "drink price must be a non-negative number, got {}",
                self.price
            )));
        }
        Ok(())
    }
}

/// Build a new menu entry with a fresh `drink-{uuid}` id.
pub fn new_drink(input: DrinkInput) -> PosResult<Drink> {
    input.validate()?;
    Ok(Drink {
        id: format!("drink-{}", Uuid::new_v4().simple()),
        name: input.name.trim().to_string(),
        price: input.price,
        image: input.image.trim().to_string(),
        category: input.category.trim().to_string(),
        available: input.available,
    })
}

/// Apply the edit form onto an existing drink, keeping its id.
pub fn edit_drink(existing: &Drink, input: DrinkInput) -> PosResult<Drink> {
    input.validate()?;
    Ok(Drink {
        id: existing.id.clone(),
        name: input.name.trim().to_string(),
        price: input.price,
        image: input.image.trim().to_string(),
        category: input.category.trim().to_string(),
        available: input.available,
    })
}

// ---------------------------------------------------------------------------
// Ordering screen filters
// ---------------------------------------------------------------------------

pub fn available_drinks(drinks: &[Drink]) -> Vec<Drink> {
    drinks.iter().filter(|d| d.available).cloned().collect()
}

/// Distinct categories of the available drinks, in first-seen order.
pub fn categories(drinks: &[Drink]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for drink in drinks.iter().filter(|d| d.available) {
        if !seen.iter().any(|c| c == &drink.category) {
            seen.push(drink.category.clone());
        }
    }
    seen
}

/// Available drinks whose name contains `term` (case-insensitive), limited
/// to `category` unless it is `None` or `"all"`.
pub fn search(drinks: &[Drink], term: &str, category: Option<&str>) -> Vec<Drink> {
    let needle = term.trim().to_lowercase();
    let category = category
        .map(str::trim)
        .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case("all"));
    drinks
        .iter()
        .filter(|d| d.available)
        .filter(|d| needle.is_empty() || d.name.to_lowercase().contains(&needle))
        .filter(|d| category.map_or(true, |c| d.category == c))
        .cloned()
        .collect()
}

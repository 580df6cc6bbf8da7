use serde::Deserialize;
use std::sync::Arc;

use crate::menu::{self, DrinkInput};
use crate::models::Drink;
use crate::store::{Action, Store};

use super::{object_payload, parse_id_payload};

const DRINK_ID_KEYS: &[&str] = &["drinkId", "drink_id", "id"];

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct MenuSearchPayload {
    #[serde(default, alias = "query", alias = "q", alias = "searchTerm")]
    term: String,
    #[serde(default, alias = "selectedCategory")]
    category: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MenuUpdateDrinkPayload {
    #[serde(alias = "drink_id", alias = "drinkId")]
    id: String,
    #[serde(flatten)]
    input: DrinkInput,
}

fn parse_search_payload(arg0: Option<serde_json::Value>) -> Result<MenuSearchPayload, String> {
    let payload = match arg0 {
        Some(serde_json::Value::String(term)) => serde_json::json!({ "term": term }),
        other => object_payload(other),
    };
    serde_json::from_value(payload).map_err(|e| format!("Invalid menu search payload: {e}"))
}

fn parse_drink_input(arg0: Option<serde_json::Value>) -> Result<DrinkInput, String> {
    serde_json::from_value(object_payload(arg0)).map_err(|e| format!("Invalid drink payload: {e}"))
}

fn parse_update_drink_payload(
    arg0: Option<serde_json::Value>,
) -> Result<MenuUpdateDrinkPayload, String> {
    let mut parsed: MenuUpdateDrinkPayload = serde_json::from_value(object_payload(arg0))
        .map_err(|e| format!("Invalid drink payload: {e}"))?;
    parsed.id = parsed.id.trim().to_string();
    if parsed.id.is_empty() {
        return Err("Missing drink id".into());
    }
    Ok(parsed)
}

fn find_drink(store: &Store, id: &str) -> Result<Drink, String> {
    store
        .snapshot()
        .drinks
        .into_iter()
        .find(|d| d.id == id)
        .ok_or_else(|| format!("Drink not found: {id}"))
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn menu_get_drinks(store: tauri::State<'_, Arc<Store>>) -> Result<Vec<Drink>, String> {
    Ok(store.snapshot().drinks)
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn menu_get_available(
    store: tauri::State<'_, Arc<Store>>,
) -> Result<Vec<Drink>, String> {
    Ok(menu::available_drinks(&store.snapshot().drinks))
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn menu_get_categories(
    store: tauri::State<'_, Arc<Store>>,
) -> Result<Vec<String>, String> {
    Ok(menu::categories(&store.snapshot().drinks))
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn menu_search(
    arg0: Option<serde_json::Value>,
    store: tauri::State<'_, Arc<Store>>,
) -> Result<Vec<Drink>, String> {
    let payload = parse_search_payload(arg0)?;
    Ok(menu::search(
        &store.snapshot().drinks,
        &payload.term,
        payload.category.as_deref(),
    ))
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn menu_add_drink(
    arg0: Option<serde_json::Value>,
    store: tauri::State<'_, Arc<Store>>,
) -> Result<Drink, String> {
    let drink = menu::new_drink(parse_drink_input(arg0)?).map_err(|e| e.to_string())?;
    store
        .dispatch(Action::AddDrink(drink.clone()))
        .map_err(|e| e.to_string())?;
    Ok(drink)
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn menu_update_drink(
    arg0: Option<serde_json::Value>,
    store: tauri::State<'_, Arc<Store>>,
) -> Result<Drink, String> {
    let payload = parse_update_drink_payload(arg0)?;
    let existing = find_drink(&store, &payload.id)?;
    let drink = menu::edit_drink(&existing, payload.input).map_err(|e| e.to_string())?;
    store
        .dispatch(Action::UpdateDrink(drink.clone()))
        .map_err(|e| e.to_string())?;
    Ok(drink)
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn menu_toggle_availability(
    arg0: Option<serde_json::Value>,
    store: tauri::State<'_, Arc<Store>>,
) -> Result<Drink, String> {
    let id = parse_id_payload(arg0, DRINK_ID_KEYS, "drink id")?;
    let mut drink = find_drink(&store, &id)?;
    drink.available = !drink.available;
    store
        .dispatch(Action::UpdateDrink(drink.clone()))
        .map_err(|e| e.to_string())?;
    Ok(drink)
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn menu_delete_drink(
    arg0: Option<serde_json::Value>,
    store: tauri::State<'_, Arc<Store>>,
) -> Result<(), String> {
    let id = parse_id_payload(arg0, DRINK_ID_KEYS, "drink id")?;
    store
        .dispatch(Action::DeleteDrink(id))
        .map_err(|e| e.to_string())?;
    Ok(())
}

//! Application state and the action reducer behind every screen.
//!
//! The in-memory state mirrors the local collections. Actions that touch a
//! persisted collection write through [`Storage`] first and only then update
//! memory, so a failed write leaves the state unchanged.

use chrono::Utc;
use serde::Serialize;
use std::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{PosError, PosResult};
use crate::models::{
    CurrentOrder, Drink, IceLevel, Order, OrderItem, OrderStatus, SugarLevel, MAX_LINE_QUANTITY,
};
use crate::storage::{LocalData, Storage};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    pub drinks: Vec<Drink>,
    /// Newest first.
    pub orders: Vec<Order>,
    pub current_order: CurrentOrder,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SetDrinks(Vec<Drink>),
    SetOrders(Vec<Order>),
    AddOrderItem(OrderItem),
    UpdateOrderItem {
        id: String,
        quantity: Option<u32>,
        sugar: Option<SugarLevel>,
        ice: Option<IceLevel>,
    },
    RemoveOrderItem(String),
    ClearCurrentOrder,
    SubmitOrder,
    UpdateOrderStatus { id: String, status: OrderStatus },
    DeleteOrder(String),
    AddDrink(Drink),
    UpdateDrink(Drink),
    DeleteDrink(String),
}

// ---------------------------------------------------------------------------
// Cart reducer (memory only)
// ---------------------------------------------------------------------------

fn check_quantity(quantity: u32) -> PosResult<()> {
    if quantity > MAX_LINE_QUANTITY {
        return Err(PosError::Invalid(format!(
            "quantity {quantity} exceeds the limit of {MAX_LINE_QUANTITY} per line"
        )));
    }
    Ok(())
}

/// Merging into an existing line must stay within [`MAX_LINE_QUANTITY`];
/// the cart is left untouched otherwise.
fn add_item(cart: &mut CurrentOrder, item: OrderItem) -> PosResult<()> {
    match cart.items.iter_mut().find(|existing| existing.same_options(&item)) {
        Some(existing) => {
            let merged = existing
                .quantity
                .checked_add(item.quantity)
                .unwrap_or(u32::MAX);
            check_quantity(merged)?;
            existing.quantity = merged;
            existing.recompute();
        }
        None => {
            check_quantity(item.quantity)?;
            cart.items.push(item);
        }
    }
    cart.recompute_total();
    Ok(())
}

/// Unknown ids are ignored. A quantity of zero removes the line.
fn update_item(
    cart: &mut CurrentOrder,
    id: &str,
    quantity: Option<u32>,
    sugar: Option<SugarLevel>,
    ice: Option<IceLevel>,
) -> PosResult<()> {
    if let Some(quantity) = quantity {
        check_quantity(quantity)?;
    }
    if quantity == Some(0) {
        cart.items.retain(|i| i.id != id);
    } else if let Some(item) = cart.items.iter_mut().find(|i| i.id == id) {
        if let Some(quantity) = quantity {
            item.quantity = quantity;
        }
        if let Some(sugar) = sugar {
            item.sugar = sugar;
        }
        if let Some(ice) = ice {
            item.ice = ice;
        }
        item.recompute();
    }
    cart.recompute_total();
    Ok(())
}

fn remove_item(cart: &mut CurrentOrder, id: &str) {
    cart.items.retain(|i| i.id != id);
    cart.recompute_total();
}

fn sort_newest_first(orders: &mut [Order]) {
    orders.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

pub struct Store {
    state: Mutex<AppState>,
    storage: Storage,
}

impl Store {
    /// Hydrate from local storage. The default menu is seeded on first run.
    pub fn load(storage: Storage) -> PosResult<Self> {
        let drinks = storage.get_drinks()?;
        let mut orders = storage.get_orders()?;
        sort_newest_first(&mut orders);
        info!(drinks = drinks.len(), orders = orders.len(), "Store loaded");
        Ok(Self {
            state: Mutex::new(AppState {
                drinks,
                orders,
                current_order: CurrentOrder::default(),
            }),
            storage,
        })
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn snapshot(&self) -> AppState {
        self.state
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Apply `action` and return the resulting state.
    pub fn dispatch(&self, action: Action) -> PosResult<AppState> {
        let mut state = self.state.lock()?;
        self.reduce(&mut state, action)?;
        Ok(state.clone())
    }

    fn reduce(&self, state: &mut AppState, action: Action) -> PosResult<()> {
        match action {
            Action::SetDrinks(drinks) => state.drinks = drinks,
            Action::SetOrders(orders) => state.orders = orders,
            Action::AddOrderItem(item) => add_item(&mut state.current_order, item)?,
            Action::UpdateOrderItem {
                id,
                quantity,
                sugar,
                ice,
            } => update_item(&mut state.current_order, &id, quantity, sugar, ice)?,
            Action::RemoveOrderItem(id) => remove_item(&mut state.current_order, &id),
            Action::ClearCurrentOrder => state.current_order = CurrentOrder::default(),
            Action::SubmitOrder => {
                if state.current_order.is_empty() {
                    return Err(PosError::Invalid("the current order has no items".into()));
                }
                let order = Order {
                    id: Uuid::new_v4().to_string(),
                    items: state.current_order.items.clone(),
                    total: state.current_order.total,
                    status: OrderStatus::Pending,
                    timestamp: Utc::now(),
                    order_number: self.storage.next_order_number()?,
                };
                self.storage.save_order(&order)?;
                info!(
                    order_id = %order.id,
                    order_number = %order.order_number,
                    total = order.total,
                    "Order submitted"
                );
                state.orders.insert(0, order);
                state.current_order = CurrentOrder::default();
            }
            Action::UpdateOrderStatus { id, status } => {
                if !self.storage.update_order_status(&id, status)? {
                    return Err(PosError::NotFound(format!("order {id}")));
                }
                if let Some(order) = state.orders.iter_mut().find(|o| o.id == id) {
                    order.status = status;
                }
            }
            Action::DeleteOrder(id) => {
                self.storage.delete_order(&id)?;
                state.orders.retain(|o| o.id != id);
            }
            Action::AddDrink(drink) => {
                let mut drinks = state.drinks.clone();
                drinks.push(drink);
                self.storage.save_drinks(&drinks)?;
                state.drinks = drinks;
            }
            Action::UpdateDrink(drink) => {
                let mut drinks = state.drinks.clone();
                let Some(slot) = drinks.iter_mut().find(|d| d.id == drink.id) else {
                    return Err(PosError::NotFound(format!("drink {}", drink.id)));
                };
                *slot = drink;
                self.storage.save_drinks(&drinks)?;
                state.drinks = drinks;
            }
            Action::DeleteDrink(id) => {
                let drinks: Vec<Drink> =
                    state.drinks.iter().filter(|d| d.id != id).cloned().collect();
                self.storage.remove_drink(&drinks, &id)?;
                state.drinks = drinks;
            }
        }
        Ok(())
    }

    /// Put `quantity` of the drink with `drink_id` in the cart.
    pub fn add_drink_to_cart(
        &self,
        drink_id: &str,
        quantity: u32,
        sugar: SugarLevel,
        ice: IceLevel,
    ) -> PosResult<AppState> {
        if quantity == 0 {
            return Err(PosError::Invalid("quantity must be at least 1".into()));
        }
        check_quantity(quantity)?;
        let drink = self
            .snapshot()
            .drinks
            .into_iter()
            .find(|d| d.id == drink_id)
            .ok_or_else(|| PosError::NotFound(format!("drink {drink_id}")))?;
        if !drink.available {
            return Err(PosError::Invalid(format!("{} is not available", drink.name)));
        }
        self.dispatch(Action::AddOrderItem(OrderItem::for_drink(
            &drink, quantity, sugar, ice,
        )))
    }

    /// Drop every order and the counter. Local only.
    pub fn clear_all_orders(&self) -> PosResult<AppState> {
        self.storage.clear_all_orders()?;
        self.dispatch(Action::SetOrders(Vec::new()))
    }

    /// Refresh memory after a cloud pull wrote `data` to storage.
    pub fn replace_from_pull(&self, data: &LocalData) -> PosResult<()> {
        let mut orders = data.orders.clone();
        sort_newest_first(&mut orders);
        let mut state = self.state.lock()?;
        self.reduce(&mut state, Action::SetDrinks(data.drinks.clone()))?;
        self.reduce(&mut state, Action::SetOrders(orders))?;
        debug!("Store refreshed from cloud pull");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory_storage;

    fn store() -> Store {
        Store::load(memory_storage()).unwrap()
    }

    fn cart_add(store: &Store, drink_id: &str, qty: u32, sugar: SugarLevel) -> AppState {
        store
            .add_drink_to_cart(drink_id, qty, sugar, IceLevel::Normal)
            .unwrap()
    }

    #[test]
    fn test_load_seeds_menu() {
        let state = store().snapshot();
        assert_eq!(state.drinks.len(), 8);
        assert!(state.orders.is_empty());
        assert!(state.current_order.is_empty());
    }

    #[test]
    fn test_add_merges_same_options() {
        let store = store();
        cart_add(&store, "coffee", 1, SugarLevel::Normal);
        let state = cart_add(&store, "coffee", 2, SugarLevel::Normal);
        assert_eq!(state.current_order.items.len(), 1);
        assert_eq!(state.current_order.items[0].quantity, 3);
        assert_eq!(state.current_order.items[0].subtotal, 54.0);

        let state = cart_add(&store, "coffee", 1, SugarLevel::Less);
        assert_eq!(state.current_order.items.len(), 2);
        assert_eq!(state.current_order.total, 72.0);
    }

    #[test]
    fn test_oversized_quantities_leave_the_cart_usable() {
        let store = store();
        assert!(matches!(
            store.add_drink_to_cart("coffee", u32::MAX, SugarLevel::Normal, IceLevel::Normal),
            Err(PosError::Invalid(_))
        ));

        cart_add(&store, "coffee", MAX_LINE_QUANTITY, SugarLevel::Normal);
        assert!(matches!(
            store.add_drink_to_cart("coffee", 2, SugarLevel::Normal, IceLevel::Normal),
            Err(PosError::Invalid(_))
        ));
        let snapshot = store.snapshot();
        let item = &snapshot.current_order.items[0];
        assert_eq!(item.quantity, MAX_LINE_QUANTITY);
        assert_eq!(item.subtotal, 18.0 * f64::from(MAX_LINE_QUANTITY));

        let mut huge = item.clone();
        huge.quantity = u32::MAX;
        assert!(matches!(
            store.dispatch(Action::AddOrderItem(huge)),
            Err(PosError::Invalid(_))
        ));
        assert!(matches!(
            store.dispatch(Action::UpdateOrderItem {
                id: item.id.clone(),
                quantity: Some(MAX_LINE_QUANTITY + 1),
                sugar: None,
                ice: None,
            }),
            Err(PosError::Invalid(_))
        ));

        let state = cart_add(&store, "black-tea", 1, SugarLevel::Normal);
        assert_eq!(state.current_order.items.len(), 2);
        assert_eq!(state.drinks.len(), 8);
        assert_eq!(state.current_order.items[0].quantity, MAX_LINE_QUANTITY);
    }

    #[test]
    fn test_update_item_and_zero_quantity_removes() {
        let store = store();
        let state = cart_add(&store, "black-tea", 1, SugarLevel::Normal);
        let id = state.current_order.items[0].id.clone();

        let state = store
            .dispatch(Action::UpdateOrderItem {
                id: id.clone(),
                quantity: Some(4),
                sugar: Some(SugarLevel::None),
                ice: None,
            })
            .unwrap();
        let item = &state.current_order.items[0];
        assert_eq!(item.quantity, 4);
        assert_eq!(item.sugar, SugarLevel::None);
        assert_eq!(state.current_order.total, 32.0);

        let state = store
            .dispatch(Action::UpdateOrderItem {
                id,
                quantity: Some(0),
                sugar: None,
                ice: None,
            })
            .unwrap();
        assert!(state.current_order.is_empty());
        assert_eq!(state.current_order.total, 0.0);
    }

    #[test]
    fn test_submit_order_persists_and_clears_cart() {
        let store = store();
        assert!(matches!(
            store.dispatch(Action::SubmitOrder),
            Err(PosError::Invalid(_))
        ));

        cart_add(&store, "coffee", 1, SugarLevel::Normal);
        let first = store.dispatch(Action::SubmitOrder).unwrap();
        cart_add(&store, "milkshake", 2, SugarLevel::Normal);
        let state = store.dispatch(Action::SubmitOrder).unwrap();

        assert!(state.current_order.is_empty());
        assert_eq!(state.orders.len(), 2);
        assert_eq!(state.orders[0].order_number, "002");
        assert_eq!(state.orders[0].total, 40.0);
        assert_eq!(state.orders[1].id, first.orders[0].id);
        assert_eq!(state.orders[0].status, OrderStatus::Pending);

        let persisted = store.storage().get_orders().unwrap();
        assert_eq!(persisted.len(), 2);
    }

    #[test]
    fn test_order_status_and_delete() {
        let store = store();
        cart_add(&store, "coffee", 1, SugarLevel::Normal);
        let id = store.dispatch(Action::SubmitOrder).unwrap().orders[0]
            .id
            .clone();

        let state = store
            .dispatch(Action::UpdateOrderStatus {
                id: id.clone(),
                status: OrderStatus::Completed,
            })
            .unwrap();
        assert_eq!(state.orders[0].status, OrderStatus::Completed);
        assert!(matches!(
            store.dispatch(Action::UpdateOrderStatus {
                id: "missing".into(),
                status: OrderStatus::Completed,
            }),
            Err(PosError::NotFound(_))
        ));

        let state = store.dispatch(Action::DeleteOrder(id)).unwrap();
        assert!(state.orders.is_empty());
        assert!(store.storage().get_orders().unwrap().is_empty());
    }

    #[test]
    fn test_drink_actions_persist_menu() {
        let store = store();
        let mut tea = store.snapshot().drinks[2].clone();
        tea.available = false;
        store.dispatch(Action::UpdateDrink(tea.clone())).unwrap();
        assert!(matches!(
            store.add_drink_to_cart(&tea.id, 1, SugarLevel::Normal, IceLevel::Normal),
            Err(PosError::Invalid(_))
        ));

        let mut extra = tea.clone();
        extra.id = "oolong".into();
        store.dispatch(Action::AddDrink(extra)).unwrap();
        store.dispatch(Action::DeleteDrink("coffee".into())).unwrap();

        let persisted = store.storage().get_drinks().unwrap();
        assert_eq!(persisted.len(), 8);
        assert!(persisted.iter().any(|d| d.id == "oolong"));
        assert!(!persisted.iter().any(|d| d.id == "coffee"));
        assert_eq!(store.snapshot().drinks, persisted);
    }

    #[test]
    fn test_clear_all_orders_resets_numbering() {
        let store = store();
        cart_add(&store, "coffee", 1, SugarLevel::Normal);
        store.dispatch(Action::SubmitOrder).unwrap();
        let state = store.clear_all_orders().unwrap();
        assert!(state.orders.is_empty());

        cart_add(&store, "coffee", 1, SugarLevel::Normal);
        let state = store.dispatch(Action::SubmitOrder).unwrap();
        assert_eq!(state.orders[0].order_number, "001");
    }
}

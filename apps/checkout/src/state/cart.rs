//! # Cart State
//!
//! Holds the shopper's cart and persists it through a [`LocalStore`].
//!
//! ## Thread Safety
//! The cart is wrapped in `Arc<Mutex<T>>` because:
//! 1. Multiple commands may access/modify the cart
//! 2. Only one command should modify the cart at a time
//! 3. Commands can run concurrently on the tokio runtime
//!
//! ## Cart Operations Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         CartState                                       │
//! │                                                                         │
//! │  startup ──► store.load() ──► Some(cart) ──► restored                   │
//! │                          └──► None / Err ──► Cart::new()                │
//! │                                                                         │
//! │  with_cart_mut(|c| c.add_item(..))                                      │
//! │       │                                                                 │
//! │       ├── lock Mutex<Cart>                                              │
//! │       ├── run closure                                                   │
//! │       └── store.save(&cart)   (failure logged, memory stays current)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Pricing rules live in [`lys_core::cart::Cart`]; this type only owns it.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

use super::store::{LocalStore, MemoryStore};
use lys_core::cart::Cart;

/// Shared cart state.
#[derive(Debug, Clone)]
pub struct CartState {
    cart: Arc<Mutex<Cart>>,
    store: Arc<dyn LocalStore<Cart>>,
}

impl CartState {
    /// Restores the cart from `store`, starting empty when nothing usable is
    /// stored.
    pub fn new(store: Arc<dyn LocalStore<Cart>>) -> Self {
        let cart = match store.load() {
            Ok(Some(cart)) => cart,
            Ok(None) => Cart::new(),
            Err(e) => {
                warn!(error = %e, "Stored cart unreadable, starting empty");
                Cart::new()
            }
        };

        CartState {
            cart: Arc::new(Mutex::new(cart)),
            store,
        }
    }

    /// Cart state with no persistence beyond the process.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::<Cart>::new()))
    }

    /// Executes a function with read access to the cart.
    ///
    /// ## Usage
    /// ```rust,ignore
    /// let totals = cart_state.with_cart(|cart| cart.totals());
    /// ```
    pub fn with_cart<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&Cart) -> R,
    {
        let cart = self.cart.lock().unwrap_or_else(PoisonError::into_inner);
        f(&cart)
    }

    /// Executes a function with write access to the cart, then saves it.
    ///
    /// ## Usage
    /// ```rust,ignore
    /// cart_state.with_cart_mut(|cart| cart.add_item(&product, 1))?;
    /// ```
    pub fn with_cart_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Cart) -> R,
    {
        let mut cart = self.cart.lock().unwrap_or_else(PoisonError::into_inner);
        let result = f(&mut cart);
        if let Err(e) = self.store.save(&cart) {
            warn!(error = %e, "Failed to persist cart");
        }
        result
    }
}

impl Default for CartState {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lys_core::cart::{AppliedCode, ProductSnapshot};
    use lys_core::{Money, PromotionalDiscount};

    fn product(id: &str, pence: i64) -> ProductSnapshot {
        ProductSnapshot::new(id, "brand-1", format!("Product {}", id), pence)
    }

    #[test]
    fn test_mutations_are_saved() {
        let store = Arc::new(MemoryStore::<Cart>::new());
        let state = CartState::new(store.clone());

        state
            .with_cart_mut(|c| c.add_item(&product("p1", 1000), 2))
            .unwrap();

        let saved = store.load().unwrap().unwrap();
        assert_eq!(saved.total_quantity(), 2);
        assert_eq!(saved.subtotal(), Money::from_cents(2000));
    }

    #[test]
    fn test_restores_previous_cart() {
        let mut cart = Cart::new();
        cart.add_item(&product("p1", 1500), 1).unwrap();
        cart.set_promotional_discount(Some(AppliedCode {
            code_id: "code-1".into(),
            code: "SAVE10".into(),
            discount: PromotionalDiscount::percent(10),
            removes_moq: false,
        }));

        let state = CartState::new(Arc::new(MemoryStore::with_value(cart)));

        let totals = state.with_cart(|c| c.totals());
        assert_eq!(totals.item_count, 1);
        assert_eq!(totals.applied_code.as_deref(), Some("SAVE10"));
    }

    #[test]
    fn test_clear_keeps_code_and_is_saved() {
        let store = Arc::new(MemoryStore::<Cart>::new());
        let state = CartState::new(store.clone());

        state.with_cart_mut(|c| {
            c.add_item(&product("p1", 1000), 1).unwrap();
            c.set_promotional_discount(Some(AppliedCode {
                code_id: "code-1".into(),
                code: "SAVE10".into(),
                discount: PromotionalDiscount::percent(10),
                removes_moq: false,
            }));
        });
        state.with_cart_mut(|c| c.clear());
        state.with_cart_mut(|c| c.clear());

        let saved = store.load().unwrap().unwrap();
        assert!(saved.is_empty());
        assert!(saved.applied_code.is_some());
    }
}

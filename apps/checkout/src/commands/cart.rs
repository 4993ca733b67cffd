//! # Cart Commands
//!
//! Commands for cart manipulation.
//!
//! ## Cart Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Cart Lifecycle                                       │
//! │                                                                         │
//! │  ┌──────────┐     ┌──────────┐     ┌──────────┐     ┌──────────┐       │
//! │  │  Empty   │────►│ In Cart  │────►│ Code     │────►│ Payment  │       │
//! │  │  Cart    │     │          │     │ Applied  │     │ Confirmed│       │
//! │  └──────────┘     └──────────┘     └──────────┘     └──────────┘       │
//! │                        │                 │                │             │
//! │                   add_to_cart       apply_code      confirm_payment     │
//! │                   update_item       (code.rs)       (checkout.rs)       │
//! │                   remove_item                             │             │
//! │                        │                                  │             │
//! │                        ▼                                  ▼             │
//! │                   clear_cart ────────────────────► (back to empty)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Products arrive as [`ProductSnapshot`]s from the catalog; the price on
//! the snapshot is frozen into the cart line.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ApiResult;
use crate::state::CartState;
use lys_core::cart::{Cart, CartItem, CartTotals, ProductSnapshot};

/// Cart response including items and totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartResponse {
    pub items: Vec<CartItem>,
    pub totals: CartTotals,
}

impl From<&Cart> for CartResponse {
    fn from(cart: &Cart) -> Self {
        CartResponse {
            items: cart.items.clone(),
            totals: CartTotals::from(cart),
        }
    }
}

/// Gets the current cart contents.
pub fn get_cart(cart: &CartState) -> CartResponse {
    debug!("get_cart command");
    cart.with_cart(|c| CartResponse::from(c))
}

/// Adds a product to the cart.
///
/// ## Behavior
/// - Same product and variant already in cart: quantities merge
/// - Quantity is clamped to stock (or the 99-unit ceiling) silently
///
/// ## Arguments
/// * `product` - Catalog snapshot of the product
/// * `quantity` - Quantity to add (default: 1)
pub fn add_to_cart(
    cart: &CartState,
    product: &ProductSnapshot,
    quantity: Option<i64>,
) -> ApiResult<CartResponse> {
    let quantity = quantity.unwrap_or(1);
    debug!(product_id = %product.product_id, quantity = %quantity, "add_to_cart command");

    let response = cart.with_cart_mut(|c| {
        c.add_item(product, quantity)?;
        Ok::<CartResponse, lys_core::CoreError>(CartResponse::from(&*c))
    })?;
    Ok(response)
}

/// Updates the quantity of a cart line.
///
/// Quantity below 1 removes the line.
pub fn update_cart_item(cart: &CartState, item_id: &str, quantity: i64) -> ApiResult<CartResponse> {
    debug!(item_id = %item_id, quantity = %quantity, "update_cart_item command");

    let response = cart.with_cart_mut(|c| {
        c.update_quantity(item_id, quantity)?;
        Ok::<CartResponse, lys_core::CoreError>(CartResponse::from(&*c))
    })?;
    Ok(response)
}

/// Removes a line from the cart.
pub fn remove_from_cart(cart: &CartState, item_id: &str) -> ApiResult<CartResponse> {
    debug!(item_id = %item_id, "remove_from_cart command");

    let response = cart.with_cart_mut(|c| {
        c.remove_item(item_id)?;
        Ok::<CartResponse, lys_core::CoreError>(CartResponse::from(&*c))
    })?;
    Ok(response)
}

/// Clears all items. The applied code, if any, stays.
pub fn clear_cart(cart: &CartState) -> CartResponse {
    debug!("clear_cart command");

    cart.with_cart_mut(|c| {
        c.clear();
        CartResponse::from(&*c)
    })
}

//! # Cart Aggregate
//!
//! Line items plus the single active promotional code, and every total the
//! checkout shows, derived on demand.
//!
//! ## Pricing Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Cart Totals                                      │
//! │                                                                         │
//! │  subtotal   = Σ unit_price × quantity            (VAT-inclusive)        │
//! │  preorder   = Σ unit_price × quantity × p%       (preorder lines only)  │
//! │  promotion  = code discount on GROSS subtotal,                          │
//! │               then capped at subtotal − preorder                        │
//! │  shipping   = shipping(subtotal)                 (always free)          │
//! │  total      = subtotal + shipping − preorder − promotion   (≥ 0)        │
//! │  tax        = vat_portion(subtotal − preorder − promotion)              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing is cached: totals are recomputed from the items every time, so
//! they can never drift from the lines they describe.
//!
//! ## Quantity Clamping
//! Quantities are silently clamped to known stock, or to
//! [`MAX_ITEM_QUANTITY`] when stock is unknown. Clamping is not an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::{clamp_discount, shipping, vat_portion, Money};
use crate::types::PromotionalDiscount;
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY};

// =============================================================================
// Product Snapshot
// =============================================================================

/// What the storefront knows about a product at the moment it is added.
///
/// The cart freezes these values into a [`CartItem`]; later price changes
/// do not reach lines already in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ProductSnapshot {
    pub product_id: String,
    pub variant_id: Option<String>,
    pub brand_id: String,
    pub name: String,
    /// VAT-inclusive unit price in pence.
    pub unit_price_cents: i64,
    pub is_preorder: bool,
    /// Preorder reduction in basis points (1500 = 15%).
    pub preorder_discount_bps: Option<u32>,
    /// Units available, when the storefront knows.
    pub stock: Option<i64>,
}

impl ProductSnapshot {
    /// In-stock product without variant, preorder terms or stock figure.
    pub fn new(
        product_id: impl Into<String>,
        brand_id: impl Into<String>,
        name: impl Into<String>,
        unit_price_cents: i64,
    ) -> Self {
        ProductSnapshot {
            product_id: product_id.into(),
            variant_id: None,
            brand_id: brand_id.into(),
            name: name.into(),
            unit_price_cents,
            is_preorder: false,
            preorder_discount_bps: None,
            stock: None,
        }
    }

    pub fn with_variant(mut self, variant_id: impl Into<String>) -> Self {
        self.variant_id = Some(variant_id.into());
        self
    }

    pub fn with_stock(mut self, stock: i64) -> Self {
        self.stock = Some(stock);
        self
    }

    pub fn preorder(mut self, discount_bps: Option<u32>) -> Self {
        self.is_preorder = true;
        self.preorder_discount_bps = discount_bps;
        self
    }
}

// =============================================================================
// Cart Item
// =============================================================================

/// One line of the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    /// Line id (UUID v4), stable across quantity changes.
    pub id: String,
    pub product_id: String,
    pub variant_id: Option<String>,
    pub brand_id: String,
    pub name: String,
    pub unit_price_cents: i64,
    pub quantity: i64,
    pub is_preorder: bool,
    pub preorder_discount_bps: Option<u32>,
    pub stock: Option<i64>,
    #[ts(as = "String")]
    pub added_at: DateTime<Utc>,
}

impl CartItem {
    fn from_snapshot(product: &ProductSnapshot, quantity: i64) -> Self {
        CartItem {
            id: Uuid::new_v4().to_string(),
            product_id: product.product_id.clone(),
            variant_id: product.variant_id.clone(),
            brand_id: product.brand_id.clone(),
            name: product.name.clone(),
            unit_price_cents: product.unit_price_cents,
            quantity: clamp_quantity(quantity, product.stock),
            is_preorder: product.is_preorder,
            preorder_discount_bps: product.preorder_discount_bps.map(|bps| bps.min(10000)),
            stock: product.stock,
            added_at: Utc::now(),
        }
    }

    fn matches(&self, product: &ProductSnapshot) -> bool {
        self.product_id == product.product_id && self.variant_id == product.variant_id
    }

    /// Unit price × quantity.
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.unit_price_cents).multiply_quantity(self.quantity)
    }

    /// Preorder reduction for this line; zero for in-stock lines.
    pub fn preorder_discount(&self) -> Money {
        match (self.is_preorder, self.preorder_discount_bps) {
            (true, Some(bps)) => self.line_total().percentage(bps),
            _ => Money::zero(),
        }
    }
}

/// Clamps a requested quantity to stock when stock is known and positive,
/// otherwise to [`MAX_ITEM_QUANTITY`].
pub fn clamp_quantity(quantity: i64, stock: Option<i64>) -> i64 {
    let ceiling = match stock {
        Some(n) if n > 0 => n,
        _ => MAX_ITEM_QUANTITY,
    };
    quantity.min(ceiling)
}

// =============================================================================
// Applied Code
// =============================================================================

/// The promotional code currently attached to the cart.
///
/// Set only after the code validation engine accepted the code; the cart
/// itself never validates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct AppliedCode {
    pub code_id: String,
    pub code: String,
    pub discount: PromotionalDiscount,
    pub removes_moq: bool,
}

// =============================================================================
// Cart
// =============================================================================

/// The shopping cart.
///
/// ## Invariants
/// - Lines are unique by product + variant (adding again merges)
/// - Every line has quantity ≥ 1
/// - At most [`MAX_CART_ITEMS`] lines
/// - At most one applied code; applying another replaces it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub items: Vec<CartItem>,
    pub applied_code: Option<AppliedCode>,
    #[ts(as = "String")]
    pub last_updated: DateTime<Utc>,
}

impl Default for Cart {
    fn default() -> Self {
        Self::new()
    }
}

impl Cart {
    /// Creates a new empty cart.
    pub fn new() -> Self {
        Cart {
            items: Vec::new(),
            applied_code: None,
            last_updated: Utc::now(),
        }
    }

    fn touch(&mut self) {
        self.last_updated = Utc::now();
    }

    /// Adds a product, merging with an existing line for the same product
    /// and variant (quantities summed, then clamped).
    ///
    /// ## Errors
    /// - `ValidationError::OutOfRange` when `quantity < 1`
    /// - `CoreError::CartTooLarge` when a new line would exceed the limit
    pub fn add_item(&mut self, product: &ProductSnapshot, quantity: i64) -> CoreResult<()> {
        if quantity < 1 {
            return Err(ValidationError::OutOfRange {
                field: "quantity".to_string(),
                min: 1,
                max: MAX_ITEM_QUANTITY,
            }
            .into());
        }

        if let Some(item) = self.items.iter_mut().find(|i| i.matches(product)) {
            // Refresh stock: the newest snapshot is the best figure we have
            item.stock = product.stock;
            item.quantity = clamp_quantity(item.quantity.saturating_add(quantity), item.stock);
            self.touch();
            return Ok(());
        }

        if self.items.len() >= MAX_CART_ITEMS {
            return Err(CoreError::CartTooLarge { max: MAX_CART_ITEMS });
        }

        self.items.push(CartItem::from_snapshot(product, quantity));
        self.touch();
        Ok(())
    }

    /// Sets a line's quantity. Anything below 1 removes the line.
    pub fn update_quantity(&mut self, item_id: &str, quantity: i64) -> CoreResult<()> {
        if quantity < 1 {
            return self.remove_item(item_id);
        }

        let item = self
            .items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or_else(|| CoreError::CartItemNotFound(item_id.to_string()))?;
        item.quantity = clamp_quantity(quantity, item.stock);
        self.touch();
        Ok(())
    }

    /// Removes a line by id.
    pub fn remove_item(&mut self, item_id: &str) -> CoreResult<()> {
        let initial_len = self.items.len();
        self.items.retain(|i| i.id != item_id);

        if self.items.len() == initial_len {
            return Err(CoreError::CartItemNotFound(item_id.to_string()));
        }
        self.touch();
        Ok(())
    }

    /// Replaces the applied code. `None` removes it. Never stacks.
    pub fn set_promotional_discount(&mut self, applied: Option<AppliedCode>) {
        self.applied_code = applied;
        self.touch();
    }

    /// Drops the applied code, keeping the items.
    pub fn clear_promotion(&mut self) {
        self.set_promotional_discount(None);
    }

    /// Empties the items. The applied code survives; calling twice is the
    /// same as calling once.
    pub fn clear(&mut self) {
        self.items.clear();
        self.touch();
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn total_quantity(&self) -> i64 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    pub fn has_preorder_item(&self) -> bool {
        self.items.iter().any(|i| i.is_preorder)
    }

    /// Product ids in the cart, for code conditions.
    pub fn product_ids(&self) -> Vec<String> {
        self.items.iter().map(|i| i.product_id.clone()).collect()
    }

    /// Distinct brand ids in the cart, for code conditions.
    pub fn brand_ids(&self) -> Vec<String> {
        let mut brands: Vec<String> = Vec::new();
        for item in &self.items {
            if !brands.contains(&item.brand_id) {
                brands.push(item.brand_id.clone());
            }
        }
        brands
    }

    // -------------------------------------------------------------------------
    // Derived totals
    // -------------------------------------------------------------------------

    pub fn subtotal(&self) -> Money {
        self.items.iter().map(CartItem::line_total).sum()
    }

    pub fn preorder_discount(&self) -> Money {
        let preorder: Money = self.items.iter().map(CartItem::preorder_discount).sum();
        clamp_discount(preorder, self.subtotal())
    }

    /// Discount from the applied code.
    ///
    /// Percentages are taken of the gross subtotal. The result is capped so
    /// preorder + promotional never exceeds the subtotal.
    pub fn promotional_discount(&self) -> Money {
        let subtotal = self.subtotal();
        let raw = match &self.applied_code {
            Some(applied) => applied.discount.amount_for(subtotal),
            None => Money::zero(),
        };
        clamp_discount(raw, subtotal - self.preorder_discount())
    }

    pub fn shipping(&self) -> Money {
        shipping(self.subtotal())
    }

    /// Amount the VAT is extracted from: subtotal less both discounts.
    fn taxable(&self) -> Money {
        (self.subtotal() - self.preorder_discount() - self.promotional_discount()).non_negative()
    }

    /// VAT contained in the discounted goods total.
    pub fn tax(&self) -> Money {
        // taxable() is never negative, so vat_portion cannot reject it
        vat_portion(self.taxable()).unwrap_or_default()
    }

    pub fn total(&self) -> Money {
        (self.subtotal() + self.shipping() - self.preorder_discount() - self.promotional_discount())
            .non_negative()
    }

    pub fn totals(&self) -> CartTotals {
        CartTotals::from(self)
    }
}

// =============================================================================
// Cart Totals
// =============================================================================

/// Cart totals summary for API responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CartTotals {
    pub item_count: usize,
    pub total_quantity: i64,
    pub subtotal_cents: i64,
    pub preorder_discount_cents: i64,
    pub promotional_discount_cents: i64,
    pub shipping_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub has_preorder_item: bool,
    pub applied_code: Option<String>,
}

impl From<&Cart> for CartTotals {
    fn from(cart: &Cart) -> Self {
        CartTotals {
            item_count: cart.item_count(),
            total_quantity: cart.total_quantity(),
            subtotal_cents: cart.subtotal().cents(),
            preorder_discount_cents: cart.preorder_discount().cents(),
            promotional_discount_cents: cart.promotional_discount().cents(),
            shipping_cents: cart.shipping().cents(),
            tax_cents: cart.tax().cents(),
            total_cents: cart.total().cents(),
            has_preorder_item: cart.has_preorder_item(),
            applied_code: cart.applied_code.as_ref().map(|a| a.code.clone()),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: &str, price_cents: i64) -> ProductSnapshot {
        ProductSnapshot::new(id, "brand-1", format!("Product {}", id), price_cents)
    }

    fn applied(code: &str, discount: PromotionalDiscount) -> AppliedCode {
        AppliedCode {
            code_id: format!("id-{}", code),
            code: code.to_string(),
            discount,
            removes_moq: false,
        }
    }

    #[test]
    fn test_scenario_no_discount() {
        let mut cart = Cart::new();
        cart.add_item(&product("1", 12000), 1).unwrap();

        let totals = cart.totals();
        assert_eq!(totals.subtotal_cents, 12000);
        assert_eq!(totals.tax_cents, 2000);
        assert_eq!(totals.total_cents, 12000);
        assert_eq!(totals.shipping_cents, 0);
    }

    #[test]
    fn test_scenario_percentage_code() {
        let mut cart = Cart::new();
        cart.add_item(&product("1", 10000), 1).unwrap();
        cart.set_promotional_discount(Some(applied("TEN", PromotionalDiscount::percent(10))));

        let totals = cart.totals();
        assert_eq!(totals.promotional_discount_cents, 1000);
        assert_eq!(totals.tax_cents, 1500);
        assert_eq!(totals.total_cents, 9000);
    }

    #[test]
    fn test_scenario_fixed_code_larger_than_subtotal() {
        let mut cart = Cart::new();
        cart.add_item(&product("1", 5000), 1).unwrap();
        cart.set_promotional_discount(Some(applied("EIGHTY", PromotionalDiscount::fixed(8000))));

        let totals = cart.totals();
        assert_eq!(totals.promotional_discount_cents, 5000);
        assert_eq!(totals.total_cents, 0);
        assert_eq!(totals.tax_cents, 0);
    }

    #[test]
    fn test_combined_discounts_never_exceed_subtotal() {
        let mut cart = Cart::new();
        cart.add_item(&product("1", 10000).preorder(Some(5000)), 1).unwrap();
        cart.set_promotional_discount(Some(applied("BIG", PromotionalDiscount::percent(80))));

        // Preorder takes £50, promo would take £80 of gross but only £50 is left
        assert_eq!(cart.preorder_discount().cents(), 5000);
        assert_eq!(cart.promotional_discount().cents(), 5000);
        assert_eq!(cart.total(), Money::zero());
        assert!(!cart.tax().is_negative());
    }

    #[test]
    fn test_preorder_discount() {
        let mut cart = Cart::new();
        cart.add_item(&product("1", 2000).preorder(Some(1000)), 3).unwrap();
        cart.add_item(&product("2", 1000), 1).unwrap();

        assert!(cart.has_preorder_item());
        assert_eq!(cart.subtotal().cents(), 7000);
        assert_eq!(cart.preorder_discount().cents(), 600);
        assert_eq!(cart.total().cents(), 6400);
    }

    #[test]
    fn test_preorder_without_percentage_has_no_discount() {
        let mut cart = Cart::new();
        cart.add_item(&product("1", 2000).preorder(None), 1).unwrap();
        assert!(cart.has_preorder_item());
        assert_eq!(cart.preorder_discount(), Money::zero());
    }

    #[test]
    fn test_second_code_replaces_first() {
        let mut cart = Cart::new();
        cart.add_item(&product("1", 10000), 1).unwrap();
        cart.set_promotional_discount(Some(applied("TEN", PromotionalDiscount::percent(10))));
        cart.set_promotional_discount(Some(applied("FIVER", PromotionalDiscount::fixed(500))));

        assert_eq!(cart.applied_code.as_ref().unwrap().code, "FIVER");
        assert_eq!(cart.promotional_discount().cents(), 500);
    }

    #[test]
    fn test_add_same_product_merges() {
        let mut cart = Cart::new();
        let lamp = product("1", 999);
        cart.add_item(&lamp, 2).unwrap();
        cart.add_item(&lamp, 3).unwrap();

        assert_eq!(cart.item_count(), 1);
        assert_eq!(cart.total_quantity(), 5);
    }

    #[test]
    fn test_variants_are_separate_lines() {
        let mut cart = Cart::new();
        cart.add_item(&product("1", 999).with_variant("red"), 1).unwrap();
        cart.add_item(&product("1", 999).with_variant("blue"), 1).unwrap();
        assert_eq!(cart.item_count(), 2);
    }

    #[test]
    fn test_quantity_clamped_to_stock() {
        let mut cart = Cart::new();
        let scarce = product("1", 500).with_stock(3);
        cart.add_item(&scarce, 2).unwrap();
        cart.add_item(&scarce, 5).unwrap();
        assert_eq!(cart.total_quantity(), 3);
    }

    #[test]
    fn test_quantity_clamped_to_ceiling_without_stock() {
        let mut cart = Cart::new();
        cart.add_item(&product("1", 100), 150).unwrap();
        assert_eq!(cart.total_quantity(), MAX_ITEM_QUANTITY);

        // Zero stock is treated as unknown
        assert_eq!(clamp_quantity(120, Some(0)), MAX_ITEM_QUANTITY);
    }

    #[test]
    fn test_update_quantity_below_one_removes() {
        let mut cart = Cart::new();
        cart.add_item(&product("1", 100), 2).unwrap();
        let id = cart.items[0].id.clone();

        cart.update_quantity(&id, 4).unwrap();
        assert_eq!(cart.total_quantity(), 4);

        cart.update_quantity(&id, 0).unwrap();
        assert!(cart.is_empty());
    }

    #[test]
    fn test_update_unknown_item_fails() {
        let mut cart = Cart::new();
        let result = cart.update_quantity("missing", 2);
        assert!(matches!(result, Err(CoreError::CartItemNotFound(_))));
    }

    #[test]
    fn test_add_rejects_non_positive_quantity() {
        let mut cart = Cart::new();
        assert!(matches!(
            cart.add_item(&product("1", 100), 0),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_cart_too_large() {
        let mut cart = Cart::new();
        for i in 0..MAX_CART_ITEMS {
            cart.add_item(&product(&i.to_string(), 100), 1).unwrap();
        }
        let result = cart.add_item(&product("overflow", 100), 1);
        assert!(matches!(result, Err(CoreError::CartTooLarge { .. })));
    }

    #[test]
    fn test_clear_is_idempotent_and_keeps_code() {
        let mut cart = Cart::new();
        cart.add_item(&product("1", 1000), 1).unwrap();
        cart.set_promotional_discount(Some(applied("TEN", PromotionalDiscount::percent(10))));

        cart.clear();
        let once = (cart.items.clone(), cart.applied_code.clone());
        cart.clear();

        assert!(cart.is_empty());
        assert_eq!((cart.items.clone(), cart.applied_code.clone()), once);
        assert_eq!(cart.applied_code.as_ref().unwrap().code, "TEN");

        cart.clear_promotion();
        assert!(cart.applied_code.is_none());
    }

    #[test]
    fn test_brand_ids_are_distinct() {
        let mut cart = Cart::new();
        cart.add_item(&ProductSnapshot::new("1", "acme", "A", 100), 1).unwrap();
        cart.add_item(&ProductSnapshot::new("2", "acme", "B", 100), 1).unwrap();
        cart.add_item(&ProductSnapshot::new("3", "zeta", "C", 100), 1).unwrap();
        assert_eq!(cart.brand_ids(), vec!["acme".to_string(), "zeta".to_string()]);
    }
}

//! # Domain Types
//!
//! Core domain types shared by the pricing, code and attribution modules.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │      Code       │   │   UsageRecord   │   │ TrackingRecord  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  code_id (FK)   │   │  session_id     │       │
//! │  │  code (UPPER)   │   │  customer_id?   │   │  code_id (FK)   │       │
//! │  │  discount       │   │  order_id       │   │  stage          │       │
//! │  │  commission?    │   │  order_value    │   │  order_value?   │       │
//! │  │  limits, window │   │  discount       │   │  commission?    │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────────┐ ┌─────────────────┐ ┌─────────────────┐       │
//! │  │ PromotionalDiscount │ │ CommissionTerms │ │   FunnelStage   │       │
//! │  │  None               │ │  Percentage     │ │  Clicked        │       │
//! │  │  Percentage { bps } │ │  Fixed          │ │  AddedToCart    │       │
//! │  │  Fixed { cents }    │ └─────────────────┘ │  Purchased      │       │
//! │  └─────────────────────┘                     │  Refunded       │       │
//! │                                              └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! A code has a UUID `id` used for relations and a human `code` string
//! (canonical upper-case) used for lookup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// 1 basis point = 0.01%, so UK standard VAT (20%) is 2000 bps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

// =============================================================================
// Promotional Discount
// =============================================================================

/// 100%. Neither a discount nor a commission may take more than the order.
pub const MAX_PERCENTAGE_BPS: u32 = 10_000;

fn check_bps(field: &str, bps: u32) -> Result<(), ValidationError> {
    if bps > MAX_PERCENTAGE_BPS {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_PERCENTAGE_BPS as i64,
        });
    }
    Ok(())
}

fn check_cents(field: &str, cents: i64) -> Result<(), ValidationError> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }
    Ok(())
}

/// The customer-facing discount a code grants.
///
/// ## Why a Tagged Enum?
/// There is exactly one way to say "no discount": `None`. A `Fixed` discount
/// of zero pence is a real (if useless) discount and is kept distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PromotionalDiscount {
    #[default]
    None,
    /// Share of the order value in basis points (1000 = 10%).
    Percentage { bps: u32 },
    /// Flat amount in pence, capped at the order value when applied.
    Fixed { cents: i64 },
}

impl PromotionalDiscount {
    /// Percentage discount from whole percent (10 → 10%).
    pub const fn percent(pct: u32) -> Self {
        PromotionalDiscount::Percentage { bps: pct * 100 }
    }

    /// Fixed discount in pence.
    pub const fn fixed(cents: i64) -> Self {
        PromotionalDiscount::Fixed { cents }
    }

    pub const fn is_none(&self) -> bool {
        matches!(self, PromotionalDiscount::None)
    }

    /// Discount this term grants against `base`.
    ///
    /// Percentages are taken of `base`; fixed amounts are capped at `base`.
    pub fn amount_for(&self, base: Money) -> Money {
        let base = base.non_negative();
        match *self {
            PromotionalDiscount::None => Money::zero(),
            PromotionalDiscount::Percentage { bps } => base.percentage(bps.min(MAX_PERCENTAGE_BPS)),
            PromotionalDiscount::Fixed { cents } => Money::from_cents(cents).min(base).non_negative(),
        }
    }

    /// Rejects percentages above 100% and negative fixed amounts.
    pub fn check(&self) -> Result<(), ValidationError> {
        match *self {
            PromotionalDiscount::None => Ok(()),
            PromotionalDiscount::Percentage { bps } => check_bps("discount", bps),
            PromotionalDiscount::Fixed { cents } => check_cents("discount", cents),
        }
    }

    /// Storage discriminator (`none`, `percentage`, `fixed`).
    pub const fn type_name(&self) -> &'static str {
        match self {
            PromotionalDiscount::None => "none",
            PromotionalDiscount::Percentage { .. } => "percentage",
            PromotionalDiscount::Fixed { .. } => "fixed",
        }
    }

    /// Raw stored value: bps for percentages, pence for fixed, 0 for none.
    pub const fn raw_value(&self) -> i64 {
        match *self {
            PromotionalDiscount::None => 0,
            PromotionalDiscount::Percentage { bps } => bps as i64,
            PromotionalDiscount::Fixed { cents } => cents,
        }
    }

    /// Rebuilds a discount from its storage discriminator and raw value.
    /// `None` if the pair does not describe a discount [`Self::check`] accepts.
    pub fn from_parts(type_name: &str, value: i64) -> Option<Self> {
        let discount = match type_name {
            "none" => PromotionalDiscount::None,
            "percentage" => PromotionalDiscount::Percentage {
                bps: u32::try_from(value).ok()?,
            },
            "fixed" => PromotionalDiscount::Fixed { cents: value },
            _ => return None,
        };
        discount.check().ok().map(|()| discount)
    }
}

// =============================================================================
// Commission Terms
// =============================================================================

/// What the code's owner earns per attributed order.
///
/// Independent of the customer-facing discount: a code may give customers
/// 10% off while paying its owner a flat £5.00 per order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommissionTerms {
    Percentage { bps: u32 },
    Fixed { cents: i64 },
}

impl CommissionTerms {
    pub const fn type_name(&self) -> &'static str {
        match self {
            CommissionTerms::Percentage { .. } => "percentage",
            CommissionTerms::Fixed { .. } => "fixed",
        }
    }

    pub const fn raw_value(&self) -> i64 {
        match *self {
            CommissionTerms::Percentage { bps } => bps as i64,
            CommissionTerms::Fixed { cents } => cents,
        }
    }

    /// Rejects percentages above 100% and negative fixed amounts.
    pub fn check(&self) -> Result<(), ValidationError> {
        match *self {
            CommissionTerms::Percentage { bps } => check_bps("commission", bps),
            CommissionTerms::Fixed { cents } => check_cents("commission", cents),
        }
    }

    pub fn from_parts(type_name: &str, value: i64) -> Option<Self> {
        let terms = match type_name {
            "percentage" => CommissionTerms::Percentage {
                bps: u32::try_from(value).ok()?,
            },
            "fixed" => CommissionTerms::Fixed { cents: value },
            _ => return None,
        };
        terms.check().ok().map(|()| terms)
    }
}

// =============================================================================
// Code Kind
// =============================================================================

/// Marketing category of a code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CodeKind {
    #[default]
    General,
    Affiliate,
    Seasonal,
    Vip,
    Promotional,
    /// B2B code that waives minimum order quantities.
    NoMoq,
}

// =============================================================================
// Code
// =============================================================================

/// Restrictions a code places on the order it is applied to.
///
/// Empty product/brand lists mean "no restriction".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(default, rename_all = "camelCase")]
pub struct CodeConditions {
    pub min_order_value_cents: Option<i64>,
    pub new_customers_only: bool,
    pub specific_products: Vec<String>,
    pub specific_brands: Vec<String>,
}

/// A promotional code: a customer discount, optionally with an owner who
/// earns commission on orders placed with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Code {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Canonical upper-case code string, e.g. `WELCOME10`.
    pub code: String,

    /// Friendly name for administrators.
    pub name: String,

    pub kind: CodeKind,

    /// Customer-facing discount.
    pub discount: PromotionalDiscount,

    /// Owner commission; `None` for codes nobody is paid for.
    pub commission: Option<CommissionTerms>,

    #[ts(as = "String")]
    pub valid_from: DateTime<Utc>,

    #[ts(as = "Option<String>")]
    pub valid_until: Option<DateTime<Utc>>,

    pub max_uses: Option<i64>,
    pub max_uses_per_customer: Option<i64>,

    /// Redemptions so far. Only the usage ledger increments this.
    pub current_uses: i64,

    pub conditions: CodeConditions,

    /// Waives MOQ requirements on B2B orders.
    pub removes_moq: bool,

    /// Soft-delete flag; codes with usage history are never removed.
    pub active: bool,

    /// Party credited with commission.
    pub owner_id: Option<String>,

    pub total_orders: i64,
    pub total_revenue_cents: i64,
    pub total_savings_cents: i64,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Code {
    /// Whether this code is the B2B-only "removes MOQ" type.
    pub fn is_moq_waiver(&self) -> bool {
        self.removes_moq && self.kind == CodeKind::NoMoq
    }

    /// Whether `now` falls inside `[valid_from, valid_until]`.
    pub fn is_within_window(&self, now: DateTime<Utc>) -> bool {
        if now < self.valid_from {
            return false;
        }
        match self.valid_until {
            Some(until) => now <= until,
            None => true,
        }
    }

    /// Whether the global usage cap has been reached.
    pub fn is_exhausted(&self) -> bool {
        matches!(self.max_uses, Some(max) if self.current_uses >= max)
    }
}

/// Canonical form of a code string: trimmed, upper-case.
pub fn canonical_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

// =============================================================================
// Usage Record
// =============================================================================

/// One redemption of a code. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub id: String,
    pub code_id: String,
    pub code: String,
    pub customer_id: Option<String>,
    pub order_id: String,
    pub order_value_cents: i64,
    pub discount_cents: i64,
    #[ts(as = "String")]
    pub used_at: DateTime<Utc>,
}

// =============================================================================
// Funnel Stage
// =============================================================================

/// Where an attributed visitor is in the click → cart → purchase funnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum FunnelStage {
    Clicked,
    AddedToCart,
    Purchased,
    Refunded,
}

impl FunnelStage {
    /// Forward-only transitions. Repeating the current stage is allowed and
    /// treated as a no-op by callers. Only a purchase can be refunded.
    pub fn can_transition_to(&self, next: FunnelStage) -> bool {
        match next {
            FunnelStage::Refunded => matches!(self, FunnelStage::Purchased | FunnelStage::Refunded),
            _ => next >= *self,
        }
    }

    /// `purchased` and `refunded` sessions no longer attribute anything.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FunnelStage::Purchased | FunnelStage::Refunded)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            FunnelStage::Clicked => "clicked",
            FunnelStage::AddedToCart => "added_to_cart",
            FunnelStage::Purchased => "purchased",
            FunnelStage::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for FunnelStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Click Parameters
// =============================================================================

/// Marketing parameters captured with a qualifying click.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(default, rename_all = "camelCase")]
pub struct ClickParams {
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_term: Option<String>,
    pub utm_content: Option<String>,
    pub referrer: Option<String>,
    pub landing_page: String,
}

// =============================================================================
// Tracking Record
// =============================================================================

/// Durable, server-side record of one attributed click and its progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct TrackingRecord {
    pub id: String,
    pub session_id: String,
    pub code_id: String,
    pub code: String,
    pub params: ClickParams,
    pub stage: FunnelStage,
    pub customer_id: Option<String>,
    pub order_id: Option<String>,
    pub order_value_cents: Option<i64>,
    pub commission_cents: Option<i64>,
    #[ts(as = "String")]
    pub clicked_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub added_to_cart_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub purchased_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub refunded_at: Option<DateTime<Utc>>,
}

impl TrackingRecord {
    /// Whether the visitor got at least as far as the cart and the session
    /// still stands. Refunded sessions are excluded.
    pub fn reached_cart(&self) -> bool {
        matches!(self.stage, FunnelStage::AddedToCart | FunnelStage::Purchased)
    }

    /// Whether this click converted into an order that still stands.
    /// Refunded orders count neither as orders nor as revenue.
    pub fn is_purchase(&self) -> bool {
        self.stage == FunnelStage::Purchased
    }
}

// =============================================================================
// Code Owner
// =============================================================================

/// A party credited for orders placed with their code (affiliate, partner).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CodeOwner {
    pub id: String,
    pub name: String,
    pub total_clicks: i64,
    pub total_orders: i64,
    pub total_revenue_cents: i64,
    pub total_commission_cents: i64,
    pub pending_commission_cents: i64,
    pub paid_commission_cents: i64,
    #[ts(as = "Option<String>")]
    pub last_order_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub last_click_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tax_rate_from_bps() {
        let rate = TaxRate::from_bps(2000);
        assert_eq!(rate.bps(), 2000);
        assert!((rate.percentage() - 20.0).abs() < 0.001);
    }

    #[test]
    fn test_discount_amounts() {
        let base = Money::from_cents(10000);
        assert_eq!(PromotionalDiscount::None.amount_for(base), Money::zero());
        assert_eq!(PromotionalDiscount::percent(10).amount_for(base).cents(), 1000);
        assert_eq!(PromotionalDiscount::fixed(2500).amount_for(base).cents(), 2500);
        // Fixed discounts never exceed the base
        assert_eq!(
            PromotionalDiscount::fixed(8000).amount_for(Money::from_cents(5000)).cents(),
            5000
        );
    }

    #[test]
    fn test_none_is_not_fixed_zero() {
        assert!(PromotionalDiscount::None.is_none());
        assert!(!PromotionalDiscount::fixed(0).is_none());
        assert_ne!(PromotionalDiscount::None, PromotionalDiscount::fixed(0));
    }

    #[test]
    fn test_discount_storage_parts() {
        let pct = PromotionalDiscount::percent(15);
        assert_eq!(pct.type_name(), "percentage");
        assert_eq!(
            PromotionalDiscount::from_parts(pct.type_name(), pct.raw_value()),
            Some(pct)
        );
        assert_eq!(PromotionalDiscount::from_parts("bogus", 1), None);
        assert_eq!(PromotionalDiscount::from_parts("percentage", -1), None);
        assert_eq!(PromotionalDiscount::from_parts("percentage", 10_001), None);
        assert_eq!(CommissionTerms::from_parts("percentage", 20_000), None);
        assert_eq!(CommissionTerms::from_parts("fixed", -500), None);
    }

    #[test]
    fn test_percentages_capped_at_whole_order() {
        assert!(PromotionalDiscount::percent(100).check().is_ok());
        assert!(matches!(
            PromotionalDiscount::Percentage { bps: 10_001 }.check(),
            Err(ValidationError::OutOfRange { max: 10_000, .. })
        ));
        assert!(PromotionalDiscount::fixed(-1).check().is_err());
        assert!(CommissionTerms::Percentage { bps: 10_000 }.check().is_ok());
        assert!(CommissionTerms::Percentage { bps: 15_000 }.check().is_err());

        // A discount that slipped past the check still cannot exceed the order
        let base = Money::from_cents(5000);
        assert_eq!(PromotionalDiscount::Percentage { bps: 15_000 }.amount_for(base), base);
    }

    #[test]
    fn test_discount_serde_shape() {
        let json = serde_json::to_string(&PromotionalDiscount::percent(10)).unwrap();
        assert_eq!(json, r#"{"kind":"percentage","bps":1000}"#);
        let none: PromotionalDiscount = serde_json::from_str(r#"{"kind":"none"}"#).unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn test_canonical_code() {
        assert_eq!(canonical_code("  welcome10 "), "WELCOME10");
        assert_eq!(canonical_code("Summer-2024"), "SUMMER-2024");
    }

    #[test]
    fn test_funnel_transitions() {
        use FunnelStage::*;
        assert!(Clicked.can_transition_to(AddedToCart));
        assert!(Clicked.can_transition_to(Purchased));
        assert!(AddedToCart.can_transition_to(AddedToCart));
        assert!(Purchased.can_transition_to(Refunded));
        assert!(!Purchased.can_transition_to(AddedToCart));
        assert!(!Refunded.can_transition_to(Purchased));
        assert!(!Clicked.can_transition_to(Refunded));
        assert!(!AddedToCart.can_transition_to(Refunded));
        assert!(Refunded.can_transition_to(Refunded));
        assert!(Purchased.is_terminal());
        assert!(!AddedToCart.is_terminal());
    }
}

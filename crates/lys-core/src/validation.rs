//! # Code Validation Engine
//!
//! Decides whether a promotional code may be applied to an order and what it
//! is worth. Pure: the caller looks the code up and counts the customer's
//! previous uses, then hands both in with the order context.
//!
//! ## Check Order (first failure wins)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. code exists                        → invalid_code                   │
//! │  2. code active                        → inactive                       │
//! │  3. now ≥ valid_from                   → not_yet_valid                  │
//! │  4. now ≤ valid_until (when set)       → expired                        │
//! │  5. current_uses < max_uses (when set) → usage_limit_reached            │
//! │  6. customer uses < per-customer cap   → customer_limit_reached         │
//! │  7. MOQ-waiver codes on B2B orders     → b2c_not_allowed                │
//! │  8. conditions: min order value, new customers, products, brands        │
//! │                                        → condition_unmet:<which>        │
//! │  9. accepted: discount computed against the order value                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Validation never reserves a use. The usage ledger re-checks the limits
//! atomically when payment is confirmed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{canonical_code, Code, PromotionalDiscount};
use crate::MAX_CODE_LENGTH;

// =============================================================================
// Input Validation
// =============================================================================

/// Checks and canonicalizes a raw code string before lookup.
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most [`MAX_CODE_LENGTH`] characters
/// - Letters, digits, hyphens and underscores only
///
/// ```rust
/// use lys_core::validation::normalize_code;
///
/// assert_eq!(normalize_code(" welcome10 ").unwrap(), "WELCOME10");
/// assert!(normalize_code("").is_err());
/// ```
pub fn normalize_code(raw: &str) -> Result<String, ValidationError> {
    let code = canonical_code(raw);

    if code.is_empty() {
        return Err(ValidationError::Required {
            field: "code".to_string(),
        });
    }

    if code.chars().count() > MAX_CODE_LENGTH {
        return Err(ValidationError::TooLong {
            field: "code".to_string(),
            max: MAX_CODE_LENGTH,
        });
    }

    if !code
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "code".to_string(),
            reason: "only letters, numbers, hyphens, and underscores allowed".to_string(),
        });
    }

    Ok(code)
}

// =============================================================================
// Order Context
// =============================================================================

/// What the validation engine knows about the order a code is applied to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(default, rename_all = "camelCase")]
pub struct ValidationContext {
    pub customer_id: Option<String>,
    /// Order value in pence the discount is computed against.
    pub order_value_cents: i64,
    pub product_ids: Vec<String>,
    pub brand_ids: Vec<String>,
    pub is_new_customer: bool,
    pub is_b2b: bool,
}

// =============================================================================
// Rejection Reasons
// =============================================================================

/// The condition a code's restrictions found unmet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "condition", rename_all = "snake_case")]
pub enum Condition {
    MinOrderValue { min_cents: i64 },
    NewCustomersOnly,
    SpecificProducts,
    SpecificBrands,
}

impl Condition {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Condition::MinOrderValue { .. } => "min_order_value",
            Condition::NewCustomersOnly => "new_customers_only",
            Condition::SpecificProducts => "specific_products",
            Condition::SpecificBrands => "specific_brands",
        }
    }
}

/// Why a code was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectionReason {
    InvalidCode,
    Inactive,
    NotYetValid,
    Expired,
    UsageLimitReached,
    CustomerLimitReached,
    B2cNotAllowed,
    ConditionUnmet(Condition),
}

impl RejectionReason {
    /// Stable machine-readable kind, e.g. `condition_unmet:new_customers_only`.
    pub fn kind(&self) -> String {
        match self {
            RejectionReason::InvalidCode => "invalid_code".to_string(),
            RejectionReason::Inactive => "inactive".to_string(),
            RejectionReason::NotYetValid => "not_yet_valid".to_string(),
            RejectionReason::Expired => "expired".to_string(),
            RejectionReason::UsageLimitReached => "usage_limit_reached".to_string(),
            RejectionReason::CustomerLimitReached => "customer_limit_reached".to_string(),
            RejectionReason::B2cNotAllowed => "b2c_not_allowed".to_string(),
            RejectionReason::ConditionUnmet(c) => format!("condition_unmet:{}", c.as_str()),
        }
    }

    /// Message shown to the shopper.
    pub fn user_message(&self) -> String {
        match self {
            RejectionReason::InvalidCode => "Invalid discount code".to_string(),
            RejectionReason::Inactive => "Discount code is not active".to_string(),
            RejectionReason::NotYetValid => "Discount code is not yet valid".to_string(),
            RejectionReason::Expired => "Discount code has expired".to_string(),
            RejectionReason::UsageLimitReached => "Discount code usage limit reached".to_string(),
            RejectionReason::CustomerLimitReached => {
                "You have already used this discount code".to_string()
            }
            RejectionReason::B2cNotAllowed => {
                "No-MOQ codes are only valid for B2B orders".to_string()
            }
            RejectionReason::ConditionUnmet(Condition::MinOrderValue { min_cents }) => {
                format!("Minimum order value of {} required", Money::from_cents(*min_cents))
            }
            RejectionReason::ConditionUnmet(Condition::NewCustomersOnly) => {
                "This code is only valid for new customers".to_string()
            }
            RejectionReason::ConditionUnmet(Condition::SpecificProducts) => {
                "This code is not valid for these products".to_string()
            }
            RejectionReason::ConditionUnmet(Condition::SpecificBrands) => {
                "This code is not valid for these brands".to_string()
            }
        }
    }
}

// =============================================================================
// Validation Result
// =============================================================================

/// Outcome of validating a code against an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub valid: bool,
    pub code_id: Option<String>,
    pub code: Option<String>,
    pub discount: Option<PromotionalDiscount>,
    pub discount_cents: Option<i64>,
    pub removes_moq: bool,
    pub owner_id: Option<String>,
    pub reason: Option<RejectionReason>,
}

impl ValidationResult {
    pub fn rejected(reason: RejectionReason) -> Self {
        ValidationResult {
            valid: false,
            code_id: None,
            code: None,
            discount: None,
            discount_cents: None,
            removes_moq: false,
            owner_id: None,
            reason: Some(reason),
        }
    }

    fn accepted(code: &Code, discount_cents: Money) -> Self {
        ValidationResult {
            valid: true,
            code_id: Some(code.id.clone()),
            code: Some(code.code.clone()),
            discount: Some(code.discount),
            discount_cents: Some(discount_cents.cents()),
            removes_moq: code.removes_moq,
            owner_id: code.owner_id.clone(),
            reason: None,
        }
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Validates a looked-up code against an order.
///
/// ## Arguments
/// * `code` - Result of the lookup by canonical code (`None` when missing)
/// * `customer_uses` - Usage records this customer already holds for the
///   code; only consulted when `ctx.customer_id` is set
/// * `ctx` - Order context
/// * `now` - Evaluation instant
pub fn validate_code(
    code: Option<&Code>,
    customer_uses: i64,
    ctx: &ValidationContext,
    now: DateTime<Utc>,
) -> ValidationResult {
    match check_code(code, customer_uses, ctx, now) {
        Ok((code, discount)) => ValidationResult::accepted(code, discount),
        Err(reason) => ValidationResult::rejected(reason),
    }
}

fn check_code<'a>(
    code: Option<&'a Code>,
    customer_uses: i64,
    ctx: &ValidationContext,
    now: DateTime<Utc>,
) -> Result<(&'a Code, Money), RejectionReason> {
    let code = code.ok_or(RejectionReason::InvalidCode)?;

    check_redeemable(code, now)?;

    if let (Some(cap), Some(_)) = (code.max_uses_per_customer, &ctx.customer_id) {
        if customer_uses >= cap {
            return Err(RejectionReason::CustomerLimitReached);
        }
    }

    if code.is_moq_waiver() && !ctx.is_b2b {
        return Err(RejectionReason::B2cNotAllowed);
    }

    check_conditions(code, ctx).map_err(RejectionReason::ConditionUnmet)?;

    let order_value = Money::from_cents(ctx.order_value_cents);
    Ok((code, code.discount.amount_for(order_value)))
}

fn check_conditions(code: &Code, ctx: &ValidationContext) -> Result<(), Condition> {
    let conditions = &code.conditions;

    if let Some(min_cents) = conditions.min_order_value_cents {
        if ctx.order_value_cents < min_cents {
            return Err(Condition::MinOrderValue { min_cents });
        }
    }

    if conditions.new_customers_only && !ctx.is_new_customer {
        return Err(Condition::NewCustomersOnly);
    }

    if !conditions.specific_products.is_empty()
        && !ctx
            .product_ids
            .iter()
            .any(|id| conditions.specific_products.contains(id))
    {
        return Err(Condition::SpecificProducts);
    }

    if !conditions.specific_brands.is_empty()
        && !ctx
            .brand_ids
            .iter()
            .any(|id| conditions.specific_brands.contains(id))
    {
        return Err(Condition::SpecificBrands);
    }

    Ok(())
}

/// The order-independent checks: active, inside its window, not exhausted.
///
/// Click tracking uses this on its own, since a click carries no order.
pub fn check_redeemable(code: &Code, now: DateTime<Utc>) -> Result<(), RejectionReason> {
    if !code.active {
        return Err(RejectionReason::Inactive);
    }

    if now < code.valid_from {
        return Err(RejectionReason::NotYetValid);
    }

    if matches!(code.valid_until, Some(until) if now > until) {
        return Err(RejectionReason::Expired);
    }

    if code.is_exhausted() {
        return Err(RejectionReason::UsageLimitReached);
    }

    Ok(())
}

/// Re-evaluates whether a code that was valid still is, ignoring order
/// conditions. Used before auto-applying an attributed code.
pub fn is_redeemable(code: &Code, now: DateTime<Utc>) -> bool {
    check_redeemable(code, now).is_ok()
}

// =============================================================================
// Unit Tests
// =============================================================================

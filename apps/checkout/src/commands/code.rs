//! # Code Commands
//!
//! Validating promotional codes and putting them on the cart.
//!
//! ## Validation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  apply_code("  summer20 ")                                              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  normalize_code        → "SUMMER20"        (malformed → invalid_code)   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  codes().find_by_code  → Option<Code>      (read only)                  │
//! │  usage().count_for_customer                (only with a customer id)    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  lys_core::validation::validate_code       (pure, first failure wins)   │
//! │       │                                                                 │
//! │       ├── rejected ──► ApiError { CODE_EXPIRED, "…has expired" }        │
//! │       └── accepted ──► cart.set_promotional_discount(AppliedCode)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Validation never reserves a use; that happens at payment confirmation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::cart::CartResponse;
use crate::error::{ApiError, ApiResult};
use crate::state::CartState;
use lys_core::cart::AppliedCode;
use lys_core::validation::{self, normalize_code, RejectionReason, ValidationContext, ValidationResult};
use lys_db::Database;

/// Who is checking out; the order half of the context comes from the cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CustomerContext {
    pub customer_id: Option<String>,
    pub is_new_customer: bool,
    pub is_b2b: bool,
}

/// Validates a code against an order.
///
/// Rejections come back as `Ok` with `valid: false` and a reason; only
/// store failures are errors.
pub async fn validate_code(
    db: &Database,
    raw_code: &str,
    ctx: &ValidationContext,
    now: DateTime<Utc>,
) -> ApiResult<ValidationResult> {
    let canonical = match normalize_code(raw_code) {
        Ok(code) => code,
        Err(e) => {
            debug!(error = %e, "Malformed code rejected");
            return Ok(ValidationResult::rejected(RejectionReason::InvalidCode));
        }
    };

    let code = db.codes().find_by_code(&canonical).await?;

    let customer_uses = match (&code, &ctx.customer_id) {
        (Some(code), Some(customer_id)) if code.max_uses_per_customer.is_some() => {
            db.usage().count_for_customer(&code.id, customer_id).await?
        }
        _ => 0,
    };

    let result = validation::validate_code(code.as_ref(), customer_uses, ctx, now);

    match &result.reason {
        Some(reason) => debug!(code = %canonical, reason = %reason.kind(), "Code rejected"),
        None => debug!(code = %canonical, discount = ?result.discount_cents, "Code accepted"),
    }

    Ok(result)
}

/// Builds the validation context for the cart as it stands.
pub fn cart_context(cart: &CartState, customer: &CustomerContext) -> ValidationContext {
    cart.with_cart(|c| ValidationContext {
        customer_id: customer.customer_id.clone(),
        order_value_cents: c.subtotal().cents(),
        product_ids: c.product_ids(),
        brand_ids: c.brand_ids(),
        is_new_customer: customer.is_new_customer,
        is_b2b: customer.is_b2b,
    })
}

/// Validates `raw_code` against the cart and applies it, replacing any code
/// already applied.
///
/// ## Errors
/// The rejection's stable `ErrorCode` and shopper-facing message, e.g.
/// `CONDITION_UNMET` / "This code is only valid for new customers".
pub async fn apply_code(
    db: &Database,
    cart: &CartState,
    raw_code: &str,
    customer: &CustomerContext,
    now: DateTime<Utc>,
) -> ApiResult<CartResponse> {
    debug!(code = %raw_code, "apply_code command");

    let ctx = cart_context(cart, customer);
    let result = validate_code(db, raw_code, &ctx, now).await?;
    let applied = accepted_code(result)?;

    info!(code = %applied.code, "Code applied to cart");

    Ok(cart.with_cart_mut(|c| {
        c.set_promotional_discount(Some(applied));
        CartResponse::from(&*c)
    }))
}

/// Takes the code off the cart.
pub fn remove_code(cart: &CartState) -> CartResponse {
    debug!("remove_code command");
    cart.with_cart_mut(|c| {
        c.clear_promotion();
        CartResponse::from(&*c)
    })
}

/// Turns an accepted result into the cart's applied code.
pub(crate) fn accepted_code(result: ValidationResult) -> ApiResult<AppliedCode> {
    if let Some(reason) = result.reason {
        return Err(ApiError::from(reason));
    }

    match (result.code_id, result.code, result.discount) {
        (Some(code_id), Some(code), Some(discount)) => Ok(AppliedCode {
            code_id,
            code,
            discount,
            removes_moq: result.removes_moq,
        }),
        _ => Err(ApiError::internal("Accepted code is missing its terms")),
    }
}

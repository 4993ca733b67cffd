//! # Checkout Commands
//!
//! Payment confirmation: the one point where a code use is consumed.
//!
//! ## Confirmation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  confirm_payment(order_id, customer)                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  code applied? ──yes──► validate again against the cart as it is now    │
//! │       │                     │                                           │
//! │       │                     ├── rejected ──► code removed from cart,    │
//! │       │                     │               the rejection's error       │
//! │       │                     ▼                                           │
//! │       │                 usage().reserve_use()  ◄── single transaction   │
//! │       │                     │                                           │
//! │       │                     ├── RaceLost ──► code removed from cart,    │
//! │       │                     │               RESERVATION_RACE_LOST       │
//! │       │                     ▼                                           │
//! │       │                 Reserved                                        │
//! │       │                     │                                           │
//! │       │                     ├── session for this code? ──► purchased,   │
//! │       │                     │                              commission,  │
//! │       │                     │                              session      │
//! │       │                     │                              retired      │
//! │       │                     └── owned code, no session ──► commission   │
//! │       ▼                                                                 │
//! │  cart cleared (items and code)                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The cart can change after a code is applied (lines removed, the code's
//! window closing), so the code is checked again before its use is taken.
//!
//! Once the use is reserved the order stands: attribution and commission
//! failures after that point are logged, not returned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::code::{accepted_code, cart_context, validate_code, CustomerContext};
use super::tracking::{update_funnel_stage, PurchaseInfo};
use crate::error::{ApiError, ApiResult};
use crate::state::{AttributionState, CartState};
use lys_core::cart::{AppliedCode, CartTotals};
use lys_core::commission::commission_for;
use lys_core::validation::RejectionReason;
use lys_core::{FunnelStage, Money};
use lys_db::{Database, NewUsage, Reservation};

/// Payment details from the payment provider's success callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentConfirmation {
    pub order_id: String,
    #[serde(flatten)]
    pub customer: CustomerContext,
}

/// What was confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderConfirmation {
    pub order_id: String,
    pub totals: CartTotals,
    /// Usage record id when a code was redeemed.
    pub usage_id: Option<String>,
    /// Tracking session credited with the order.
    pub attributed_session: Option<String>,
    pub commission_cents: Option<i64>,
}

/// Confirms a paid order: redeems the applied code, credits attribution and
/// empties the cart.
///
/// ## Errors
/// - `CART_ERROR` for an empty cart
/// - the rejection's own code (`CODE_EXPIRED`, `CONDITION_UNMET`, ...) when
///   the applied code no longer holds for this cart; the code is taken off
///   and the items are kept
/// - `RESERVATION_RACE_LOST` when the code hit a limit after it was
///   applied; the code is taken off the cart and nothing is recorded
/// - `STORE_UNAVAILABLE` when the database cannot be reached
pub async fn confirm_payment(
    db: &Database,
    cart: &CartState,
    attribution: &AttributionState,
    payment: &PaymentConfirmation,
    now: DateTime<Utc>,
) -> ApiResult<OrderConfirmation> {
    debug!(order_id = %payment.order_id, "confirm_payment command");

    if cart.with_cart(|c| c.is_empty()) {
        return Err(ApiError::cart("Cart is empty"));
    }

    if let Some(applied) = cart.with_cart(|c| c.applied_code.clone()) {
        let fresh = recheck_code(db, cart, &applied, &payment.customer, now).await?;
        cart.with_cart_mut(|c| c.set_promotional_discount(Some(fresh)));
    }

    let (totals, applied) = cart.with_cart(|c| (c.totals(), c.applied_code.clone()));

    let order_value = Money::from_cents(totals.total_cents);
    let mut confirmation = OrderConfirmation {
        order_id: payment.order_id.clone(),
        totals: totals.clone(),
        usage_id: None,
        attributed_session: None,
        commission_cents: None,
    };

    if let Some(applied) = applied {
        let usage = NewUsage {
            code_id: applied.code_id.clone(),
            customer_id: payment.customer.customer_id.clone(),
            order_id: payment.order_id.clone(),
            order_value,
            discount: Money::from_cents(totals.promotional_discount_cents),
        };

        match db.usage().reserve_use(&usage).await? {
            Reservation::Reserved(record) => {
                confirmation.usage_id = Some(record.id);
            }
            Reservation::RaceLost(lost) => {
                warn!(code = %applied.code, order_id = %payment.order_id, reason = %lost, "Reservation lost");
                cart.with_cart_mut(|c| c.clear_promotion());
                return Err(ApiError::from(lost));
            }
        }

        credit_attribution(db, attribution, &applied, payment, order_value, now, &mut confirmation).await;
    }

    cart.with_cart_mut(|c| {
        c.clear();
        c.clear_promotion();
    });

    info!(
        order_id = %payment.order_id,
        total = totals.total_cents,
        code = ?totals.applied_code,
        "Payment confirmed"
    );

    Ok(confirmation)
}

/// Validates the applied code against the live cart and `now`.
///
/// A rejected code comes off the cart so the shopper sees the full price
/// before paying again.
async fn recheck_code(
    db: &Database,
    cart: &CartState,
    applied: &AppliedCode,
    customer: &CustomerContext,
    now: DateTime<Utc>,
) -> ApiResult<AppliedCode> {
    let ctx = cart_context(cart, customer);
    let result = validate_code(db, &applied.code, &ctx, now).await?;

    // Same string, different code: the original was deleted and recreated
    let reason = match (&result.reason, &result.code_id) {
        (Some(reason), _) => Some(*reason),
        (None, Some(code_id)) if *code_id != applied.code_id => Some(RejectionReason::InvalidCode),
        _ => None,
    };

    if let Some(reason) = reason {
        warn!(code = %applied.code, reason = %reason.kind(), "Applied code no longer valid at payment");
        cart.with_cart_mut(|c| c.clear_promotion());
        return Err(ApiError::from(reason));
    }

    accepted_code(result)
}

/// Credits the order to the click session for this code, or straight to the
/// code's owner when there was no click.
async fn credit_attribution(
    db: &Database,
    attribution: &AttributionState,
    applied: &AppliedCode,
    payment: &PaymentConfirmation,
    order_value: Money,
    now: DateTime<Utc>,
    confirmation: &mut OrderConfirmation,
) {
    let session = attribution
        .current(now)
        .filter(|s| s.code_id == applied.code_id && s.is_active(now));

    if let Some(session) = session {
        let purchase = PurchaseInfo {
            customer_id: payment.customer.customer_id.clone(),
            order_id: payment.order_id.clone(),
            order_value_cents: order_value.cents(),
        };
        match update_funnel_stage(db, attribution, &session.session_id, FunnelStage::Purchased, Some(purchase), now)
            .await
        {
            Ok(record) => {
                confirmation.attributed_session = Some(record.session_id);
                confirmation.commission_cents = record.commission_cents;
            }
            Err(e) => error!(
                session_id = %session.session_id,
                order_id = %payment.order_id,
                error = %e,
                "Failed to attribute purchase"
            ),
        }
        return;
    }

    let code = match db.codes().get_by_id(&applied.code_id).await {
        Ok(Some(code)) => code,
        Ok(None) => return,
        Err(e) => {
            error!(code_id = %applied.code_id, error = %e, "Failed to load code for commission");
            return;
        }
    };
    let Some(owner_id) = code.owner_id.as_deref() else {
        return;
    };

    let commission = commission_for(code.commission, order_value);
    match db.owners().accrue_commission(owner_id, order_value, commission, now).await {
        Ok(()) => confirmation.commission_cents = Some(commission.cents()),
        Err(e) => error!(
            owner_id = %owner_id,
            order_id = %payment.order_id,
            error = %e,
            "Failed to accrue commission"
        ),
    }
}

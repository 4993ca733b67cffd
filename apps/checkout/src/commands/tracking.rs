//! # Attribution Commands
//!
//! Click tracking, funnel updates and per-code stats.
//!
//! ## Funnel
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   ?ref=PARTNER5                                                         │
//! │        │                                                                │
//! │        ▼                                                                │
//! │   track_click ──► clicked ──► added_to_cart ──► purchased ──► refunded  │
//! │        │             │             │               │                    │
//! │        │             └─────────────┴───────────────┘                    │
//! │        │                 update_funnel_stage (forward only,             │
//! │        │                 same stage is a no-op)                         │
//! │        ▼                                                                │
//! │   tracking row + owner click counter          purchased ──► commission  │
//! │   + local session (30 days)                                accrued,     │
//! │                                                            session      │
//! │                                                            retired      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::cart::CartResponse;
use super::code::{accepted_code, cart_context, validate_code, CustomerContext};
use crate::error::{ApiError, ApiResult};
use crate::state::{AttributionState, CartState};
use lys_core::attribution::{decide_click, AttributionSession, ClickDecision};
use lys_core::commission::commission_for;
use lys_core::stats::{AttributionStats, StatsPeriod};
use lys_core::validation::{check_redeemable, normalize_code, RejectionReason};
use lys_core::{ClickParams, CoreError, FunnelStage, Money, TrackingRecord};
use lys_db::{Database, NewClick, PurchaseDetails};

/// Result of [`track_click`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackClickResponse {
    pub session_id: String,
    pub code: String,
    /// `true` when an existing session for the same code was kept.
    pub reused: bool,
}

/// The order a `purchased` transition attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseInfo {
    pub customer_id: Option<String>,
    pub order_id: String,
    pub order_value_cents: i64,
}

/// Records a click on a code link and starts (or keeps) the local session.
///
/// ## Behavior
/// - Same code, session still active: returns the existing session id
/// - Otherwise the code must exist and be redeemable; a new session
///   replaces any stored one
///
/// ## Errors
/// `CODE_NOT_FOUND`, `CODE_INACTIVE`, `CODE_NOT_YET_VALID`, `CODE_EXPIRED`
/// or `GLOBAL_LIMIT_REACHED` when the code cannot be attributed.
pub async fn track_click(
    db: &Database,
    attribution: &AttributionState,
    raw_code: &str,
    params: ClickParams,
    now: DateTime<Utc>,
) -> ApiResult<TrackClickResponse> {
    let canonical = normalize_code(raw_code).map_err(|_| ApiError::from(RejectionReason::InvalidCode))?;
    debug!(code = %canonical, "track_click command");

    let current = attribution.current(now);
    if let ClickDecision::Reuse(session_id) = decide_click(current.as_ref(), &canonical, now) {
        debug!(session_id = %session_id, "Reusing attribution session");
        return Ok(TrackClickResponse {
            session_id,
            code: canonical,
            reused: true,
        });
    }

    let code = db
        .codes()
        .find_by_code(&canonical)
        .await?
        .ok_or(RejectionReason::InvalidCode)?;
    check_redeemable(&code, now)?;

    let session = AttributionSession::start(&code.id, &code.code, params, now);

    db.tracking()
        .insert_click(
            &NewClick {
                session_id: session.session_id.clone(),
                code_id: code.id.clone(),
                code: code.code.clone(),
                params: session.params.clone(),
            },
            now,
        )
        .await?;

    if let Some(owner_id) = &code.owner_id {
        db.owners().increment_clicks(owner_id, now).await?;
    }

    info!(session_id = %session.session_id, code = %code.code, "Attribution session started");

    let response = TrackClickResponse {
        session_id: session.session_id.clone(),
        code: code.code,
        reused: false,
    };
    attribution.replace(session);
    Ok(response)
}

/// The unexpired local session, if any.
pub fn get_active_session(attribution: &AttributionState, now: DateTime<Utc>) -> Option<AttributionSession> {
    attribution.current(now)
}

/// Puts the session's code on the cart when the cart has none and the
/// session is still active.
///
/// A code that no longer validates is left off without error.
pub async fn auto_apply_session_code(
    db: &Database,
    cart: &CartState,
    attribution: &AttributionState,
    customer: &CustomerContext,
    now: DateTime<Utc>,
) -> ApiResult<Option<CartResponse>> {
    let Some(session) = attribution.current(now) else {
        return Ok(None);
    };

    let cart_has_code = cart.with_cart(|c| c.applied_code.is_some());
    if !session.should_auto_apply(cart_has_code, now) {
        return Ok(None);
    }

    let ctx = cart_context(cart, customer);
    let result = validate_code(db, &session.code, &ctx, now).await?;
    let applied = match accepted_code(result) {
        Ok(applied) => applied,
        Err(e) => {
            debug!(code = %session.code, reason = %e.message, "Session code not auto-applied");
            return Ok(None);
        }
    };

    info!(code = %applied.code, session_id = %session.session_id, "Session code auto-applied");

    Ok(Some(cart.with_cart_mut(|c| {
        // Another command may have applied a code while we validated
        if c.applied_code.is_none() {
            c.set_promotional_discount(Some(applied));
        }
        CartResponse::from(&*c)
    })))
}

/// Moves a tracked session forward through the funnel.
///
/// ## Behavior
/// - Same stage as stored: no-op, returns the record
/// - Backward move: `SESSION_ERROR`
/// - `purchased` requires `purchase`; commission is computed from the code's
///   terms and accrued to its owner in the same transaction, and the local
///   session is retired
pub async fn update_funnel_stage(
    db: &Database,
    attribution: &AttributionState,
    session_id: &str,
    stage: FunnelStage,
    purchase: Option<PurchaseInfo>,
    now: DateTime<Utc>,
) -> ApiResult<TrackingRecord> {
    debug!(session_id = %session_id, stage = %stage, "update_funnel_stage command");

    let record = db
        .tracking()
        .get_by_session(session_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Tracking session", session_id))?;

    if record.stage == stage {
        return Ok(record);
    }

    if !record.stage.can_transition_to(stage) {
        return Err(CoreError::InvalidStageTransition {
            session_id: session_id.to_string(),
            from: record.stage,
            to: stage,
        }
        .into());
    }

    let updated = match stage {
        FunnelStage::Purchased => {
            let purchase = purchase.ok_or_else(|| CoreError::MissingOrderDetails("order_id".to_string()))?;
            let code = db
                .codes()
                .get_by_id(&record.code_id)
                .await?
                .ok_or_else(|| ApiError::not_found("Code", &record.code_id))?;

            let order_value = Money::from_cents(purchase.order_value_cents);
            let details = PurchaseDetails {
                customer_id: purchase.customer_id,
                order_id: purchase.order_id,
                order_value,
                commission: commission_for(code.commission, order_value),
            };

            db.tracking()
                .record_purchase(session_id, record.stage, &details, code.owner_id.as_deref(), now)
                .await?
        }
        _ => db.tracking().update_stage(session_id, record.stage, stage, now).await?,
    };

    sync_local_session(attribution, session_id, stage, now);
    Ok(updated)
}

/// Mirrors a durable stage change onto the local session, retiring it once
/// the purchase is recorded.
fn sync_local_session(attribution: &AttributionState, session_id: &str, stage: FunnelStage, now: DateTime<Utc>) {
    let Some(current) = attribution.current(now) else {
        return;
    };
    if current.session_id != session_id {
        return;
    }

    if stage.is_terminal() {
        attribution.retire();
        return;
    }

    if let Some(Err(e)) = attribution.update(|s| s.advance(stage, now)) {
        warn!(error = %e, "Local session out of step with tracking record");
    }
}

/// Attribution stats for one code over `period`.
pub async fn code_stats(
    db: &Database,
    raw_code: &str,
    period: StatsPeriod,
    now: DateTime<Utc>,
) -> ApiResult<AttributionStats> {
    let canonical = normalize_code(raw_code).map_err(|_| ApiError::from(RejectionReason::InvalidCode))?;
    let code = db
        .codes()
        .find_by_code(&canonical)
        .await?
        .ok_or(RejectionReason::InvalidCode)?;

    let records = db
        .tracking()
        .list_for_code_since(&code.id, period.start(now))
        .await?;

    debug!(code = %canonical, records = records.len(), "Computed code stats");
    Ok(AttributionStats::from_records(&records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use chrono::Duration;
    use lys_core::cart::ProductSnapshot;
    use lys_core::{CodeKind, CommissionTerms, PromotionalDiscount};
    use lys_db::{CodeTerms, DbConfig, NewCode};

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    /// Partner code: 5% off, 10% commission. Returns the owner id.
    async fn partner(db: &Database, code: &str) -> String {
        let owner = db.owners().insert("Partner").await.unwrap();
        let mut terms = CodeTerms::new(PromotionalDiscount::percent(5), Utc::now() - Duration::days(60));
        terms.commission = Some(CommissionTerms::Percentage { bps: 1000 });
        db.codes()
            .insert(&NewCode {
                code: code.to_string(),
                name: "Partner link".to_string(),
                kind: CodeKind::Affiliate,
                owner_id: Some(owner.id.clone()),
                terms,
            })
            .await
            .unwrap();
        owner.id
    }

    fn params(referrer: &str) -> ClickParams {
        ClickParams {
            referrer: Some(referrer.to_string()),
            landing_page: "/".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_click_starts_and_reuses_session() {
        let db = db().await;
        let owner_id = partner(&db, "PARTNER5").await;
        let attribution = AttributionState::in_memory(Utc::now());

        let first = track_click(&db, &attribution, "partner5", params("instagram.com"), Utc::now())
            .await
            .unwrap();
        assert!(!first.reused);
        assert_eq!(first.code, "PARTNER5");

        let second = track_click(&db, &attribution, "PARTNER5", params("instagram.com"), Utc::now())
            .await
            .unwrap();
        assert!(second.reused);
        assert_eq!(second.session_id, first.session_id);

        // Only the first click is a new tracking record
        let owner = db.owners().get_by_id(&owner_id).await.unwrap().unwrap();
        assert_eq!(owner.total_clicks, 1);
    }

    #[tokio::test]
    async fn test_click_with_other_code_replaces_session() {
        let db = db().await;
        partner(&db, "PARTNER5").await;
        partner(&db, "OTHER5").await;
        let attribution = AttributionState::in_memory(Utc::now());

        let first = track_click(&db, &attribution, "PARTNER5", params("a.com"), Utc::now())
            .await
            .unwrap();
        let second = track_click(&db, &attribution, "OTHER5", params("b.com"), Utc::now())
            .await
            .unwrap();

        assert_ne!(first.session_id, second.session_id);
        let current = get_active_session(&attribution, Utc::now()).unwrap();
        assert_eq!(current.code, "OTHER5");
    }

    #[tokio::test]
    async fn test_click_on_unknown_or_inactive_code() {
        let db = db().await;
        partner(&db, "PARTNER5").await;
        let attribution = AttributionState::in_memory(Utc::now());

        let err = track_click(&db, &attribution, "GHOST", params("a.com"), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::CodeNotFound);

        let code = db.codes().find_by_code("PARTNER5").await.unwrap().unwrap();
        db.codes().set_active(&code.id, false).await.unwrap();
        let err = track_click(&db, &attribution, "PARTNER5", params("a.com"), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::CodeInactive);
        assert!(get_active_session(&attribution, Utc::now()).is_none());
    }

    #[tokio::test]
    async fn test_session_absent_after_31_days() {
        let db = db().await;
        partner(&db, "PARTNER5").await;
        let clicked_at = Utc::now() - Duration::days(31);
        let attribution = AttributionState::in_memory(clicked_at);
        track_click(&db, &attribution, "PARTNER5", params("a.com"), clicked_at)
            .await
            .unwrap();

        let cart = CartState::in_memory();
        cart.with_cart_mut(|c| c.add_item(&ProductSnapshot::new("p1", "b1", "Lamp", 4000), 1))
            .unwrap();

        let now = Utc::now();
        assert!(get_active_session(&attribution, now).is_none());
        let applied = auto_apply_session_code(&db, &cart, &attribution, &CustomerContext::default(), now)
            .await
            .unwrap();
        assert!(applied.is_none());
        assert!(cart.with_cart(|c| c.applied_code.is_none()));
    }

    #[tokio::test]
    async fn test_auto_apply_only_onto_empty_code_slot() {
        let db = db().await;
        partner(&db, "PARTNER5").await;
        let now = Utc::now();
        let attribution = AttributionState::in_memory(now);
        track_click(&db, &attribution, "PARTNER5", params("a.com"), now).await.unwrap();

        let cart = CartState::in_memory();
        cart.with_cart_mut(|c| c.add_item(&ProductSnapshot::new("p1", "b1", "Lamp", 4000), 1))
            .unwrap();

        let applied = auto_apply_session_code(&db, &cart, &attribution, &CustomerContext::default(), now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(applied.totals.applied_code.as_deref(), Some("PARTNER5"));
        assert_eq!(applied.totals.promotional_discount_cents, 200);

        // Already has a code: nothing to do
        let again = auto_apply_session_code(&db, &cart, &attribution, &CustomerContext::default(), now)
            .await
            .unwrap();
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn test_funnel_to_purchase_accrues_commission() {
        let db = db().await;
        let owner_id = partner(&db, "PARTNER5").await;
        let now = Utc::now();
        let attribution = AttributionState::in_memory(now);
        let click = track_click(&db, &attribution, "PARTNER5", params("a.com"), now).await.unwrap();

        let record = update_funnel_stage(&db, &attribution, &click.session_id, FunnelStage::AddedToCart, None, now)
            .await
            .unwrap();
        assert_eq!(record.stage, FunnelStage::AddedToCart);
        assert_eq!(attribution.current(now).unwrap().stage, FunnelStage::AddedToCart);

        // Re-entering the same stage is a no-op
        update_funnel_stage(&db, &attribution, &click.session_id, FunnelStage::AddedToCart, None, now)
            .await
            .unwrap();

        let record = update_funnel_stage(
            &db,
            &attribution,
            &click.session_id,
            FunnelStage::Purchased,
            Some(PurchaseInfo {
                customer_id: Some("cust-1".into()),
                order_id: "order-1".into(),
                order_value_cents: 12000,
            }),
            now,
        )
        .await
        .unwrap();
        assert_eq!(record.stage, FunnelStage::Purchased);
        assert_eq!(record.commission_cents, Some(1200));
        assert!(attribution.current(now).is_none());

        let owner = db.owners().get_by_id(&owner_id).await.unwrap().unwrap();
        assert_eq!(owner.total_orders, 1);
        assert_eq!(owner.pending_commission_cents, 1200);
    }

    #[tokio::test]
    async fn test_backward_transition_and_missing_order() {
        let db = db().await;
        partner(&db, "PARTNER5").await;
        let now = Utc::now();
        let attribution = AttributionState::in_memory(now);
        let click = track_click(&db, &attribution, "PARTNER5", params("a.com"), now).await.unwrap();

        let err = update_funnel_stage(&db, &attribution, &click.session_id, FunnelStage::Purchased, None, now)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);

        update_funnel_stage(&db, &attribution, &click.session_id, FunnelStage::AddedToCart, None, now)
            .await
            .unwrap();
        let err = update_funnel_stage(&db, &attribution, &click.session_id, FunnelStage::Clicked, None, now)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::SessionError);

        let err = update_funnel_stage(&db, &attribution, "nope", FunnelStage::AddedToCart, None, now)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_refund_needs_a_purchase() {
        let db = db().await;
        partner(&db, "PARTNER5").await;
        let now = Utc::now();
        let attribution = AttributionState::in_memory(now);
        let click = track_click(&db, &attribution, "PARTNER5", params("a.com"), now).await.unwrap();

        let err = update_funnel_stage(&db, &attribution, &click.session_id, FunnelStage::Refunded, None, now)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::SessionError);

        update_funnel_stage(&db, &attribution, &click.session_id, FunnelStage::AddedToCart, None, now)
            .await
            .unwrap();
        let err = update_funnel_stage(&db, &attribution, &click.session_id, FunnelStage::Refunded, None, now)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::SessionError);

        let record = db.tracking().get_by_session(&click.session_id).await.unwrap().unwrap();
        assert_eq!(record.stage, FunnelStage::AddedToCart);
        assert!(record.refunded_at.is_none());
    }

    #[tokio::test]
    async fn test_code_stats() {
        let db = db().await;
        partner(&db, "PARTNER5").await;
        let now = Utc::now();

        for referrer in ["a.com", "a.com", "b.com"] {
            // Fresh local state per shopper
            let attribution = AttributionState::in_memory(now);
            track_click(&db, &attribution, "PARTNER5", params(referrer), now).await.unwrap();
        }

        let stats = code_stats(&db, "partner5", StatsPeriod::Month, now).await.unwrap();
        assert_eq!(stats.total_clicks, 3);
        assert_eq!(stats.orders, 0);
        assert_eq!(stats.conversion_rate, 0.0);
        assert_eq!(stats.top_referrers[0].referrer, "a.com");
        assert_eq!(stats.top_referrers[0].clicks, 2);

        let err = code_stats(&db, "GHOST", StatsPeriod::All, now).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::CodeNotFound);
    }
}

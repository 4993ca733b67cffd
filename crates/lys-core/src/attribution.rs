//! # Attribution Session
//!
//! The client-held record that ties a code click to a later purchase.
//!
//! ## Session Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Attribution Session Lifecycle                       │
//! │                                                                         │
//! │   click ?ref=CODE ──► Clicked ──► AddedToCart ──► Purchased ──► cleared │
//! │         │                                                               │
//! │         ├── same code, session active   → reuse existing session        │
//! │         └── different code / no session → new session replaces old      │
//! │                                                                         │
//! │   created_at + 30 days = expires_at. An expired session reads as        │
//! │   absent and is dropped from storage on read.                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The durable counterpart lives in the tracking table; this type only
//! holds what the shopper's device keeps between visits.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::types::{ClickParams, FunnelStage};
use crate::ATTRIBUTION_TTL_DAYS;

/// Client-held attribution state for one click.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct AttributionSession {
    pub session_id: String,
    pub code: String,
    pub code_id: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub expires_at: DateTime<Utc>,
    pub stage: FunnelStage,
    pub params: ClickParams,
    /// Set once the code has been redeemed on an order.
    #[ts(as = "Option<String>")]
    pub applied_at: Option<DateTime<Utc>>,
}

/// What to do with an incoming click given the stored session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickDecision {
    /// Same code and still active: keep the existing session.
    Reuse(String),
    /// Start a new session, replacing whatever was stored.
    Start,
}

impl AttributionSession {
    /// Starts a fresh session at `Clicked`, expiring after the TTL.
    pub fn start(
        code_id: impl Into<String>,
        code: impl Into<String>,
        params: ClickParams,
        now: DateTime<Utc>,
    ) -> Self {
        AttributionSession {
            session_id: Uuid::new_v4().to_string(),
            code: code.into(),
            code_id: code_id.into(),
            created_at: now,
            expires_at: now + Duration::days(ATTRIBUTION_TTL_DAYS),
            stage: FunnelStage::Clicked,
            params,
            applied_at: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Unexpired, not yet redeemed and not past the purchase stage.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired(now) && self.applied_at.is_none() && !self.stage.is_terminal()
    }

    /// Moves the session forward.
    ///
    /// ## Returns
    /// - `Ok(true)` when the stage changed
    /// - `Ok(false)` when `next` is the current stage
    ///
    /// ## Errors
    /// `CoreError::InvalidStageTransition` for backward moves.
    pub fn advance(&mut self, next: FunnelStage, now: DateTime<Utc>) -> CoreResult<bool> {
        if next == self.stage {
            return Ok(false);
        }
        if !self.stage.can_transition_to(next) {
            return Err(CoreError::InvalidStageTransition {
                session_id: self.session_id.clone(),
                from: self.stage,
                to: next,
            });
        }
        self.stage = next;
        if next == FunnelStage::Purchased {
            self.applied_at = Some(now);
        }
        Ok(true)
    }

    /// Whether the session's code should be put on a cart that has none.
    pub fn should_auto_apply(&self, cart_has_code: bool, now: DateTime<Utc>) -> bool {
        !cart_has_code && self.is_active(now)
    }
}

/// Drops a stored session that has expired.
pub fn restore(stored: Option<AttributionSession>, now: DateTime<Utc>) -> Option<AttributionSession> {
    stored.filter(|s| !s.is_expired(now))
}

/// Decides whether a click for `code` reuses the stored session.
///
/// `code` must already be canonical.
pub fn decide_click(
    current: Option<&AttributionSession>,
    code: &str,
    now: DateTime<Utc>,
) -> ClickDecision {
    match current {
        Some(session) if session.code == code && session.is_active(now) => {
            ClickDecision::Reuse(session.session_id.clone())
        }
        _ => ClickDecision::Start,
    }
}

//! # Error Types
//!
//! Domain-specific error types for lys-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  lys-core errors (this file)                                           │
//! │  ├── CoreError        - Cart and attribution rule violations           │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  lys-db errors (separate crate)                                        │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  lys-checkout errors (app)                                             │
//! │  └── ApiError         - What callers see (serialized)                  │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → ApiError → Storefront             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Code rejections are not errors here: a rejected code is a normal
//! validation outcome (see [`crate::validation::RejectionReason`]).

use thiserror::Error;

use crate::types::FunnelStage;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Cart line id is not in the cart.
    #[error("Cart item not found: {0}")]
    CartItemNotFound(String),

    /// Cart has exceeded maximum allowed lines.
    #[error("Cart cannot have more than {max} items")]
    CartTooLarge { max: usize },

    /// Funnel stages only move forward.
    ///
    /// ## When This Occurs
    /// - A late `added_to_cart` event arrives after `purchased`
    /// - A refund is reported for a session that never purchased
    #[error("Cannot move attribution session {session_id} from {from} to {to}")]
    InvalidStageTransition {
        session_id: String,
        from: FunnelStage,
        to: FunnelStage,
    },

    /// A purchase transition must carry the order it attributes.
    #[error("Purchase attribution for session {0} is missing order details")]
    MissingOrderDetails(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format (e.g., invalid code characters).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

//! # API Error Type
//!
//! Unified error type for checkout commands.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Lys Checkout                           │
//! │                                                                         │
//! │  Storefront                  Rust Backend                               │
//! │  ──────────                  ────────────                               │
//! │                                                                         │
//! │  applyCode('SUMMER20')                                                  │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  Command Function                                                │  │
//! │  │  Result<T, ApiError>                                             │  │
//! │  │         │                                                        │  │
//! │  │         ▼                                                        │  │
//! │  │  Database Error? ─── DbError::Unavailable ──────────┐           │  │
//! │  │         │                                           │           │  │
//! │  │         ▼                                           ▼           │  │
//! │  │  Code rejected? ─── RejectionReason::Expired ─── ApiError ─────►│  │
//! │  │         │                                                        │  │
//! │  │         ▼                                                        │  │
//! │  │  Success ──────────────────────────────────────────────────────►│  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  catch (e) {                                                            │
//! │    // e.code    = "CODE_EXPIRED"                                        │
//! │    // e.message = "This discount code has expired"                      │
//! │  }                                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every code rejection has its own stable `ErrorCode`, and the message is
//! the one the storefront shows the shopper.

use serde::Serialize;
use tracing::error;

use lys_core::validation::RejectionReason;
use lys_core::CoreError;
use lys_db::{DbError, RaceLost};

/// API error returned from checkout commands.
///
/// ## Serialization
/// ```json
/// {
///   "code": "CUSTOMER_LIMIT_REACHED",
///   "message": "You have already used this discount code"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Machine-readable error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message for display
    pub message: String,
}

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ---- Code validation -------------------------------------------------
    /// No code with that string
    CodeNotFound,

    /// Code exists but is switched off
    CodeInactive,

    /// Validity window has not opened
    CodeNotYetValid,

    /// Validity window has closed
    CodeExpired,

    /// `max_uses` exhausted
    GlobalLimitReached,

    /// Customer already used the code `max_uses_per_customer` times
    CustomerLimitReached,

    /// MOQ-waiver code on a consumer order
    B2cNotAllowed,

    /// One of the code's conditions does not hold
    ConditionUnmet,

    // ---- Redemption ------------------------------------------------------
    /// A limit was hit between validation and payment; re-validate
    ReservationRaceLost,

    // ---- Infrastructure --------------------------------------------------
    /// Store unreachable or busy; retryable
    StoreUnavailable,

    /// Resource not found (404)
    NotFound,

    /// Input validation failed (400)
    ValidationError,

    /// Database operation failed (500)
    DatabaseError,

    /// Request conflicts with current state (409)
    Conflict,

    /// Cart operation failed
    CartError,

    /// Attribution session operation failed
    SessionError,

    /// Configuration could not be loaded
    ConfigError,

    /// Internal server error (500)
    Internal,
}

impl ApiError {
    /// Creates a new API error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(resource: &str, id: &str) -> Self {
        ApiError::new(ErrorCode::NotFound, format!("{} not found: {}", resource, id))
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::ValidationError, message)
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Internal, message)
    }

    /// Creates a cart error.
    pub fn cart(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::CartError, message)
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::ConfigError, message)
    }

    /// Whether the caller may retry the same request.
    ///
    /// A lost reservation is retried by re-validating, not by resubmitting.
    pub fn is_retryable(&self) -> bool {
        self.code == ErrorCode::StoreUnavailable
    }
}

/// Maps a validation rejection to its stable code and shopper-facing message.
impl From<RejectionReason> for ApiError {
    fn from(reason: RejectionReason) -> Self {
        let code = match reason {
            RejectionReason::InvalidCode => ErrorCode::CodeNotFound,
            RejectionReason::Inactive => ErrorCode::CodeInactive,
            RejectionReason::NotYetValid => ErrorCode::CodeNotYetValid,
            RejectionReason::Expired => ErrorCode::CodeExpired,
            RejectionReason::UsageLimitReached => ErrorCode::GlobalLimitReached,
            RejectionReason::CustomerLimitReached => ErrorCode::CustomerLimitReached,
            RejectionReason::B2cNotAllowed => ErrorCode::B2cNotAllowed,
            RejectionReason::ConditionUnmet(_) => ErrorCode::ConditionUnmet,
        };
        ApiError::new(code, reason.user_message())
    }
}

impl From<RaceLost> for ApiError {
    fn from(lost: RaceLost) -> Self {
        ApiError::new(
            ErrorCode::ReservationRaceLost,
            format!("Discount code could not be redeemed: {}", lost),
        )
    }
}

/// Converts database errors to API errors.
impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Unavailable(reason) => {
                error!(reason = %reason, "Store unavailable");
                ApiError::new(
                    ErrorCode::StoreUnavailable,
                    "Service temporarily unavailable, please try again",
                )
            }
            DbError::NotFound { entity, id } => ApiError::not_found(&entity, &id),
            DbError::UniqueViolation { field, value } => ApiError::new(
                ErrorCode::Conflict,
                format!("{} '{}' already exists", field, value),
            ),
            DbError::Conflict(message) => ApiError::new(ErrorCode::Conflict, message),
            DbError::InvalidTerms(e) => ApiError::validation(e.to_string()),
            DbError::ForeignKeyViolation { message } => {
                error!("Foreign key violation: {}", message);
                ApiError::validation("Invalid reference")
            }
            DbError::CorruptRecord { entity, id, reason } => {
                error!(entity = %entity, id = %id, reason = %reason, "Corrupt record");
                ApiError::new(ErrorCode::DatabaseError, "Stored data is invalid")
            }
            DbError::Migration(e) => {
                error!("Migration failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database migration failed")
            }
            DbError::Query(e) => {
                // Log the actual error but return a generic message
                error!("Database operation failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
        }
    }
}

/// Converts core errors to API errors.
impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::CartItemNotFound(id) => ApiError::not_found("Cart item", &id),
            CoreError::CartTooLarge { max } => {
                ApiError::cart(format!("Cart cannot have more than {} items", max))
            }
            err @ CoreError::InvalidStageTransition { .. } => {
                ApiError::new(ErrorCode::SessionError, err.to_string())
            }
            CoreError::MissingOrderDetails(field) => {
                ApiError::validation(format!("Purchase is missing {}", field))
            }
            CoreError::Validation(e) => ApiError::validation(e.to_string()),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

/// Result alias for command functions.
pub type ApiResult<T> = Result<T, ApiError>;

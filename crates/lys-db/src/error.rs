//! # Database Error Types
//!
//! What can go wrong between the checkout and its SQLite store.
//!
//! ## Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  The request was wrong             The store could not answer           │
//! │  ─────────────────────             ──────────────────────────           │
//! │  NotFound        unknown code/owner/session                             │
//! │  UniqueViolation code string, (code, order), session id                 │
//! │  ForeignKeyViolation  owner or code id does not exist                   │
//! │  Conflict        guarded UPDATE matched no row                          │
//! │  InvalidTerms    discount/commission out of range                       │
//! │                                    Unavailable  lock or pool timeout,   │
//! │                                                 closed pool, file I/O   │
//! │  CorruptRecord   stored row no longer decodes                           │
//! │  Migration / Query  schema setup or any other SQLite failure            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only `Unavailable` is worth retrying. A lost usage reservation is not an
//! error at all; see [`crate::repository::usage::Reservation`].

use lys_core::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// ## When This Occurs
    /// - Inserting a code string that already exists
    /// - Redeeming the same code twice for one order
    /// - Tracking the same session id twice
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// ## When This Occurs
    /// - Creating a code for an owner that does not exist
    /// - Tracking a click for an unknown code id
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// A guarded update found the row in a state that forbids it.
    ///
    /// ## When This Occurs
    /// - Paying out more commission than is pending
    /// - Lowering `max_uses` below `current_uses`
    /// - A funnel stage changed under a concurrent update
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Code terms rejected before they reach the table.
    #[error("Invalid code terms: {0}")]
    InvalidTerms(#[from] ValidationError),

    #[error("Corrupt {entity} record {id}: {reason}")]
    CorruptRecord {
        entity: String,
        id: String,
        reason: String,
    },

    /// SQLite held its write lock past the busy timeout, the pool had no
    /// free connection, or the file could not be opened.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Query failed: {0}")]
    Query(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn corrupt(entity: impl Into<String>, id: impl Into<String>, reason: impl Into<String>) -> Self {
        DbError::CorruptRecord {
            entity: entity.into(),
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Whether the store itself was unreachable, as opposed to the request
    /// being wrong.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, DbError::Unavailable(_))
    }
}

/// Maps sqlx failures onto the categories above.
///
/// SQLite reports constraint failures only as text, e.g.
/// `UNIQUE constraint failed: usage_records.code_id, usage_records.order_id`,
/// so the message is inspected.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),
            sqlx::Error::Database(db_err) => classify_sqlite_message(db_err.message()),
            sqlx::Error::PoolTimedOut => DbError::Unavailable("no free connection".to_string()),
            sqlx::Error::PoolClosed => DbError::Unavailable("pool is closed".to_string()),
            sqlx::Error::Io(io) => DbError::Unavailable(io.to_string()),
            other => DbError::Query(other.to_string()),
        }
    }
}

fn classify_sqlite_message(msg: &str) -> DbError {
    if let Some(columns) = msg.strip_prefix("UNIQUE constraint failed: ") {
        DbError::duplicate(columns, "unknown")
    } else if msg.contains("FOREIGN KEY constraint failed") {
        DbError::ForeignKeyViolation {
            message: msg.to_string(),
        }
    } else if msg.contains("database is locked") || msg.contains("database is busy") {
        DbError::Unavailable(msg.to_string())
    } else {
        DbError::Query(msg.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::Migration(err.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;

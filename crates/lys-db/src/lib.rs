//! # lys-db: Database Layer for Lys Checkout
//!
//! SQLite persistence for codes, the usage ledger, attribution tracking and
//! owner commission aggregates, using sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Lys Checkout Data Flow                           │
//! │                                                                         │
//! │  Checkout service (confirm_payment)                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     lys-db (THIS CRATE)                         │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐   ┌──────────────┐   │   │
//! │  │   │   Database    │    │  Repositories  │   │  Migrations  │   │   │
//! │  │   │   (pool.rs)   │    │                │   │  (embedded)  │   │   │
//! │  │   │               │    │ CodeRepo       │   │ 001_initial  │   │   │
//! │  │   │ SqlitePool    │◄───│ UsageRepo      │   │ _schema.sql  │   │   │
//! │  │   │ WAL, FKs on   │    │ TrackingRepo   │   │              │   │   │
//! │  │   │               │    │ OwnerRepo      │   │              │   │   │
//! │  │   └───────────────┘    └────────────────┘   └──────────────┘   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Code, usage, tracking and owner repositories
//!
//! ## Usage
//!
//! ```rust,ignore
//! use lys_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/lys.db")).await?;
//!
//! let code = db.codes().find_by_code("WELCOME10").await?;
//! let outcome = db.usage().reserve_use(&usage).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::code::{CodeRepository, CodeTerms, NewCode};
pub use repository::owner::OwnerRepository;
pub use repository::tracking::{NewClick, PurchaseDetails, TrackingRepository};
pub use repository::usage::{NewUsage, RaceLost, Reservation, UsageRepository};

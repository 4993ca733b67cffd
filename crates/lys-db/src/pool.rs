//! # Checkout Store
//!
//! Opens the SQLite file behind codes, the usage ledger, click tracking and
//! owner commission, and hands out repositories over it.
//!
//! ## Who Writes What
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Database::new(DbConfig)  → WAL, foreign keys, busy timeout, migrations │
//! │       │                                                                 │
//! │       ├── codes()    read by every validation; written by admin ops     │
//! │       ├── usage()    reserve_use: the one contended write               │
//! │       ├── tracking() one row per click session                          │
//! │       └── owners()   click counters, commission accrual, payouts        │
//! │                                                                         │
//! │  Readers never wait (WAL). Writers queue on SQLite's single write lock  │
//! │  for up to busy_timeout, then fail as DbError::Unavailable.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The single write lock is what serializes two shoppers racing for the last
//! use of a code: their reservation transactions run one after the other.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::code::CodeRepository;
use crate::repository::owner::OwnerRepository;
use crate::repository::tracking::TrackingRepository;
use crate::repository::usage::UsageRepository;

const IN_MEMORY: &str = ":memory:";

/// Where the store lives and how long writers wait for each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub database_path: PathBuf,

    /// Default: 5
    pub max_connections: u32,

    /// How long a writer waits for SQLite's lock before failing with
    /// `DbError::Unavailable`. Also bounds waiting for a free connection.
    /// Default: 5 seconds
    pub busy_timeout: Duration,
}

impl DbConfig {
    /// File-backed store, created on first open.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            busy_timeout: Duration::from_secs(5),
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Private in-memory store for tests.
    ///
    /// Each connection to `:memory:` is its own database, so the pool is
    /// held to one connection and callers take turns on it.
    pub fn in_memory() -> Self {
        DbConfig::new(IN_MEMORY).max_connections(1)
    }

    fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == IN_MEMORY
    }
}

/// Handle on the checkout store. Clones share one pool.
///
/// ## Usage
/// ```rust,ignore
/// let db = Database::new(DbConfig::new("./lys.db")).await?;
/// let code = db.codes().find_by_code("WELCOME10").await?;
/// let uses = db.usage().count_for_customer(&code_id, "cust-1").await?;
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (or creates) the store and brings its schema up to date.
    ///
    /// ## Errors
    /// - `DbError::Unavailable` when the file cannot be opened
    /// - `DbError::Migration` when the schema cannot be applied
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(path = %config.database_path.display(), "Opening checkout store");

        let options = if config.is_in_memory() {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| DbError::Unavailable(e.to_string()))?
        } else {
            SqliteConnectOptions::new()
                .filename(&config.database_path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
        }
        // Owner and code references are enforced by the schema
        .foreign_keys(true)
        .busy_timeout(config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.busy_timeout)
            .connect_with(options)
            .await
            .map_err(|e| DbError::Unavailable(e.to_string()))?;

        migrations::run_migrations(&pool).await?;

        info!(max_connections = config.max_connections, "Checkout store ready");
        Ok(Database { pool })
    }

    /// Raw pool, for diagnostics such as
    /// [`crate::migrations::migration_status`].
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn codes(&self) -> CodeRepository {
        CodeRepository::new(self.pool.clone())
    }

    pub fn usage(&self) -> UsageRepository {
        UsageRepository::new(self.pool.clone())
    }

    pub fn tracking(&self) -> TrackingRepository {
        TrackingRepository::new(self.pool.clone())
    }

    /// Owner click counters and the commission ledger.
    pub fn owners(&self) -> OwnerRepository {
        OwnerRepository::new(self.pool.clone())
    }

    /// Closes the pool; later repository calls fail as unavailable.
    pub async fn close(&self) {
        info!("Closing checkout store");
        self.pool.close().await;
    }

    /// Whether the store answers a trivial query.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.health_check().await);
    }

    #[test]
    fn test_config_builder() {
        let config = DbConfig::new("/tmp/lys.db")
            .max_connections(10)
            .busy_timeout(Duration::from_secs(1));

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.busy_timeout, Duration::from_secs(1));
        assert!(!config.is_in_memory());
        assert!(DbConfig::in_memory().is_in_memory());
    }

    #[tokio::test]
    async fn test_schema_has_checkout_tables() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE '\\_%' ESCAPE '\\' ORDER BY name",
        )
        .fetch_all(db.pool())
        .await
        .unwrap();

        assert_eq!(tables, ["code_owners", "codes", "tracking", "usage_records"]);
    }

    #[tokio::test]
    async fn test_closed_store_is_unavailable() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.close().await;

        assert!(!db.health_check().await);
        let err = db.codes().find_by_code("WELCOME10").await.unwrap_err();
        assert!(err.is_unavailable());
    }
}

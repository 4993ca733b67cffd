//! # Schema
//!
//! The checkout schema ships inside the binary and is applied whenever the
//! store is opened.
//!
//! ```text
//! code_owners    partner/influencer commission ledger and click counters
//!      ▲
//! codes          terms, conditions, current_uses ≤ max_uses
//!      ▲
//! usage_records  one row per redeemed order, UNIQUE(code_id, order_id)
//! tracking       one row per click session, stage only moves forward
//! ```
//!
//! Files in `migrations/sqlite/` are numbered and never edited once
//! released; schema changes go in a new file.

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Applies any schema files the store has not seen yet.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    MIGRATOR.run(pool).await?;
    info!(migrations = MIGRATOR.migrations.len(), "Checkout schema up to date");
    Ok(())
}

/// Schema files shipped vs applied to this store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationStatus {
    pub shipped: usize,
    pub applied: usize,
}

impl MigrationStatus {
    pub fn is_current(&self) -> bool {
        self.applied >= self.shipped
    }
}

/// Reports how far this store's schema has been brought up.
///
/// Fails if the bookkeeping table is missing, which means the store was
/// never opened through [`crate::Database::new`].
pub async fn migration_status(pool: &SqlitePool) -> DbResult<MigrationStatus> {
    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
        .fetch_one(pool)
        .await?;

    Ok(MigrationStatus {
        shipped: MIGRATOR.migrations.len(),
        applied: usize::try_from(applied).unwrap_or_default(),
    })
}

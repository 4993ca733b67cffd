//! # Usage Repository (Usage Ledger)
//!
//! Redemption records and the atomic "reserve a use" transaction.
//!
//! ## Why Validation Alone Is Not Enough
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  max_uses = 1, current_uses = 0                                         │
//! │                                                                         │
//! │  Checkout A: validate ✓ (0 < 1)      Checkout B: validate ✓ (0 < 1)     │
//! │  Checkout A: pay                     Checkout B: pay                    │
//! │                                                                         │
//! │  Both passed validation. Only ONE may redeem.                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Reservation Transaction
//! ```text
//! BEGIN
//!   UPDATE codes SET current_uses = current_uses + 1, …        ← takes the
//!    WHERE id = ? AND active = 1                                 write lock
//!      AND (max_uses IS NULL OR current_uses < max_uses)
//!   0 rows?  → ROLLBACK, RaceLost(GlobalLimitReached | CodeInactive)
//!
//!   SELECT COUNT(*) FROM usage_records                          ← serialized
//!    WHERE code_id = ? AND customer_id = ?                        behind the
//!   count ≥ cap? → ROLLBACK, RaceLost(CustomerLimitReached)       lock above
//!
//!   INSERT INTO usage_records …
//! COMMIT
//! ```
//!
//! The conditional UPDATE is the first statement, so the transaction holds
//! SQLite's single write lock before it reads anything. A second reservation
//! waits on that lock and then sees the committed counter.

use std::fmt;

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use lys_core::{Money, UsageRecord};

// =============================================================================
// Types
// =============================================================================

/// A redemption about to be recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUsage {
    pub code_id: String,
    pub customer_id: Option<String>,
    pub order_id: String,
    pub order_value: Money,
    pub discount: Money,
}

/// Which limit a reservation lost to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaceLost {
    GlobalLimitReached,
    CustomerLimitReached,
    CodeInactive,
}

impl fmt::Display for RaceLost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RaceLost::GlobalLimitReached => f.write_str("global usage limit reached"),
            RaceLost::CustomerLimitReached => f.write_str("customer usage limit reached"),
            RaceLost::CodeInactive => f.write_str("code is no longer active"),
        }
    }
}

/// Outcome of [`UsageRepository::reserve_use`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reservation {
    Reserved(UsageRecord),
    RaceLost(RaceLost),
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for the usage ledger.
#[derive(Debug, Clone)]
pub struct UsageRepository {
    pool: SqlitePool,
}

impl UsageRepository {
    /// Creates a new UsageRepository.
    pub fn new(pool: SqlitePool) -> Self {
        UsageRepository { pool }
    }

    /// Number of times `customer_id` has redeemed the code.
    pub async fn count_for_customer(&self, code_id: &str, customer_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM usage_records WHERE code_id = ?1 AND customer_id = ?2",
        )
        .bind(code_id)
        .bind(customer_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Redemptions of a code, newest first.
    pub async fn list_for_code(&self, code_id: &str) -> DbResult<Vec<UsageRecord>> {
        let records = sqlx::query_as::<_, UsageRecord>(
            r#"
            SELECT
                id, code_id, code, customer_id, order_id,
                order_value_cents, discount_cents, used_at
            FROM usage_records
            WHERE code_id = ?1
            ORDER BY used_at DESC
            "#,
        )
        .bind(code_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Atomically consumes one use of a code and appends the usage record.
    ///
    /// ## Returns
    /// - `Reservation::Reserved` with the new record
    /// - `Reservation::RaceLost` when a limit was hit between validation and
    ///   now; nothing was written
    ///
    /// ## Errors
    /// - `DbError::NotFound` for an unknown code id
    /// - `DbError::UniqueViolation` when the order already redeemed this code
    pub async fn reserve_use(&self, usage: &NewUsage) -> DbResult<Reservation> {
        let now = Utc::now();

        debug!(
            code_id = %usage.code_id,
            order_id = %usage.order_id,
            "Reserving code use"
        );

        let mut tx = self.pool.begin().await?;

        // Step 1: conditional increment; takes the write lock
        let updated = sqlx::query(
            r#"
            UPDATE codes SET
                current_uses = current_uses + 1,
                total_orders = total_orders + 1,
                total_revenue_cents = total_revenue_cents + ?2,
                total_savings_cents = total_savings_cents + ?3,
                updated_at = ?4
            WHERE id = ?1
              AND active = 1
              AND (max_uses IS NULL OR current_uses < max_uses)
            "#,
        )
        .bind(&usage.code_id)
        .bind(usage.order_value.cents())
        .bind(usage.discount.cents())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let active: Option<bool> = sqlx::query_scalar("SELECT active FROM codes WHERE id = ?1")
                .bind(&usage.code_id)
                .fetch_optional(&mut *tx)
                .await?;
            tx.rollback().await?;

            let lost = match active {
                None => return Err(DbError::not_found("Code", &usage.code_id)),
                Some(false) => RaceLost::CodeInactive,
                Some(true) => RaceLost::GlobalLimitReached,
            };
            warn!(code_id = %usage.code_id, reason = %lost, "Reservation lost");
            return Ok(Reservation::RaceLost(lost));
        }

        // Step 2: per-customer cap, read under the lock
        let (code, per_customer_cap): (String, Option<i64>) =
            sqlx::query_as("SELECT code, max_uses_per_customer FROM codes WHERE id = ?1")
                .bind(&usage.code_id)
                .fetch_one(&mut *tx)
                .await?;

        if let (Some(customer_id), Some(cap)) = (&usage.customer_id, per_customer_cap) {
            let used: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM usage_records WHERE code_id = ?1 AND customer_id = ?2",
            )
            .bind(&usage.code_id)
            .bind(customer_id)
            .fetch_one(&mut *tx)
            .await?;

            if used >= cap {
                tx.rollback().await?;
                warn!(
                    code_id = %usage.code_id,
                    customer_id = %customer_id,
                    used,
                    cap,
                    "Reservation lost to per-customer limit"
                );
                return Ok(Reservation::RaceLost(RaceLost::CustomerLimitReached));
            }
        }

        // Step 3: append the ledger row
        let record = UsageRecord {
            id: Uuid::new_v4().to_string(),
            code_id: usage.code_id.clone(),
            code,
            customer_id: usage.customer_id.clone(),
            order_id: usage.order_id.clone(),
            order_value_cents: usage.order_value.cents(),
            discount_cents: usage.discount.cents(),
            used_at: now,
        };

        let inserted = sqlx::query(
            r#"
            INSERT INTO usage_records (
                id, code_id, code, customer_id, order_id,
                order_value_cents, discount_cents, used_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&record.id)
        .bind(&record.code_id)
        .bind(&record.code)
        .bind(&record.customer_id)
        .bind(&record.order_id)
        .bind(record.order_value_cents)
        .bind(record.discount_cents)
        .bind(record.used_at)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            // Dropping the transaction rolls the increment back
            return Err(match DbError::from(e) {
                DbError::UniqueViolation { .. } => DbError::duplicate("order_id", &usage.order_id),
                other => other,
            });
        }

        tx.commit().await?;

        info!(
            code = %record.code,
            order_id = %record.order_id,
            discount = record.discount_cents,
            "Code use reserved"
        );

        Ok(Reservation::Reserved(record))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::test_support::{db, new_code};
    use lys_core::PromotionalDiscount;

    fn usage(code_id: &str, customer: Option<&str>, order: &str) -> NewUsage {
        NewUsage {
            code_id: code_id.to_string(),
            customer_id: customer.map(str::to_string),
            order_id: order.to_string(),
            order_value: Money::from_cents(10000),
            discount: Money::from_cents(1000),
        }
    }

    async fn code_with_limits(db: &Database, max: Option<i64>, per_customer: Option<i64>) -> String {
        let mut new = new_code("LIMITED", PromotionalDiscount::percent(10));
        new.terms.max_uses = max;
        new.terms.max_uses_per_customer = per_customer;
        db.codes().insert(&new).await.unwrap().id
    }

    #[tokio::test]
    async fn test_reserve_updates_counters_and_ledger() {
        let db = db().await;
        let code_id = code_with_limits(&db, Some(5), None).await;

        let outcome = db
            .usage()
            .reserve_use(&usage(&code_id, Some("cust-1"), "order-1"))
            .await
            .unwrap();
        let Reservation::Reserved(record) = outcome else {
            panic!("expected a reservation, got {:?}", outcome);
        };
        assert_eq!(record.code, "LIMITED");

        let code = db.codes().get_by_id(&code_id).await.unwrap().unwrap();
        assert_eq!(code.current_uses, 1);
        assert_eq!(code.total_orders, 1);
        assert_eq!(code.total_revenue_cents, 10000);
        assert_eq!(code.total_savings_cents, 1000);

        assert_eq!(db.usage().count_for_customer(&code_id, "cust-1").await.unwrap(), 1);
        assert_eq!(db.usage().list_for_code(&code_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_global_limit_is_exact() {
        let db = db().await;
        let code_id = code_with_limits(&db, Some(2), None).await;

        let mut reserved = 0;
        let mut lost = 0;
        for i in 0..5 {
            match db
                .usage()
                .reserve_use(&usage(&code_id, None, &format!("order-{}", i)))
                .await
                .unwrap()
            {
                Reservation::Reserved(_) => reserved += 1,
                Reservation::RaceLost(RaceLost::GlobalLimitReached) => lost += 1,
                other => panic!("unexpected outcome {:?}", other),
            }
        }

        assert_eq!(reserved, 2);
        assert_eq!(lost, 3);
        let code = db.codes().get_by_id(&code_id).await.unwrap().unwrap();
        assert_eq!(code.current_uses, 2);
    }

    #[tokio::test]
    async fn test_simultaneous_reservations_on_last_use() {
        let db = db().await;
        let code_id = code_with_limits(&db, Some(1), None).await;

        let first = usage(&code_id, Some("cust-a"), "order-a");
        let second = usage(&code_id, Some("cust-b"), "order-b");
        let repo_a = db.usage();
        let repo_b = db.usage();

        let (a, b) = tokio::join!(repo_a.reserve_use(&first), repo_b.reserve_use(&second));
        let outcomes = [a.unwrap(), b.unwrap()];

        let wins = outcomes
            .iter()
            .filter(|o| matches!(o, Reservation::Reserved(_)))
            .count();
        let losses = outcomes
            .iter()
            .filter(|o| matches!(o, Reservation::RaceLost(RaceLost::GlobalLimitReached)))
            .count();
        assert_eq!(wins, 1);
        assert_eq!(losses, 1);

        let code = db.codes().get_by_id(&code_id).await.unwrap().unwrap();
        assert_eq!(code.current_uses, 1);
        assert_eq!(db.usage().list_for_code(&code_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_reservations_on_file_database() {
        let dir = std::env::temp_dir().join(format!("lys-usage-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let db = Database::new(DbConfig::new(dir.join("lys.db")).max_connections(4))
            .await
            .unwrap();
        let code_id = code_with_limits(&db, Some(3), None).await;

        let mut handles = Vec::new();
        for i in 0..8 {
            let repo = db.usage();
            let usage = usage(&code_id, None, &format!("order-{}", i));
            handles.push(tokio::spawn(async move { repo.reserve_use(&usage).await }));
        }

        let mut reserved = 0;
        for handle in handles {
            if let Reservation::Reserved(_) = handle.await.unwrap().unwrap() {
                reserved += 1;
            }
        }
        assert_eq!(reserved, 3);

        let code = db.codes().get_by_id(&code_id).await.unwrap().unwrap();
        assert_eq!(code.current_uses, 3);

        db.close().await;
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_customer_limit_rolls_back_increment() {
        let db = db().await;
        let code_id = code_with_limits(&db, None, Some(1)).await;

        db.usage()
            .reserve_use(&usage(&code_id, Some("cust-1"), "order-1"))
            .await
            .unwrap();
        let outcome = db
            .usage()
            .reserve_use(&usage(&code_id, Some("cust-1"), "order-2"))
            .await
            .unwrap();
        assert_eq!(outcome, Reservation::RaceLost(RaceLost::CustomerLimitReached));

        // The failed attempt must not leave its increment behind
        let code = db.codes().get_by_id(&code_id).await.unwrap().unwrap();
        assert_eq!(code.current_uses, 1);

        // Other customers and guests are unaffected
        assert!(matches!(
            db.usage()
                .reserve_use(&usage(&code_id, Some("cust-2"), "order-3"))
                .await
                .unwrap(),
            Reservation::Reserved(_)
        ));
        assert!(matches!(
            db.usage()
                .reserve_use(&usage(&code_id, None, "order-4"))
                .await
                .unwrap(),
            Reservation::Reserved(_)
        ));
    }

    #[tokio::test]
    async fn test_inactive_code_loses() {
        let db = db().await;
        let code_id = code_with_limits(&db, None, None).await;
        db.codes().set_active(&code_id, false).await.unwrap();

        let outcome = db
            .usage()
            .reserve_use(&usage(&code_id, None, "order-1"))
            .await
            .unwrap();
        assert_eq!(outcome, Reservation::RaceLost(RaceLost::CodeInactive));
    }

    #[tokio::test]
    async fn test_unknown_code() {
        let db = db().await;
        let err = db
            .usage()
            .reserve_use(&usage("missing", None, "order-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_same_order_cannot_redeem_twice() {
        let db = db().await;
        let code_id = code_with_limits(&db, None, None).await;

        db.usage()
            .reserve_use(&usage(&code_id, None, "order-1"))
            .await
            .unwrap();
        let err = db
            .usage()
            .reserve_use(&usage(&code_id, None, "order-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));

        let code = db.codes().get_by_id(&code_id).await.unwrap().unwrap();
        assert_eq!(code.current_uses, 1);
    }
}

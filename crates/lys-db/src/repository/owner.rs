//! # Owner Repository (Commission Ledger)
//!
//! Aggregates for the parties credited with orders placed on their codes.
//!
//! ## Commission Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Commission Ledger                                │
//! │                                                                         │
//! │  click        ──► increment_clicks()   total_clicks += 1                │
//! │                                                                         │
//! │  purchase     ──► accrue_commission()  total_orders      += 1           │
//! │                                        total_revenue     += value       │
//! │                                        total_commission  += c           │
//! │                                        pending           += c           │
//! │                                                                         │
//! │  payout       ──► record_payout()      pending -= amount                │
//! │                                        paid    += amount                │
//! │                   (refused when amount > pending)                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All increments are single `UPDATE … SET x = x + ?` statements, so
//! concurrent accruals never lose an update.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use lys_core::{CodeOwner, Money};

const SELECT_OWNER: &str = r#"
    SELECT
        id, name,
        total_clicks, total_orders, total_revenue_cents,
        total_commission_cents, pending_commission_cents, paid_commission_cents,
        last_order_at, last_click_at, created_at
    FROM code_owners
"#;

/// Repository for code owner aggregates.
#[derive(Debug, Clone)]
pub struct OwnerRepository {
    pool: SqlitePool,
}

impl OwnerRepository {
    /// Creates a new OwnerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OwnerRepository { pool }
    }

    /// Creates an owner with zeroed aggregates.
    pub async fn insert(&self, name: &str) -> DbResult<CodeOwner> {
        let owner = CodeOwner {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            total_clicks: 0,
            total_orders: 0,
            total_revenue_cents: 0,
            total_commission_cents: 0,
            pending_commission_cents: 0,
            paid_commission_cents: 0,
            last_order_at: None,
            last_click_at: None,
            created_at: Utc::now(),
        };

        debug!(id = %owner.id, name = %owner.name, "Inserting code owner");

        sqlx::query(
            r#"
            INSERT INTO code_owners (id, name, created_at)
            VALUES (?1, ?2, ?3)
            "#,
        )
        .bind(&owner.id)
        .bind(&owner.name)
        .bind(owner.created_at)
        .execute(&self.pool)
        .await?;

        Ok(owner)
    }

    /// Gets an owner by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<CodeOwner>> {
        let sql = format!("{} WHERE id = ?1", SELECT_OWNER);

        let owner = sqlx::query_as::<_, CodeOwner>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(owner)
    }

    /// Counts one attributed click.
    pub async fn increment_clicks(&self, id: &str, now: DateTime<Utc>) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE code_owners SET
                total_clicks = total_clicks + 1,
                last_click_at = ?2
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("CodeOwner", id));
        }
        Ok(())
    }

    /// Accrues commission for one order in its own transaction.
    ///
    /// Use [`crate::repository::tracking::TrackingRepository::record_purchase`]
    /// instead when the order is attributed to a tracked session, so the
    /// tracking update and the accrual commit together.
    pub async fn accrue_commission(
        &self,
        id: &str,
        order_value: Money,
        commission: Money,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        accrue_in_tx(&mut *tx, id, order_value, commission, now).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Moves `amount` from pending to paid commission.
    ///
    /// ## Errors
    /// - `DbError::NotFound` for an unknown owner
    /// - `DbError::Conflict` when `amount` exceeds pending commission
    pub async fn record_payout(&self, id: &str, amount: Money) -> DbResult<CodeOwner> {
        if !amount.is_positive() {
            return Err(DbError::Conflict("payout amount must be positive".to_string()));
        }

        let result = sqlx::query(
            r#"
            UPDATE code_owners SET
                pending_commission_cents = pending_commission_cents - ?2,
                paid_commission_cents = paid_commission_cents + ?2
            WHERE id = ?1 AND pending_commission_cents >= ?2
            "#,
        )
        .bind(id)
        .bind(amount.cents())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let owner = self
                .get_by_id(id)
                .await?
                .ok_or_else(|| DbError::not_found("CodeOwner", id))?;
            warn!(
                owner_id = %id,
                requested = amount.cents(),
                pending = owner.pending_commission_cents,
                "Payout exceeds pending commission"
            );
            return Err(DbError::Conflict(format!(
                "payout of {} exceeds pending commission of {}",
                amount,
                Money::from_cents(owner.pending_commission_cents)
            )));
        }

        info!(owner_id = %id, amount = amount.cents(), "Commission paid out");

        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("CodeOwner", id))
    }
}

/// Applies one order's accrual on an open transaction.
pub(crate) async fn accrue_in_tx(
    conn: &mut SqliteConnection,
    id: &str,
    order_value: Money,
    commission: Money,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE code_owners SET
            total_orders = total_orders + 1,
            total_revenue_cents = total_revenue_cents + ?2,
            total_commission_cents = total_commission_cents + ?3,
            pending_commission_cents = pending_commission_cents + ?3,
            last_order_at = ?4
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .bind(order_value.cents())
    .bind(commission.cents())
    .bind(now)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("CodeOwner", id));
    }

    info!(
        owner_id = %id,
        order_value = order_value.cents(),
        commission = commission.cents(),
        "Commission accrued"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::db;

    #[tokio::test]
    async fn test_insert_and_get() {
        let db = db().await;
        let owner = db.owners().insert("Ada's Picks").await.unwrap();

        let fetched = db.owners().get_by_id(&owner.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Ada's Picks");
        assert_eq!(fetched.total_clicks, 0);
        assert!(fetched.last_order_at.is_none());
    }

    #[tokio::test]
    async fn test_clicks_and_accrual() {
        let db = db().await;
        let owner = db.owners().insert("Partner").await.unwrap();
        let now = Utc::now();

        db.owners().increment_clicks(&owner.id, now).await.unwrap();
        db.owners().increment_clicks(&owner.id, now).await.unwrap();
        db.owners()
            .accrue_commission(&owner.id, Money::from_cents(10000), Money::from_cents(1000), now)
            .await
            .unwrap();

        let owner = db.owners().get_by_id(&owner.id).await.unwrap().unwrap();
        assert_eq!(owner.total_clicks, 2);
        assert_eq!(owner.total_orders, 1);
        assert_eq!(owner.total_revenue_cents, 10000);
        assert_eq!(owner.total_commission_cents, 1000);
        assert_eq!(owner.pending_commission_cents, 1000);
        assert!(owner.last_click_at.is_some());
        assert!(owner.last_order_at.is_some());
    }

    #[tokio::test]
    async fn test_accrue_unknown_owner() {
        let db = db().await;
        let err = db
            .owners()
            .accrue_commission("ghost", Money::from_cents(1), Money::from_cents(1), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_payout_moves_pending_to_paid() {
        let db = db().await;
        let owner = db.owners().insert("Partner").await.unwrap();
        db.owners()
            .accrue_commission(&owner.id, Money::from_cents(20000), Money::from_cents(2000), Utc::now())
            .await
            .unwrap();

        let after = db
            .owners()
            .record_payout(&owner.id, Money::from_cents(1500))
            .await
            .unwrap();
        assert_eq!(after.pending_commission_cents, 500);
        assert_eq!(after.paid_commission_cents, 1500);
        assert_eq!(after.total_commission_cents, 2000);
    }

    #[tokio::test]
    async fn test_payout_refuses_overpay() {
        let db = db().await;
        let owner = db.owners().insert("Partner").await.unwrap();

        let err = db
            .owners()
            .record_payout(&owner.id, Money::from_cents(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));

        let err = db
            .owners()
            .record_payout("ghost", Money::from_cents(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}

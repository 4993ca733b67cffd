//! # Tracking Repository
//!
//! Durable attribution records: one row per click session, moved through the
//! funnel as the shopper progresses.
//!
//! ## Stage Updates Are Guarded
//! Every update names the stage it expects to move FROM:
//!
//! ```text
//! UPDATE tracking SET stage = 'purchased', …
//!  WHERE session_id = ? AND stage = 'added_to_cart'
//! ```
//!
//! Zero rows means another request moved the session first; the caller gets
//! `DbError::Conflict` and nothing is written. A purchase also accrues the
//! owner's commission in the same transaction.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::owner::accrue_in_tx;
use lys_core::{ClickParams, FunnelStage, Money, TrackingRecord};

const SELECT_TRACKING: &str = r#"
    SELECT
        id, session_id, code_id, code,
        utm_source, utm_medium, utm_campaign, utm_term, utm_content,
        referrer, landing_page, stage,
        customer_id, order_id, order_value_cents, commission_cents,
        clicked_at, added_to_cart_at, purchased_at, refunded_at
    FROM tracking
"#;

#[derive(Debug, Clone, sqlx::FromRow)]
struct TrackingRow {
    id: String,
    session_id: String,
    code_id: String,
    code: String,
    utm_source: Option<String>,
    utm_medium: Option<String>,
    utm_campaign: Option<String>,
    utm_term: Option<String>,
    utm_content: Option<String>,
    referrer: Option<String>,
    landing_page: String,
    stage: FunnelStage,
    customer_id: Option<String>,
    order_id: Option<String>,
    order_value_cents: Option<i64>,
    commission_cents: Option<i64>,
    clicked_at: DateTime<Utc>,
    added_to_cart_at: Option<DateTime<Utc>>,
    purchased_at: Option<DateTime<Utc>>,
    refunded_at: Option<DateTime<Utc>>,
}

impl From<TrackingRow> for TrackingRecord {
    fn from(row: TrackingRow) -> Self {
        TrackingRecord {
            id: row.id,
            session_id: row.session_id,
            code_id: row.code_id,
            code: row.code,
            params: ClickParams {
                utm_source: row.utm_source,
                utm_medium: row.utm_medium,
                utm_campaign: row.utm_campaign,
                utm_term: row.utm_term,
                utm_content: row.utm_content,
                referrer: row.referrer,
                landing_page: row.landing_page,
            },
            stage: row.stage,
            customer_id: row.customer_id,
            order_id: row.order_id,
            order_value_cents: row.order_value_cents,
            commission_cents: row.commission_cents,
            clicked_at: row.clicked_at,
            added_to_cart_at: row.added_to_cart_at,
            purchased_at: row.purchased_at,
            refunded_at: row.refunded_at,
        }
    }
}

/// A qualifying click to record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewClick {
    pub session_id: String,
    pub code_id: String,
    pub code: String,
    pub params: ClickParams,
}

/// The order a purchase transition attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseDetails {
    pub customer_id: Option<String>,
    pub order_id: String,
    pub order_value: Money,
    pub commission: Money,
}

/// Repository for attribution tracking records.
#[derive(Debug, Clone)]
pub struct TrackingRepository {
    pool: SqlitePool,
}

impl TrackingRepository {
    /// Creates a new TrackingRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TrackingRepository { pool }
    }

    /// Records a click at stage `clicked`.
    pub async fn insert_click(&self, click: &NewClick, now: DateTime<Utc>) -> DbResult<TrackingRecord> {
        let id = Uuid::new_v4().to_string();

        debug!(session_id = %click.session_id, code = %click.code, "Recording click");

        sqlx::query(
            r#"
            INSERT INTO tracking (
                id, session_id, code_id, code,
                utm_source, utm_medium, utm_campaign, utm_term, utm_content,
                referrer, landing_page, stage, clicked_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&id)
        .bind(&click.session_id)
        .bind(&click.code_id)
        .bind(&click.code)
        .bind(&click.params.utm_source)
        .bind(&click.params.utm_medium)
        .bind(&click.params.utm_campaign)
        .bind(&click.params.utm_term)
        .bind(&click.params.utm_content)
        .bind(&click.params.referrer)
        .bind(&click.params.landing_page)
        .bind(FunnelStage::Clicked)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(TrackingRecord {
            id,
            session_id: click.session_id.clone(),
            code_id: click.code_id.clone(),
            code: click.code.clone(),
            params: click.params.clone(),
            stage: FunnelStage::Clicked,
            customer_id: None,
            order_id: None,
            order_value_cents: None,
            commission_cents: None,
            clicked_at: now,
            added_to_cart_at: None,
            purchased_at: None,
            refunded_at: None,
        })
    }

    /// Gets the record for a session.
    pub async fn get_by_session(&self, session_id: &str) -> DbResult<Option<TrackingRecord>> {
        let sql = format!("{} WHERE session_id = ?1", SELECT_TRACKING);

        let row = sqlx::query_as::<_, TrackingRow>(&sql)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(TrackingRecord::from))
    }

    /// Records for a code clicked at or after `since`, oldest first.
    pub async fn list_for_code_since(
        &self,
        code_id: &str,
        since: DateTime<Utc>,
    ) -> DbResult<Vec<TrackingRecord>> {
        let sql = format!(
            "{} WHERE code_id = ?1 AND clicked_at >= ?2 ORDER BY clicked_at ASC",
            SELECT_TRACKING
        );

        let rows = sqlx::query_as::<_, TrackingRow>(&sql)
            .bind(code_id)
            .bind(since)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(TrackingRecord::from).collect())
    }

    /// Moves a session from `from` to `to` (`added_to_cart` or `refunded`).
    ///
    /// Purchases go through [`Self::record_purchase`], which carries the
    /// order and the commission accrual.
    pub async fn update_stage(
        &self,
        session_id: &str,
        from: FunnelStage,
        to: FunnelStage,
        now: DateTime<Utc>,
    ) -> DbResult<TrackingRecord> {
        let sql = match to {
            FunnelStage::AddedToCart => {
                "UPDATE tracking SET stage = ?3, added_to_cart_at = ?4 WHERE session_id = ?1 AND stage = ?2"
            }
            FunnelStage::Refunded => {
                "UPDATE tracking SET stage = ?3, refunded_at = ?4 WHERE session_id = ?1 AND stage = ?2"
            }
            FunnelStage::Clicked | FunnelStage::Purchased => {
                return Err(DbError::Conflict(format!(
                    "stage '{}' cannot be set by update_stage",
                    to
                )))
            }
        };

        let result = sqlx::query(sql)
            .bind(session_id)
            .bind(from)
            .bind(to)
            .bind(now)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(self.stage_conflict(session_id, from).await);
        }

        info!(session_id = %session_id, from = %from, to = %to, "Funnel stage updated");

        self.get_by_session(session_id)
            .await?
            .ok_or_else(|| DbError::not_found("Tracking", session_id))
    }

    /// Marks a session purchased and, when the code has an owner, accrues
    /// their commission in the same transaction.
    pub async fn record_purchase(
        &self,
        session_id: &str,
        from: FunnelStage,
        purchase: &PurchaseDetails,
        owner_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> DbResult<TrackingRecord> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE tracking SET
                stage = ?3,
                customer_id = ?4,
                order_id = ?5,
                order_value_cents = ?6,
                commission_cents = ?7,
                purchased_at = ?8
            WHERE session_id = ?1 AND stage = ?2
            "#,
        )
        .bind(session_id)
        .bind(from)
        .bind(FunnelStage::Purchased)
        .bind(&purchase.customer_id)
        .bind(&purchase.order_id)
        .bind(purchase.order_value.cents())
        .bind(purchase.commission.cents())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(self.stage_conflict(session_id, from).await);
        }

        if let Some(owner_id) = owner_id {
            accrue_in_tx(&mut *tx, owner_id, purchase.order_value, purchase.commission, now).await?;
        }

        tx.commit().await?;

        info!(
            session_id = %session_id,
            order_id = %purchase.order_id,
            commission = purchase.commission.cents(),
            "Attributed purchase recorded"
        );

        self.get_by_session(session_id)
            .await?
            .ok_or_else(|| DbError::not_found("Tracking", session_id))
    }

    async fn stage_conflict(&self, session_id: &str, expected: FunnelStage) -> DbError {
        match self.get_by_session(session_id).await {
            Ok(Some(record)) => DbError::Conflict(format!(
                "session {} is at stage '{}', expected '{}'",
                session_id, record.stage, expected
            )),
            Ok(None) => DbError::not_found("Tracking", session_id),
            Err(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Database;
    use crate::repository::test_support::{db, new_code};
    use chrono::Duration;
    use lys_core::{CommissionTerms, PromotionalDiscount};

    async fn click(db: &Database, session: &str, code_id: &str, referrer: Option<&str>) -> TrackingRecord {
        db.tracking()
            .insert_click(
                &NewClick {
                    session_id: session.to_string(),
                    code_id: code_id.to_string(),
                    code: "PARTNER5".to_string(),
                    params: ClickParams {
                        utm_source: Some("newsletter".to_string()),
                        referrer: referrer.map(str::to_string),
                        landing_page: "/shop?ref=PARTNER5".to_string(),
                        ..Default::default()
                    },
                },
                Utc::now(),
            )
            .await
            .unwrap()
    }

    async fn partner_code(db: &Database) -> (String, String) {
        let owner = db.owners().insert("Partner").await.unwrap();
        let mut new = new_code("PARTNER5", PromotionalDiscount::percent(5));
        new.owner_id = Some(owner.id.clone());
        new.terms.commission = Some(CommissionTerms::Percentage { bps: 1000 });
        let code = db.codes().insert(&new).await.unwrap();
        (code.id, owner.id)
    }

    #[tokio::test]
    async fn test_insert_and_get_click() {
        let db = db().await;
        let (code_id, _) = partner_code(&db).await;
        click(&db, "s-1", &code_id, Some("instagram.com")).await;

        let record = db.tracking().get_by_session("s-1").await.unwrap().unwrap();
        assert_eq!(record.stage, FunnelStage::Clicked);
        assert_eq!(record.params.utm_source.as_deref(), Some("newsletter"));
        assert_eq!(record.params.referrer.as_deref(), Some("instagram.com"));
        assert!(db.tracking().get_by_session("s-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_session_rejected() {
        let db = db().await;
        let (code_id, _) = partner_code(&db).await;
        click(&db, "s-1", &code_id, None).await;

        let err = db
            .tracking()
            .insert_click(
                &NewClick {
                    session_id: "s-1".to_string(),
                    code_id: code_id.clone(),
                    code: "PARTNER5".to_string(),
                    params: ClickParams::default(),
                },
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_guarded_stage_update() {
        let db = db().await;
        let (code_id, _) = partner_code(&db).await;
        click(&db, "s-1", &code_id, None).await;

        let record = db
            .tracking()
            .update_stage("s-1", FunnelStage::Clicked, FunnelStage::AddedToCart, Utc::now())
            .await
            .unwrap();
        assert_eq!(record.stage, FunnelStage::AddedToCart);
        assert!(record.added_to_cart_at.is_some());

        // Stale expectation: someone already moved it
        let err = db
            .tracking()
            .update_stage("s-1", FunnelStage::Clicked, FunnelStage::AddedToCart, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));

        let err = db
            .tracking()
            .update_stage("nope", FunnelStage::Clicked, FunnelStage::AddedToCart, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_purchase_accrues_commission_atomically() {
        let db = db().await;
        let (code_id, owner_id) = partner_code(&db).await;
        click(&db, "s-1", &code_id, None).await;

        let purchase = PurchaseDetails {
            customer_id: Some("cust-1".to_string()),
            order_id: "order-1".to_string(),
            order_value: Money::from_cents(12000),
            commission: Money::from_cents(1200),
        };
        let record = db
            .tracking()
            .record_purchase("s-1", FunnelStage::Clicked, &purchase, Some(&owner_id), Utc::now())
            .await
            .unwrap();
        assert_eq!(record.stage, FunnelStage::Purchased);
        assert_eq!(record.order_value_cents, Some(12000));
        assert_eq!(record.commission_cents, Some(1200));

        let owner = db.owners().get_by_id(&owner_id).await.unwrap().unwrap();
        assert_eq!(owner.total_orders, 1);
        assert_eq!(owner.pending_commission_cents, 1200);

        // A second purchase for the same session is refused and accrues nothing
        let err = db
            .tracking()
            .record_purchase("s-1", FunnelStage::Clicked, &purchase, Some(&owner_id), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));
        let owner = db.owners().get_by_id(&owner_id).await.unwrap().unwrap();
        assert_eq!(owner.pending_commission_cents, 1200);
    }

    #[tokio::test]
    async fn test_purchase_with_unknown_owner_rolls_back() {
        let db = db().await;
        let (code_id, _) = partner_code(&db).await;
        click(&db, "s-1", &code_id, None).await;

        let purchase = PurchaseDetails {
            customer_id: None,
            order_id: "order-1".to_string(),
            order_value: Money::from_cents(5000),
            commission: Money::from_cents(500),
        };
        let err = db
            .tracking()
            .record_purchase("s-1", FunnelStage::Clicked, &purchase, Some("ghost"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));

        let record = db.tracking().get_by_session("s-1").await.unwrap().unwrap();
        assert_eq!(record.stage, FunnelStage::Clicked);
        assert!(record.order_id.is_none());
    }

    #[tokio::test]
    async fn test_list_for_code_since() {
        let db = db().await;
        let (code_id, _) = partner_code(&db).await;
        click(&db, "s-1", &code_id, None).await;
        click(&db, "s-2", &code_id, None).await;

        let all = db
            .tracking()
            .list_for_code_since(&code_id, Utc::now() - Duration::days(1))
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let none = db
            .tracking()
            .list_for_code_since(&code_id, Utc::now() + Duration::days(1))
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}

//! # Code Repository
//!
//! Lookup and administration of promotional codes.
//!
//! ## Code Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Code Lifecycle                                   │
//! │                                                                         │
//! │  insert() ──► active ──► set_active(false) ──► inactive (soft delete)   │
//! │                 │  ▲                              │                     │
//! │                 │  └──── set_active(true) ────────┘                     │
//! │                 │                                                       │
//! │                 └── update_terms() edits discount, limits, window       │
//! │                                                                         │
//! │  Counters (current_uses, total_orders, revenue, savings) are written    │
//! │  ONLY by UsageRepository::reserve_use. Nothing here touches them.       │
//! │                                                                         │
//! │  Codes are never deleted: usage history keeps referencing them.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use lys_core::{
    canonical_code, Code, CodeConditions, CodeKind, CommissionTerms, PromotionalDiscount,
};

// =============================================================================
// Row Mapping
// =============================================================================

const SELECT_CODE: &str = r#"
    SELECT
        id, code, name, kind,
        discount_type, discount_value,
        commission_type, commission_value,
        valid_from, valid_until,
        max_uses, max_uses_per_customer, current_uses,
        min_order_value_cents, new_customers_only,
        specific_products, specific_brands,
        removes_moq, active, owner_id,
        total_orders, total_revenue_cents, total_savings_cents,
        created_at, updated_at
    FROM codes
"#;

/// Raw `codes` row. Discount and commission are stored as type + value
/// columns and the product/brand lists as JSON arrays.
#[derive(Debug, Clone, sqlx::FromRow)]
struct CodeRecord {
    id: String,
    code: String,
    name: String,
    kind: CodeKind,
    discount_type: String,
    discount_value: i64,
    commission_type: Option<String>,
    commission_value: Option<i64>,
    valid_from: DateTime<Utc>,
    valid_until: Option<DateTime<Utc>>,
    max_uses: Option<i64>,
    max_uses_per_customer: Option<i64>,
    current_uses: i64,
    min_order_value_cents: Option<i64>,
    new_customers_only: bool,
    specific_products: String,
    specific_brands: String,
    removes_moq: bool,
    active: bool,
    owner_id: Option<String>,
    total_orders: i64,
    total_revenue_cents: i64,
    total_savings_cents: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CodeRecord> for Code {
    type Error = DbError;

    fn try_from(row: CodeRecord) -> Result<Self, Self::Error> {
        let discount = PromotionalDiscount::from_parts(&row.discount_type, row.discount_value)
            .ok_or_else(|| {
                DbError::corrupt("Code", &row.id, format!("discount {} {}", row.discount_type, row.discount_value))
            })?;

        let commission = match (row.commission_type.as_deref(), row.commission_value) {
            (Some(kind), Some(value)) => Some(CommissionTerms::from_parts(kind, value).ok_or_else(
                || DbError::corrupt("Code", &row.id, format!("commission {} {}", kind, value)),
            )?),
            _ => None,
        };

        let specific_products: Vec<String> = serde_json::from_str(&row.specific_products)
            .map_err(|e| DbError::corrupt("Code", &row.id, e.to_string()))?;
        let specific_brands: Vec<String> = serde_json::from_str(&row.specific_brands)
            .map_err(|e| DbError::corrupt("Code", &row.id, e.to_string()))?;

        Ok(Code {
            id: row.id,
            code: row.code,
            name: row.name,
            kind: row.kind,
            discount,
            commission,
            valid_from: row.valid_from,
            valid_until: row.valid_until,
            max_uses: row.max_uses,
            max_uses_per_customer: row.max_uses_per_customer,
            current_uses: row.current_uses,
            conditions: CodeConditions {
                min_order_value_cents: row.min_order_value_cents,
                new_customers_only: row.new_customers_only,
                specific_products,
                specific_brands,
            },
            removes_moq: row.removes_moq,
            active: row.active,
            owner_id: row.owner_id,
            total_orders: row.total_orders,
            total_revenue_cents: row.total_revenue_cents,
            total_savings_cents: row.total_savings_cents,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn to_json(list: &[String]) -> DbResult<String> {
    serde_json::to_string(list).map_err(|e| DbError::Query(e.to_string()))
}

// =============================================================================
// Inputs
// =============================================================================

/// The editable terms of a code.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeTerms {
    pub discount: PromotionalDiscount,
    pub commission: Option<CommissionTerms>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
    pub max_uses: Option<i64>,
    pub max_uses_per_customer: Option<i64>,
    pub conditions: CodeConditions,
    pub removes_moq: bool,
}

impl CodeTerms {
    /// Unlimited, unconditional terms valid from `valid_from`.
    pub fn new(discount: PromotionalDiscount, valid_from: DateTime<Utc>) -> Self {
        CodeTerms {
            discount,
            commission: None,
            valid_from,
            valid_until: None,
            max_uses: None,
            max_uses_per_customer: None,
            conditions: CodeConditions::default(),
            removes_moq: false,
        }
    }

    /// Rejects discounts or commissions above 100% or below zero.
    pub fn check(&self) -> DbResult<()> {
        self.discount.check()?;
        if let Some(commission) = &self.commission {
            commission.check()?;
        }
        Ok(())
    }
}

/// A code about to be created.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCode {
    /// Raw code string; stored canonical (trimmed, upper-case).
    pub code: String,
    pub name: String,
    pub kind: CodeKind,
    pub owner_id: Option<String>,
    pub terms: CodeTerms,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for promotional code operations.
#[derive(Debug, Clone)]
pub struct CodeRepository {
    pool: SqlitePool,
}

impl CodeRepository {
    /// Creates a new CodeRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CodeRepository { pool }
    }

    /// Looks a code up by its string. Inactive codes are returned too; the
    /// validation engine decides what to do with them.
    pub async fn find_by_code(&self, code: &str) -> DbResult<Option<Code>> {
        let code = canonical_code(code);
        let sql = format!("{} WHERE code = ?1", SELECT_CODE);

        let row = sqlx::query_as::<_, CodeRecord>(&sql)
            .bind(&code)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Code::try_from).transpose()
    }

    /// Gets a code by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Code>> {
        let sql = format!("{} WHERE id = ?1", SELECT_CODE);

        let row = sqlx::query_as::<_, CodeRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Code::try_from).transpose()
    }

    /// Lists codes, newest first.
    pub async fn list(&self, include_inactive: bool) -> DbResult<Vec<Code>> {
        let sql = if include_inactive {
            format!("{} ORDER BY created_at DESC", SELECT_CODE)
        } else {
            format!("{} WHERE active = 1 ORDER BY created_at DESC", SELECT_CODE)
        };

        let rows = sqlx::query_as::<_, CodeRecord>(&sql)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Code::try_from).collect()
    }

    /// Creates a code.
    ///
    /// ## Errors
    /// - `DbError::UniqueViolation` when the canonical code already exists
    /// - `DbError::ForeignKeyViolation` when `owner_id` is unknown
    /// - `DbError::InvalidTerms` when a percentage exceeds 100%
    pub async fn insert(&self, new: &NewCode) -> DbResult<Code> {
        new.terms.check()?;

        let id = Uuid::new_v4().to_string();
        let code = canonical_code(&new.code);
        let now = Utc::now();
        let terms = &new.terms;

        debug!(id = %id, code = %code, kind = ?new.kind, "Inserting code");

        let result = sqlx::query(
            r#"
            INSERT INTO codes (
                id, code, name, kind,
                discount_type, discount_value,
                commission_type, commission_value,
                valid_from, valid_until,
                max_uses, max_uses_per_customer, current_uses,
                min_order_value_cents, new_customers_only,
                specific_products, specific_brands,
                removes_moq, active, owner_id,
                total_orders, total_revenue_cents, total_savings_cents,
                created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4,
                ?5, ?6,
                ?7, ?8,
                ?9, ?10,
                ?11, ?12, 0,
                ?13, ?14,
                ?15, ?16,
                ?17, 1, ?18,
                0, 0, 0,
                ?19, ?19
            )
            "#,
        )
        .bind(&id)
        .bind(&code)
        .bind(&new.name)
        .bind(new.kind)
        .bind(terms.discount.type_name())
        .bind(terms.discount.raw_value())
        .bind(terms.commission.map(|c| c.type_name()))
        .bind(terms.commission.map(|c| c.raw_value()))
        .bind(terms.valid_from)
        .bind(terms.valid_until)
        .bind(terms.max_uses)
        .bind(terms.max_uses_per_customer)
        .bind(terms.conditions.min_order_value_cents)
        .bind(terms.conditions.new_customers_only)
        .bind(to_json(&terms.conditions.specific_products)?)
        .bind(to_json(&terms.conditions.specific_brands)?)
        .bind(terms.removes_moq)
        .bind(&new.owner_id)
        .bind(now)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            return Err(match DbError::from(e) {
                DbError::UniqueViolation { .. } => DbError::duplicate("code", &code),
                other => other,
            });
        }

        info!(id = %id, code = %code, "Code created");

        self.get_by_id(&id)
            .await?
            .ok_or_else(|| DbError::not_found("Code", &id))
    }

    /// Activates or soft-deletes a code.
    pub async fn set_active(&self, id: &str, active: bool) -> DbResult<()> {
        let result = sqlx::query("UPDATE codes SET active = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(active)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Code", id));
        }

        info!(id = %id, active, "Code activation changed");
        Ok(())
    }

    /// Replaces a code's discount, commission, window, limits and conditions.
    ///
    /// ## Errors
    /// - `DbError::Conflict` when `max_uses` would drop below `current_uses`
    /// - `DbError::InvalidTerms` when a percentage exceeds 100%
    pub async fn update_terms(&self, id: &str, terms: &CodeTerms) -> DbResult<Code> {
        terms.check()?;
        debug!(id = %id, "Updating code terms");

        let result = sqlx::query(
            r#"
            UPDATE codes SET
                discount_type = ?2,
                discount_value = ?3,
                commission_type = ?4,
                commission_value = ?5,
                valid_from = ?6,
                valid_until = ?7,
                max_uses = ?8,
                max_uses_per_customer = ?9,
                min_order_value_cents = ?10,
                new_customers_only = ?11,
                specific_products = ?12,
                specific_brands = ?13,
                removes_moq = ?14,
                updated_at = ?15
            WHERE id = ?1
              AND (?8 IS NULL OR ?8 >= current_uses)
            "#,
        )
        .bind(id)
        .bind(terms.discount.type_name())
        .bind(terms.discount.raw_value())
        .bind(terms.commission.map(|c| c.type_name()))
        .bind(terms.commission.map(|c| c.raw_value()))
        .bind(terms.valid_from)
        .bind(terms.valid_until)
        .bind(terms.max_uses)
        .bind(terms.max_uses_per_customer)
        .bind(terms.conditions.min_order_value_cents)
        .bind(terms.conditions.new_customers_only)
        .bind(to_json(&terms.conditions.specific_products)?)
        .bind(to_json(&terms.conditions.specific_brands)?)
        .bind(terms.removes_moq)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let existing = self
                .get_by_id(id)
                .await?
                .ok_or_else(|| DbError::not_found("Code", id))?;
            return Err(DbError::Conflict(format!(
                "max_uses cannot be lowered below current uses ({})",
                existing.current_uses
            )));
        }

        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Code", id))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{db, new_code};

    #[tokio::test]
    async fn test_insert_and_find_canonical() {
        let db = db().await;
        let mut new = new_code(" welcome10 ", PromotionalDiscount::percent(10));
        new.terms.conditions.specific_brands = vec!["acme".to_string()];
        new.terms.commission = Some(CommissionTerms::Fixed { cents: 500 });

        let created = db.codes().insert(&new).await.unwrap();
        assert_eq!(created.code, "WELCOME10");
        assert!(created.active);
        assert_eq!(created.current_uses, 0);

        let found = db.codes().find_by_code("Welcome10").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.discount, PromotionalDiscount::percent(10));
        assert_eq!(found.commission, Some(CommissionTerms::Fixed { cents: 500 }));
        assert_eq!(found.conditions.specific_brands, vec!["acme".to_string()]);
    }

    #[tokio::test]
    async fn test_find_missing_code() {
        let db = db().await;
        assert!(db.codes().find_by_code("NOPE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_code_rejected() {
        let db = db().await;
        db.codes()
            .insert(&new_code("SUMMER", PromotionalDiscount::percent(5)))
            .await
            .unwrap();

        let err = db
            .codes()
            .insert(&new_code("summer", PromotionalDiscount::fixed(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { ref value, .. } if value == "SUMMER"));
    }

    #[tokio::test]
    async fn test_soft_delete_and_list() {
        let db = db().await;
        let a = db
            .codes()
            .insert(&new_code("A1", PromotionalDiscount::None))
            .await
            .unwrap();
        db.codes()
            .insert(&new_code("B2", PromotionalDiscount::fixed(0)))
            .await
            .unwrap();

        db.codes().set_active(&a.id, false).await.unwrap();

        assert_eq!(db.codes().list(false).await.unwrap().len(), 1);
        assert_eq!(db.codes().list(true).await.unwrap().len(), 2);

        // Inactive codes still resolve so validation can say "inactive"
        let inactive = db.codes().find_by_code("A1").await.unwrap().unwrap();
        assert!(!inactive.active);
        assert!(inactive.discount.is_none());
    }

    #[tokio::test]
    async fn test_set_active_unknown_code() {
        let db = db().await;
        let err = db.codes().set_active("missing", true).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_update_terms() {
        let db = db().await;
        let code = db
            .codes()
            .insert(&new_code("VIP", PromotionalDiscount::percent(10)))
            .await
            .unwrap();

        let mut terms = CodeTerms::new(PromotionalDiscount::fixed(2500), code.valid_from);
        terms.max_uses = Some(10);
        terms.conditions.new_customers_only = true;

        let updated = db.codes().update_terms(&code.id, &terms).await.unwrap();
        assert_eq!(updated.discount, PromotionalDiscount::fixed(2500));
        assert_eq!(updated.max_uses, Some(10));
        assert!(updated.conditions.new_customers_only);
    }

    #[tokio::test]
    async fn test_unknown_owner_rejected() {
        let db = db().await;
        let mut new = new_code("GHOST", PromotionalDiscount::percent(10));
        new.owner_id = Some("no-such-owner".to_string());

        let err = db.codes().insert(&new).await.unwrap_err();
        assert!(matches!(err, DbError::ForeignKeyViolation { .. }));
    }

    #[tokio::test]
    async fn test_percentages_over_whole_order_rejected() {
        let db = db().await;

        let over = new_code("TOOMUCH", PromotionalDiscount::Percentage { bps: 10_001 });
        let err = db.codes().insert(&over).await.unwrap_err();
        assert!(matches!(err, DbError::InvalidTerms(_)));
        assert!(db.codes().find_by_code("TOOMUCH").await.unwrap().is_none());

        let code = db
            .codes()
            .insert(&new_code("FREE", PromotionalDiscount::percent(100)))
            .await
            .unwrap();

        let mut terms = CodeTerms::new(PromotionalDiscount::percent(10), code.valid_from);
        terms.commission = Some(CommissionTerms::Percentage { bps: 25_000 });
        let err = db.codes().update_terms(&code.id, &terms).await.unwrap_err();
        assert!(matches!(err, DbError::InvalidTerms(_)));

        let unchanged = db.codes().get_by_id(&code.id).await.unwrap().unwrap();
        assert_eq!(unchanged.discount, PromotionalDiscount::percent(100));
    }

    #[tokio::test]
    async fn test_out_of_range_stored_terms_read_as_corrupt() {
        let db = db().await;
        let code = db
            .codes()
            .insert(&new_code("EDITED", PromotionalDiscount::percent(10)))
            .await
            .unwrap();

        sqlx::query("UPDATE codes SET discount_value = 50000 WHERE id = ?1")
            .bind(&code.id)
            .execute(db.pool())
            .await
            .unwrap();

        let err = db.codes().find_by_code("EDITED").await.unwrap_err();
        assert!(matches!(err, DbError::CorruptRecord { .. }));
    }
}

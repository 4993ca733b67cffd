//! # Repository Module
//!
//! Database repository implementations for Lys Checkout.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  Checkout service                                                       │
//! │       │                                                                 │
//! │       │  db.codes().find_by_code("WELCOME10")                           │
//! │       ▼                                                                 │
//! │  CodeRepository       find_by_code, get_by_id, insert, set_active,      │
//! │                       update_terms, list                                │
//! │  UsageRepository      count_for_customer, reserve_use, list_for_code    │
//! │  TrackingRepository   insert_click, get_by_session, update_stage,       │
//! │                       record_purchase, list_for_code_since              │
//! │  OwnerRepository      insert, get_by_id, increment_clicks,              │
//! │                       accrue_commission, record_payout                  │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod code;
pub mod owner;
pub mod tracking;
pub mod usage;

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{Duration, Utc};
    use lys_core::{CodeKind, PromotionalDiscount};

    use super::code::{CodeTerms, NewCode};
    use crate::pool::{Database, DbConfig};

    pub(crate) async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    /// Active, unlimited general code valid since yesterday.
    pub(crate) fn new_code(code: &str, discount: PromotionalDiscount) -> NewCode {
        NewCode {
            code: code.to_string(),
            name: format!("{} campaign", code),
            kind: CodeKind::General,
            owner_id: None,
            terms: CodeTerms::new(discount, Utc::now() - Duration::days(1)),
        }
    }
}

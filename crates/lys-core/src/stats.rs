//! # Attribution Statistics
//!
//! Aggregates tracking records for one code over a reporting period.
//!
//! ## Metrics
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  total_clicks      every tracking record in the period                  │
//! │  unique_sessions   distinct session ids                                 │
//! │  cart_adds         records at added_to_cart or purchased                │
//! │  orders            records currently at purchased                       │
//! │  conversion_rate   orders / clicks (0 when there are no clicks)         │
//! │  revenue           Σ order value of purchased records                   │
//! │  commission        Σ commission of purchased records                    │
//! │  average_order     revenue / orders                                     │
//! │  top_referrers     five referrers with the most clicks                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, Months, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::TrackingRecord;

/// Referrer bucket for clicks that arrived without one.
pub const DIRECT_REFERRER: &str = "direct";

const TOP_REFERRERS: usize = 5;

// =============================================================================
// Period
// =============================================================================

/// Reporting window ending now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StatsPeriod {
    Today,
    Week,
    #[default]
    Month,
    Year,
    All,
}

impl StatsPeriod {
    /// First instant included in the period.
    ///
    /// `Today` starts at UTC midnight; `All` starts at the Unix epoch.
    pub fn start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            StatsPeriod::Today => now.date_naive().and_time(NaiveTime::MIN).and_utc(),
            StatsPeriod::Week => now - Duration::days(7),
            StatsPeriod::Month => now.checked_sub_months(Months::new(1)).unwrap_or_default(),
            StatsPeriod::Year => now.checked_sub_months(Months::new(12)).unwrap_or_default(),
            StatsPeriod::All => DateTime::<Utc>::default(),
        }
    }
}

impl std::str::FromStr for StatsPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "today" => Ok(StatsPeriod::Today),
            "week" => Ok(StatsPeriod::Week),
            "month" => Ok(StatsPeriod::Month),
            "year" => Ok(StatsPeriod::Year),
            "all" => Ok(StatsPeriod::All),
            other => Err(format!("unknown stats period: {}", other)),
        }
    }
}

// =============================================================================
// Stats
// =============================================================================

/// Clicks and orders that came through one referrer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ReferrerStats {
    pub referrer: String,
    pub clicks: i64,
    pub orders: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct AttributionStats {
    pub total_clicks: i64,
    pub unique_sessions: i64,
    pub cart_adds: i64,
    pub orders: i64,
    /// Ratio in `[0, 1]`.
    pub conversion_rate: f64,
    pub revenue_cents: i64,
    pub commission_cents: i64,
    pub average_order_value_cents: i64,
    pub top_referrers: Vec<ReferrerStats>,
}

impl AttributionStats {
    /// Aggregates records already filtered to one code and period.
    pub fn from_records(records: &[TrackingRecord]) -> Self {
        let total_clicks = records.len() as i64;
        let unique_sessions = records
            .iter()
            .map(|r| r.session_id.as_str())
            .collect::<HashSet<_>>()
            .len() as i64;
        let cart_adds = records.iter().filter(|r| r.reached_cart()).count() as i64;

        let purchases: Vec<&TrackingRecord> = records.iter().filter(|r| r.is_purchase()).collect();
        let orders = purchases.len() as i64;
        let revenue_cents: i64 = purchases.iter().filter_map(|r| r.order_value_cents).sum();
        let commission_cents: i64 = purchases.iter().filter_map(|r| r.commission_cents).sum();

        let conversion_rate = if total_clicks > 0 {
            orders as f64 / total_clicks as f64
        } else {
            0.0
        };
        let average_order_value_cents = if orders > 0 { revenue_cents / orders } else { 0 };

        AttributionStats {
            total_clicks,
            unique_sessions,
            cart_adds,
            orders,
            conversion_rate,
            revenue_cents,
            commission_cents,
            average_order_value_cents,
            top_referrers: top_referrers(records),
        }
    }
}

fn top_referrers(records: &[TrackingRecord]) -> Vec<ReferrerStats> {
    let mut by_referrer: BTreeMap<&str, (i64, i64)> = BTreeMap::new();
    for record in records {
        let key = record
            .params
            .referrer
            .as_deref()
            .filter(|r| !r.is_empty())
            .unwrap_or(DIRECT_REFERRER);
        let entry = by_referrer.entry(key).or_default();
        entry.0 += 1;
        if record.is_purchase() {
            entry.1 += 1;
        }
    }

    let mut ranked: Vec<ReferrerStats> = by_referrer
        .into_iter()
        .map(|(referrer, (clicks, orders))| ReferrerStats {
            referrer: referrer.to_string(),
            clicks,
            orders,
        })
        .collect();
    // Stable sort keeps alphabetical order among ties
    ranked.sort_by(|a, b| b.clicks.cmp(&a.clicks));
    ranked.truncate(TOP_REFERRERS);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClickParams, FunnelStage};
    use chrono::TimeZone;

    fn record(session: &str, stage: FunnelStage, referrer: Option<&str>) -> TrackingRecord {
        let purchased = stage == FunnelStage::Purchased;
        TrackingRecord {
            id: format!("t-{}", session),
            session_id: session.to_string(),
            code_id: "code-1".to_string(),
            code: "PARTNER5".to_string(),
            params: ClickParams {
                referrer: referrer.map(str::to_string),
                landing_page: "/".to_string(),
                ..Default::default()
            },
            stage,
            customer_id: None,
            order_id: purchased.then(|| format!("order-{}", session)),
            order_value_cents: purchased.then_some(10000),
            commission_cents: purchased.then_some(500),
            clicked_at: Utc::now(),
            added_to_cart_at: None,
            purchased_at: None,
            refunded_at: None,
        }
    }

    #[test]
    fn test_empty_stats() {
        let stats = AttributionStats::from_records(&[]);
        assert_eq!(stats.total_clicks, 0);
        assert_eq!(stats.conversion_rate, 0.0);
        assert_eq!(stats.average_order_value_cents, 0);
        assert!(stats.top_referrers.is_empty());
    }

    #[test]
    fn test_funnel_counts() {
        let records = vec![
            record("a", FunnelStage::Clicked, Some("instagram.com")),
            record("a", FunnelStage::AddedToCart, Some("instagram.com")),
            record("b", FunnelStage::Purchased, Some("instagram.com")),
            record("c", FunnelStage::Purchased, None),
            record("d", FunnelStage::Refunded, None),
        ];
        let stats = AttributionStats::from_records(&records);

        assert_eq!(stats.total_clicks, 5);
        assert_eq!(stats.unique_sessions, 4);
        // The refunded session counts as neither a cart add nor an order
        assert_eq!(stats.cart_adds, 3);
        assert_eq!(stats.orders, 2);
        assert!((stats.conversion_rate - 0.4).abs() < 1e-9);
        assert_eq!(stats.revenue_cents, 20000);
        assert_eq!(stats.commission_cents, 1000);
        assert_eq!(stats.average_order_value_cents, 10000);
    }

    #[test]
    fn test_top_referrers_ranked_and_capped() {
        let mut records = Vec::new();
        for (i, referrer) in ["a.com", "b.com", "c.com", "d.com", "e.com", "f.com"]
            .iter()
            .enumerate()
        {
            for n in 0..=i {
                records.push(record(&format!("{}-{}", referrer, n), FunnelStage::Clicked, Some(referrer)));
            }
        }
        records.push(record("direct-1", FunnelStage::Purchased, None));

        let top = AttributionStats::from_records(&records).top_referrers;
        assert_eq!(top.len(), 5);
        assert_eq!(top[0].referrer, "f.com");
        assert_eq!(top[0].clicks, 6);
        assert!(top.iter().all(|r| r.referrer != DIRECT_REFERRER));
    }

    #[test]
    fn test_period_starts() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 14, 30, 0).unwrap();
        assert_eq!(
            StatsPeriod::Today.start(now),
            Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap()
        );
        assert_eq!(
            StatsPeriod::Week.start(now),
            Utc.with_ymd_and_hms(2024, 3, 8, 14, 30, 0).unwrap()
        );
        assert_eq!(
            StatsPeriod::Month.start(now),
            Utc.with_ymd_and_hms(2024, 2, 15, 14, 30, 0).unwrap()
        );
        assert_eq!(
            StatsPeriod::Year.start(now),
            Utc.with_ymd_and_hms(2023, 3, 15, 14, 30, 0).unwrap()
        );
        assert_eq!(StatsPeriod::All.start(now).timestamp(), 0);
    }

    #[test]
    fn test_period_from_str() {
        assert_eq!("week".parse::<StatsPeriod>(), Ok(StatsPeriod::Week));
        assert!("fortnight".parse::<StatsPeriod>().is_err());
    }
}

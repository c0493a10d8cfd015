//! Subscription plans and the quota grants they produce.

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A purchasable plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Plan {
    pub id: i64,
    pub name: String,
    pub price: i64,
    pub quota: i32,
}

/// A quota allotment with an expiry. Only ever decremented after insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SubscriptionGrant {
    pub id: i64,
    pub user_id: i64,
    pub plan_id: i64,
    pub remaining_quota: i32,
    pub started_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

/// Grant row to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGrant {
    pub user_id: i64,
    pub plan_id: i64,
    pub remaining_quota: i32,
    pub started_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

impl NewGrant {
    /// Full plan quota, valid for one calendar month from `now`.
    pub fn for_plan(user_id: i64, plan: &Plan, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            plan_id: plan.id,
            remaining_quota: plan.quota,
            started_at: now,
            ends_at: one_month_after(now),
        }
    }
}

/// Conditional decrement of one grant: applies only while the grant still
/// holds `expected_remaining`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaDebit {
    pub grant_id: i64,
    pub expected_remaining: i32,
    pub amount: i32,
}

/// Same day-of-month next month, clamped to the month's last day.
pub fn one_month_after(at: DateTime<Utc>) -> DateTime<Utc> {
    at.checked_add_months(Months::new(1))
        .unwrap_or_else(|| at + chrono::Duration::days(30))
}

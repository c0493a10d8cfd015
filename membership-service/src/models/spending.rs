//! Monthly cumulative spending and member referral links.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Calendar month a payment is accounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpendingPeriod {
    pub month: i32,
    pub year: i32,
}

impl SpendingPeriod {
    pub fn of(at: DateTime<Utc>) -> Self {
        Self {
            month: at.month() as i32,
            year: at.year(),
        }
    }
}

/// Total paid by a user within one calendar month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UserSpending {
    pub user_id: i64,
    pub month: i32,
    pub year: i32,
    pub total: i64,
}

impl UserSpending {
    pub fn empty(user_id: i64, period: SpendingPeriod) -> Self {
        Self {
            user_id,
            month: period.month,
            year: period.year,
            total: 0,
        }
    }

    pub fn period(&self) -> SpendingPeriod {
        SpendingPeriod {
            month: self.month,
            year: self.year,
        }
    }
}

/// The slice of a user account the ledger needs: who referred them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Member {
    pub id: i64,
    pub referred_by: Option<i64>,
}

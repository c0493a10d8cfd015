//! Voucher catalog entries and issued user vouchers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::ParseStatusError;

/// Issued voucher status: `Available -> Pending -> Used`, with `Pending`
/// released back to `Available` when its invoice is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoucherStatus {
    Available,
    Pending,
    Used,
}

impl VoucherStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoucherStatus::Available => "available",
            VoucherStatus::Pending => "pending",
            VoucherStatus::Used => "used",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "available" => Some(VoucherStatus::Available),
            "pending" => Some(VoucherStatus::Pending),
            "used" => Some(VoucherStatus::Used),
            _ => None,
        }
    }
}

impl std::fmt::Display for VoucherStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<String> for VoucherStatus {
    type Error = ParseStatusError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_string(&value).ok_or(ParseStatusError::new("voucher", value))
    }
}

/// Catalog voucher template. No stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Voucher {
    pub id: i64,
    pub name: String,
    pub discount: i64,
    pub minimum_spending: i64,
}

/// A redeemable voucher owned by a user. `discount` is joined from the
/// catalog template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UserVoucher {
    pub id: i64,
    pub code: String,
    pub user_id: i64,
    pub voucher_id: i64,
    pub received_from: Option<i64>,
    pub received_at: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    #[sqlx(try_from = "String")]
    pub status: VoucherStatus,
    pub discount: i64,
}

impl UserVoucher {
    /// Whether the voucher may be applied to a new invoice at `now`.
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        self.status == VoucherStatus::Available && now <= self.valid_until
    }
}

/// Issued voucher row to insert.
#[derive(Debug, Clone)]
pub struct NewUserVoucher {
    pub code: String,
    pub user_id: i64,
    pub voucher_id: i64,
    pub received_from: Option<i64>,
    pub received_at: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
}

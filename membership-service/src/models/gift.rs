//! Gift catalog with stock, and per-month gift issuance records.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{ParseStatusError, SpendingPeriod};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GiftStatus {
    Processed,
    Completed,
    Cancelled,
}

impl GiftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GiftStatus::Processed => "processed",
            GiftStatus::Completed => "completed",
            GiftStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "processed" => Some(GiftStatus::Processed),
            "completed" => Some(GiftStatus::Completed),
            "cancelled" => Some(GiftStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for GiftStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<String> for GiftStatus {
    type Error = ParseStatusError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_string(&value).ok_or(ParseStatusError::new("gift", value))
    }
}

/// Catalog gift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Gift {
    pub id: i64,
    pub name: String,
    pub stock: i32,
    pub minimum_spending: i64,
}

/// Composite identity of a gift issuance. At most one row exists per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserGiftKey {
    pub user_id: i64,
    pub gift_id: i64,
    pub month: i32,
    pub year: i32,
}

impl UserGiftKey {
    pub fn new(user_id: i64, gift_id: i64, period: SpendingPeriod) -> Self {
        Self {
            user_id,
            gift_id,
            month: period.month,
            year: period.year,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UserGift {
    pub user_id: i64,
    pub gift_id: i64,
    pub month: i32,
    pub year: i32,
    #[sqlx(try_from = "String")]
    pub status: GiftStatus,
}

impl UserGift {
    pub fn key(&self) -> UserGiftKey {
        UserGiftKey {
            user_id: self.user_id,
            gift_id: self.gift_id,
            month: self.month,
            year: self.year,
        }
    }
}

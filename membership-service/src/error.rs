//! Ledger error taxonomy.

use service_core::error::AppError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// No row matched a point lookup, or an update expected to match did not.
    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid status update from {from} to {to}")]
    InvalidStatusUpdate { from: String, to: String },

    #[error("invalid voucher")]
    InvalidVoucher,

    #[error("voucher expired")]
    VoucherExpired,

    #[error("not enough quota: needed {needed}, available {available}")]
    NotEnoughQuota { needed: i64, available: i64 },

    #[error("invalid amount: {0}")]
    InvalidAmount(i64),

    #[error("not authorized")]
    NotAuthorized,

    /// A generated voucher code is already taken.
    #[error("voucher code {0} already exists")]
    DuplicateCode(String),

    #[error("storage failure: {0}")]
    Storage(anyhow::Error),
}

impl LedgerError {
    pub fn not_found(what: impl Into<String>) -> Self {
        LedgerError::NotFound(what.into())
    }

    pub fn invalid_status(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        LedgerError::InvalidStatusUpdate {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::NotFound(_) => "not_found",
            LedgerError::InvalidStatusUpdate { .. } => "invalid_status_update",
            LedgerError::InvalidVoucher => "invalid_voucher",
            LedgerError::VoucherExpired => "voucher_expired",
            LedgerError::NotEnoughQuota { .. } => "not_enough_quota",
            LedgerError::InvalidAmount(_) => "invalid_amount",
            LedgerError::NotAuthorized => "not_authorized",
            LedgerError::DuplicateCode(_) => "duplicate_code",
            LedgerError::Storage(_) => "storage",
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        LedgerError::Storage(anyhow::Error::new(err))
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(_) => AppError::NotFound(anyhow::anyhow!(err)),
            LedgerError::InvalidStatusUpdate { .. } | LedgerError::DuplicateCode(_) => {
                AppError::Conflict(anyhow::anyhow!(err))
            }
            LedgerError::InvalidVoucher
            | LedgerError::VoucherExpired
            | LedgerError::NotEnoughQuota { .. }
            | LedgerError::InvalidAmount(_) => AppError::BadRequest(anyhow::anyhow!(err)),
            LedgerError::NotAuthorized => AppError::Forbidden(anyhow::anyhow!(err)),
            LedgerError::Storage(e) => AppError::DatabaseError(e),
        }
    }
}

//! Invoice model and lifecycle states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{NewGrant, ParseStatusError, SubscriptionGrant};

/// Invoice status. Forward order is `Waiting -> Processed -> Completed`;
/// `Rejected` is only reachable from `Processed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Waiting,
    Processed,
    Completed,
    Rejected,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Waiting => "waiting",
            InvoiceStatus::Processed => "processed",
            InvoiceStatus::Completed => "completed",
            InvoiceStatus::Rejected => "rejected",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(InvoiceStatus::Waiting),
            "processed" => Some(InvoiceStatus::Processed),
            "completed" => Some(InvoiceStatus::Completed),
            "rejected" => Some(InvoiceStatus::Rejected),
            _ => None,
        }
    }

    /// Position in the lifecycle, starting at 1.
    pub fn ordinal(&self) -> i32 {
        match self {
            InvoiceStatus::Waiting => 1,
            InvoiceStatus::Processed => 2,
            InvoiceStatus::Completed => 3,
            InvoiceStatus::Rejected => 4,
        }
    }

    /// Single forward step, or rejection of a payment under review.
    pub fn can_advance_to(&self, target: InvoiceStatus) -> bool {
        match target {
            InvoiceStatus::Rejected => *self == InvoiceStatus::Processed,
            _ => target.ordinal() - self.ordinal() == 1,
        }
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<String> for InvoiceStatus {
    type Error = ParseStatusError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_string(&value).ok_or(ParseStatusError::new("invoice", value))
    }
}

/// A single purchase of a subscription plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub id: i64,
    pub code: String,
    pub user_id: i64,
    pub plan_id: i64,
    #[sqlx(try_from = "String")]
    pub status: InvoiceStatus,
    pub original_price: i64,
    pub total: i64,
    pub voucher_code: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Caller input for creating an invoice.
#[derive(Debug, Clone)]
pub struct CreateInvoice {
    pub user_id: i64,
    pub plan_id: i64,
    pub original_price: i64,
    pub voucher_code: Option<String>,
}

/// Issued voucher to move from available to pending together with the
/// invoice insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoucherReservation {
    pub user_voucher_id: i64,
    pub code: String,
}

/// Row to insert; the store assigns id, code and creation time.
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub user_id: i64,
    pub plan_id: i64,
    pub original_price: i64,
    pub total: i64,
    pub reservation: Option<VoucherReservation>,
}

/// Conditional status change. Applied only while the stored status still
/// equals `from`; a completion carries the grant to insert alongside it.
#[derive(Debug, Clone)]
pub struct InvoiceTransition {
    pub invoice_id: i64,
    pub from: InvoiceStatus,
    pub to: InvoiceStatus,
    pub decided_at: DateTime<Utc>,
    pub grant: Option<NewGrant>,
}

/// Result of a successful transition.
#[derive(Debug, Clone)]
pub struct TransitionedInvoice {
    pub invoice: Invoice,
    pub grant: Option<SubscriptionGrant>,
}

/// Human-typeable invoice codes: `<prefix><plan_id>-<starting_number + id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceNumbering {
    pub prefix: String,
    pub starting_number: i64,
}

impl InvoiceNumbering {
    pub fn code_for(&self, plan_id: i64, invoice_id: i64) -> String {
        format!(
            "{}{}-{}",
            self.prefix,
            plan_id,
            self.starting_number + invoice_id
        )
    }
}

impl Default for InvoiceNumbering {
    fn default() -> Self {
        Self {
            prefix: "INV".to_string(),
            starting_number: 100_000,
        }
    }
}

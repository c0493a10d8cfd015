//! Domain models for membership-service.

mod gift;
mod grant;
mod invoice;
mod spending;
mod voucher;

pub use gift::{Gift, GiftStatus, UserGift, UserGiftKey};
pub use grant::{one_month_after, NewGrant, Plan, QuotaDebit, SubscriptionGrant};
pub use invoice::{
    CreateInvoice, Invoice, InvoiceNumbering, InvoiceStatus, InvoiceTransition, NewInvoice,
    TransitionedInvoice, VoucherReservation,
};
pub use spending::{Member, SpendingPeriod, UserSpending};
pub use voucher::{NewUserVoucher, UserVoucher, Voucher, VoucherStatus};

/// A status column held a value no variant matches.
#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} status '{value}'")]
pub struct ParseStatusError {
    kind: &'static str,
    value: String,
}

impl ParseStatusError {
    pub(crate) fn new(kind: &'static str, value: String) -> Self {
        Self { kind, value }
    }
}

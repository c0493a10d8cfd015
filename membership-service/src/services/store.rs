//! Ledger store contract.
//!
//! Every status change and decrement is conditional on the state the caller
//! last observed. A conditional write that matches nothing is reported as
//! `None`/`false`, never as an error, so callers can tell a lost race from a
//! storage failure.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{
    Gift, GiftStatus, Invoice, InvoiceNumbering, InvoiceTransition, Member, NewGrant,
    NewInvoice, NewUserVoucher, Plan, QuotaDebit, SpendingPeriod, SubscriptionGrant,
    TransitionedInvoice, UserGift, UserGiftKey, UserSpending, UserVoucher, Voucher,
    VoucherStatus,
};

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Cheap connectivity probe.
    async fn ping(&self) -> Result<()>;

    // ---------------------------------------------------------------------
    // Reference data
    // ---------------------------------------------------------------------

    async fn find_plan(&self, plan_id: i64) -> Result<Option<Plan>>;

    async fn find_member(&self, user_id: i64) -> Result<Option<Member>>;

    // ---------------------------------------------------------------------
    // Invoices
    // ---------------------------------------------------------------------

    /// Insert a `waiting` invoice and assign its code. When a reservation is
    /// present the voucher moves `available -> pending` in the same unit of
    /// work; `None` means that reservation lost its race and nothing was
    /// written.
    async fn insert_invoice(
        &self,
        input: &NewInvoice,
        numbering: &InvoiceNumbering,
    ) -> Result<Option<Invoice>>;

    async fn find_invoice_by_code(&self, code: &str) -> Result<Option<Invoice>>;

    /// Newest first. `None` lists every user's invoices.
    async fn list_invoices(&self, user_id: Option<i64>) -> Result<Vec<Invoice>>;

    /// Apply a status change together with its grant, if any. `None` when
    /// the invoice is no longer in `transition.from`.
    async fn transition_invoice(
        &self,
        transition: &InvoiceTransition,
    ) -> Result<Option<TransitionedInvoice>>;

    // ---------------------------------------------------------------------
    // Subscription grants
    // ---------------------------------------------------------------------

    async fn insert_grant(&self, grant: &NewGrant) -> Result<SubscriptionGrant>;

    /// All grants, soonest-ending first, then largest remaining quota.
    async fn list_grants(&self, user_id: i64) -> Result<Vec<SubscriptionGrant>>;

    /// Grants ending after `now` with quota left, in the same order as
    /// [`LedgerStore::list_grants`].
    async fn ongoing_grants(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<SubscriptionGrant>>;

    /// Apply every debit or none. `false` when any grant no longer holds its
    /// expected remaining quota.
    async fn apply_quota_debits(&self, debits: &[QuotaDebit]) -> Result<bool>;

    // ---------------------------------------------------------------------
    // Vouchers
    // ---------------------------------------------------------------------

    async fn list_vouchers(&self) -> Result<Vec<Voucher>>;

    async fn find_voucher(&self, voucher_id: i64) -> Result<Option<Voucher>>;

    async fn find_user_voucher(&self, code: &str) -> Result<Option<UserVoucher>>;

    /// Ordered by status, then latest expiry first.
    async fn list_user_vouchers(&self, user_id: i64) -> Result<Vec<UserVoucher>>;

    /// Issued as `available`.
    async fn insert_user_voucher(&self, voucher: &NewUserVoucher) -> Result<UserVoucher>;

    async fn update_user_voucher_status(
        &self,
        user_voucher_id: i64,
        from: VoucherStatus,
        to: VoucherStatus,
    ) -> Result<bool>;

    // ---------------------------------------------------------------------
    // Gifts
    // ---------------------------------------------------------------------

    async fn list_gifts(&self) -> Result<Vec<Gift>>;

    /// Insert a `processed` user gift and take one unit of stock, atomically.
    /// `None` when the key already exists or the gift is out of stock.
    async fn issue_gift(&self, key: &UserGiftKey) -> Result<Option<Gift>>;

    async fn find_user_gift(&self, key: &UserGiftKey) -> Result<Option<UserGift>>;

    /// `None` lists every user's gifts.
    async fn list_user_gifts(&self, user_id: Option<i64>) -> Result<Vec<UserGift>>;

    async fn transition_user_gift(
        &self,
        key: &UserGiftKey,
        from: GiftStatus,
        to: GiftStatus,
    ) -> Result<Option<UserGift>>;

    async fn set_gift_stock(&self, gift_id: i64, stock: i32) -> Result<Option<Gift>>;

    // ---------------------------------------------------------------------
    // Spending
    // ---------------------------------------------------------------------

    async fn find_spending(
        &self,
        user_id: i64,
        period: SpendingPeriod,
    ) -> Result<Option<UserSpending>>;

    /// Add `amount` to the month's running total, creating the row when
    /// absent, and return the new total.
    async fn add_spending(
        &self,
        user_id: i64,
        period: SpendingPeriod,
        amount: i64,
    ) -> Result<UserSpending>;
}

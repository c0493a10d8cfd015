//! Store wrapper that fails chosen operations on demand.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use membership_service::error::{LedgerError, Result};
use membership_service::models::{
    Gift, GiftStatus, Invoice, InvoiceNumbering, InvoiceTransition, Member, NewGrant,
    NewInvoice, NewUserVoucher, Plan, QuotaDebit, SpendingPeriod, SubscriptionGrant,
    TransitionedInvoice, UserGift, UserGiftKey, UserSpending, UserVoucher, Voucher,
    VoucherStatus,
};
use membership_service::services::{LedgerStore, MemoryLedgerStore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The store reports a storage failure.
    Storage,
    /// The generated voucher code is reported as taken.
    DuplicateCode,
    /// A conditional write matches nothing, as if another caller got there first.
    LostRace,
}

struct Armed {
    fault: Fault,
    remaining: u32,
}

pub struct FaultyStore {
    inner: Arc<MemoryLedgerStore>,
    armed: Mutex<HashMap<&'static str, Armed>>,
}

impl FaultyStore {
    pub fn new(inner: Arc<MemoryLedgerStore>) -> Self {
        Self {
            inner,
            armed: Mutex::new(HashMap::new()),
        }
    }

    /// Fail the next `times` calls of `operation`.
    pub fn fail(&self, operation: &'static str, fault: Fault, times: u32) {
        self.armed.lock().unwrap().insert(
            operation,
            Armed {
                fault,
                remaining: times,
            },
        );
    }

    pub fn fail_always(&self, operation: &'static str, fault: Fault) {
        self.fail(operation, fault, u32::MAX);
    }

    pub fn clear(&self) {
        self.armed.lock().unwrap().clear();
    }

    fn take(&self, operation: &'static str) -> Option<Fault> {
        let mut armed = self.armed.lock().unwrap();
        let entry = armed.get_mut(operation)?;
        if entry.remaining == 0 {
            return None;
        }
        entry.remaining -= 1;
        Some(entry.fault)
    }

    fn check(&self, operation: &'static str) -> Result<()> {
        match self.take(operation) {
            None | Some(Fault::LostRace) => Ok(()),
            Some(Fault::Storage) => Err(LedgerError::Storage(anyhow::anyhow!(
                "injected failure in {}",
                operation
            ))),
            Some(Fault::DuplicateCode) => Err(LedgerError::DuplicateCode(operation.to_string())),
        }
    }
}

#[async_trait]
impl LedgerStore for FaultyStore {
    async fn ping(&self) -> Result<()> {
        self.check("ping")?;
        self.inner.ping().await
    }

    async fn find_plan(&self, plan_id: i64) -> Result<Option<Plan>> {
        self.check("find_plan")?;
        self.inner.find_plan(plan_id).await
    }

    async fn find_member(&self, user_id: i64) -> Result<Option<Member>> {
        self.check("find_member")?;
        self.inner.find_member(user_id).await
    }

    async fn insert_invoice(
        &self,
        input: &NewInvoice,
        numbering: &InvoiceNumbering,
    ) -> Result<Option<Invoice>> {
        if self.take("insert_invoice") == Some(Fault::LostRace) {
            return Ok(None);
        }
        self.inner.insert_invoice(input, numbering).await
    }

    async fn find_invoice_by_code(&self, code: &str) -> Result<Option<Invoice>> {
        self.check("find_invoice_by_code")?;
        self.inner.find_invoice_by_code(code).await
    }

    async fn list_invoices(&self, user_id: Option<i64>) -> Result<Vec<Invoice>> {
        self.check("list_invoices")?;
        self.inner.list_invoices(user_id).await
    }

    async fn transition_invoice(
        &self,
        transition: &InvoiceTransition,
    ) -> Result<Option<TransitionedInvoice>> {
        if self.take("transition_invoice") == Some(Fault::LostRace) {
            return Ok(None);
        }
        self.inner.transition_invoice(transition).await
    }

    async fn insert_grant(&self, grant: &NewGrant) -> Result<SubscriptionGrant> {
        self.check("insert_grant")?;
        self.inner.insert_grant(grant).await
    }

    async fn list_grants(&self, user_id: i64) -> Result<Vec<SubscriptionGrant>> {
        self.check("list_grants")?;
        self.inner.list_grants(user_id).await
    }

    async fn ongoing_grants(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<SubscriptionGrant>> {
        self.check("ongoing_grants")?;
        self.inner.ongoing_grants(user_id, now).await
    }

    async fn apply_quota_debits(&self, debits: &[QuotaDebit]) -> Result<bool> {
        match self.take("apply_quota_debits") {
            Some(Fault::LostRace) => return Ok(false),
            Some(_) => {
                return Err(LedgerError::Storage(anyhow::anyhow!(
                    "injected failure in apply_quota_debits"
                )))
            }
            None => {}
        }
        self.inner.apply_quota_debits(debits).await
    }

    async fn list_vouchers(&self) -> Result<Vec<Voucher>> {
        self.check("list_vouchers")?;
        self.inner.list_vouchers().await
    }

    async fn find_voucher(&self, voucher_id: i64) -> Result<Option<Voucher>> {
        self.check("find_voucher")?;
        self.inner.find_voucher(voucher_id).await
    }

    async fn find_user_voucher(&self, code: &str) -> Result<Option<UserVoucher>> {
        self.check("find_user_voucher")?;
        self.inner.find_user_voucher(code).await
    }

    async fn list_user_vouchers(&self, user_id: i64) -> Result<Vec<UserVoucher>> {
        self.check("list_user_vouchers")?;
        self.inner.list_user_vouchers(user_id).await
    }

    async fn insert_user_voucher(&self, voucher: &NewUserVoucher) -> Result<UserVoucher> {
        match self.take("insert_user_voucher") {
            Some(Fault::DuplicateCode) => {
                return Err(LedgerError::DuplicateCode(voucher.code.clone()))
            }
            Some(_) => {
                return Err(LedgerError::Storage(anyhow::anyhow!(
                    "injected failure in insert_user_voucher"
                )))
            }
            None => {}
        }
        self.inner.insert_user_voucher(voucher).await
    }

    async fn update_user_voucher_status(
        &self,
        user_voucher_id: i64,
        from: VoucherStatus,
        to: VoucherStatus,
    ) -> Result<bool> {
        if self.take("update_user_voucher_status").is_some() {
            return Err(LedgerError::Storage(anyhow::anyhow!(
                "injected failure in update_user_voucher_status"
            )));
        }
        self.inner
            .update_user_voucher_status(user_voucher_id, from, to)
            .await
    }

    async fn list_gifts(&self) -> Result<Vec<Gift>> {
        self.check("list_gifts")?;
        self.inner.list_gifts().await
    }

    async fn issue_gift(&self, key: &UserGiftKey) -> Result<Option<Gift>> {
        self.check("issue_gift")?;
        self.inner.issue_gift(key).await
    }

    async fn find_user_gift(&self, key: &UserGiftKey) -> Result<Option<UserGift>> {
        self.check("find_user_gift")?;
        self.inner.find_user_gift(key).await
    }

    async fn list_user_gifts(&self, user_id: Option<i64>) -> Result<Vec<UserGift>> {
        self.check("list_user_gifts")?;
        self.inner.list_user_gifts(user_id).await
    }

    async fn transition_user_gift(
        &self,
        key: &UserGiftKey,
        from: GiftStatus,
        to: GiftStatus,
    ) -> Result<Option<UserGift>> {
        self.check("transition_user_gift")?;
        self.inner.transition_user_gift(key, from, to).await
    }

    async fn set_gift_stock(&self, gift_id: i64, stock: i32) -> Result<Option<Gift>> {
        self.check("set_gift_stock")?;
        self.inner.set_gift_stock(gift_id, stock).await
    }

    async fn find_spending(
        &self,
        user_id: i64,
        period: SpendingPeriod,
    ) -> Result<Option<UserSpending>> {
        self.check("find_spending")?;
        self.inner.find_spending(user_id, period).await
    }

    async fn add_spending(
        &self,
        user_id: i64,
        period: SpendingPeriod,
        amount: i64,
    ) -> Result<UserSpending> {
        self.check("add_spending")?;
        self.inner.add_spending(user_id, period, amount).await
    }
}

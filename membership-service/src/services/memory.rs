//! In-memory ledger store.
//!
//! Holds all tables behind one async mutex, so every trait call is a single
//! atomic unit of work. Used by the test suites and for running the engines
//! without PostgreSQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

use crate::error::{LedgerError, Result};
use crate::models::{
    Gift, GiftStatus, Invoice, InvoiceNumbering, InvoiceStatus, InvoiceTransition, Member,
    NewGrant, NewInvoice, NewUserVoucher, Plan, QuotaDebit, SpendingPeriod, SubscriptionGrant,
    TransitionedInvoice, UserGift, UserGiftKey, UserSpending, UserVoucher, Voucher,
    VoucherStatus,
};
use crate::services::store::LedgerStore;

#[derive(Default)]
struct Tables {
    next_id: i64,
    plans: BTreeMap<i64, Plan>,
    members: BTreeMap<i64, Member>,
    invoices: BTreeMap<i64, Invoice>,
    grants: BTreeMap<i64, SubscriptionGrant>,
    vouchers: BTreeMap<i64, Voucher>,
    user_vouchers: BTreeMap<i64, UserVoucher>,
    gifts: BTreeMap<i64, Gift>,
    user_gifts: HashMap<UserGiftKey, UserGift>,
    spendings: HashMap<(i64, SpendingPeriod), UserSpending>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

fn grant_order(a: &SubscriptionGrant, b: &SubscriptionGrant) -> std::cmp::Ordering {
    a.ends_at
        .cmp(&b.ends_at)
        .then(b.remaining_quota.cmp(&a.remaining_quota))
}

#[derive(Default)]
pub struct MemoryLedgerStore {
    tables: Mutex<Tables>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_plan(&self, name: &str, price: i64, quota: i32) -> Plan {
        let mut tables = self.tables.lock().await;
        let plan = Plan {
            id: tables.next_id(),
            name: name.to_string(),
            price,
            quota,
        };
        tables.plans.insert(plan.id, plan.clone());
        plan
    }

    pub async fn add_member(&self, referred_by: Option<i64>) -> Member {
        let mut tables = self.tables.lock().await;
        let member = Member {
            id: tables.next_id(),
            referred_by,
        };
        tables.members.insert(member.id, member.clone());
        member
    }

    pub async fn add_voucher(&self, name: &str, discount: i64, minimum_spending: i64) -> Voucher {
        let mut tables = self.tables.lock().await;
        let voucher = Voucher {
            id: tables.next_id(),
            name: name.to_string(),
            discount,
            minimum_spending,
        };
        tables.vouchers.insert(voucher.id, voucher.clone());
        voucher
    }

    pub async fn add_gift(&self, name: &str, stock: i32, minimum_spending: i64) -> Gift {
        let mut tables = self.tables.lock().await;
        let gift = Gift {
            id: tables.next_id(),
            name: name.to_string(),
            stock,
            minimum_spending,
        };
        tables.gifts.insert(gift.id, gift.clone());
        gift
    }

    /// Seed a spending row directly, replacing any existing total.
    pub async fn set_spending(&self, user_id: i64, period: SpendingPeriod, total: i64) {
        let mut tables = self.tables.lock().await;
        tables.spendings.insert(
            (user_id, period),
            UserSpending {
                user_id,
                month: period.month,
                year: period.year,
                total,
            },
        );
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn find_plan(&self, plan_id: i64) -> Result<Option<Plan>> {
        Ok(self.tables.lock().await.plans.get(&plan_id).cloned())
    }

    async fn find_member(&self, user_id: i64) -> Result<Option<Member>> {
        Ok(self.tables.lock().await.members.get(&user_id).cloned())
    }

    async fn insert_invoice(
        &self,
        input: &NewInvoice,
        numbering: &InvoiceNumbering,
    ) -> Result<Option<Invoice>> {
        let mut tables = self.tables.lock().await;

        if !tables.plans.contains_key(&input.plan_id) {
            return Err(LedgerError::Storage(anyhow::anyhow!(
                "plan {} violates foreign key",
                input.plan_id
            )));
        }

        if let Some(reservation) = &input.reservation {
            match tables.user_vouchers.get_mut(&reservation.user_voucher_id) {
                Some(voucher) if voucher.status == VoucherStatus::Available => {
                    voucher.status = VoucherStatus::Pending;
                }
                _ => return Ok(None),
            }
        }

        let id = tables.next_id();
        let invoice = Invoice {
            id,
            code: numbering.code_for(input.plan_id, id),
            user_id: input.user_id,
            plan_id: input.plan_id,
            status: InvoiceStatus::Waiting,
            original_price: input.original_price,
            total: input.total,
            voucher_code: input.reservation.as_ref().map(|r| r.code.clone()),
            paid_at: None,
            created_at: Utc::now(),
        };
        tables.invoices.insert(id, invoice.clone());
        Ok(Some(invoice))
    }

    async fn find_invoice_by_code(&self, code: &str) -> Result<Option<Invoice>> {
        Ok(self
            .tables
            .lock()
            .await
            .invoices
            .values()
            .find(|invoice| invoice.code == code)
            .cloned())
    }

    async fn list_invoices(&self, user_id: Option<i64>) -> Result<Vec<Invoice>> {
        Ok(self
            .tables
            .lock()
            .await
            .invoices
            .values()
            .rev()
            .filter(|invoice| user_id.map_or(true, |id| invoice.user_id == id))
            .cloned()
            .collect())
    }

    async fn transition_invoice(
        &self,
        transition: &InvoiceTransition,
    ) -> Result<Option<TransitionedInvoice>> {
        let mut tables = self.tables.lock().await;

        let invoice = match tables.invoices.get_mut(&transition.invoice_id) {
            Some(invoice) if invoice.status == transition.from => {
                invoice.status = transition.to;
                invoice.paid_at = Some(transition.decided_at);
                invoice.clone()
            }
            _ => return Ok(None),
        };

        let grant = transition.grant.as_ref().map(|grant| {
            let row = SubscriptionGrant {
                id: tables.next_id(),
                user_id: grant.user_id,
                plan_id: grant.plan_id,
                remaining_quota: grant.remaining_quota,
                started_at: grant.started_at,
                ends_at: grant.ends_at,
            };
            tables.grants.insert(row.id, row.clone());
            row
        });

        Ok(Some(TransitionedInvoice { invoice, grant }))
    }

    async fn insert_grant(&self, grant: &NewGrant) -> Result<SubscriptionGrant> {
        let mut tables = self.tables.lock().await;
        let row = SubscriptionGrant {
            id: tables.next_id(),
            user_id: grant.user_id,
            plan_id: grant.plan_id,
            remaining_quota: grant.remaining_quota,
            started_at: grant.started_at,
            ends_at: grant.ends_at,
        };
        tables.grants.insert(row.id, row.clone());
        Ok(row)
    }

    async fn list_grants(&self, user_id: i64) -> Result<Vec<SubscriptionGrant>> {
        let tables = self.tables.lock().await;
        let mut grants: Vec<_> = tables
            .grants
            .values()
            .filter(|grant| grant.user_id == user_id)
            .cloned()
            .collect();
        grants.sort_by(grant_order);
        Ok(grants)
    }

    async fn ongoing_grants(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<SubscriptionGrant>> {
        let tables = self.tables.lock().await;
        let mut grants: Vec<_> = tables
            .grants
            .values()
            .filter(|grant| {
                grant.user_id == user_id && grant.ends_at > now && grant.remaining_quota > 0
            })
            .cloned()
            .collect();
        grants.sort_by(grant_order);
        Ok(grants)
    }

    async fn apply_quota_debits(&self, debits: &[QuotaDebit]) -> Result<bool> {
        let mut tables = self.tables.lock().await;

        let all_match = debits.iter().all(|debit| {
            tables
                .grants
                .get(&debit.grant_id)
                .is_some_and(|grant| grant.remaining_quota == debit.expected_remaining)
        });
        if !all_match {
            return Ok(false);
        }

        for debit in debits {
            if let Some(grant) = tables.grants.get_mut(&debit.grant_id) {
                grant.remaining_quota -= debit.amount;
            }
        }
        Ok(true)
    }

    async fn list_vouchers(&self) -> Result<Vec<Voucher>> {
        Ok(self.tables.lock().await.vouchers.values().cloned().collect())
    }

    async fn find_voucher(&self, voucher_id: i64) -> Result<Option<Voucher>> {
        Ok(self.tables.lock().await.vouchers.get(&voucher_id).cloned())
    }

    async fn find_user_voucher(&self, code: &str) -> Result<Option<UserVoucher>> {
        Ok(self
            .tables
            .lock()
            .await
            .user_vouchers
            .values()
            .find(|voucher| voucher.code == code)
            .cloned())
    }

    async fn list_user_vouchers(&self, user_id: i64) -> Result<Vec<UserVoucher>> {
        let tables = self.tables.lock().await;
        let mut vouchers: Vec<_> = tables
            .user_vouchers
            .values()
            .filter(|voucher| voucher.user_id == user_id)
            .cloned()
            .collect();
        let rank = |status: VoucherStatus| match status {
            VoucherStatus::Available => 1,
            VoucherStatus::Pending => 2,
            VoucherStatus::Used => 3,
        };
        vouchers.sort_by(|a, b| {
            rank(a.status)
                .cmp(&rank(b.status))
                .then(b.valid_until.cmp(&a.valid_until))
                .then(a.id.cmp(&b.id))
        });
        Ok(vouchers)
    }

    async fn insert_user_voucher(&self, voucher: &NewUserVoucher) -> Result<UserVoucher> {
        let mut tables = self.tables.lock().await;

        if tables
            .user_vouchers
            .values()
            .any(|existing| existing.code == voucher.code)
        {
            return Err(LedgerError::DuplicateCode(voucher.code.clone()));
        }
        let discount = tables
            .vouchers
            .get(&voucher.voucher_id)
            .map(|template| template.discount)
            .ok_or_else(|| {
                LedgerError::Storage(anyhow::anyhow!(
                    "voucher {} violates foreign key",
                    voucher.voucher_id
                ))
            })?;

        let row = UserVoucher {
            id: tables.next_id(),
            code: voucher.code.clone(),
            user_id: voucher.user_id,
            voucher_id: voucher.voucher_id,
            received_from: voucher.received_from,
            received_at: voucher.received_at,
            valid_until: voucher.valid_until,
            status: VoucherStatus::Available,
            discount,
        };
        tables.user_vouchers.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update_user_voucher_status(
        &self,
        user_voucher_id: i64,
        from: VoucherStatus,
        to: VoucherStatus,
    ) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        match tables.user_vouchers.get_mut(&user_voucher_id) {
            Some(voucher) if voucher.status == from => {
                voucher.status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_gifts(&self) -> Result<Vec<Gift>> {
        Ok(self.tables.lock().await.gifts.values().cloned().collect())
    }

    async fn issue_gift(&self, key: &UserGiftKey) -> Result<Option<Gift>> {
        let mut tables = self.tables.lock().await;

        if tables.user_gifts.contains_key(key) {
            return Ok(None);
        }
        let gift = match tables.gifts.get_mut(&key.gift_id) {
            Some(gift) if gift.stock > 0 => {
                gift.stock -= 1;
                gift.clone()
            }
            _ => return Ok(None),
        };
        tables.user_gifts.insert(
            *key,
            UserGift {
                user_id: key.user_id,
                gift_id: key.gift_id,
                month: key.month,
                year: key.year,
                status: GiftStatus::Processed,
            },
        );
        Ok(Some(gift))
    }

    async fn find_user_gift(&self, key: &UserGiftKey) -> Result<Option<UserGift>> {
        Ok(self.tables.lock().await.user_gifts.get(key).cloned())
    }

    async fn list_user_gifts(&self, user_id: Option<i64>) -> Result<Vec<UserGift>> {
        let tables = self.tables.lock().await;
        let mut gifts: Vec<_> = tables
            .user_gifts
            .values()
            .filter(|gift| user_id.map_or(true, |id| gift.user_id == id))
            .cloned()
            .collect();
        gifts.sort_by(|a, b| {
            (b.year, b.month)
                .cmp(&(a.year, a.month))
                .then((a.user_id, a.gift_id).cmp(&(b.user_id, b.gift_id)))
        });
        Ok(gifts)
    }

    async fn transition_user_gift(
        &self,
        key: &UserGiftKey,
        from: GiftStatus,
        to: GiftStatus,
    ) -> Result<Option<UserGift>> {
        let mut tables = self.tables.lock().await;
        match tables.user_gifts.get_mut(key) {
            Some(gift) if gift.status == from => {
                gift.status = to;
                Ok(Some(gift.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn set_gift_stock(&self, gift_id: i64, stock: i32) -> Result<Option<Gift>> {
        let mut tables = self.tables.lock().await;
        Ok(tables.gifts.get_mut(&gift_id).map(|gift| {
            gift.stock = stock;
            gift.clone()
        }))
    }

    async fn find_spending(
        &self,
        user_id: i64,
        period: SpendingPeriod,
    ) -> Result<Option<UserSpending>> {
        Ok(self
            .tables
            .lock()
            .await
            .spendings
            .get(&(user_id, period))
            .cloned())
    }

    async fn add_spending(
        &self,
        user_id: i64,
        period: SpendingPeriod,
        amount: i64,
    ) -> Result<UserSpending> {
        let mut tables = self.tables.lock().await;
        let spending = tables
            .spendings
            .entry((user_id, period))
            .or_insert_with(|| UserSpending::empty(user_id, period));
        spending.total += amount;
        Ok(spending.clone())
    }
}

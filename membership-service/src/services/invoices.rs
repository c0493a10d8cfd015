//! Invoice lifecycle engine.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::config::LedgerPolicy;
use crate::error::{LedgerError, Result};
use crate::models::{
    CreateInvoice, Gift, Invoice, InvoiceStatus, InvoiceTransition, NewGrant, NewInvoice,
    SpendingPeriod, SubscriptionGrant, UserSpending, Voucher, VoucherReservation, VoucherStatus,
};
use crate::services::metrics::{record_error, record_invoice_operation};
use crate::services::rewards::RewardEngine;
use crate::services::store::LedgerStore;

/// What an advance produced, for reporting back to the payer.
#[derive(Debug, Clone, Serialize)]
pub struct AdvanceOutcome {
    pub invoice: Invoice,
    pub grant: Option<SubscriptionGrant>,
    pub gifts: Vec<Gift>,
    pub vouchers: Vec<Voucher>,
}

#[derive(Clone)]
pub struct InvoiceEngine {
    store: Arc<dyn LedgerStore>,
    policy: LedgerPolicy,
    rewards: RewardEngine,
}

impl InvoiceEngine {
    pub fn new(store: Arc<dyn LedgerStore>, policy: LedgerPolicy) -> Self {
        let rewards = RewardEngine::new(store.clone(), policy.voucher_code_length);
        Self {
            store,
            policy,
            rewards,
        }
    }

    /// Create a `waiting` invoice, applying and reserving a voucher if given.
    #[instrument(skip(self, input), fields(user_id = input.user_id, plan_id = input.plan_id))]
    pub async fn create(&self, input: CreateInvoice) -> Result<Invoice> {
        if input.original_price < 0 {
            return Err(LedgerError::InvalidAmount(input.original_price));
        }

        // Completion looks the plan up again; an unknown plan would strand
        // the invoice in `processed`.
        self.store
            .find_plan(input.plan_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("plan"))?;

        let mut total = input.original_price;
        let mut reservation = None;

        if let Some(code) = input.voucher_code.as_deref().filter(|c| !c.is_empty()) {
            let voucher = self
                .store
                .find_user_voucher(code)
                .await?
                .ok_or(LedgerError::InvalidVoucher)?;

            if !voucher.is_redeemable(Utc::now()) {
                return Err(LedgerError::VoucherExpired);
            }

            total = (input.original_price - voucher.discount).max(0);
            reservation = Some(VoucherReservation {
                user_voucher_id: voucher.id,
                code: voucher.code,
            });
        }

        let new_invoice = NewInvoice {
            user_id: input.user_id,
            plan_id: input.plan_id,
            original_price: input.original_price,
            total,
            reservation,
        };

        let invoice = self
            .store
            .insert_invoice(&new_invoice, &self.policy.numbering)
            .await
            .inspect_err(|e| record_error(e.kind(), "create_invoice"))?
            // The voucher was reserved by a concurrent invoice.
            .ok_or(LedgerError::VoucherExpired)?;

        record_invoice_operation("create", invoice.status.as_str());
        info!(
            invoice_code = %invoice.code,
            original_price = invoice.original_price,
            total = invoice.total,
            "Invoice created"
        );
        Ok(invoice)
    }

    /// Move an invoice one step along its lifecycle. Completion grants the
    /// plan's quota and then issues spending rewards on a best-effort basis.
    #[instrument(skip(self))]
    pub async fn advance(&self, code: &str, target: InvoiceStatus) -> Result<AdvanceOutcome> {
        let current = self
            .store
            .find_invoice_by_code(code)
            .await?
            .ok_or_else(|| LedgerError::not_found("invoice"))?;

        if !current.status.can_advance_to(target) {
            record_error("invalid_status_update", "advance_invoice");
            return Err(LedgerError::invalid_status(current.status, target));
        }

        let now = Utc::now();
        let grant = if target == InvoiceStatus::Completed {
            let plan = self
                .store
                .find_plan(current.plan_id)
                .await?
                .ok_or_else(|| LedgerError::not_found("plan"))?;
            Some(NewGrant::for_plan(current.user_id, &plan, now))
        } else {
            None
        };

        let transition = InvoiceTransition {
            invoice_id: current.id,
            from: current.status,
            to: target,
            decided_at: now,
            grant,
        };
        let transitioned = self
            .store
            .transition_invoice(&transition)
            .await?
            .ok_or_else(|| {
                record_error("not_found", "advance_invoice");
                LedgerError::not_found("invoice")
            })?;

        let invoice = transitioned.invoice;
        record_invoice_operation("advance", invoice.status.as_str());
        info!(from = %current.status, to = %invoice.status, "Invoice advanced");

        if let Some(voucher_code) = invoice.voucher_code.as_deref() {
            self.settle_voucher(voucher_code, invoice.status).await;
        }

        let (gifts, vouchers) = if invoice.status == InvoiceStatus::Completed {
            self.reward_payment(&invoice, now).await
        } else {
            (Vec::new(), Vec::new())
        };

        Ok(AdvanceOutcome {
            invoice,
            grant: transitioned.grant,
            gifts,
            vouchers,
        })
    }

    /// Mark the reserved voucher used, or release it on rejection.
    async fn settle_voucher(&self, code: &str, status: InvoiceStatus) {
        let target = match status {
            InvoiceStatus::Rejected => VoucherStatus::Available,
            _ => VoucherStatus::Used,
        };

        let voucher = match self.store.find_user_voucher(code).await {
            Ok(Some(voucher)) => voucher,
            Ok(None) => {
                warn!(voucher_code = %code, "Reserved voucher no longer exists");
                return;
            }
            Err(e) => {
                warn!(voucher_code = %code, error = %e, "Failed to load reserved voucher");
                record_error(e.kind(), "settle_voucher");
                return;
            }
        };

        if voucher.status == target {
            return;
        }

        match self
            .store
            .update_user_voucher_status(voucher.id, voucher.status, target)
            .await
        {
            Ok(true) => info!(voucher_code = %code, status = %target, "Voucher settled"),
            Ok(false) => warn!(voucher_code = %code, "Voucher changed while settling"),
            Err(e) => {
                warn!(voucher_code = %code, error = %e, "Failed to settle voucher");
                record_error(e.kind(), "settle_voucher");
            }
        }
    }

    /// Account the payment to this month's spending and evaluate rewards
    /// against the total as it stood before the payment.
    async fn reward_payment(&self, invoice: &Invoice, now: DateTime<Utc>) -> (Vec<Gift>, Vec<Voucher>) {
        let period = SpendingPeriod::of(now);

        let after = match self
            .store
            .add_spending(invoice.user_id, period, invoice.total)
            .await
        {
            Ok(spending) => spending,
            Err(e) => {
                warn!(error = %e, "Failed to record spending, skipping rewards");
                record_error(e.kind(), "record_spending");
                return (Vec::new(), Vec::new());
            }
        };

        let before = UserSpending {
            total: after.total - invoice.total,
            ..after
        };

        let gifts = self
            .rewards
            .evaluate_gifts(invoice.user_id, invoice, &before)
            .await;
        let vouchers = self
            .rewards
            .evaluate_vouchers(invoice.user_id, invoice, &before)
            .await;

        (gifts, vouchers)
    }

    pub async fn get_invoice(&self, code: &str) -> Result<Invoice> {
        self.store
            .find_invoice_by_code(code)
            .await?
            .ok_or_else(|| LedgerError::not_found("invoice"))
    }

    /// Look up an invoice on behalf of its owner.
    pub async fn get_user_invoice(&self, code: &str, user_id: i64) -> Result<Invoice> {
        let invoice = self.get_invoice(code).await?;
        if invoice.user_id != user_id {
            return Err(LedgerError::NotAuthorized);
        }
        Ok(invoice)
    }

    pub async fn list_invoices(&self) -> Result<Vec<Invoice>> {
        self.store.list_invoices(None).await
    }

    pub async fn list_user_invoices(&self, user_id: i64) -> Result<Vec<Invoice>> {
        self.store.list_invoices(Some(user_id)).await
    }
}

//! Spending-threshold reward engine.
//!
//! Decides which gifts and referral vouchers a payment has just crossed
//! into. Issuance is best-effort: a failure drops that reward from the
//! result and is logged, it never fails the payment that triggered it.

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::error::{LedgerError, Result};
use crate::models::{
    one_month_after, Gift, Invoice, NewUserVoucher, UserGiftKey, UserSpending, UserVoucher,
    Voucher,
};
use crate::services::metrics::{record_error, record_rewards_issued};
use crate::services::store::LedgerStore;

/// True when a payment moves spending from at-or-below `threshold` to
/// strictly above it.
pub fn crosses(before: i64, payment: i64, threshold: i64) -> bool {
    before <= threshold && threshold < before.saturating_add(payment)
}

/// Random uppercase alphanumeric voucher code.
pub fn generate_voucher_code(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect()
}

const CODE_ATTEMPTS: u32 = 3;

/// Insert `voucher` under a freshly generated code, drawing a new code when
/// the previous one is already taken. Any code already set is replaced.
pub async fn issue_user_voucher(
    store: &dyn LedgerStore,
    code_length: usize,
    mut voucher: NewUserVoucher,
) -> Result<UserVoucher> {
    let mut attempt = 1;
    loop {
        voucher.code = generate_voucher_code(code_length);
        match store.insert_user_voucher(&voucher).await {
            Err(LedgerError::DuplicateCode(code)) if attempt < CODE_ATTEMPTS => {
                warn!(voucher_code = %code, attempt, "Voucher code collision, retrying");
                attempt += 1;
            }
            result => return result,
        }
    }
}

#[derive(Clone)]
pub struct RewardEngine {
    store: Arc<dyn LedgerStore>,
    voucher_code_length: usize,
}

impl RewardEngine {
    pub fn new(store: Arc<dyn LedgerStore>, voucher_code_length: usize) -> Self {
        Self {
            store,
            voucher_code_length,
        }
    }

    /// Issue every in-stock gift whose threshold this invoice crosses. A gift
    /// already issued to the user in the same month is skipped.
    #[instrument(skip(self, invoice, spending_before), fields(invoice_code = %invoice.code))]
    pub async fn evaluate_gifts(
        &self,
        user_id: i64,
        invoice: &Invoice,
        spending_before: &UserSpending,
    ) -> Vec<Gift> {
        let gifts = match self.store.list_gifts().await {
            Ok(gifts) => gifts,
            Err(e) => {
                warn!(error = %e, "Failed to load gift catalog, skipping gift rewards");
                record_error(e.kind(), "evaluate_gifts");
                return Vec::new();
            }
        };

        let period = spending_before.period();
        let mut issued = Vec::new();

        for gift in gifts {
            if !crosses(spending_before.total, invoice.total, gift.minimum_spending)
                || gift.stock <= 0
            {
                continue;
            }

            let key = UserGiftKey::new(user_id, gift.id, period);
            match self.store.issue_gift(&key).await {
                Ok(Some(updated)) => {
                    info!(gift_id = updated.id, remaining_stock = updated.stock, "Gift issued");
                    issued.push(updated);
                }
                Ok(None) => {
                    info!(gift_id = gift.id, "Gift already issued this month or out of stock");
                }
                Err(e) => {
                    warn!(gift_id = gift.id, error = %e, "Failed to issue gift");
                    record_error(e.kind(), "evaluate_gifts");
                }
            }
        }

        record_rewards_issued("gift", issued.len());
        issued
    }

    /// Issue referral vouchers to whoever referred the payer. Payers without
    /// a referrer trigger nothing.
    #[instrument(skip(self, invoice, spending_before), fields(invoice_code = %invoice.code))]
    pub async fn evaluate_vouchers(
        &self,
        user_id: i64,
        invoice: &Invoice,
        spending_before: &UserSpending,
    ) -> Vec<Voucher> {
        let referrer = match self.store.find_member(user_id).await {
            Ok(Some(member)) => member.referred_by,
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Failed to load member, skipping referral vouchers");
                record_error(e.kind(), "evaluate_vouchers");
                return Vec::new();
            }
        };
        let Some(referrer_id) = referrer else {
            return Vec::new();
        };

        let vouchers = match self.store.list_vouchers().await {
            Ok(vouchers) => vouchers,
            Err(e) => {
                warn!(error = %e, "Failed to load voucher catalog, skipping referral vouchers");
                record_error(e.kind(), "evaluate_vouchers");
                return Vec::new();
            }
        };

        let now = Utc::now();
        let mut issued = Vec::new();

        for voucher in vouchers {
            if !crosses(spending_before.total, invoice.total, voucher.minimum_spending) {
                continue;
            }

            let grant = NewUserVoucher {
                code: String::new(),
                user_id: referrer_id,
                voucher_id: voucher.id,
                received_from: Some(user_id),
                received_at: now,
                valid_until: one_month_after(now),
            };

            match issue_user_voucher(self.store.as_ref(), self.voucher_code_length, grant).await {
                Ok(user_voucher) => {
                    info!(
                        referrer_id = referrer_id,
                        voucher_id = voucher.id,
                        voucher_code = %user_voucher.code,
                        "Referral voucher issued"
                    );
                    issued.push(voucher);
                }
                Err(e) => {
                    warn!(voucher_id = voucher.id, error = %e, "Failed to issue referral voucher");
                    record_error(e.kind(), "evaluate_vouchers");
                }
            }
        }

        record_rewards_issued("voucher", issued.len());
        issued
    }
}

//! Subscription grants and the quota allocator.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::error::{LedgerError, Result};
use crate::models::{NewGrant, QuotaDebit, SubscriptionGrant};
use crate::services::metrics::{record_error, record_quota_consumed};
use crate::services::store::LedgerStore;

/// Walk `grants` in order, draining each before touching the next, until
/// `needed` is covered. Returns the available total when it falls short.
pub fn plan_debits(
    grants: &[SubscriptionGrant],
    needed: i32,
) -> std::result::Result<Vec<QuotaDebit>, i64> {
    let available: i64 = grants.iter().map(|g| i64::from(g.remaining_quota)).sum();
    if available < i64::from(needed) {
        return Err(available);
    }

    let mut remaining = needed;
    let mut debits = Vec::new();
    for grant in grants {
        if remaining <= 0 {
            break;
        }
        let amount = remaining.min(grant.remaining_quota);
        debits.push(QuotaDebit {
            grant_id: grant.id,
            expected_remaining: grant.remaining_quota,
            amount,
        });
        remaining -= amount;
    }
    Ok(debits)
}

#[derive(Clone)]
pub struct QuotaAllocator {
    store: Arc<dyn LedgerStore>,
}

impl QuotaAllocator {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Spend `quota_needed` across the user's live grants, soonest-expiring
    /// first. Nothing is written unless the whole amount is covered.
    #[instrument(skip(self))]
    pub async fn validate_and_consume(&self, user_id: i64, quota_needed: i32) -> Result<()> {
        if quota_needed < 0 {
            return Err(LedgerError::InvalidAmount(i64::from(quota_needed)));
        }
        if quota_needed == 0 {
            return Ok(());
        }

        let grants = self.store.ongoing_grants(user_id, Utc::now()).await?;
        let debits = plan_debits(&grants, quota_needed).map_err(|available| {
            record_error("not_enough_quota", "validate_and_consume");
            LedgerError::NotEnoughQuota {
                needed: i64::from(quota_needed),
                available,
            }
        })?;

        if !self.store.apply_quota_debits(&debits).await? {
            warn!("Subscription grants changed while consuming quota");
            record_error("not_found", "validate_and_consume");
            return Err(LedgerError::not_found("subscription grant"));
        }

        record_quota_consumed("consumed", quota_needed as u64);
        info!(
            quota = quota_needed,
            grants_touched = debits.len(),
            "Quota consumed"
        );
        Ok(())
    }

    /// Administrative grant of a plan's full quota for one month.
    #[instrument(skip(self))]
    pub async fn grant_subscription(&self, user_id: i64, plan_id: i64) -> Result<SubscriptionGrant> {
        let plan = self
            .store
            .find_plan(plan_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("plan"))?;

        let grant = self
            .store
            .insert_grant(&NewGrant::for_plan(user_id, &plan, Utc::now()))
            .await?;

        info!(grant_id = grant.id, quota = grant.remaining_quota, "Subscription granted");
        Ok(grant)
    }

    pub async fn list_user_grants(&self, user_id: i64) -> Result<Vec<SubscriptionGrant>> {
        self.store.list_grants(user_id).await
    }
}

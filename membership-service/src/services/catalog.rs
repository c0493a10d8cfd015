//! Gift and voucher catalog administration.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::error::{LedgerError, Result};
use crate::models::{
    one_month_after, Gift, GiftStatus, NewUserVoucher, SpendingPeriod, UserGift, UserGiftKey,
    UserVoucher, Voucher,
};
use crate::services::rewards::issue_user_voucher;
use crate::services::store::LedgerStore;

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn LedgerStore>,
    voucher_code_length: usize,
}

impl CatalogService {
    pub fn new(store: Arc<dyn LedgerStore>, voucher_code_length: usize) -> Self {
        Self {
            store,
            voucher_code_length,
        }
    }

    pub async fn list_gifts(&self) -> Result<Vec<Gift>> {
        self.store.list_gifts().await
    }

    /// Every issuance, or one user's when `user_id` is given.
    pub async fn list_user_gifts(&self, user_id: Option<i64>) -> Result<Vec<UserGift>> {
        self.store.list_user_gifts(user_id).await
    }

    /// Resolve a `processed` gift as delivered or cancelled.
    #[instrument(skip(self))]
    pub async fn update_user_gift_status(
        &self,
        key: UserGiftKey,
        target: GiftStatus,
    ) -> Result<UserGift> {
        let current = self
            .store
            .find_user_gift(&key)
            .await?
            .ok_or_else(|| LedgerError::not_found("user gift"))?;

        if current.status != GiftStatus::Processed || target == GiftStatus::Processed {
            return Err(LedgerError::invalid_status(current.status, target));
        }

        let updated = self
            .store
            .transition_user_gift(&key, current.status, target)
            .await?
            .ok_or_else(|| LedgerError::not_found("user gift"))?;

        info!(status = %updated.status, "User gift status updated");
        Ok(updated)
    }

    /// Administrative restock.
    #[instrument(skip(self))]
    pub async fn update_gift_stock(&self, gift_id: i64, stock: i32) -> Result<Gift> {
        if stock < 0 {
            return Err(LedgerError::InvalidAmount(i64::from(stock)));
        }

        let gift = self
            .store
            .set_gift_stock(gift_id, stock)
            .await?
            .ok_or_else(|| LedgerError::not_found("gift"))?;

        info!(stock = gift.stock, "Gift stock updated");
        Ok(gift)
    }

    pub async fn list_vouchers(&self) -> Result<Vec<Voucher>> {
        self.store.list_vouchers().await
    }

    pub async fn list_user_vouchers(&self, user_id: i64) -> Result<Vec<UserVoucher>> {
        self.store.list_user_vouchers(user_id).await
    }

    /// Administrative voucher grant, valid for one month.
    #[instrument(skip(self))]
    pub async fn grant_voucher(&self, user_id: i64, voucher_id: i64) -> Result<UserVoucher> {
        self.store
            .find_voucher(voucher_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("voucher"))?;

        let now = Utc::now();
        let issued = issue_user_voucher(
            self.store.as_ref(),
            self.voucher_code_length,
            NewUserVoucher {
                code: String::new(),
                user_id,
                voucher_id,
                received_from: None,
                received_at: now,
                valid_until: one_month_after(now),
            },
        )
        .await?;

        info!(voucher_code = %issued.code, "Voucher granted");
        Ok(issued)
    }

    /// Cumulative amount paid in a calendar month; zero when nothing was paid.
    pub async fn monthly_spending(&self, user_id: i64, period: SpendingPeriod) -> Result<i64> {
        Ok(self
            .store
            .find_spending(user_id, period)
            .await?
            .map_or(0, |spending| spending.total))
    }
}

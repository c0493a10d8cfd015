//! PostgreSQL ledger store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::PgExecutor;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::error::{LedgerError, Result};
use crate::models::{
    Gift, GiftStatus, Invoice, InvoiceNumbering, InvoiceStatus, InvoiceTransition, Member,
    NewGrant, NewInvoice, NewUserVoucher, Plan, QuotaDebit, SpendingPeriod, SubscriptionGrant,
    TransitionedInvoice, UserGift, UserGiftKey, UserSpending, UserVoucher, Voucher,
    VoucherStatus,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::LedgerStore;

const INVOICE_COLUMNS: &str =
    "id, code, user_id, plan_id, status, original_price, total, voucher_code, paid_at, created_at";
const GRANT_COLUMNS: &str = "id, user_id, plan_id, remaining_quota, started_at, ends_at";
const USER_VOUCHER_COLUMNS: &str = "uv.id, uv.code, uv.user_id, uv.voucher_id, uv.received_from, uv.received_at, uv.valid_until, uv.status, v.discount";
const USER_GIFT_COLUMNS: &str = "user_id, gift_id, month, year, status";

fn storage(context: &str, e: sqlx::Error) -> LedgerError {
    LedgerError::Storage(anyhow::anyhow!("Failed to {}: {}", context, e))
}

/// Connection pool wrapper implementing [`LedgerStore`].
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "membership-service"))]
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| storage("connect", e))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| LedgerError::Storage(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

async fn insert_grant_with<'e, E>(executor: E, grant: &NewGrant) -> Result<SubscriptionGrant>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, SubscriptionGrant>(&format!(
        r#"
        INSERT INTO subscription_grants (user_id, plan_id, remaining_quota, started_at, ends_at)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {GRANT_COLUMNS}
        "#
    ))
    .bind(grant.user_id)
    .bind(grant.plan_id)
    .bind(grant.remaining_quota)
    .bind(grant.started_at)
    .bind(grant.ends_at)
    .fetch_one(executor)
    .await
    .map_err(|e| storage("insert subscription grant", e))
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    #[instrument(skip(self))]
    async fn ping(&self) -> Result<()> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| storage("run health check", e))?;

        timer.observe_duration();
        Ok(())
    }

    // =========================================================================
    // Reference data
    // =========================================================================

    #[instrument(skip(self))]
    async fn find_plan(&self, plan_id: i64) -> Result<Option<Plan>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_plan"])
            .start_timer();

        let plan = sqlx::query_as::<_, Plan>(
            "SELECT id, name, price, quota FROM plans WHERE id = $1",
        )
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage("get plan", e))?;

        timer.observe_duration();
        Ok(plan)
    }

    #[instrument(skip(self))]
    async fn find_member(&self, user_id: i64) -> Result<Option<Member>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_member"])
            .start_timer();

        let member = sqlx::query_as::<_, Member>(
            "SELECT id, referred_by FROM members WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage("get member", e))?;

        timer.observe_duration();
        Ok(member)
    }

    // =========================================================================
    // Invoice Operations
    // =========================================================================

    #[instrument(skip(self, input, numbering), fields(user_id = input.user_id, plan_id = input.plan_id))]
    async fn insert_invoice(
        &self,
        input: &NewInvoice,
        numbering: &InvoiceNumbering,
    ) -> Result<Option<Invoice>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_invoice"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage("begin transaction", e))?;

        if let Some(reservation) = &input.reservation {
            let reserved = sqlx::query(
                "UPDATE user_vouchers SET status = $3 WHERE id = $1 AND status = $2",
            )
            .bind(reservation.user_voucher_id)
            .bind(VoucherStatus::Available.as_str())
            .bind(VoucherStatus::Pending.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| storage("reserve voucher", e))?
            .rows_affected();

            if reserved == 0 {
                tx.rollback().await.ok();
                warn!(voucher_code = %reservation.code, "Voucher reservation lost race");
                return Ok(None);
            }
        }

        let invoice_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO invoices (user_id, plan_id, status, original_price, total, voucher_code)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(input.user_id)
        .bind(input.plan_id)
        .bind(InvoiceStatus::Waiting.as_str())
        .bind(input.original_price)
        .bind(input.total)
        .bind(input.reservation.as_ref().map(|r| r.code.as_str()))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| storage("insert invoice", e))?;

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            "UPDATE invoices SET code = $2 WHERE id = $1 RETURNING {INVOICE_COLUMNS}"
        ))
        .bind(invoice_id)
        .bind(numbering.code_for(input.plan_id, invoice_id))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| storage("assign invoice code", e))?;

        tx.commit()
            .await
            .map_err(|e| storage("commit transaction", e))?;

        timer.observe_duration();
        info!(invoice_code = %invoice.code, total = invoice.total, "Invoice created");

        Ok(Some(invoice))
    }

    #[instrument(skip(self))]
    async fn find_invoice_by_code(&self, code: &str) -> Result<Option<Invoice>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_invoice_by_code"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE code = $1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage("get invoice", e))?;

        timer.observe_duration();
        Ok(invoice)
    }

    #[instrument(skip(self))]
    async fn list_invoices(&self, user_id: Option<i64>) -> Result<Vec<Invoice>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoices"])
            .start_timer();

        let invoices = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            SELECT {INVOICE_COLUMNS}
            FROM invoices
            WHERE ($1::BIGINT IS NULL OR user_id = $1)
            ORDER BY created_at DESC, id DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage("list invoices", e))?;

        timer.observe_duration();
        Ok(invoices)
    }

    #[instrument(skip(self, transition), fields(invoice_id = transition.invoice_id, to = %transition.to))]
    async fn transition_invoice(
        &self,
        transition: &InvoiceTransition,
    ) -> Result<Option<TransitionedInvoice>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["transition_invoice"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage("begin transaction", e))?;

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            UPDATE invoices
            SET status = $3, paid_at = $4
            WHERE id = $1 AND status = $2
            RETURNING {INVOICE_COLUMNS}
            "#
        ))
        .bind(transition.invoice_id)
        .bind(transition.from.as_str())
        .bind(transition.to.as_str())
        .bind(transition.decided_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| storage("update invoice status", e))?;

        let Some(invoice) = invoice else {
            tx.rollback().await.ok();
            return Ok(None);
        };

        let grant = match &transition.grant {
            Some(grant) => Some(insert_grant_with(&mut *tx, grant).await?),
            None => None,
        };

        tx.commit()
            .await
            .map_err(|e| storage("commit transaction", e))?;

        timer.observe_duration();
        Ok(Some(TransitionedInvoice { invoice, grant }))
    }

    // =========================================================================
    // Subscription Grant Operations
    // =========================================================================

    #[instrument(skip(self, grant), fields(user_id = grant.user_id, plan_id = grant.plan_id))]
    async fn insert_grant(&self, grant: &NewGrant) -> Result<SubscriptionGrant> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_grant"])
            .start_timer();

        let grant = insert_grant_with(&self.pool, grant).await?;

        timer.observe_duration();
        Ok(grant)
    }

    #[instrument(skip(self))]
    async fn list_grants(&self, user_id: i64) -> Result<Vec<SubscriptionGrant>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_grants"])
            .start_timer();

        let grants = sqlx::query_as::<_, SubscriptionGrant>(&format!(
            r#"
            SELECT {GRANT_COLUMNS}
            FROM subscription_grants
            WHERE user_id = $1
            ORDER BY ends_at ASC, remaining_quota DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage("list subscription grants", e))?;

        timer.observe_duration();
        Ok(grants)
    }

    #[instrument(skip(self))]
    async fn ongoing_grants(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<SubscriptionGrant>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["ongoing_grants"])
            .start_timer();

        let grants = sqlx::query_as::<_, SubscriptionGrant>(&format!(
            r#"
            SELECT {GRANT_COLUMNS}
            FROM subscription_grants
            WHERE user_id = $1 AND ends_at > $2 AND remaining_quota > 0
            ORDER BY ends_at ASC, remaining_quota DESC
            "#
        ))
        .bind(user_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage("list ongoing subscription grants", e))?;

        timer.observe_duration();
        Ok(grants)
    }

    #[instrument(skip(self, debits), fields(debit_count = debits.len()))]
    async fn apply_quota_debits(&self, debits: &[QuotaDebit]) -> Result<bool> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["apply_quota_debits"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage("begin transaction", e))?;

        for debit in debits {
            let affected = sqlx::query(
                r#"
                UPDATE subscription_grants
                SET remaining_quota = remaining_quota - $3
                WHERE id = $1 AND remaining_quota = $2
                "#,
            )
            .bind(debit.grant_id)
            .bind(debit.expected_remaining)
            .bind(debit.amount)
            .execute(&mut *tx)
            .await
            .map_err(|e| storage("decrement quota", e))?
            .rows_affected();

            if affected == 0 {
                tx.rollback().await.ok();
                warn!(grant_id = debit.grant_id, "Grant changed during quota consumption");
                return Ok(false);
            }
        }

        tx.commit()
            .await
            .map_err(|e| storage("commit transaction", e))?;

        timer.observe_duration();
        Ok(true)
    }

    // =========================================================================
    // Voucher Operations
    // =========================================================================

    #[instrument(skip(self))]
    async fn list_vouchers(&self) -> Result<Vec<Voucher>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_vouchers"])
            .start_timer();

        let vouchers = sqlx::query_as::<_, Voucher>(
            "SELECT id, name, discount, minimum_spending FROM vouchers ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage("list vouchers", e))?;

        timer.observe_duration();
        Ok(vouchers)
    }

    #[instrument(skip(self))]
    async fn find_voucher(&self, voucher_id: i64) -> Result<Option<Voucher>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_voucher"])
            .start_timer();

        let voucher = sqlx::query_as::<_, Voucher>(
            "SELECT id, name, discount, minimum_spending FROM vouchers WHERE id = $1",
        )
        .bind(voucher_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage("get voucher", e))?;

        timer.observe_duration();
        Ok(voucher)
    }

    #[instrument(skip(self))]
    async fn find_user_voucher(&self, code: &str) -> Result<Option<UserVoucher>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_user_voucher"])
            .start_timer();

        let voucher = sqlx::query_as::<_, UserVoucher>(&format!(
            r#"
            SELECT {USER_VOUCHER_COLUMNS}
            FROM user_vouchers uv
            JOIN vouchers v ON v.id = uv.voucher_id
            WHERE uv.code = $1
            "#
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage("get user voucher", e))?;

        timer.observe_duration();
        Ok(voucher)
    }

    #[instrument(skip(self))]
    async fn list_user_vouchers(&self, user_id: i64) -> Result<Vec<UserVoucher>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_user_vouchers"])
            .start_timer();

        let vouchers = sqlx::query_as::<_, UserVoucher>(&format!(
            r#"
            SELECT {USER_VOUCHER_COLUMNS}
            FROM user_vouchers uv
            JOIN vouchers v ON v.id = uv.voucher_id
            WHERE uv.user_id = $1
            ORDER BY
                CASE uv.status WHEN 'available' THEN 1 WHEN 'pending' THEN 2 ELSE 3 END,
                uv.valid_until DESC,
                uv.id ASC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage("list user vouchers", e))?;

        timer.observe_duration();
        Ok(vouchers)
    }

    #[instrument(skip(self, voucher), fields(user_id = voucher.user_id, voucher_id = voucher.voucher_id))]
    async fn insert_user_voucher(&self, voucher: &NewUserVoucher) -> Result<UserVoucher> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_user_voucher"])
            .start_timer();

        let issued = sqlx::query_as::<_, UserVoucher>(&format!(
            r#"
            WITH uv AS (
                INSERT INTO user_vouchers (code, user_id, voucher_id, received_from, received_at, valid_until, status)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING *
            )
            SELECT {USER_VOUCHER_COLUMNS}
            FROM uv
            JOIN vouchers v ON v.id = uv.voucher_id
            "#
        ))
        .bind(&voucher.code)
        .bind(voucher.user_id)
        .bind(voucher.voucher_id)
        .bind(voucher.received_from)
        .bind(voucher.received_at)
        .bind(voucher.valid_until)
        .bind(VoucherStatus::Available.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            let duplicate = e
                .as_database_error()
                .is_some_and(|db| db.is_unique_violation());
            if duplicate {
                LedgerError::DuplicateCode(voucher.code.clone())
            } else {
                storage("insert user voucher", e)
            }
        })?;

        timer.observe_duration();
        Ok(issued)
    }

    #[instrument(skip(self))]
    async fn update_user_voucher_status(
        &self,
        user_voucher_id: i64,
        from: VoucherStatus,
        to: VoucherStatus,
    ) -> Result<bool> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_user_voucher_status"])
            .start_timer();

        let affected = sqlx::query("UPDATE user_vouchers SET status = $3 WHERE id = $1 AND status = $2")
            .bind(user_voucher_id)
            .bind(from.as_str())
            .bind(to.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| storage("update user voucher status", e))?
            .rows_affected();

        timer.observe_duration();
        Ok(affected > 0)
    }

    // =========================================================================
    // Gift Operations
    // =========================================================================

    #[instrument(skip(self))]
    async fn list_gifts(&self) -> Result<Vec<Gift>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_gifts"])
            .start_timer();

        let gifts = sqlx::query_as::<_, Gift>(
            "SELECT id, name, stock, minimum_spending FROM gifts ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage("list gifts", e))?;

        timer.observe_duration();
        Ok(gifts)
    }

    #[instrument(skip(self))]
    async fn issue_gift(&self, key: &UserGiftKey) -> Result<Option<Gift>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["issue_gift"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage("begin transaction", e))?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO user_gifts (user_id, gift_id, month, year, status)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, gift_id, month, year) DO NOTHING
            "#,
        )
        .bind(key.user_id)
        .bind(key.gift_id)
        .bind(key.month)
        .bind(key.year)
        .bind(GiftStatus::Processed.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| storage("insert user gift", e))?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await.ok();
            return Ok(None);
        }

        let gift = sqlx::query_as::<_, Gift>(
            r#"
            UPDATE gifts SET stock = stock - 1
            WHERE id = $1 AND stock > 0
            RETURNING id, name, stock, minimum_spending
            "#,
        )
        .bind(key.gift_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| storage("decrement gift stock", e))?;

        if gift.is_none() {
            tx.rollback().await.ok();
            return Ok(None);
        }

        tx.commit()
            .await
            .map_err(|e| storage("commit transaction", e))?;

        timer.observe_duration();
        Ok(gift)
    }

    #[instrument(skip(self))]
    async fn find_user_gift(&self, key: &UserGiftKey) -> Result<Option<UserGift>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_user_gift"])
            .start_timer();

        let gift = sqlx::query_as::<_, UserGift>(&format!(
            r#"
            SELECT {USER_GIFT_COLUMNS}
            FROM user_gifts
            WHERE user_id = $1 AND gift_id = $2 AND month = $3 AND year = $4
            "#
        ))
        .bind(key.user_id)
        .bind(key.gift_id)
        .bind(key.month)
        .bind(key.year)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage("get user gift", e))?;

        timer.observe_duration();
        Ok(gift)
    }

    #[instrument(skip(self))]
    async fn list_user_gifts(&self, user_id: Option<i64>) -> Result<Vec<UserGift>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_user_gifts"])
            .start_timer();

        let gifts = sqlx::query_as::<_, UserGift>(&format!(
            r#"
            SELECT {USER_GIFT_COLUMNS}
            FROM user_gifts
            WHERE ($1::BIGINT IS NULL OR user_id = $1)
            ORDER BY year DESC, month DESC, user_id, gift_id
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage("list user gifts", e))?;

        timer.observe_duration();
        Ok(gifts)
    }

    #[instrument(skip(self))]
    async fn transition_user_gift(
        &self,
        key: &UserGiftKey,
        from: GiftStatus,
        to: GiftStatus,
    ) -> Result<Option<UserGift>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["transition_user_gift"])
            .start_timer();

        let gift = sqlx::query_as::<_, UserGift>(&format!(
            r#"
            UPDATE user_gifts SET status = $6
            WHERE user_id = $1 AND gift_id = $2 AND month = $3 AND year = $4 AND status = $5
            RETURNING {USER_GIFT_COLUMNS}
            "#
        ))
        .bind(key.user_id)
        .bind(key.gift_id)
        .bind(key.month)
        .bind(key.year)
        .bind(from.as_str())
        .bind(to.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage("update user gift status", e))?;

        timer.observe_duration();
        Ok(gift)
    }

    #[instrument(skip(self))]
    async fn set_gift_stock(&self, gift_id: i64, stock: i32) -> Result<Option<Gift>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_gift_stock"])
            .start_timer();

        let gift = sqlx::query_as::<_, Gift>(
            "UPDATE gifts SET stock = $2 WHERE id = $1 RETURNING id, name, stock, minimum_spending",
        )
        .bind(gift_id)
        .bind(stock)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage("update gift stock", e))?;

        timer.observe_duration();
        Ok(gift)
    }

    // =========================================================================
    // Spending Operations
    // =========================================================================

    #[instrument(skip(self))]
    async fn find_spending(
        &self,
        user_id: i64,
        period: SpendingPeriod,
    ) -> Result<Option<UserSpending>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_spending"])
            .start_timer();

        let spending = sqlx::query_as::<_, UserSpending>(
            r#"
            SELECT user_id, month, year, total
            FROM user_spendings
            WHERE user_id = $1 AND month = $2 AND year = $3
            "#,
        )
        .bind(user_id)
        .bind(period.month)
        .bind(period.year)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage("get user spending", e))?;

        timer.observe_duration();
        Ok(spending)
    }

    #[instrument(skip(self))]
    async fn add_spending(
        &self,
        user_id: i64,
        period: SpendingPeriod,
        amount: i64,
    ) -> Result<UserSpending> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["add_spending"])
            .start_timer();

        let spending = sqlx::query_as::<_, UserSpending>(
            r#"
            INSERT INTO user_spendings (user_id, month, year, total)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, month, year)
            DO UPDATE SET total = user_spendings.total + EXCLUDED.total
            RETURNING user_id, month, year, total
            "#,
        )
        .bind(user_id)
        .bind(period.month)
        .bind(period.year)
        .bind(amount)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| storage("record user spending", e))?;

        timer.observe_duration();
        Ok(spending)
    }
}

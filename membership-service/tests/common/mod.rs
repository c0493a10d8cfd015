//! Test helper module for membership-service integration tests.
//!
//! `TestLedger` runs the engines over the in-memory store; `postgres::PgTestLedger`
//! runs them against a real database in a throwaway schema.

#![allow(dead_code)]

pub mod faults;
pub mod postgres;

use chrono::{DateTime, Duration, Utc};
use membership_service::config::LedgerPolicy;
use membership_service::models::{
    CreateInvoice, Invoice, InvoiceStatus, NewUserVoucher, Plan, SpendingPeriod, UserVoucher,
};
use membership_service::services::{init_metrics, Ledger, LedgerStore, MemoryLedgerStore};
use service_core::observability::init_test_tracing;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use faults::FaultyStore;

static VOUCHER_COUNTER: AtomicU32 = AtomicU32::new(0);

pub struct TestLedger {
    /// Seeding and inspection go straight to the tables.
    pub store: Arc<MemoryLedgerStore>,
    /// The engines see the store through this wrapper; nothing fails until armed.
    pub faults: Arc<FaultyStore>,
    pub ledger: Ledger,
}

impl TestLedger {
    pub fn new() -> Self {
        init_test_tracing("membership_service=debug");
        init_metrics();

        let store = Arc::new(MemoryLedgerStore::new());
        let faults = Arc::new(FaultyStore::new(store.clone()));
        let dyn_store: Arc<dyn LedgerStore> = faults.clone();
        let ledger = Ledger::new(dyn_store, LedgerPolicy::default());
        Self {
            store,
            faults,
            ledger,
        }
    }

    pub fn current_period() -> SpendingPeriod {
        SpendingPeriod::of(Utc::now())
    }

    pub async fn plan(&self, price: i64, quota: i32) -> Plan {
        self.store.add_plan("Premium", price, quota).await
    }

    /// Issue a user voucher of `discount` straight into the store.
    pub async fn voucher(
        &self,
        user_id: i64,
        discount: i64,
        valid_until: DateTime<Utc>,
    ) -> UserVoucher {
        let template = self.store.add_voucher("Promo", discount, 0).await;
        let n = VOUCHER_COUNTER.fetch_add(1, Ordering::SeqCst);
        self.store
            .insert_user_voucher(&NewUserVoucher {
                code: format!("TEST{:04}", n),
                user_id,
                voucher_id: template.id,
                received_from: None,
                received_at: Utc::now(),
                valid_until,
            })
            .await
            .expect("Failed to seed user voucher")
    }

    pub async fn valid_voucher(&self, user_id: i64, discount: i64) -> UserVoucher {
        self.voucher(user_id, discount, Utc::now() + Duration::days(7))
            .await
    }

    pub async fn invoice(
        &self,
        user_id: i64,
        plan: &Plan,
        voucher_code: Option<&str>,
    ) -> Invoice {
        self.ledger
            .invoices
            .create(CreateInvoice {
                user_id,
                plan_id: plan.id,
                original_price: plan.price,
                voucher_code: voucher_code.map(str::to_string),
            })
            .await
            .expect("Failed to create invoice")
    }

    /// Drive an invoice through `processed` to `completed`.
    pub async fn pay(&self, invoice: &Invoice) -> membership_service::services::AdvanceOutcome {
        self.ledger
            .invoices
            .advance(&invoice.code, InvoiceStatus::Processed)
            .await
            .expect("Failed to process invoice");
        self.ledger
            .invoices
            .advance(&invoice.code, InvoiceStatus::Completed)
            .await
            .expect("Failed to complete invoice")
    }
}

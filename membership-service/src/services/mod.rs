//! Services module for membership-service.

pub mod catalog;
pub mod invoices;
pub mod memory;
pub mod metrics;
pub mod postgres;
pub mod quota;
pub mod rewards;
pub mod store;

pub use catalog::CatalogService;
pub use invoices::{AdvanceOutcome, InvoiceEngine};
pub use memory::MemoryLedgerStore;
pub use metrics::{get_metrics, init_metrics};
pub use postgres::PgLedgerStore;
pub use quota::QuotaAllocator;
pub use rewards::RewardEngine;
pub use store::LedgerStore;

use std::sync::Arc;

use crate::config::LedgerPolicy;

/// The ledger engines wired to one store.
#[derive(Clone)]
pub struct Ledger {
    pub invoices: InvoiceEngine,
    pub quota: QuotaAllocator,
    pub catalog: CatalogService,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>, policy: LedgerPolicy) -> Self {
        Self {
            quota: QuotaAllocator::new(store.clone()),
            catalog: CatalogService::new(store.clone(), policy.voucher_code_length),
            invoices: InvoiceEngine::new(store, policy),
        }
    }
}

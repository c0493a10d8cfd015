//! Membership ledger service.
//!
//! Tracks invoices through their payment lifecycle, grants and consumes
//! subscription quota, and issues spending-threshold rewards (gifts and
//! referral vouchers).

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod startup;

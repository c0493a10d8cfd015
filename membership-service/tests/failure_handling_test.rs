//! Store failures and lost races around invoice completion and quota use.

mod common;

use chrono::{Duration, Utc};
use common::faults::Fault;
use common::TestLedger;
use membership_service::error::LedgerError;
use membership_service::models::{InvoiceStatus, NewGrant, VoucherStatus};
use membership_service::services::LedgerStore;

#[tokio::test]
async fn gift_catalog_failure_still_completes_the_invoice() {
    let t = TestLedger::new();
    let member = t.store.add_member(None).await;
    t.store.add_gift("Mug", 5, 0).await;
    let plan = t.plan(10_000, 10).await;
    let invoice = t.invoice(member.id, &plan, None).await;
    t.faults.fail_always("list_gifts", Fault::Storage);

    let outcome = t.pay(&invoice).await;

    assert_eq!(outcome.invoice.status, InvoiceStatus::Completed);
    assert_eq!(outcome.grant.map(|g| g.remaining_quota), Some(10));
    assert!(outcome.gifts.is_empty());
    assert_eq!(t.store.list_gifts().await.unwrap()[0].stock, 5);
}

#[tokio::test]
async fn gift_issue_failure_drops_only_that_gift() {
    let t = TestLedger::new();
    let member = t.store.add_member(None).await;
    t.store.add_gift("Mug", 5, 0).await;
    let poster = t.store.add_gift("Poster", 5, 0).await;
    let plan = t.plan(10_000, 10).await;
    let invoice = t.invoice(member.id, &plan, None).await;
    t.faults.fail("issue_gift", Fault::Storage, 1);

    let outcome = t.pay(&invoice).await;

    assert_eq!(outcome.gifts.len(), 1);
    assert_eq!(outcome.gifts[0].id, poster.id);
}

#[tokio::test]
async fn referral_voucher_failure_still_completes_the_invoice() {
    let t = TestLedger::new();
    let referrer = t.store.add_member(None).await;
    let payer = t.store.add_member(Some(referrer.id)).await;
    t.store.add_voucher("Referral", 5_000, 0).await;
    let plan = t.plan(10_000, 10).await;
    let invoice = t.invoice(payer.id, &plan, None).await;
    t.faults.fail_always("insert_user_voucher", Fault::Storage);

    let outcome = t.pay(&invoice).await;

    assert!(outcome.grant.is_some());
    assert!(outcome.vouchers.is_empty());
    assert!(t.store.list_user_vouchers(referrer.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn member_lookup_failure_skips_referral_vouchers() {
    let t = TestLedger::new();
    let referrer = t.store.add_member(None).await;
    let payer = t.store.add_member(Some(referrer.id)).await;
    t.store.add_voucher("Referral", 5_000, 0).await;
    let plan = t.plan(10_000, 10).await;
    let invoice = t.invoice(payer.id, &plan, None).await;
    t.faults.fail_always("find_member", Fault::Storage);

    let outcome = t.pay(&invoice).await;

    assert!(outcome.grant.is_some());
    assert!(outcome.vouchers.is_empty());
}

#[tokio::test]
async fn spending_failure_skips_rewards_but_keeps_the_grant() {
    let t = TestLedger::new();
    let member = t.store.add_member(None).await;
    t.store.add_gift("Mug", 5, 0).await;
    let plan = t.plan(10_000, 10).await;
    let invoice = t.invoice(member.id, &plan, None).await;
    t.faults.fail_always("add_spending", Fault::Storage);

    let outcome = t.pay(&invoice).await;

    assert_eq!(outcome.invoice.status, InvoiceStatus::Completed);
    assert!(outcome.grant.is_some());
    assert!(outcome.gifts.is_empty());
    assert!(outcome.vouchers.is_empty());
    assert_eq!(
        t.store
            .find_spending(member.id, TestLedger::current_period())
            .await
            .unwrap(),
        None
    );
}

#[tokio::test]
async fn voucher_settlement_failure_does_not_undo_the_transition() {
    let t = TestLedger::new();
    let plan = t.plan(10_000, 10).await;
    let voucher = t.valid_voucher(7, 2_000).await;
    let invoice = t.invoice(7, &plan, Some(&voucher.code)).await;
    t.faults
        .fail_always("update_user_voucher_status", Fault::Storage);

    let outcome = t.pay(&invoice).await;

    assert_eq!(outcome.invoice.status, InvoiceStatus::Completed);
    assert!(outcome.grant.is_some());
    let stored = t.store.find_user_voucher(&voucher.code).await.unwrap().unwrap();
    assert_eq!(stored.status, VoucherStatus::Pending);
}

#[tokio::test]
async fn lost_transition_race_is_not_found_and_grants_nothing() {
    let t = TestLedger::new();
    let plan = t.plan(10_000, 10).await;
    let invoice = t.invoice(7, &plan, None).await;
    t.ledger
        .invoices
        .advance(&invoice.code, InvoiceStatus::Processed)
        .await
        .unwrap();
    t.faults.fail("transition_invoice", Fault::LostRace, 1);

    let result = t
        .ledger
        .invoices
        .advance(&invoice.code, InvoiceStatus::Completed)
        .await;

    assert!(matches!(result, Err(LedgerError::NotFound(_))));
    assert!(t.store.list_grants(7).await.unwrap().is_empty());
}

#[tokio::test]
async fn lost_reservation_race_fails_creation() {
    let t = TestLedger::new();
    let plan = t.plan(10_000, 10).await;
    let voucher = t.valid_voucher(7, 2_000).await;
    t.faults.fail("insert_invoice", Fault::LostRace, 1);

    let result = t
        .ledger
        .invoices
        .create(membership_service::models::CreateInvoice {
            user_id: 7,
            plan_id: plan.id,
            original_price: plan.price,
            voucher_code: Some(voucher.code.clone()),
        })
        .await;

    assert!(matches!(result, Err(LedgerError::VoucherExpired)));
    assert!(t.store.list_invoices(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn lost_quota_race_is_not_found_and_leaves_grants_untouched() {
    let t = TestLedger::new();
    let now = Utc::now();
    for (quota, days) in [(1, 2), (5, 30)] {
        t.store
            .insert_grant(&NewGrant {
                user_id: 7,
                plan_id: 1,
                remaining_quota: quota,
                started_at: now,
                ends_at: now + Duration::days(days),
            })
            .await
            .unwrap();
    }
    t.faults.fail("apply_quota_debits", Fault::LostRace, 1);

    let result = t.ledger.quota.validate_and_consume(7, 3).await;

    assert!(matches!(result, Err(LedgerError::NotFound(_))));
    let remaining: Vec<i32> = t
        .store
        .list_grants(7)
        .await
        .unwrap()
        .iter()
        .map(|g| g.remaining_quota)
        .collect();
    assert_eq!(remaining, vec![1, 5]);

    // A retry against the unchanged grants goes through.
    t.ledger.quota.validate_and_consume(7, 3).await.unwrap();
}

#[tokio::test]
async fn voucher_code_collision_is_retried_with_a_fresh_code() {
    let t = TestLedger::new();
    let template = t.store.add_voucher("Welcome", 1_000, 0).await;
    t.faults
        .fail("insert_user_voucher", Fault::DuplicateCode, 2);

    let granted = t.ledger.catalog.grant_voucher(7, template.id).await.unwrap();

    assert_eq!(granted.status, VoucherStatus::Available);
    assert_eq!(t.store.list_user_vouchers(7).await.unwrap().len(), 1);
}

#[tokio::test]
async fn persistent_code_collisions_give_up() {
    let t = TestLedger::new();
    let template = t.store.add_voucher("Welcome", 1_000, 0).await;
    t.faults
        .fail_always("insert_user_voucher", Fault::DuplicateCode);

    let result = t.ledger.catalog.grant_voucher(7, template.id).await;

    assert!(matches!(result, Err(LedgerError::DuplicateCode(_))));
}

#[tokio::test]
async fn referral_voucher_survives_a_code_collision() {
    let t = TestLedger::new();
    let referrer = t.store.add_member(None).await;
    let payer = t.store.add_member(Some(referrer.id)).await;
    t.store.add_voucher("Referral", 5_000, 0).await;
    let plan = t.plan(10_000, 10).await;
    let invoice = t.invoice(payer.id, &plan, None).await;
    t.faults
        .fail("insert_user_voucher", Fault::DuplicateCode, 1);

    let outcome = t.pay(&invoice).await;

    assert_eq!(outcome.vouchers.len(), 1);
    let granted = t.store.list_user_vouchers(referrer.id).await.unwrap();
    assert_eq!(granted.len(), 1);
    assert_eq!(granted[0].received_from, Some(payer.id));
}

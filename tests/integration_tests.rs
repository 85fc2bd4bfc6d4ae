use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use tillbook::chart::ChartConfig;
use tillbook::engine::PostingEngine;
use tillbook::models::requests::{
    BatchOperation, CardBatchPostingRequest, EzwichPostingRequest, EzwichTransactionType,
    MomoPostingRequest, MomoTransactionType, PowerPostingRequest,
};
use tillbook::models::SyncStatus;
use tillbook::sqlite_storage::SqliteStorage;
use tillbook::storage::{InMemoryStorage, LedgerStorage};

fn memory_engine() -> PostingEngine {
    let engine = PostingEngine::new(Arc::new(InMemoryStorage::new()), ChartConfig::builtin());
    engine.bootstrap().expect("bootstrap failed");
    engine
}

fn sqlite_engine() -> PostingEngine {
    let storage = SqliteStorage::new(":memory:").expect("sqlite open failed");
    let engine = PostingEngine::new(Arc::new(storage), ChartConfig::builtin());
    engine.bootstrap().expect("bootstrap failed");
    engine
}

fn momo_request(id: &str, transaction_type: MomoTransactionType) -> MomoPostingRequest {
    MomoPostingRequest {
        transaction_id: id.to_string(),
        transaction_type,
        amount: dec!(100.00),
        fee: dec!(5.00),
        provider: "MTN".to_string(),
        phone_number: "0244000000".to_string(),
        customer_name: "Ama Mensah".to_string(),
        reference: Some("ref-1".to_string()),
        processed_by: "teller-1".to_string(),
        branch_id: "BR-01".to_string(),
    }
}

fn power_request(id: &str) -> PowerPostingRequest {
    PowerPostingRequest {
        transaction_id: id.to_string(),
        meter_number: "P190000001".to_string(),
        provider: "ECG".to_string(),
        amount: dec!(50.00),
        fee: dec!(2.00),
        customer_name: "Kofi Boateng".to_string(),
        reference: None,
        processed_by: "teller-1".to_string(),
        branch_id: "BR-01".to_string(),
    }
}

fn ezwich_request(id: &str, transaction_type: EzwichTransactionType) -> EzwichPostingRequest {
    EzwichPostingRequest {
        transaction_id: id.to_string(),
        transaction_type,
        amount: dec!(200.00),
        fee: dec!(3.00),
        card_number: "6072000011112222".to_string(),
        customer_name: "Esi Agyeman".to_string(),
        reference: None,
        processed_by: "teller-2".to_string(),
        branch_id: "BR-01".to_string(),
    }
}

fn batch_request(operation: BatchOperation) -> CardBatchPostingRequest {
    CardBatchPostingRequest {
        operation,
        batch_id: "batch-1".to_string(),
        batch_code: "EZ-2024-07".to_string(),
        quantity_received: 100,
        old_quantity: None,
        unit_cost: dec!(10.00),
        user_id: "admin-1".to_string(),
        branch_id: "BR-01".to_string(),
    }
}

#[test]
fn momo_cash_in_posts_four_balanced_legs() {
    let engine = memory_engine();
    let outcome = engine.post_momo(&momo_request("momo-1", MomoTransactionType::CashIn));
    assert!(outcome.success);

    let id = outcome.ledger_transaction_id.unwrap();
    let txn = engine.storage().transaction_by_id(id).unwrap();
    assert_eq!(txn.source_transaction_id, "momo-1");
    assert_eq!(txn.status, "posted");

    let entries = engine.storage().entries_for_transaction(id).unwrap();
    assert_eq!(entries.len(), 4);
    let debits: Decimal = entries.iter().map(|e| e.debit).sum();
    let credits: Decimal = entries.iter().map(|e| e.credit).sum();
    assert_eq!(debits, credits);

    assert_eq!(engine.storage().account_balance("1010-001").unwrap(), dec!(100.00));
    assert_eq!(engine.storage().account_balance("4010-001").unwrap(), dec!(-5.00));
    assert_eq!(engine.storage().account_balance("1001").unwrap(), dec!(-95.00));
}

#[test]
fn momo_cash_out_moves_cash_into_the_till() {
    let engine = memory_engine();
    let outcome = engine.post_momo(&momo_request("momo-2", MomoTransactionType::CashOut));
    assert!(outcome.success);

    assert_eq!(engine.storage().account_balance("1010-001").unwrap(), dec!(-100.00));
    assert_eq!(engine.storage().account_balance("1001").unwrap(), dec!(105.00));
}

#[test]
fn power_sale_collects_amount_plus_fee_in_cash() {
    let engine = memory_engine();
    let outcome = engine.post_power(&power_request("pwr-1"));
    assert!(outcome.success);

    assert_eq!(engine.storage().account_balance("1001").unwrap(), dec!(52.00));
    assert_eq!(engine.storage().account_balance("1020-001").unwrap(), dec!(-50.00));
    assert_eq!(engine.storage().account_balance("4020-001").unwrap(), dec!(-2.00));
}

#[test]
fn ezwich_withdrawal_and_card_issuance() {
    let engine = memory_engine();
    assert!(engine
        .post_ezwich(&ezwich_request("ez-1", EzwichTransactionType::Withdrawal))
        .success);

    let mut issuance = ezwich_request("ez-2", EzwichTransactionType::CardIssuance);
    issuance.amount = dec!(15.00);
    issuance.fee = Decimal::ZERO;
    assert!(engine.post_ezwich(&issuance).success);

    assert_eq!(engine.storage().account_balance("1030").unwrap(), dec!(200.00));
    assert_eq!(engine.storage().account_balance("4030").unwrap(), dec!(-3.00));
    assert_eq!(engine.storage().account_balance("4031").unwrap(), dec!(-15.00));
    // 200 out for the withdrawal, 3 fee in, 15 card fee in.
    assert_eq!(engine.storage().account_balance("1001").unwrap(), dec!(-182.00));
}

#[test]
fn card_batch_lifecycle_nets_to_zero() {
    let engine = memory_engine();
    assert!(engine.post_card_batch(&batch_request(BatchOperation::Create)).success);

    let mut update = batch_request(BatchOperation::Update);
    update.quantity_received = 80;
    update.old_quantity = Some(100);
    assert!(engine.post_card_batch(&update).success);
    assert_eq!(engine.storage().account_balance("1040").unwrap(), dec!(800.00));
    assert_eq!(engine.storage().account_balance("5040").unwrap(), dec!(200.00));

    let mut delete = batch_request(BatchOperation::Delete);
    delete.quantity_received = 80;
    assert!(engine.post_card_batch(&delete).success);
    assert_eq!(engine.storage().account_balance("1040").unwrap(), Decimal::ZERO);
}

#[test]
fn replay_of_each_module_is_idempotent() {
    let engine = memory_engine();
    let momo = momo_request("momo-1", MomoTransactionType::CashIn);
    let power = power_request("pwr-1");

    let first_momo = engine.post_momo(&momo);
    let first_power = engine.post_power(&power);
    let replay_momo = engine.post_momo(&momo);
    let replay_power = engine.post_power(&power);

    assert_eq!(replay_momo.ledger_transaction_id, first_momo.ledger_transaction_id);
    assert_eq!(replay_power.ledger_transaction_id, first_power.ledger_transaction_id);

    // Balances reflect exactly one posting per source transaction.
    assert_eq!(engine.storage().account_balance("1010-001").unwrap(), dec!(100.00));
    assert_eq!(engine.storage().account_balance("1020-001").unwrap(), dec!(-50.00));
}

#[test]
fn same_transaction_id_in_different_modules_does_not_collide() {
    let engine = memory_engine();
    let momo = momo_request("txn-1", MomoTransactionType::CashIn);
    let power = power_request("txn-1");

    let first = engine.post_momo(&momo);
    let second = engine.post_power(&power);
    assert!(first.success && second.success);
    assert_ne!(first.ledger_transaction_id, second.ledger_transaction_id);
}

#[test]
fn failed_posting_leaves_no_ledger_state() {
    let engine = memory_engine();
    let mut req = momo_request("momo-1", MomoTransactionType::CashIn);
    req.provider = "Glo".to_string();

    let outcome = engine.post_momo(&req);
    assert!(!outcome.success);
    assert!(engine.storage().list_accounts().unwrap().iter().all(|a| {
        engine.storage().account_balance(&a.code).unwrap() == Decimal::ZERO
    }));
}

#[test]
fn sync_log_records_every_attempt() {
    let engine = memory_engine();
    engine.post_momo(&momo_request("momo-1", MomoTransactionType::CashIn));
    engine.post_momo(&momo_request("momo-1", MomoTransactionType::CashIn));

    let mut bad = momo_request("momo-2", MomoTransactionType::CashIn);
    bad.provider = "Glo".to_string();
    engine.post_momo(&bad);

    let mut noop = batch_request(BatchOperation::Update);
    noop.old_quantity = Some(noop.quantity_received);
    engine.post_card_batch(&noop);

    let log = engine.storage().sync_log().unwrap();
    assert_eq!(log.len(), 4);
    assert_eq!(log[0].status, SyncStatus::Success);
    assert_eq!(log[1].status, SyncStatus::Success);
    assert_eq!(log[2].status, SyncStatus::Failed);
    assert_eq!(log[3].status, SyncStatus::Skipped);
}

#[test]
fn sqlite_backend_matches_memory_semantics() {
    let engine = sqlite_engine();
    let momo = momo_request("momo-1", MomoTransactionType::CashIn);

    let first = engine.post_momo(&momo);
    let replay = engine.post_momo(&momo);
    assert!(first.success);
    assert_eq!(replay.ledger_transaction_id, first.ledger_transaction_id);

    assert!(engine.post_power(&power_request("pwr-1")).success);
    assert!(engine.post_card_batch(&batch_request(BatchOperation::Create)).success);

    assert_eq!(engine.storage().account_balance("1010-001").unwrap(), dec!(100.00));
    assert_eq!(engine.storage().account_balance("1040").unwrap(), dec!(1000.00));

    let log = engine.storage().sync_log().unwrap();
    assert_eq!(log.len(), 4);

    let views = engine.accounts_with_balances().unwrap();
    assert!(views.iter().any(|v| v.code == "1001"));
}

//! The posting engine: turns typed posting requests into committed ledger
//! transactions.
//!
//! Each posting runs the same pipeline: generate candidate entries, check
//! the double-entry invariant, then hand the balanced set to storage for an
//! atomic commit. Replays of a source transaction resolve to the original
//! ledger transaction id and still count as success.

use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;

use crate::chart::ChartConfig;
use crate::entries::{
    card_batch_entries, ezwich_entries, momo_entries, power_entries, GeneratorError,
};
use crate::models::requests::{
    CardBatchPostingRequest, EzwichPostingRequest, MomoPostingRequest, PowerPostingRequest,
};
use crate::models::{
    Account, PostingCommand, PostingOutcome, SourceModule, SyncStatus,
};
use crate::storage::{LedgerStorage, StorageError};
use crate::sync_log::SyncLogger;
use crate::validation::{validate_balanced, ValidationError};
use rust_decimal::Decimal;

#[derive(Debug, Error)]
pub enum PostingError {
    #[error(transparent)]
    Generator(#[from] GeneratorError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// An account row joined with its running balance, for reporting surfaces.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AccountView {
    pub code: String,
    pub name: String,
    pub account_type: crate::models::AccountType,
    pub active: bool,
    pub balance: Decimal,
}

pub struct PostingEngine {
    storage: Arc<dyn LedgerStorage>,
    chart: ChartConfig,
}

impl PostingEngine {
    pub fn new(storage: Arc<dyn LedgerStorage>, chart: ChartConfig) -> Self {
        Self { storage, chart }
    }

    /// Creates every chart account that does not exist yet. Run once at
    /// startup, before the first posting.
    pub fn bootstrap(&self) -> Result<(), StorageError> {
        self.chart.bootstrap(self.storage.as_ref())
    }

    pub fn chart(&self) -> &ChartConfig {
        &self.chart
    }

    pub fn post_momo(&self, req: &MomoPostingRequest) -> PostingOutcome {
        let operation = req.transaction_type.as_str();
        let details = format!(
            "momo {} {} GHS {} (fee {})",
            operation, req.transaction_id, req.amount, req.fee
        );
        let entries = match momo_entries(&self.chart, req) {
            Ok(entries) => entries,
            Err(e) => return self.reject(SourceModule::Momo, operation, details, e),
        };
        self.submit(
            SourceModule::Momo,
            operation,
            details,
            PostingCommand {
                date: today(),
                source_module: SourceModule::Momo,
                source_transaction_id: req.transaction_id.clone(),
                source_transaction_type: operation.to_string(),
                description: format!("MoMo {} - {}", operation, req.provider),
                created_by: req.processed_by.clone(),
                metadata: Some(serde_json::json!({
                    "provider": req.provider,
                    "phoneNumber": req.phone_number,
                    "branchId": req.branch_id,
                    "reference": req.reference,
                })),
                entries,
            },
        )
    }

    pub fn post_power(&self, req: &PowerPostingRequest) -> PostingOutcome {
        let details = format!(
            "power sale {} meter {} GHS {} (fee {})",
            req.transaction_id, req.meter_number, req.amount, req.fee
        );
        let entries = match power_entries(&self.chart, req) {
            Ok(entries) => entries,
            Err(e) => return self.reject(SourceModule::Power, "sale", details, e),
        };
        self.submit(
            SourceModule::Power,
            "sale",
            details,
            PostingCommand {
                date: today(),
                source_module: SourceModule::Power,
                source_transaction_id: req.transaction_id.clone(),
                source_transaction_type: "sale".to_string(),
                description: format!("Power sale - {} - meter {}", req.provider, req.meter_number),
                created_by: req.processed_by.clone(),
                metadata: Some(serde_json::json!({
                    "provider": req.provider,
                    "meterNumber": req.meter_number,
                    "branchId": req.branch_id,
                    "reference": req.reference,
                })),
                entries,
            },
        )
    }

    pub fn post_ezwich(&self, req: &EzwichPostingRequest) -> PostingOutcome {
        let operation = req.transaction_type.as_str();
        let details = format!(
            "ezwich {} {} GHS {} (fee {})",
            operation, req.transaction_id, req.amount, req.fee
        );
        let entries = match ezwich_entries(&self.chart, req) {
            Ok(entries) => entries,
            Err(e) => return self.reject(SourceModule::Ezwich, operation, details, e),
        };
        self.submit(
            SourceModule::Ezwich,
            operation,
            details,
            PostingCommand {
                date: today(),
                source_module: SourceModule::Ezwich,
                source_transaction_id: req.transaction_id.clone(),
                source_transaction_type: operation.to_string(),
                description: format!("E-Zwich {} - {}", operation, req.customer_name),
                created_by: req.processed_by.clone(),
                metadata: Some(serde_json::json!({
                    "cardNumber": req.card_number,
                    "branchId": req.branch_id,
                    "reference": req.reference,
                })),
                entries,
            },
        )
    }

    pub fn post_card_batch(&self, req: &CardBatchPostingRequest) -> PostingOutcome {
        let operation = req.operation.as_str();
        let details = format!(
            "card batch {} {} ({} cards @ {})",
            operation, req.batch_code, req.quantity_received, req.unit_cost
        );
        let entries = match card_batch_entries(&self.chart, req) {
            Ok(entries) => entries,
            Err(e) => return self.reject(SourceModule::EzwichBatch, operation, details, e),
        };
        self.submit(
            SourceModule::EzwichBatch,
            operation,
            details,
            PostingCommand {
                date: today(),
                source_module: SourceModule::EzwichBatch,
                // Create, update and delete of the same batch are distinct
                // ledger events, so the operation is part of the key.
                source_transaction_id: format!("{}:{}", req.batch_id, operation),
                source_transaction_type: operation.to_string(),
                description: format!("Card batch {} - {}", operation, req.batch_code),
                created_by: req.user_id.clone(),
                metadata: Some(serde_json::json!({
                    "batchId": req.batch_id,
                    "batchCode": req.batch_code,
                    "branchId": req.branch_id,
                })),
                entries,
            },
        )
    }

    pub fn accounts_with_balances(&self) -> Result<Vec<AccountView>, StorageError> {
        let accounts = self.storage.list_accounts()?;
        let mut views = Vec::with_capacity(accounts.len());
        for Account {
            code,
            name,
            account_type,
            active,
            ..
        } in accounts
        {
            let balance = self.storage.account_balance(&code)?;
            views.push(AccountView {
                code,
                name,
                account_type,
                active,
                balance,
            });
        }
        Ok(views)
    }

    pub fn storage(&self) -> &dyn LedgerStorage {
        self.storage.as_ref()
    }

    /// Validate and commit a generated command, logging the outcome.
    fn submit(
        &self,
        module: SourceModule,
        operation: &str,
        details: String,
        command: PostingCommand,
    ) -> PostingOutcome {
        if command.entries.is_empty() {
            tracing::debug!(module = %module, operation, "No entries generated, skipping");
            SyncLogger::record(
                self.storage.as_ref(),
                module,
                operation,
                SyncStatus::Skipped,
                details,
                None,
            );
            return PostingOutcome::skipped();
        }

        if let Err(e) = validate_balanced(&command.entries) {
            return self.reject(module, operation, details, e);
        }

        // Cheap pre-check; the storage unique constraint remains the
        // authority under concurrency.
        match self
            .storage
            .find_posted(module, &command.source_transaction_id)
        {
            Ok(Some(existing)) => {
                tracing::debug!(
                    module = %module,
                    source_transaction_id = %command.source_transaction_id,
                    ledger_transaction_id = %existing,
                    "Source transaction already posted"
                );
                SyncLogger::record(
                    self.storage.as_ref(),
                    module,
                    operation,
                    SyncStatus::Success,
                    format!("{} (already posted)", details),
                    None,
                );
                return PostingOutcome::posted(existing);
            }
            Ok(None) => {}
            Err(e) => return self.reject(module, operation, details, e),
        }

        match self.storage.post(&command) {
            Ok(id) => {
                tracing::info!(
                    module = %module,
                    operation,
                    ledger_transaction_id = %id,
                    entries = command.entries.len(),
                    "Posting committed"
                );
                SyncLogger::record(
                    self.storage.as_ref(),
                    module,
                    operation,
                    SyncStatus::Success,
                    details,
                    None,
                );
                PostingOutcome::posted(id)
            }
            Err(StorageError::DuplicatePosting(existing)) => {
                SyncLogger::record(
                    self.storage.as_ref(),
                    module,
                    operation,
                    SyncStatus::Success,
                    format!("{} (already posted)", details),
                    None,
                );
                PostingOutcome::posted(existing)
            }
            Err(e) => self.reject(module, operation, details, e),
        }
    }

    fn reject(
        &self,
        module: SourceModule,
        operation: &str,
        details: String,
        error: impl Into<PostingError>,
    ) -> PostingOutcome {
        let error = error.into();
        tracing::warn!(module = %module, operation, error = %error, "Posting failed");
        SyncLogger::record(
            self.storage.as_ref(),
            module,
            operation,
            SyncStatus::Failed,
            details,
            Some(error.to_string()),
        );
        PostingOutcome::failed(error)
    }
}

fn today() -> time::Date {
    OffsetDateTime::now_utc().date()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::requests::MomoTransactionType;
    use crate::storage::InMemoryStorage;
    use rust_decimal_macros::dec;

    fn engine() -> PostingEngine {
        let engine = PostingEngine::new(
            Arc::new(InMemoryStorage::new()),
            ChartConfig::builtin(),
        );
        engine.bootstrap().unwrap();
        engine
    }

    fn cash_in(transaction_id: &str) -> MomoPostingRequest {
        MomoPostingRequest {
            transaction_id: transaction_id.to_string(),
            transaction_type: MomoTransactionType::CashIn,
            amount: dec!(100.00),
            fee: dec!(5.00),
            provider: "MTN".to_string(),
            phone_number: "0244000000".to_string(),
            customer_name: "Ama Mensah".to_string(),
            reference: None,
            processed_by: "teller-1".to_string(),
            branch_id: "BR-01".to_string(),
        }
    }

    #[test]
    fn momo_posting_commits_and_updates_balances() {
        let engine = engine();
        let outcome = engine.post_momo(&cash_in("momo-1"));

        assert!(outcome.success);
        let id = outcome.ledger_transaction_id.unwrap();
        let entries = engine.storage().entries_for_transaction(id).unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(
            engine.storage().account_balance("1010-001").unwrap(),
            dec!(100.00)
        );
        assert_eq!(
            engine.storage().account_balance("1001").unwrap(),
            dec!(-95.00)
        );
    }

    #[test]
    fn replay_returns_original_transaction_id() {
        let engine = engine();
        let first = engine.post_momo(&cash_in("momo-1"));
        let second = engine.post_momo(&cash_in("momo-1"));

        assert!(second.success);
        assert_eq!(
            second.ledger_transaction_id,
            first.ledger_transaction_id
        );
        // Balances applied exactly once.
        assert_eq!(
            engine.storage().account_balance("1010-001").unwrap(),
            dec!(100.00)
        );
    }

    #[test]
    fn generator_failure_yields_failed_outcome_and_log_entry() {
        let engine = engine();
        let mut req = cash_in("momo-1");
        req.provider = "Glo".to_string();

        let outcome = engine.post_momo(&req);
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("unknown momo provider"));

        let log = engine.storage().sync_log().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].status, SyncStatus::Failed);
    }

    #[test]
    fn empty_entry_set_is_skipped() {
        use crate::models::requests::{BatchOperation, CardBatchPostingRequest};
        let engine = engine();
        let req = CardBatchPostingRequest {
            operation: BatchOperation::Update,
            batch_id: "batch-1".to_string(),
            batch_code: "EZ-2024-07".to_string(),
            quantity_received: 100,
            old_quantity: Some(100),
            unit_cost: dec!(10.00),
            user_id: "admin-1".to_string(),
            branch_id: "BR-01".to_string(),
        };

        let outcome = engine.post_card_batch(&req);
        assert!(outcome.success);
        assert!(outcome.ledger_transaction_id.is_none());

        let log = engine.storage().sync_log().unwrap();
        assert_eq!(log[0].status, SyncStatus::Skipped);
    }

    #[test]
    fn card_batch_operations_use_distinct_idempotency_keys() {
        use crate::models::requests::{BatchOperation, CardBatchPostingRequest};
        let engine = engine();
        let create = CardBatchPostingRequest {
            operation: BatchOperation::Create,
            batch_id: "batch-1".to_string(),
            batch_code: "EZ-2024-07".to_string(),
            quantity_received: 100,
            old_quantity: None,
            unit_cost: dec!(10.00),
            user_id: "admin-1".to_string(),
            branch_id: "BR-01".to_string(),
        };
        let delete = CardBatchPostingRequest {
            operation: BatchOperation::Delete,
            ..create.clone()
        };

        let created = engine.post_card_batch(&create);
        let deleted = engine.post_card_batch(&delete);
        assert!(created.success && deleted.success);
        assert_ne!(
            created.ledger_transaction_id,
            deleted.ledger_transaction_id
        );
        // Create then delete nets inventory back to zero.
        assert_eq!(
            engine.storage().account_balance("1040").unwrap(),
            Decimal::ZERO
        );
    }
}

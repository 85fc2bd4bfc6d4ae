use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

pub mod requests;

/// High-level account classification within the chart of accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Asset,
    Liability,
    Expense,
    Revenue,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Asset => "asset",
            AccountType::Liability => "liability",
            AccountType::Expense => "expense",
            AccountType::Revenue => "revenue",
        }
    }

    pub fn parse(s: &str) -> Option<AccountType> {
        match s {
            "asset" => Some(AccountType::Asset),
            "liability" => Some(AccountType::Liability),
            "expense" => Some(AccountType::Expense),
            "revenue" => Some(AccountType::Revenue),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub active: bool,
}

/// Running balance for one account. Mutated only by the transaction poster.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountBalance {
    pub account_id: Uuid,
    pub balance: Decimal,
    pub last_updated: OffsetDateTime,
}

/// Domain tag identifying which business subsystem originated a posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceModule {
    Momo,
    Power,
    Ezwich,
    EzwichBatch,
}

impl SourceModule {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceModule::Momo => "momo",
            SourceModule::Power => "power",
            SourceModule::Ezwich => "ezwich",
            SourceModule::EzwichBatch => "ezwich_batch",
        }
    }

    pub fn parse(s: &str) -> Option<SourceModule> {
        match s {
            "momo" => Some(SourceModule::Momo),
            "power" => Some(SourceModule::Power),
            "ezwich" => Some(SourceModule::Ezwich),
            "ezwich_batch" => Some(SourceModule::EzwichBatch),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A posted, balanced group of ledger entries for one business event.
///
/// At most one exists per (source_module, source_transaction_id); rows are
/// never updated or deleted after posting. Corrections happen via new
/// offsetting transactions.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerTransaction {
    pub id: Uuid,
    pub date: Date,
    pub source_module: SourceModule,
    pub source_transaction_id: String,
    pub source_transaction_type: String,
    pub description: String,
    pub status: String,
    pub created_by: String,
    pub metadata: Option<serde_json::Value>,
}

/// Status value written for every ledger transaction. No draft or void
/// states are modeled.
pub const STATUS_POSTED: &str = "posted";

/// A candidate debit/credit line produced by an entry generator, not yet
/// bound to an account id or transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryDraft {
    pub account_code: String,
    pub debit: Decimal,
    pub credit: Decimal,
    pub description: String,
    pub metadata: Option<serde_json::Value>,
}

impl EntryDraft {
    pub fn debit(
        account_code: impl Into<String>,
        amount: Decimal,
        description: impl Into<String>,
    ) -> Self {
        Self {
            account_code: account_code.into(),
            debit: amount,
            credit: Decimal::ZERO,
            description: description.into(),
            metadata: None,
        }
    }

    pub fn credit(
        account_code: impl Into<String>,
        amount: Decimal,
        description: impl Into<String>,
    ) -> Self {
        Self {
            account_code: account_code.into(),
            debit: Decimal::ZERO,
            credit: amount,
            description: description.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A persisted journal line belonging to exactly one ledger transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub id: i64,
    pub transaction_id: Uuid,
    pub account_id: Uuid,
    pub account_code: String,
    pub debit: Decimal,
    pub credit: Decimal,
    pub description: String,
    pub metadata: Option<serde_json::Value>,
}

/// Everything the storage layer needs to persist one posting atomically.
#[derive(Debug, Clone, PartialEq)]
pub struct PostingCommand {
    pub date: Date,
    pub source_module: SourceModule,
    pub source_transaction_id: String,
    pub source_transaction_type: String,
    pub description: String,
    pub created_by: String,
    pub metadata: Option<serde_json::Value>,
    pub entries: Vec<EntryDraft>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Success,
    Failed,
    Skipped,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Success => "success",
            SyncStatus::Failed => "failed",
            SyncStatus::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<SyncStatus> {
        match s {
            "success" => Some(SyncStatus::Success),
            "failed" => Some(SyncStatus::Failed),
            "skipped" => Some(SyncStatus::Skipped),
            _ => None,
        }
    }
}

/// Append-only operational log row, written independently of the ledger
/// tables. A failure to write one never affects a posting result.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncLogEntry {
    pub module: String,
    pub operation: String,
    pub status: SyncStatus,
    pub details: String,
    pub error: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Result returned to callers for every posting attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostingOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_transaction_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PostingOutcome {
    pub fn posted(id: Uuid) -> Self {
        Self {
            success: true,
            ledger_transaction_id: Some(id),
            error: None,
        }
    }

    /// Nothing to post (empty entry set). Treated as success without an id.
    pub fn skipped() -> Self {
        Self {
            success: true,
            ledger_transaction_id: None,
            error: None,
        }
    }

    pub fn failed(error: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            ledger_transaction_id: None,
            error: Some(error.to_string()),
        }
    }
}

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, RwLock};

use rust_decimal::Decimal;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::{
    Account, AccountBalance, AccountType, LedgerEntry, LedgerTransaction, PostingCommand,
    SourceModule, SyncLogEntry, STATUS_POSTED,
};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("ledger transaction not found: {0}")]
    TransactionNotFound(Uuid),

    /// A posting for the same (source_module, source_transaction_id) already
    /// exists. Carries the existing transaction id so callers can treat this
    /// as "already posted" rather than a failure.
    #[error("already posted as ledger transaction {0}")]
    DuplicatePosting(Uuid),

    #[error("{0}")]
    Other(String),
}

/// Persistence contract for the posting engine.
///
/// `post` is the only multi-row write and must be all-or-nothing: header,
/// entries and balance updates either all become visible or none do.
/// Implementations enforce uniqueness of `accounts.code` and of
/// `(source_module, source_transaction_id)` at the storage level, not just
/// via the read-check, so concurrent duplicates resolve to one posting.
pub trait LedgerStorage: Send + Sync {
    /// Create-if-absent under the unique code constraint; returns the id of
    /// the existing or newly created account.
    fn ensure_account(
        &self,
        code: &str,
        name: &str,
        account_type: AccountType,
    ) -> Result<Uuid, StorageError>;

    fn account_by_code(&self, code: &str) -> Result<Option<Account>, StorageError>;

    fn list_accounts(&self) -> Result<Vec<Account>, StorageError>;

    fn account_balance(&self, code: &str) -> Result<Decimal, StorageError>;

    /// Idempotency guard: id of the posted transaction for this source
    /// event, if one exists.
    fn find_posted(
        &self,
        source_module: SourceModule,
        source_transaction_id: &str,
    ) -> Result<Option<Uuid>, StorageError>;

    /// Atomically insert the transaction header and its entries and apply
    /// `balance += debit - credit` to each referenced account. Returns
    /// [`StorageError::DuplicatePosting`] when the source event was already
    /// posted, and [`StorageError::AccountNotFound`] (with nothing written)
    /// when an entry references an unregistered account code.
    fn post(&self, command: &PostingCommand) -> Result<Uuid, StorageError>;

    fn transaction_by_id(&self, id: Uuid) -> Result<LedgerTransaction, StorageError>;

    fn entries_for_transaction(&self, id: Uuid) -> Result<Vec<LedgerEntry>, StorageError>;

    /// Append-only operational log, independent of the ledger tables.
    fn append_sync_log(&self, entry: &SyncLogEntry) -> Result<(), StorageError>;

    fn sync_log(&self) -> Result<Vec<SyncLogEntry>, StorageError>;
}

#[derive(Default)]
struct Inner {
    accounts: BTreeMap<String, Account>,
    balances: HashMap<Uuid, AccountBalance>,
    transactions: HashMap<Uuid, LedgerTransaction>,
    entries: HashMap<Uuid, Vec<LedgerEntry>>,
    source_index: HashMap<(SourceModule, String), Uuid>,
    sync_log: Vec<SyncLogEntry>,
}

/// In-memory backend. Postings stage all rows first and apply them under a
/// single write guard, so a failure part-way through staging leaves nothing
/// behind.
pub struct InMemoryStorage {
    inner: RwLock<Inner>,
    entry_seq: AtomicI64,
    fail_after_entries: Mutex<Option<usize>>,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            entry_seq: AtomicI64::new(1),
            fail_after_entries: Mutex::new(None),
        }
    }

    /// Test hook: the next posting fails after staging this many entries.
    pub fn inject_failure_after(&self, entries: usize) {
        *self.fail_after_entries.lock().unwrap() = Some(entries);
    }

    fn next_entry_id(&self) -> i64 {
        self.entry_seq.fetch_add(1, Ordering::SeqCst)
    }
}

impl LedgerStorage for InMemoryStorage {
    fn ensure_account(
        &self,
        code: &str,
        name: &str,
        account_type: AccountType,
    ) -> Result<Uuid, StorageError> {
        let mut inner = self.inner.write().unwrap();
        if let Some(existing) = inner.accounts.get(code) {
            return Ok(existing.id);
        }
        let account = Account {
            id: Uuid::new_v4(),
            code: code.to_string(),
            name: name.to_string(),
            account_type,
            active: true,
        };
        let id = account.id;
        inner.balances.insert(
            id,
            AccountBalance {
                account_id: id,
                balance: Decimal::ZERO,
                last_updated: OffsetDateTime::now_utc(),
            },
        );
        inner.accounts.insert(code.to_string(), account);
        Ok(id)
    }

    fn account_by_code(&self, code: &str) -> Result<Option<Account>, StorageError> {
        Ok(self.inner.read().unwrap().accounts.get(code).cloned())
    }

    fn list_accounts(&self) -> Result<Vec<Account>, StorageError> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .accounts
            .values()
            .cloned()
            .collect())
    }

    fn account_balance(&self, code: &str) -> Result<Decimal, StorageError> {
        let inner = self.inner.read().unwrap();
        let account = inner
            .accounts
            .get(code)
            .ok_or_else(|| StorageError::AccountNotFound(code.to_string()))?;
        Ok(inner
            .balances
            .get(&account.id)
            .map(|b| b.balance)
            .unwrap_or(Decimal::ZERO))
    }

    fn find_posted(
        &self,
        source_module: SourceModule,
        source_transaction_id: &str,
    ) -> Result<Option<Uuid>, StorageError> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .source_index
            .get(&(source_module, source_transaction_id.to_string()))
            .copied())
    }

    fn post(&self, command: &PostingCommand) -> Result<Uuid, StorageError> {
        let fail_after = self.fail_after_entries.lock().unwrap().take();
        let mut inner = self.inner.write().unwrap();

        let key = (command.source_module, command.source_transaction_id.clone());
        if let Some(existing) = inner.source_index.get(&key) {
            return Err(StorageError::DuplicatePosting(*existing));
        }

        let transaction_id = Uuid::new_v4();

        // Stage everything before touching the maps, so account resolution
        // failures or the injected test failure leave no partial state.
        let mut staged_entries: Vec<LedgerEntry> = Vec::with_capacity(command.entries.len());
        let mut deltas: HashMap<Uuid, Decimal> = HashMap::new();
        for (n, draft) in command.entries.iter().enumerate() {
            if let Some(limit) = fail_after {
                if n >= limit {
                    return Err(StorageError::Other("injected failure".to_string()));
                }
            }
            let account = inner
                .accounts
                .get(&draft.account_code)
                .ok_or_else(|| StorageError::AccountNotFound(draft.account_code.clone()))?;
            staged_entries.push(LedgerEntry {
                id: self.next_entry_id(),
                transaction_id,
                account_id: account.id,
                account_code: draft.account_code.clone(),
                debit: draft.debit,
                credit: draft.credit,
                description: draft.description.clone(),
                metadata: draft.metadata.clone(),
            });
            *deltas.entry(account.id).or_insert(Decimal::ZERO) += draft.debit - draft.credit;
        }

        let now = OffsetDateTime::now_utc();
        for (account_id, delta) in deltas {
            let balance = inner.balances.entry(account_id).or_insert(AccountBalance {
                account_id,
                balance: Decimal::ZERO,
                last_updated: now,
            });
            balance.balance += delta;
            balance.last_updated = now;
        }

        inner.transactions.insert(
            transaction_id,
            LedgerTransaction {
                id: transaction_id,
                date: command.date,
                source_module: command.source_module,
                source_transaction_id: command.source_transaction_id.clone(),
                source_transaction_type: command.source_transaction_type.clone(),
                description: command.description.clone(),
                status: STATUS_POSTED.to_string(),
                created_by: command.created_by.clone(),
                metadata: command.metadata.clone(),
            },
        );
        inner.entries.insert(transaction_id, staged_entries);
        inner.source_index.insert(key, transaction_id);

        tracing::debug!(
            transaction_id = %transaction_id,
            source_module = %command.source_module,
            entries = command.entries.len(),
            "Ledger transaction posted"
        );
        Ok(transaction_id)
    }

    fn transaction_by_id(&self, id: Uuid) -> Result<LedgerTransaction, StorageError> {
        self.inner
            .read()
            .unwrap()
            .transactions
            .get(&id)
            .cloned()
            .ok_or(StorageError::TransactionNotFound(id))
    }

    fn entries_for_transaction(&self, id: Uuid) -> Result<Vec<LedgerEntry>, StorageError> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .entries
            .get(&id)
            .cloned()
            .unwrap_or_default())
    }

    fn append_sync_log(&self, entry: &SyncLogEntry) -> Result<(), StorageError> {
        self.inner.write().unwrap().sync_log.push(entry.clone());
        Ok(())
    }

    fn sync_log(&self) -> Result<Vec<SyncLogEntry>, StorageError> {
        Ok(self.inner.read().unwrap().sync_log.clone())
    }
}

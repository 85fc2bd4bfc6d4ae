use std::str::FromStr;
use std::sync::Mutex;

use postgres::error::SqlState;
use postgres::{Client, NoTls, Transaction};
use rust_decimal::Decimal;
use time::{Date, Month, OffsetDateTime};
use uuid::Uuid;

use crate::models::{
    Account, AccountType, LedgerEntry, LedgerTransaction, PostingCommand, SourceModule,
    SyncLogEntry, SyncStatus, STATUS_POSTED,
};
use crate::storage::{LedgerStorage, StorageError};

pub struct PostgresStorage {
    client: Mutex<Client>,
}

impl PostgresStorage {
    pub fn new(connection_string: &str) -> Result<Self, StorageError> {
        let client = Client::connect(connection_string, NoTls)
            .map_err(|e| StorageError::Other(e.to_string()))?;
        let storage = Self {
            client: Mutex::new(client),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let mut client = self.client.lock().unwrap();
        client
            .batch_execute(
                "
                CREATE TABLE IF NOT EXISTS accounts (
                    id TEXT PRIMARY KEY,
                    code TEXT NOT NULL UNIQUE,
                    name TEXT NOT NULL,
                    account_type TEXT NOT NULL,
                    active BOOLEAN NOT NULL DEFAULT TRUE
                );

                CREATE TABLE IF NOT EXISTS account_balances (
                    account_id TEXT PRIMARY KEY REFERENCES accounts(id),
                    balance TEXT NOT NULL,
                    last_updated BIGINT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS ledger_transactions (
                    id TEXT PRIMARY KEY,
                    date TEXT NOT NULL,
                    source_module TEXT NOT NULL,
                    source_transaction_id TEXT NOT NULL,
                    source_transaction_type TEXT NOT NULL,
                    description TEXT NOT NULL,
                    status TEXT NOT NULL,
                    created_by TEXT NOT NULL,
                    metadata TEXT,
                    UNIQUE (source_module, source_transaction_id)
                );

                CREATE TABLE IF NOT EXISTS ledger_entries (
                    id BIGSERIAL PRIMARY KEY,
                    transaction_id TEXT NOT NULL REFERENCES ledger_transactions(id),
                    account_id TEXT NOT NULL REFERENCES accounts(id),
                    account_code TEXT NOT NULL,
                    debit TEXT NOT NULL,
                    credit TEXT NOT NULL,
                    description TEXT NOT NULL,
                    metadata TEXT
                );

                CREATE TABLE IF NOT EXISTS sync_log (
                    id BIGSERIAL PRIMARY KEY,
                    module TEXT NOT NULL,
                    operation TEXT NOT NULL,
                    status TEXT NOT NULL,
                    details TEXT NOT NULL,
                    error TEXT,
                    created_at BIGINT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_entries_transaction
                    ON ledger_entries(transaction_id);

                CREATE INDEX IF NOT EXISTS idx_entries_account
                    ON ledger_entries(account_id);
                ",
            )
            .map_err(|e| StorageError::Other(e.to_string()))?;
        Ok(())
    }

    fn find_posted_in(
        tx: &mut Transaction,
        source_module: SourceModule,
        source_transaction_id: &str,
    ) -> Result<Option<Uuid>, StorageError> {
        let row = tx
            .query_opt(
                "SELECT id FROM ledger_transactions
                 WHERE source_module = $1 AND source_transaction_id = $2",
                &[&source_module.as_str(), &source_transaction_id],
            )
            .map_err(|e| StorageError::Other(e.to_string()))?;
        match row {
            Some(row) => Ok(Some(parse_uuid(row.get(0))?)),
            None => Ok(None),
        }
    }
}

fn date_to_str(d: Date) -> String {
    format!("{:04}-{:02}-{:02}", d.year(), d.month() as u8, d.day())
}

fn parse_date(s: &str) -> Result<Date, StorageError> {
    let mut parts = s.splitn(3, '-');
    let bad = || StorageError::Other(format!("invalid date: {}", s));
    let year: i32 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(bad)?;
    let month: u8 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(bad)?;
    let day: u8 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(bad)?;
    let month = Month::try_from(month).map_err(|_| bad())?;
    Date::from_calendar_date(year, month, day).map_err(|_| bad())
}

fn parse_uuid(s: &str) -> Result<Uuid, StorageError> {
    Uuid::parse_str(s).map_err(|e| StorageError::Other(format!("invalid uuid {}: {}", s, e)))
}

fn parse_decimal(s: &str) -> Result<Decimal, StorageError> {
    Decimal::from_str(s).map_err(|e| StorageError::Other(format!("invalid decimal {}: {}", s, e)))
}

fn is_unique_violation(e: &postgres::Error) -> bool {
    e.code() == Some(&SqlState::UNIQUE_VIOLATION)
}

impl LedgerStorage for PostgresStorage {
    fn ensure_account(
        &self,
        code: &str,
        name: &str,
        account_type: AccountType,
    ) -> Result<Uuid, StorageError> {
        let mut client = self.client.lock().unwrap();
        let mut tx = client
            .transaction()
            .map_err(|e| StorageError::Other(e.to_string()))?;

        tx.execute(
            "INSERT INTO accounts (id, code, name, account_type, active)
             VALUES ($1, $2, $3, $4, TRUE)
             ON CONFLICT (code) DO NOTHING",
            &[
                &Uuid::new_v4().to_string(),
                &code,
                &name,
                &account_type.as_str(),
            ],
        )
        .map_err(|e| StorageError::Other(e.to_string()))?;

        let row = tx
            .query_one("SELECT id FROM accounts WHERE code = $1", &[&code])
            .map_err(|e| StorageError::Other(e.to_string()))?;
        let id: String = row.get(0);

        tx.execute(
            "INSERT INTO account_balances (account_id, balance, last_updated)
             VALUES ($1, '0', $2)
             ON CONFLICT (account_id) DO NOTHING",
            &[&id, &OffsetDateTime::now_utc().unix_timestamp()],
        )
        .map_err(|e| StorageError::Other(e.to_string()))?;

        tx.commit().map_err(|e| StorageError::Other(e.to_string()))?;
        parse_uuid(&id)
    }

    fn account_by_code(&self, code: &str) -> Result<Option<Account>, StorageError> {
        let mut client = self.client.lock().unwrap();
        let row = client
            .query_opt(
                "SELECT id, code, name, account_type, active FROM accounts WHERE code = $1",
                &[&code],
            )
            .map_err(|e| StorageError::Other(e.to_string()))?;

        match row {
            Some(row) => {
                let account_type: String = row.get(3);
                Ok(Some(Account {
                    id: parse_uuid(row.get(0))?,
                    code: row.get(1),
                    name: row.get(2),
                    account_type: AccountType::parse(&account_type).ok_or_else(|| {
                        StorageError::Other(format!("invalid account type: {}", account_type))
                    })?,
                    active: row.get(4),
                }))
            }
            None => Ok(None),
        }
    }

    fn list_accounts(&self) -> Result<Vec<Account>, StorageError> {
        let mut client = self.client.lock().unwrap();
        let rows = client
            .query(
                "SELECT id, code, name, account_type, active FROM accounts ORDER BY code",
                &[],
            )
            .map_err(|e| StorageError::Other(e.to_string()))?;

        let mut accounts = Vec::new();
        for row in rows {
            let account_type: String = row.get(3);
            accounts.push(Account {
                id: parse_uuid(row.get(0))?,
                code: row.get(1),
                name: row.get(2),
                account_type: AccountType::parse(&account_type).ok_or_else(|| {
                    StorageError::Other(format!("invalid account type: {}", account_type))
                })?,
                active: row.get(4),
            });
        }
        Ok(accounts)
    }

    fn account_balance(&self, code: &str) -> Result<Decimal, StorageError> {
        let mut client = self.client.lock().unwrap();
        let row = client
            .query_opt(
                "SELECT b.balance FROM account_balances b
                 JOIN accounts a ON a.id = b.account_id
                 WHERE a.code = $1",
                &[&code],
            )
            .map_err(|e| StorageError::Other(e.to_string()))?;
        match row {
            Some(row) => parse_decimal(row.get(0)),
            None => Err(StorageError::AccountNotFound(code.to_string())),
        }
    }

    fn find_posted(
        &self,
        source_module: SourceModule,
        source_transaction_id: &str,
    ) -> Result<Option<Uuid>, StorageError> {
        let mut client = self.client.lock().unwrap();
        let row = client
            .query_opt(
                "SELECT id FROM ledger_transactions
                 WHERE source_module = $1 AND source_transaction_id = $2",
                &[&source_module.as_str(), &source_transaction_id],
            )
            .map_err(|e| StorageError::Other(e.to_string()))?;
        match row {
            Some(row) => Ok(Some(parse_uuid(row.get(0))?)),
            None => Ok(None),
        }
    }

    fn post(&self, command: &PostingCommand) -> Result<Uuid, StorageError> {
        let mut client = self.client.lock().unwrap();
        let mut tx = client
            .transaction()
            .map_err(|e| StorageError::Other(e.to_string()))?;

        if let Some(existing) =
            Self::find_posted_in(&mut tx, command.source_module, &command.source_transaction_id)?
        {
            return Err(StorageError::DuplicatePosting(existing));
        }

        let transaction_id = Uuid::new_v4();
        let header = tx.execute(
            "INSERT INTO ledger_transactions
             (id, date, source_module, source_transaction_id, source_transaction_type,
              description, status, created_by, metadata)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            &[
                &transaction_id.to_string(),
                &date_to_str(command.date),
                &command.source_module.as_str(),
                &command.source_transaction_id,
                &command.source_transaction_type,
                &command.description,
                &STATUS_POSTED,
                &command.created_by,
                &command.metadata.as_ref().map(|m| m.to_string()),
            ],
        );
        if let Err(e) = header {
            // A concurrent writer can slip past the read-check; the unique
            // constraint is authoritative.
            if is_unique_violation(&e) {
                drop(tx);
                drop(client);
                let existing = self
                    .find_posted(command.source_module, &command.source_transaction_id)?
                    .ok_or_else(|| StorageError::Other(e.to_string()))?;
                return Err(StorageError::DuplicatePosting(existing));
            }
            return Err(StorageError::Other(e.to_string()));
        }

        let now = OffsetDateTime::now_utc().unix_timestamp();
        for draft in &command.entries {
            let row = tx
                .query_opt(
                    "SELECT id FROM accounts WHERE code = $1",
                    &[&draft.account_code],
                )
                .map_err(|e| StorageError::Other(e.to_string()))?
                .ok_or_else(|| StorageError::AccountNotFound(draft.account_code.clone()))?;
            let account_id: String = row.get(0);

            tx.execute(
                "INSERT INTO ledger_entries
                 (transaction_id, account_id, account_code, debit, credit, description, metadata)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
                &[
                    &transaction_id.to_string(),
                    &account_id,
                    &draft.account_code,
                    &draft.debit.to_string(),
                    &draft.credit.to_string(),
                    &draft.description,
                    &draft.metadata.as_ref().map(|m| m.to_string()),
                ],
            )
            .map_err(|e| StorageError::Other(e.to_string()))?;

            let current = tx
                .query_opt(
                    "SELECT balance FROM account_balances WHERE account_id = $1 FOR UPDATE",
                    &[&account_id],
                )
                .map_err(|e| StorageError::Other(e.to_string()))?
                .map(|row| parse_decimal(row.get(0)))
                .transpose()?
                .unwrap_or(Decimal::ZERO);

            let updated = current + draft.debit - draft.credit;
            tx.execute(
                "INSERT INTO account_balances (account_id, balance, last_updated)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (account_id) DO UPDATE
                 SET balance = EXCLUDED.balance, last_updated = EXCLUDED.last_updated",
                &[&account_id, &updated.to_string(), &now],
            )
            .map_err(|e| StorageError::Other(e.to_string()))?;
        }

        tx.commit().map_err(|e| StorageError::Other(e.to_string()))?;
        tracing::debug!(
            transaction_id = %transaction_id,
            source_module = %command.source_module,
            entries = command.entries.len(),
            "Ledger transaction committed"
        );
        Ok(transaction_id)
    }

    fn transaction_by_id(&self, id: Uuid) -> Result<LedgerTransaction, StorageError> {
        let mut client = self.client.lock().unwrap();
        let row = client
            .query_opt(
                "SELECT date, source_module, source_transaction_id, source_transaction_type,
                        description, status, created_by, metadata
                 FROM ledger_transactions WHERE id = $1",
                &[&id.to_string()],
            )
            .map_err(|e| StorageError::Other(e.to_string()))?
            .ok_or(StorageError::TransactionNotFound(id))?;

        let date: String = row.get(0);
        let module: String = row.get(1);
        let metadata: Option<String> = row.get(7);

        Ok(LedgerTransaction {
            id,
            date: parse_date(&date)?,
            source_module: SourceModule::parse(&module)
                .ok_or_else(|| StorageError::Other(format!("invalid source module: {}", module)))?,
            source_transaction_id: row.get(2),
            source_transaction_type: row.get(3),
            description: row.get(4),
            status: row.get(5),
            created_by: row.get(6),
            metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
        })
    }

    fn entries_for_transaction(&self, id: Uuid) -> Result<Vec<LedgerEntry>, StorageError> {
        let mut client = self.client.lock().unwrap();
        let rows = client
            .query(
                "SELECT id, account_id, account_code, debit, credit, description, metadata
                 FROM ledger_entries WHERE transaction_id = $1 ORDER BY id",
                &[&id.to_string()],
            )
            .map_err(|e| StorageError::Other(e.to_string()))?;

        let mut entries = Vec::new();
        for row in rows {
            let debit: String = row.get(3);
            let credit: String = row.get(4);
            let metadata: Option<String> = row.get(6);
            entries.push(LedgerEntry {
                id: row.get(0),
                transaction_id: id,
                account_id: parse_uuid(row.get(1))?,
                account_code: row.get(2),
                debit: parse_decimal(&debit)?,
                credit: parse_decimal(&credit)?,
                description: row.get(5),
                metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
            });
        }
        Ok(entries)
    }

    fn append_sync_log(&self, entry: &SyncLogEntry) -> Result<(), StorageError> {
        let mut client = self.client.lock().unwrap();
        client
            .execute(
                "INSERT INTO sync_log (module, operation, status, details, error, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6)",
                &[
                    &entry.module,
                    &entry.operation,
                    &entry.status.as_str(),
                    &entry.details,
                    &entry.error,
                    &entry.created_at.unix_timestamp(),
                ],
            )
            .map_err(|e| StorageError::Other(e.to_string()))?;
        Ok(())
    }

    fn sync_log(&self) -> Result<Vec<SyncLogEntry>, StorageError> {
        let mut client = self.client.lock().unwrap();
        let rows = client
            .query(
                "SELECT module, operation, status, details, error, created_at
                 FROM sync_log ORDER BY id",
                &[],
            )
            .map_err(|e| StorageError::Other(e.to_string()))?;

        let mut entries = Vec::new();
        for row in rows {
            let status: String = row.get(2);
            let created_at: i64 = row.get(5);
            entries.push(SyncLogEntry {
                module: row.get(0),
                operation: row.get(1),
                status: SyncStatus::parse(&status).ok_or_else(|| {
                    StorageError::Other(format!("invalid sync status: {}", status))
                })?,
                details: row.get(3),
                error: row.get(4),
                created_at: OffsetDateTime::from_unix_timestamp(created_at)
                    .unwrap_or(OffsetDateTime::UNIX_EPOCH),
            });
        }
        Ok(entries)
    }
}

use std::str::FromStr;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use rust_decimal::Decimal;
use time::{Date, Month, OffsetDateTime};
use uuid::Uuid;

use crate::models::{
    Account, AccountType, LedgerEntry, LedgerTransaction, PostingCommand, SourceModule,
    SyncLogEntry, SyncStatus, STATUS_POSTED,
};
use crate::storage::{LedgerStorage, StorageError};

pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn new(path: &str) -> Result<Self, StorageError> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .map_err(|e| StorageError::Other(e.to_string()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| StorageError::Other(e.to_string()))?;

        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                code TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                account_type TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS account_balances (
                account_id TEXT PRIMARY KEY,
                balance TEXT NOT NULL,
                last_updated INTEGER NOT NULL,
                FOREIGN KEY (account_id) REFERENCES accounts(id)
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
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                transaction_id TEXT NOT NULL,
                account_id TEXT NOT NULL,
                account_code TEXT NOT NULL,
                debit TEXT NOT NULL,
                credit TEXT NOT NULL,
                description TEXT NOT NULL,
                metadata TEXT,
                FOREIGN KEY (transaction_id) REFERENCES ledger_transactions(id),
                FOREIGN KEY (account_id) REFERENCES accounts(id)
            );

            CREATE TABLE IF NOT EXISTS sync_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                module TEXT NOT NULL,
                operation TEXT NOT NULL,
                status TEXT NOT NULL,
                details TEXT NOT NULL,
                error TEXT,
                created_at INTEGER NOT NULL
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
        tx: &Transaction,
        source_module: SourceModule,
        source_transaction_id: &str,
    ) -> Result<Option<Uuid>, StorageError> {
        let id: Option<String> = tx
            .query_row(
                "SELECT id FROM ledger_transactions
                 WHERE source_module = ?1 AND source_transaction_id = ?2",
                params![source_module.as_str(), source_transaction_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StorageError::Other(e.to_string()))?;
        match id {
            Some(id) => Ok(Some(parse_uuid(&id)?)),
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

fn timestamp(t: OffsetDateTime) -> i64 {
    t.unix_timestamp()
}

fn from_timestamp(ts: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(ts).unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

impl LedgerStorage for SqliteStorage {
    fn ensure_account(
        &self,
        code: &str,
        name: &str,
        account_type: AccountType,
    ) -> Result<Uuid, StorageError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction()
            .map_err(|e| StorageError::Other(e.to_string()))?;

        // Create-if-absent: the unique code constraint makes concurrent
        // bootstrap safe, INSERT OR IGNORE swallows the duplicate.
        tx.execute(
            "INSERT OR IGNORE INTO accounts (id, code, name, account_type, active)
             VALUES (?1, ?2, ?3, ?4, 1)",
            params![
                Uuid::new_v4().to_string(),
                code,
                name,
                account_type.as_str()
            ],
        )
        .map_err(|e| StorageError::Other(e.to_string()))?;

        let id: String = tx
            .query_row("SELECT id FROM accounts WHERE code = ?1", [code], |row| {
                row.get(0)
            })
            .map_err(|e| StorageError::Other(e.to_string()))?;

        tx.execute(
            "INSERT OR IGNORE INTO account_balances (account_id, balance, last_updated)
             VALUES (?1, '0', ?2)",
            params![id, timestamp(OffsetDateTime::now_utc())],
        )
        .map_err(|e| StorageError::Other(e.to_string()))?;

        tx.commit().map_err(|e| StorageError::Other(e.to_string()))?;
        parse_uuid(&id)
    }

    fn account_by_code(&self, code: &str) -> Result<Option<Account>, StorageError> {
        let conn = self.conn.lock().unwrap();
        let row: Option<(String, String, String, String, bool)> = conn
            .query_row(
                "SELECT id, code, name, account_type, active FROM accounts WHERE code = ?1",
                [code],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| StorageError::Other(e.to_string()))?;

        match row {
            Some((id, code, name, account_type, active)) => Ok(Some(Account {
                id: parse_uuid(&id)?,
                code,
                name,
                account_type: AccountType::parse(&account_type)
                    .ok_or_else(|| StorageError::Other(format!("invalid account type: {}", account_type)))?,
                active,
            })),
            None => Ok(None),
        }
    }

    fn list_accounts(&self) -> Result<Vec<Account>, StorageError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT id, code, name, account_type, active FROM accounts ORDER BY code")
            .map_err(|e| StorageError::Other(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, bool>(4)?,
                ))
            })
            .map_err(|e| StorageError::Other(e.to_string()))?;

        let mut accounts = Vec::new();
        for row in rows {
            let (id, code, name, account_type, active) =
                row.map_err(|e| StorageError::Other(e.to_string()))?;
            accounts.push(Account {
                id: parse_uuid(&id)?,
                code,
                name,
                account_type: AccountType::parse(&account_type)
                    .ok_or_else(|| StorageError::Other(format!("invalid account type: {}", account_type)))?,
                active,
            });
        }
        Ok(accounts)
    }

    fn account_balance(&self, code: &str) -> Result<Decimal, StorageError> {
        let conn = self.conn.lock().unwrap();
        let balance: Option<String> = conn
            .query_row(
                "SELECT b.balance FROM account_balances b
                 JOIN accounts a ON a.id = b.account_id
                 WHERE a.code = ?1",
                [code],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StorageError::Other(e.to_string()))?;
        match balance {
            Some(b) => parse_decimal(&b),
            None => Err(StorageError::AccountNotFound(code.to_string())),
        }
    }

    fn find_posted(
        &self,
        source_module: SourceModule,
        source_transaction_id: &str,
    ) -> Result<Option<Uuid>, StorageError> {
        let conn = self.conn.lock().unwrap();
        let id: Option<String> = conn
            .query_row(
                "SELECT id FROM ledger_transactions
                 WHERE source_module = ?1 AND source_transaction_id = ?2",
                params![source_module.as_str(), source_transaction_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StorageError::Other(e.to_string()))?;
        match id {
            Some(id) => Ok(Some(parse_uuid(&id)?)),
            None => Ok(None),
        }
    }

    fn post(&self, command: &PostingCommand) -> Result<Uuid, StorageError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction()
            .map_err(|e| StorageError::Other(e.to_string()))?;

        if let Some(existing) =
            Self::find_posted_in(&tx, command.source_module, &command.source_transaction_id)?
        {
            return Err(StorageError::DuplicatePosting(existing));
        }

        let transaction_id = Uuid::new_v4();
        let header = tx.execute(
            "INSERT INTO ledger_transactions
             (id, date, source_module, source_transaction_id, source_transaction_type,
              description, status, created_by, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                transaction_id.to_string(),
                date_to_str(command.date),
                command.source_module.as_str(),
                command.source_transaction_id,
                command.source_transaction_type,
                command.description,
                STATUS_POSTED,
                command.created_by,
                command.metadata.as_ref().map(|m| m.to_string()),
            ],
        );
        match header {
            Ok(_) => {}
            // The unique constraint closes the race the read-check leaves
            // open; the losing insert resolves to the winner's id.
            Err(e) if is_constraint_violation(&e) => {
                let existing = Self::find_posted_in(
                    &tx,
                    command.source_module,
                    &command.source_transaction_id,
                )?
                .ok_or_else(|| StorageError::Other(e.to_string()))?;
                return Err(StorageError::DuplicatePosting(existing));
            }
            Err(e) => return Err(StorageError::Other(e.to_string())),
        }

        let now = timestamp(OffsetDateTime::now_utc());
        for draft in &command.entries {
            let account_id: String = tx
                .query_row(
                    "SELECT id FROM accounts WHERE code = ?1",
                    [draft.account_code.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| StorageError::Other(e.to_string()))?
                .ok_or_else(|| StorageError::AccountNotFound(draft.account_code.clone()))?;

            tx.execute(
                "INSERT INTO ledger_entries
                 (transaction_id, account_id, account_code, debit, credit, description, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    transaction_id.to_string(),
                    account_id,
                    draft.account_code,
                    draft.debit.to_string(),
                    draft.credit.to_string(),
                    draft.description,
                    draft.metadata.as_ref().map(|m| m.to_string()),
                ],
            )
            .map_err(|e| StorageError::Other(e.to_string()))?;

            let current: Decimal = tx
                .query_row(
                    "SELECT balance FROM account_balances WHERE account_id = ?1",
                    [account_id.as_str()],
                    |row| row.get::<_, String>(0),
                )
                .optional()
                .map_err(|e| StorageError::Other(e.to_string()))?
                .map(|b| parse_decimal(&b))
                .transpose()?
                .unwrap_or(Decimal::ZERO);

            let updated = current + draft.debit - draft.credit;
            tx.execute(
                "INSERT INTO account_balances (account_id, balance, last_updated)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (account_id) DO UPDATE
                 SET balance = excluded.balance, last_updated = excluded.last_updated",
                params![account_id, updated.to_string(), now],
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
        let conn = self.conn.lock().unwrap();
        let row: Option<(String, String, String, String, String, String, String, Option<String>)> =
            conn.query_row(
                "SELECT date, source_module, source_transaction_id, source_transaction_type,
                        description, status, created_by, metadata
                 FROM ledger_transactions WHERE id = ?1",
                [id.to_string()],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| StorageError::Other(e.to_string()))?;

        let (date, module, source_transaction_id, source_transaction_type, description, status, created_by, metadata) =
            row.ok_or(StorageError::TransactionNotFound(id))?;

        Ok(LedgerTransaction {
            id,
            date: parse_date(&date)?,
            source_module: SourceModule::parse(&module)
                .ok_or_else(|| StorageError::Other(format!("invalid source module: {}", module)))?,
            source_transaction_id,
            source_transaction_type,
            description,
            status,
            created_by,
            metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
        })
    }

    fn entries_for_transaction(&self, id: Uuid) -> Result<Vec<LedgerEntry>, StorageError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, account_id, account_code, debit, credit, description, metadata
                 FROM ledger_entries WHERE transaction_id = ?1 ORDER BY id",
            )
            .map_err(|e| StorageError::Other(e.to_string()))?;
        let rows = stmt
            .query_map([id.to_string()], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, Option<String>>(6)?,
                ))
            })
            .map_err(|e| StorageError::Other(e.to_string()))?;

        let mut entries = Vec::new();
        for row in rows {
            let (entry_id, account_id, account_code, debit, credit, description, metadata) =
                row.map_err(|e| StorageError::Other(e.to_string()))?;
            entries.push(LedgerEntry {
                id: entry_id,
                transaction_id: id,
                account_id: parse_uuid(&account_id)?,
                account_code,
                debit: parse_decimal(&debit)?,
                credit: parse_decimal(&credit)?,
                description,
                metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
            });
        }
        Ok(entries)
    }

    fn append_sync_log(&self, entry: &SyncLogEntry) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO sync_log (module, operation, status, details, error, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.module,
                entry.operation,
                entry.status.as_str(),
                entry.details,
                entry.error,
                timestamp(entry.created_at),
            ],
        )
        .map_err(|e| StorageError::Other(e.to_string()))?;
        Ok(())
    }

    fn sync_log(&self) -> Result<Vec<SyncLogEntry>, StorageError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT module, operation, status, details, error, created_at
                 FROM sync_log ORDER BY id",
            )
            .map_err(|e| StorageError::Other(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            })
            .map_err(|e| StorageError::Other(e.to_string()))?;

        let mut entries = Vec::new();
        for row in rows {
            let (module, operation, status, details, error, created_at) =
                row.map_err(|e| StorageError::Other(e.to_string()))?;
            entries.push(SyncLogEntry {
                module,
                operation,
                status: SyncStatus::parse(&status)
                    .ok_or_else(|| StorageError::Other(format!("invalid sync status: {}", status)))?,
                details,
                error,
                created_at: from_timestamp(created_at),
            });
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntryDraft;
    use rust_decimal_macros::dec;
    use time::macros::date;

    fn seeded() -> SqliteStorage {
        let storage = SqliteStorage::new(":memory:").unwrap();
        storage
            .ensure_account("1001", "Cash in Till", AccountType::Asset)
            .unwrap();
        storage
            .ensure_account("1010-001", "MTN MoMo Float", AccountType::Asset)
            .unwrap();
        storage
            .ensure_account("4010-001", "MTN MoMo Fee Revenue", AccountType::Revenue)
            .unwrap();
        storage
    }

    fn cash_in_command(source_transaction_id: &str) -> PostingCommand {
        PostingCommand {
            date: date!(2024 - 07 - 01),
            source_module: SourceModule::Momo,
            source_transaction_id: source_transaction_id.to_string(),
            source_transaction_type: "cash-in".to_string(),
            description: "MoMo cash-in".to_string(),
            created_by: "teller-1".to_string(),
            metadata: Some(serde_json::json!({"branchId": "BR-01"})),
            entries: vec![
                EntryDraft::debit("1010-001", dec!(100.00), "cash-in"),
                EntryDraft::credit("1001", dec!(100.00), "cash-in"),
                EntryDraft::debit("1001", dec!(5.00), "fee"),
                EntryDraft::credit("4010-001", dec!(5.00), "fee"),
            ],
        }
    }

    #[test]
    fn ensure_account_is_idempotent() {
        let storage = SqliteStorage::new(":memory:").unwrap();
        let first = storage
            .ensure_account("1001", "Cash in Till", AccountType::Asset)
            .unwrap();
        let second = storage
            .ensure_account("1001", "Cash in Till", AccountType::Asset)
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(storage.account_balance("1001").unwrap(), Decimal::ZERO);
    }

    #[test]
    fn post_round_trips_and_applies_balances() {
        let storage = seeded();
        let id = storage.post(&cash_in_command("txn-1")).unwrap();

        assert_eq!(storage.account_balance("1010-001").unwrap(), dec!(100.00));
        assert_eq!(storage.account_balance("1001").unwrap(), dec!(-95.00));

        let txn = storage.transaction_by_id(id).unwrap();
        assert_eq!(txn.source_module, SourceModule::Momo);
        assert_eq!(txn.date, date!(2024 - 07 - 01));
        assert_eq!(txn.status, STATUS_POSTED);
        assert!(txn.metadata.is_some());

        let entries = storage.entries_for_transaction(id).unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].debit, dec!(100.00));
        assert_eq!(entries[0].account_code, "1010-001");
    }

    #[test]
    fn duplicate_source_transaction_is_rejected_with_existing_id() {
        let storage = seeded();
        let first = storage.post(&cash_in_command("txn-1")).unwrap();

        match storage.post(&cash_in_command("txn-1")) {
            Err(StorageError::DuplicatePosting(existing)) => assert_eq!(existing, first),
            other => panic!("expected DuplicatePosting, got {:?}", other),
        }
        assert_eq!(storage.account_balance("1010-001").unwrap(), dec!(100.00));
    }

    #[test]
    fn unknown_account_rolls_back_header_and_entries() {
        let storage = seeded();
        let mut command = cash_in_command("txn-1");
        // Valid first leg, unknown account later in the set: the whole
        // posting must roll back.
        command.entries[2].account_code = "9999".to_string();

        match storage.post(&command) {
            Err(StorageError::AccountNotFound(code)) => assert_eq!(code, "9999"),
            other => panic!("expected AccountNotFound, got {:?}", other),
        }

        assert_eq!(storage.account_balance("1010-001").unwrap(), Decimal::ZERO);
        assert_eq!(storage.account_balance("1001").unwrap(), Decimal::ZERO);
        assert!(storage
            .find_posted(SourceModule::Momo, "txn-1")
            .unwrap()
            .is_none());
    }

    #[test]
    fn sync_log_round_trips() {
        let storage = SqliteStorage::new(":memory:").unwrap();
        let entry = SyncLogEntry {
            module: "power".to_string(),
            operation: "sale".to_string(),
            status: SyncStatus::Failed,
            details: "posting failed".to_string(),
            error: Some("account not found: 9999".to_string()),
            created_at: OffsetDateTime::now_utc(),
        };
        storage.append_sync_log(&entry).unwrap();

        let log = storage.sync_log().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].status, SyncStatus::Failed);
        assert_eq!(log[0].error.as_deref(), Some("account not found: 9999"));
    }
}

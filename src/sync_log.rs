//! Best-effort audit trail for posting attempts.
//!
//! Every posting attempt leaves a record, whether it posted, skipped or
//! failed. Log writes never fail a posting that already committed; a
//! storage error here is logged and swallowed.

use time::OffsetDateTime;

use crate::models::{SourceModule, SyncLogEntry, SyncStatus};
use crate::storage::LedgerStorage;

pub struct SyncLogger;

impl SyncLogger {
    pub fn record(
        storage: &dyn LedgerStorage,
        module: SourceModule,
        operation: &str,
        status: SyncStatus,
        details: String,
        error: Option<String>,
    ) {
        let entry = SyncLogEntry {
            module: module.as_str().to_string(),
            operation: operation.to_string(),
            status,
            details,
            error,
            created_at: OffsetDateTime::now_utc(),
        };
        if let Err(e) = storage.append_sync_log(&entry) {
            tracing::warn!(
                module = %module,
                operation,
                error = %e,
                "Failed to append sync log entry"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;

    #[test]
    fn record_appends_entry() {
        let storage = InMemoryStorage::new();
        SyncLogger::record(
            &storage,
            SourceModule::Momo,
            "cash-in",
            SyncStatus::Success,
            "posted txn-1".to_string(),
            None,
        );
        let log = storage.sync_log().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].module, "momo");
        assert_eq!(log[0].status, SyncStatus::Success);
    }
}

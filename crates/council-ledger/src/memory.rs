use std::sync::Mutex;

use council_models::session::SessionRecord;

use crate::error::LedgerError;
use crate::ledger::SessionLedger;

/// In-process ledger. Used by tests and dry runs that should leave no file behind.
#[derive(Default)]
pub struct MemoryLedger {
    records: Mutex<Vec<SessionRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the ledger with prior sessions.
    pub fn with_records(records: Vec<SessionRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    /// Snapshot of every stored record in insertion order.
    pub fn records(&self) -> Result<Vec<SessionRecord>, LedgerError> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<SessionRecord>>, LedgerError> {
        self.records
            .lock()
            .map_err(|e| LedgerError::Unavailable(format!("ledger mutex poisoned: {e}")))
    }
}

impl SessionLedger for MemoryLedger {
    fn append(&self, record: &SessionRecord) -> Result<(), LedgerError> {
        let mut records = self.lock()?;
        if records
            .iter()
            .any(|r| r.session_id == record.session_id || r.started_at == record.started_at)
        {
            return Err(LedgerError::Duplicate(record.session_id.to_string()));
        }
        records.push(record.clone());
        Ok(())
    }

    fn recent(&self, limit: usize) -> Result<Vec<SessionRecord>, LedgerError> {
        let mut records = self.lock()?.clone();
        records.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        records.truncate(limit);
        Ok(records)
    }

    fn len(&self) -> Result<usize, LedgerError> {
        Ok(self.lock()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    #[test]
    fn append_and_read_newest_first() {
        let ledger = MemoryLedger::new();
        let now = Utc::now();
        let older = SessionRecord::open(Uuid::new_v4(), now - Duration::hours(2));
        let newer = SessionRecord::open(Uuid::new_v4(), now);
        ledger.append(&older).unwrap();
        ledger.append(&newer).unwrap();

        let recent = ledger.recent(10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].session_id, newer.session_id);
        assert_eq!(ledger.recent(1).unwrap()[0].session_id, newer.session_id);
    }

    #[test]
    fn duplicate_session_is_rejected() {
        let ledger = MemoryLedger::new();
        let record = SessionRecord::open(Uuid::new_v4(), Utc::now());
        ledger.append(&record).unwrap();

        let result = ledger.append(&record);
        assert!(matches!(result, Err(LedgerError::Duplicate(_))));
        assert_eq!(ledger.len().unwrap(), 1);
    }
}

use std::sync::Mutex;

use council_models::ledger_schema::{LedgerRow, LEDGER_TABLE_DDL};
use council_models::session::SessionRecord;
use rusqlite::Connection;
use tracing::debug;

use crate::error::LedgerError;
use crate::ledger::SessionLedger;

/// SQLite-backed session ledger.
///
/// One row per session, inserted and never updated. Access is synchronized via
/// `Mutex` since `rusqlite::Connection` is not `Sync`.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    /// Open (or create) the ledger file. Creates the schema and enables WAL so
    /// the ledger can be inspected while a session is writing.
    pub fn open(path: &str) -> Result<Self, LedgerError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(LEDGER_TABLE_DDL)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory ledger. Useful for testing.
    pub fn open_in_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(LEDGER_TABLE_DDL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Raw rows, newest first. Exposed for inspection tooling.
    pub fn rows(&self, limit: usize) -> Result<Vec<LedgerRow>, LedgerError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT session_id, started_at, finished_at, exposure_state, session_mode, \
             execution_mode, outcome, record_json \
             FROM session_records ORDER BY started_at DESC LIMIT ?1",
        )?;

        let rows = stmt
            .query_map(rusqlite::params![limit as i64], |row| {
                Ok(LedgerRow {
                    session_id: row.get(0)?,
                    started_at: row.get(1)?,
                    finished_at: row.get(2)?,
                    exposure_state: row.get(3)?,
                    session_mode: row.get(4)?,
                    execution_mode: row.get(5)?,
                    outcome: row.get(6)?,
                    record_json: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, LedgerError> {
        self.conn
            .lock()
            .map_err(|e| LedgerError::Unavailable(format!("SQLite mutex poisoned: {e}")))
    }
}

impl SessionLedger for SqliteLedger {
    fn append(&self, record: &SessionRecord) -> Result<(), LedgerError> {
        let row = LedgerRow::from_record(record)?;
        let conn = self.lock()?;
        let result = conn.execute(
            "INSERT INTO session_records \
             (session_id, started_at, finished_at, exposure_state, session_mode, \
              execution_mode, outcome, record_json) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                row.session_id,
                row.started_at,
                row.finished_at,
                row.exposure_state,
                row.session_mode,
                row.execution_mode,
                row.outcome,
                row.record_json,
            ],
        );

        match result {
            Ok(_) => {
                debug!(session_id = %row.session_id, outcome = %row.outcome, "Session appended to ledger");
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(LedgerError::Duplicate(row.session_id))
            }
            Err(e) => Err(LedgerError::Sqlite(e)),
        }
    }

    fn recent(&self, limit: usize) -> Result<Vec<SessionRecord>, LedgerError> {
        self.rows(limit)?
            .into_iter()
            .map(|row| serde_json::from_str(&row.record_json).map_err(LedgerError::from))
            .collect()
    }

    fn len(&self) -> Result<usize, LedgerError> {
        let conn = self.lock()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM session_records", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use council_models::session::SessionOutcome;
    use uuid::Uuid;

    fn record(hours_ago: i64, outcome: SessionOutcome) -> SessionRecord {
        let mut record = SessionRecord::open(Uuid::new_v4(), Utc::now() - Duration::hours(hours_ago));
        record.outcome = outcome;
        record.reason = format!("{outcome:?}");
        record
    }

    #[test]
    fn append_and_read_back() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        let original = record(1, SessionOutcome::NoTrade);
        ledger.append(&original).unwrap();

        let recent = ledger.recent(10).unwrap();
        assert_eq!(recent, vec![original]);
        assert_eq!(ledger.len().unwrap(), 1);
    }

    #[test]
    fn recent_is_newest_first_and_limited() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        let oldest = record(30, SessionOutcome::Aborted);
        let middle = record(20, SessionOutcome::VetoBlocked);
        let newest = record(10, SessionOutcome::Executed);
        ledger.append(&middle).unwrap();
        ledger.append(&newest).unwrap();
        ledger.append(&oldest).unwrap();

        let recent = ledger.recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].session_id, newest.session_id);
        assert_eq!(recent[1].session_id, middle.session_id);
    }

    #[test]
    fn duplicate_append_is_rejected() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        let original = record(1, SessionOutcome::NoTrade);
        ledger.append(&original).unwrap();

        let result = ledger.append(&original);
        assert!(matches!(result, Err(LedgerError::Duplicate(_))));
        assert_eq!(ledger.len().unwrap(), 1);
    }

    #[test]
    fn summary_columns_are_populated() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        ledger.append(&record(1, SessionOutcome::VetoBlocked)).unwrap();

        let rows = ledger.rows(1).unwrap();
        assert_eq!(rows[0].outcome, "veto_blocked");
        assert!(rows[0].exposure_state.is_none());
    }
}

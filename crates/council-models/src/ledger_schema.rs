use chrono::SecondsFormat;

/// SQLite schema for the session ledger.
///
/// ```sql
/// CREATE TABLE IF NOT EXISTS session_records (
///     session_id        TEXT PRIMARY KEY,
///     started_at        TEXT NOT NULL UNIQUE,
///     finished_at       TEXT,
///     exposure_state    TEXT,
///     session_mode      TEXT,
///     execution_mode    TEXT,
///     outcome           TEXT NOT NULL,
///     record_json       TEXT NOT NULL
/// );
///
/// CREATE INDEX IF NOT EXISTS idx_session_started ON session_records(started_at);
/// ```
///
/// The summary columns duplicate fields of `record_json` so the table can be
/// inspected with plain SQL. Rows are only ever inserted.
pub const LEDGER_TABLE_DDL: &str = "\
CREATE TABLE IF NOT EXISTS session_records (
    session_id        TEXT PRIMARY KEY,
    started_at        TEXT NOT NULL UNIQUE,
    finished_at       TEXT,
    exposure_state    TEXT,
    session_mode      TEXT,
    execution_mode    TEXT,
    outcome           TEXT NOT NULL,
    record_json       TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_session_started ON session_records(started_at);
";

/// A raw ledger row as stored in SQLite.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRow {
    pub session_id: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub exposure_state: Option<String>,
    pub session_mode: Option<String>,
    pub execution_mode: Option<String>,
    pub outcome: String,
    pub record_json: String,
}

impl LedgerRow {
    /// Flatten a session record into its storage row.
    pub fn from_record(record: &crate::SessionRecord) -> Result<Self, serde_json::Error> {
        let label = |value: serde_json::Value| value.as_str().map(str::to_string);
        // Fixed-width timestamps keep lexical order equal to chronological order
        let stamp = |t: chrono::DateTime<chrono::Utc>| t.to_rfc3339_opts(SecondsFormat::Nanos, true);
        Ok(Self {
            session_id: record.session_id.to_string(),
            started_at: stamp(record.started_at),
            finished_at: record.finished_at.map(stamp),
            exposure_state: match &record.exposure {
                Some(e) => label(serde_json::to_value(e.state)?),
                None => None,
            },
            session_mode: match &record.exposure {
                Some(e) => label(serde_json::to_value(e.mode)?),
                None => None,
            },
            execution_mode: match &record.consensus {
                Some(c) => label(serde_json::to_value(c.execution_mode)?),
                None => None,
            },
            outcome: label(serde_json::to_value(record.outcome)?).unwrap_or_default(),
            record_json: serde_json::to_string(record)?,
        })
    }
}

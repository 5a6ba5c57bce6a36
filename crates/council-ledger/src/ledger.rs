use chrono::{DateTime, Utc};
use council_models::exposure::ExposureHistory;
use council_models::session::SessionRecord;
use rust_decimal::Decimal;

use crate::error::LedgerError;

/// Append-only store of prior sessions.
///
/// Read once at session start for exposure-duration history and written once
/// at session end. Implementations never update or delete a record.
pub trait SessionLedger: Send + Sync {
    /// Append a finished session. Appending the same session twice is an error.
    fn append(&self, record: &SessionRecord) -> Result<(), LedgerError>;

    /// Up to `limit` most recent records, newest first.
    fn recent(&self, limit: usize) -> Result<Vec<SessionRecord>, LedgerError>;

    /// Number of stored sessions.
    fn len(&self) -> Result<usize, LedgerError>;

    fn is_empty(&self) -> Result<bool, LedgerError> {
        Ok(self.len()? == 0)
    }

    /// Derive exposure streaks from the most recent `limit` sessions.
    fn exposure_history(
        &self,
        limit: usize,
        now: DateTime<Utc>,
        cash_threshold_pct: Decimal,
    ) -> Result<ExposureHistory, LedgerError> {
        let records = self.recent(limit)?;
        Ok(ExposureHistory::from_records(
            &records,
            now,
            cash_threshold_pct,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryLedger;
    use chrono::Duration;
    use council_models::exposure::{ExposureAssessment, ExposureState};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn under_exposed(at: DateTime<Utc>) -> SessionRecord {
        let mut record = SessionRecord::open(Uuid::new_v4(), at);
        record.exposure = Some(ExposureAssessment {
            risk_exposure_pct: dec!(10),
            cash_pct: dec!(90),
            state: ExposureState::UnderExposed,
            mode: ExposureState::UnderExposed.into(),
            forced_deployment_eligible: false,
            under_exposed_days: Decimal::ZERO,
            high_cash_days: Decimal::ZERO,
        });
        record
    }

    #[test]
    fn history_respects_limit() {
        let ledger = MemoryLedger::new();
        let now = Utc::now();
        for days in [5, 4, 3, 2, 1] {
            ledger.append(&under_exposed(now - Duration::days(days))).unwrap();
        }

        let all = ledger.exposure_history(10, now, dec!(50)).unwrap();
        assert_eq!(all.under_exposed_days, dec!(5));
        assert_eq!(all.sessions_considered, 5);

        // Only the two newest sessions are visible
        let limited = ledger.exposure_history(2, now, dec!(50)).unwrap();
        assert_eq!(limited.under_exposed_days, dec!(2));
        assert_eq!(limited.high_cash_days, dec!(2));
    }

    #[test]
    fn empty_ledger() {
        let ledger = MemoryLedger::new();
        assert!(ledger.is_empty().unwrap());
        let history = ledger.exposure_history(10, Utc::now(), dec!(50)).unwrap();
        assert_eq!(history, ExposureHistory::default());
    }
}

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::session::SessionRecord;

const SECONDS_PER_DAY: i64 = 86_400;

/// Where the portfolio's risk exposure sits relative to the configured band.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExposureState {
    UnderExposed,
    WithinRange,
    OverExposed,
}

/// Session posture derived from [`ExposureState`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionMode {
    Standard,
    MustDeploy,
    Defensive,
}

impl From<ExposureState> for SessionMode {
    fn from(state: ExposureState) -> Self {
        match state {
            ExposureState::UnderExposed => SessionMode::MustDeploy,
            ExposureState::WithinRange => SessionMode::Standard,
            ExposureState::OverExposed => SessionMode::Defensive,
        }
    }
}

/// Result of the P0.5 exposure evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExposureAssessment {
    /// Share of total value held in volatile assets, 0-100.
    pub risk_exposure_pct: Decimal,
    /// Share of total value held in cash, 0-100.
    pub cash_pct: Decimal,
    pub state: ExposureState,
    pub mode: SessionMode,
    /// Cash has stayed above the force-deploy threshold for longer than allowed.
    pub forced_deployment_eligible: bool,
    /// Days the portfolio has been continuously under-exposed, per the ledger.
    pub under_exposed_days: Decimal,
    /// Days cash has continuously exceeded the force-deploy threshold, per the ledger.
    pub high_cash_days: Decimal,
}

/// Exposure-duration history derived from prior session records.
///
/// Passed to the evaluator explicitly; nothing reads the ledger implicitly.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExposureHistory {
    pub under_exposed_days: Decimal,
    pub high_cash_days: Decimal,
    pub sessions_considered: usize,
}

impl ExposureHistory {
    /// Derive streak durations from ledger records (any order).
    ///
    /// A streak runs from the oldest record of the uninterrupted newest-first run
    /// up to `now`. Records without an exposure assessment (aborted sessions) are
    /// skipped and neither extend nor break a streak.
    pub fn from_records(
        records: &[SessionRecord],
        now: DateTime<Utc>,
        cash_threshold_pct: Decimal,
    ) -> Self {
        let mut assessed: Vec<(DateTime<Utc>, &ExposureAssessment)> = records
            .iter()
            .filter_map(|r| r.exposure.as_ref().map(|e| (r.started_at, e)))
            .collect();
        assessed.sort_by(|a, b| b.0.cmp(&a.0));

        let under_start = streak_start(&assessed, |e| e.state == ExposureState::UnderExposed);
        let cash_start = streak_start(&assessed, |e| e.cash_pct > cash_threshold_pct);

        Self {
            under_exposed_days: days_between(under_start, now),
            high_cash_days: days_between(cash_start, now),
            sessions_considered: assessed.len(),
        }
    }
}

fn streak_start<F>(
    newest_first: &[(DateTime<Utc>, &ExposureAssessment)],
    holds: F,
) -> Option<DateTime<Utc>>
where
    F: Fn(&ExposureAssessment) -> bool,
{
    newest_first
        .iter()
        .take_while(|(_, e)| holds(e))
        .last()
        .map(|(at, _)| *at)
}

fn days_between(start: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Decimal {
    match start {
        Some(start) if start < now => {
            Decimal::from((now - start).num_seconds()) / Decimal::from(SECONDS_PER_DAY)
        }
        _ => Decimal::ZERO,
    }
}

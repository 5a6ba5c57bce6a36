//! Forward-only phase bookkeeping.

use std::time::Instant;

use council_models::recommendation::Phase;
use council_models::session::{PhaseOutcome, PhaseStatus};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug, Clone, PartialEq)]
#[error("cannot enter {to} after {from}")]
pub struct PhaseOrderError {
    pub from: Phase,
    pub to: Phase,
}

/// Tracks which phase a session is in and records an outcome for every
/// phase, including the ones it never ran.
#[derive(Debug, Default)]
pub struct PhaseTracker {
    current: Option<(Phase, Instant)>,
    last: Option<Phase>,
    outcomes: Vec<PhaseOutcome>,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Phase> {
        self.current.map(|(phase, _)| phase)
    }

    /// Outcomes recorded so far, in the order phases were closed.
    pub fn outcomes(&self) -> &[PhaseOutcome] {
        &self.outcomes
    }

    /// Enter `phase`. Phases between the last one and `phase` are recorded as
    /// skipped. An open phase is closed as completed first.
    pub fn enter(&mut self, phase: Phase) -> Result<(), PhaseOrderError> {
        if let Some(from) = self.last {
            if phase <= from {
                return Err(PhaseOrderError { from, to: phase });
            }
        }
        if self.current.is_some() {
            self.complete("completed");
        }
        self.skip_until(phase, "not reached");
        debug!(phase = %phase, "Entering phase");
        self.current = Some((phase, Instant::now()));
        self.last = Some(phase);
        Ok(())
    }

    pub fn complete(&mut self, detail: impl Into<String>) {
        self.close(PhaseStatus::Completed, detail.into());
    }

    pub fn fail(&mut self, detail: impl Into<String>) {
        let detail = detail.into();
        if let Some(phase) = self.current() {
            warn!(phase = %phase, detail = %detail, "Phase failed");
        }
        self.close(PhaseStatus::Failed, detail);
    }

    /// Record every phase before `until` that has no outcome yet as skipped.
    pub fn skip_until(&mut self, until: Phase, detail: &str) {
        let recorded =
            |outcomes: &[PhaseOutcome], phase: Phase| outcomes.iter().any(|o| o.phase == phase);
        for phase in Phase::ALL.into_iter().filter(|p| *p < until) {
            let is_open = self.current() == Some(phase);
            if !is_open && !recorded(&self.outcomes, phase) {
                self.outcomes.push(PhaseOutcome {
                    phase,
                    status: PhaseStatus::Skipped,
                    detail: detail.to_string(),
                    elapsed_ms: 0,
                });
            }
        }
    }

    /// Close any open phase and mark everything not yet run as skipped.
    pub fn finish(mut self) -> Vec<PhaseOutcome> {
        if self.current.is_some() {
            self.complete("completed");
        }
        let after_last = Phase::ALL
            .into_iter()
            .filter(|p| self.last.map_or(true, |last| *p > last))
            .collect::<Vec<_>>();
        for phase in after_last {
            self.outcomes.push(PhaseOutcome {
                phase,
                status: PhaseStatus::Skipped,
                detail: "not reached".to_string(),
                elapsed_ms: 0,
            });
        }
        self.outcomes.sort_by_key(|o| o.phase);
        self.outcomes
    }

    fn close(&mut self, status: PhaseStatus, detail: String) {
        if let Some((phase, started)) = self.current.take() {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            debug!(phase = %phase, status = ?status, elapsed_ms, "Phase closed");
            self.outcomes.push(PhaseOutcome {
                phase,
                status,
                detail,
                elapsed_ms,
            });
        }
    }
}

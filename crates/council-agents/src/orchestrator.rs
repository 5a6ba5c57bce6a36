use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use council_ledger::SessionLedger;
use council_models::config::{AgentsConfig, CouncilConfig};
use council_models::consensus::ConsensusResult;
use council_models::exposure::{ExposureAssessment, ExposureHistory};
use council_models::portfolio::PortfolioSnapshot;
use council_models::recommendation::{AgentRequest, Phase, Vote};
use council_models::session::{
    ActivityStatus, AgentActivity, SessionFault, SessionOutcome, SessionRecord,
};
use serde_json::{Map, Value};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::collector::{Collection, RecommendationCollector, SpecialistReply};
use crate::consensus::ConsensusEngine;
use crate::error::AgentError;
use crate::execution::ExecutionVenue;
use crate::exposure::evaluate_exposure;
use crate::scheduler::PhaseTracker;
use crate::specialist::SpecialistAgent;
use crate::synthesizer::{synthesize, SynthesisParams};

/// Specialists grouped by the phase they serve.
pub struct SpecialistRoster {
    pub news: Arc<dyn SpecialistAgent>,
    pub intelligence: Arc<dyn SpecialistAgent>,
    /// P2 specialists in roster order. Always contains the risk specialist.
    pub analysts: Vec<Arc<dyn SpecialistAgent>>,
    pub reporter: Arc<dyn SpecialistAgent>,
}

impl SpecialistRoster {
    /// Place each enabled specialist in its configured phase. Every enabled
    /// roster entry must have an implementation; extras are ignored.
    pub fn assemble(
        specialists: Vec<Arc<dyn SpecialistAgent>>,
        agents: &AgentsConfig,
    ) -> Result<Self, AgentError> {
        let lookup = |name: &str| {
            specialists
                .iter()
                .find(|s| s.name() == name)
                .cloned()
                .ok_or_else(|| AgentError::Roster(format!("no implementation for {name}")))
        };
        let single = |phase: Phase| {
            let mut enabled = agents.enabled_in(phase);
            match (enabled.next(), enabled.next()) {
                (Some(spec), None) => lookup(&spec.name),
                _ => Err(AgentError::Roster(format!(
                    "{phase} needs exactly one enabled specialist"
                ))),
            }
        };

        let analysts = agents
            .enabled_in(Phase::Analysis)
            .map(|spec| lookup(&spec.name))
            .collect::<Result<Vec<_>, _>>()?;
        if !analysts.iter().any(|a| a.name() == agents.risk_agent) {
            return Err(AgentError::Roster(format!(
                "risk agent {} is not an enabled P2 specialist",
                agents.risk_agent
            )));
        }

        Ok(Self {
            news: single(Phase::News)?,
            intelligence: single(Phase::Intelligence)?,
            analysts,
            reporter: single(Phase::Reporting)?,
        })
    }
}

/// Runs one council session from snapshot to ledger entry.
pub struct Orchestrator {
    roster: SpecialistRoster,
    venue: Arc<dyn ExecutionVenue>,
    ledger: Arc<dyn SessionLedger>,
    config: CouncilConfig,
}

/// Mutable state of a session in flight.
struct Session {
    record: SessionRecord,
    tracker: PhaseTracker,
    outputs: Map<String, Value>,
    history: ExposureHistory,
}

impl Session {
    fn enter(&mut self, phase: Phase) {
        if let Err(e) = self.tracker.enter(phase) {
            error!(error = %e, "Phase order violated");
        }
    }

    fn request(&self, phase: Phase, config: &CouncilConfig) -> AgentRequest {
        AgentRequest {
            request_id: Uuid::new_v4(),
            session_id: self.record.session_id,
            phase,
            portfolio: self.record.snapshot.clone(),
            prior_phase_outputs: self.outputs.clone(),
            session_mode: self.record.exposure.as_ref().map(|e| e.mode),
            history: Some(self.history.clone()),
            assets: config.portfolio.risk_assets.clone(),
            event: self.record.event.clone(),
        }
    }

    fn track(&mut self, activity: AgentActivity) {
        self.record.agent_activity.push(activity);
    }

    fn conclude(&mut self, outcome: SessionOutcome, reason: String) {
        self.record.outcome = outcome;
        self.record.reason = reason;
    }

    fn abort(&mut self, fault: SessionFault) {
        let phase = self
            .tracker
            .outcomes()
            .last()
            .map(|o| o.phase.to_string())
            .unwrap_or_else(|| "start-up".to_string());
        error!(fault = %fault, phase = %phase, "Session aborted");
        self.conclude(SessionOutcome::Aborted, format!("Aborted in {phase}: {fault}"));
        self.record.errors.push(fault);
    }

    fn finish(self) -> SessionRecord {
        let mut record = self.record;
        record.phases = self.tracker.finish();
        record.finished_at = Some(Utc::now());
        record
    }
}

impl Orchestrator {
    pub fn new(
        roster: SpecialistRoster,
        venue: Arc<dyn ExecutionVenue>,
        ledger: Arc<dyn SessionLedger>,
        config: CouncilConfig,
    ) -> Self {
        Self {
            roster,
            venue,
            ledger,
            config,
        }
    }

    pub fn config(&self) -> &CouncilConfig {
        &self.config
    }

    /// Run a full session. Never fails: every fault ends up on the returned
    /// record, which has also been appended to the ledger when possible.
    pub async fn run_session(&self, snapshot: Option<PortfolioSnapshot>) -> SessionRecord {
        self.run_session_with_event(snapshot, None).await
    }

    /// Run a session triggered by an external event. The event is stored on
    /// the record and handed to every specialist alongside the usual context.
    pub async fn run_session_with_event(
        &self,
        snapshot: Option<PortfolioSnapshot>,
        event: Option<Value>,
    ) -> SessionRecord {
        let session_id = Uuid::new_v4();
        let span = info_span!("session", %session_id);
        self.run(session_id, Utc::now(), snapshot, event)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        session_id: Uuid,
        started_at: DateTime<Utc>,
        snapshot: Option<PortfolioSnapshot>,
        event: Option<Value>,
    ) -> SessionRecord {
        let start = Instant::now();
        info!(
            has_snapshot = snapshot.is_some(),
            event_triggered = event.is_some(),
            "Session started"
        );

        let mut record = SessionRecord::open(session_id, started_at);
        record.snapshot = snapshot;
        record.event = event;
        let history = self.load_history(&mut record, started_at);
        let mut session = Session {
            record,
            tracker: PhaseTracker::new(),
            outputs: Map::new(),
            history,
        };

        if let Err(fault) = self.run_trading_phases(&mut session).await {
            session.abort(fault);
        }
        self.run_reporting(&mut session).await;

        let mut record = session.finish();
        if let Err(e) = self.ledger.append(&record) {
            error!(error = %e, "Failed to append session to ledger");
            record.errors.push(SessionFault::LedgerUnavailable {
                reason: e.to_string(),
            });
        }

        info!(
            outcome = ?record.outcome,
            reason = %record.reason,
            faults = record.errors.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Session finished"
        );
        record
    }

    fn load_history(&self, record: &mut SessionRecord, now: DateTime<Utc>) -> ExposureHistory {
        match self.ledger.exposure_history(
            self.config.ledger.history_limit,
            now,
            self.config.exposure.force_deploy_threshold_pct,
        ) {
            Ok(history) => history,
            Err(e) => {
                warn!(error = %e, "Ledger unreadable; assuming no exposure history");
                record.errors.push(SessionFault::LedgerUnavailable {
                    reason: e.to_string(),
                });
                ExposureHistory::default()
            }
        }
    }

    fn specialist_timeout(&self) -> Duration {
        Duration::from_secs(self.config.agents.specialist_timeout_seconds)
    }

    /// P0 through P4. An `Err` is a fatal fault that stops trading.
    async fn run_trading_phases(&self, s: &mut Session) -> Result<(), SessionFault> {
        s.enter(Phase::News);
        self.call_mandatory(s, &self.roster.news, Phase::News).await?;

        s.enter(Phase::Exposure);
        let assessment = match evaluate_exposure(
            s.record.snapshot.as_ref(),
            &self.config.exposure,
            &s.history,
        ) {
            Ok(assessment) => assessment,
            Err(fault) => {
                s.tracker.fail(fault.to_string());
                return Err(fault);
            }
        };
        info!(
            risk_exposure_pct = %assessment.risk_exposure_pct,
            cash_pct = %assessment.cash_pct,
            state = ?assessment.state,
            mode = ?assessment.mode,
            forced_deployment_eligible = assessment.forced_deployment_eligible,
            under_exposed_days = %assessment.under_exposed_days,
            "Exposure evaluated"
        );
        s.record.exposure = Some(assessment.clone());
        s.tracker.complete(format!("{:?} / {:?}", assessment.state, assessment.mode));

        s.enter(Phase::Intelligence);
        self.call_mandatory(s, &self.roster.intelligence, Phase::Intelligence)
            .await?;

        s.enter(Phase::Analysis);
        let collection = self.run_analysis(s).await;
        let abstentions = collection.votes.iter().filter(|v| v.is_abstain()).count();
        let detail = format!(
            "{} vote(s), {} abstention(s)",
            collection.votes.len() - abstentions,
            abstentions
        );
        s.record.recommendations.extend(collection.votes);
        s.record.errors.extend(collection.faults);
        s.tracker.complete(detail);

        s.enter(Phase::Consensus);
        let consensus =
            ConsensusEngine::new(&self.config).evaluate(&s.record.recommendations, &assessment);
        info!(
            execution_mode = ?consensus.execution_mode,
            directional_agreement = %consensus.directional_agreement,
            override_applied = consensus.override_applied,
            veto = ?consensus.veto,
            "Consensus reached"
        );
        s.record.consensus = Some(consensus.clone());
        s.tracker.complete(consensus.reason.clone());

        if !consensus.execution_mode.permits_trading() {
            let outcome = if consensus.is_veto_blocked() {
                SessionOutcome::VetoBlocked
            } else {
                SessionOutcome::NoTrade
            };
            s.conclude(outcome, consensus.reason.clone());
            return Ok(());
        }

        s.enter(Phase::Execution);
        self.run_execution(s, &consensus, &assessment).await
    }

    /// Call a phase's single mandatory specialist. Its recommendation is
    /// recorded and its raw payload becomes context for later phases.
    async fn call_mandatory(
        &self,
        s: &mut Session,
        agent: &Arc<dyn SpecialistAgent>,
        phase: Phase,
    ) -> Result<(), SessionFault> {
        let request = s.request(phase, &self.config);
        let started_at = Utc::now();
        let started = Instant::now();
        let result = call_specialist(Arc::clone(agent), request, self.specialist_timeout()).await;
        let elapsed = started.elapsed();
        let elapsed_ms = elapsed.as_millis() as u64;
        s.track(activity(agent.name(), phase, started_at, elapsed, result.as_ref().err()));

        let collector =
            RecommendationCollector::new(&self.config.agents, &self.config.portfolio.risk_assets);
        let validated = result.map_err(|e| e.to_string()).and_then(|payload| {
            collector
                .validate(agent.name(), phase, &payload, Utc::now())
                .map(|rec| (rec, payload))
                .map_err(|e| e.to_string())
        });

        match validated {
            Ok((recommendation, payload)) => {
                info!(agent = %agent.name(), phase = %phase, elapsed_ms, "Mandatory agent responded");
                s.outputs.insert(agent.name().to_string(), payload);
                s.record.recommendations.push(Vote::Cast(recommendation));
                s.tracker.complete(format!("{} responded", agent.name()));
                Ok(())
            }
            Err(reason) => {
                let fault = SessionFault::MandatoryAgentMissing {
                    agent: agent.name().to_string(),
                    phase,
                    reason,
                };
                s.tracker.fail(fault.to_string());
                Err(fault)
            }
        }
    }

    /// P2 fan-out. All calls run concurrently and every one settles into a
    /// vote or an abstention.
    async fn run_analysis(&self, s: &mut Session) -> Collection {
        let timeout = self.specialist_timeout();
        let mut handles = Vec::with_capacity(self.roster.analysts.len());
        for analyst in &self.roster.analysts {
            let agent = Arc::clone(analyst);
            let request = s.request(Phase::Analysis, &self.config);
            let name = agent.name().to_string();
            let started_at = Utc::now();
            let started = Instant::now();
            handles.push((
                name,
                started_at,
                started,
                tokio::spawn(async move {
                    let result = call_specialist(agent, request, timeout).await;
                    (result, started.elapsed())
                }),
            ));
        }

        let mut replies = Vec::with_capacity(handles.len());
        for (name, started_at, started, handle) in handles {
            let (payload, elapsed) = match handle.await {
                Ok((result, elapsed)) => {
                    let elapsed_ms = elapsed.as_millis() as u64;
                    match &result {
                        Ok(_) => info!(agent = %name, elapsed_ms, "Agent responded"),
                        Err(e) => warn!(agent = %name, error = %e, elapsed_ms, "Agent failed"),
                    }
                    (result, elapsed)
                }
                Err(e) => {
                    error!(agent = %name, error = %e, "Agent task panicked");
                    (Err(AgentError::Task(e.to_string())), started.elapsed())
                }
            };
            s.track(activity(
                &name,
                Phase::Analysis,
                started_at,
                elapsed,
                payload.as_ref().err(),
            ));
            if let Ok(value) = &payload {
                s.outputs.insert(name.clone(), value.clone());
            }
            replies.push(SpecialistReply {
                agent_id: name,
                phase: Phase::Analysis,
                payload,
                received_at: Utc::now(),
            });
        }

        RecommendationCollector::new(&self.config.agents, &self.config.portfolio.risk_assets)
            .collect(replies)
    }

    async fn run_execution(
        &self,
        s: &mut Session,
        consensus: &ConsensusResult,
        assessment: &ExposureAssessment,
    ) -> Result<(), SessionFault> {
        let snapshot = s
            .record
            .snapshot
            .clone()
            .ok_or_else(|| SessionFault::DataUnavailable {
                reason: "snapshot missing at execution".to_string(),
            })?;

        let synthesis = synthesize(
            consensus,
            &snapshot,
            SynthesisParams {
                portfolio: &self.config.portfolio,
                exposure: &self.config.exposure,
                synthesis: &self.config.synthesis,
            },
        );
        s.record.errors.extend(synthesis.faults());
        s.record.rejected_instructions = synthesis.rejected;
        let instructions = synthesis.instructions;
        s.record.instructions = Some(instructions.clone());

        if instructions.is_empty() {
            s.tracker.complete("no instructions to execute");
            s.conclude(
                SessionOutcome::NoTrade,
                format!(
                    "{:?} at {}% risk exposure produced no valid instruction",
                    consensus.execution_mode, assessment.risk_exposure_pct
                ),
            );
            return Ok(());
        }

        let timeout = Duration::from_secs(self.config.execution.timeout_seconds);
        let started_at = Utc::now();
        let started = Instant::now();
        let result = match tokio::time::timeout(timeout, self.venue.execute(&instructions, consensus))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(AgentError::Timeout(timeout.as_secs())),
        };
        s.track(activity(
            self.venue.name(),
            Phase::Execution,
            started_at,
            started.elapsed(),
            result.as_ref().err(),
        ));

        match result {
            Ok(report) if report.accepted => {
                info!(venue = %report.venue, orders = report.order_refs.len(), "Instructions executed");
                s.tracker.complete(report.message.clone());
                s.conclude(
                    SessionOutcome::Executed,
                    format!(
                        "Executed {} instruction(s) in {:?}: {}",
                        instructions.len(),
                        consensus.execution_mode,
                        consensus.reason
                    ),
                );
                s.record.execution = Some(report);
            }
            Ok(report) => {
                let fault = SessionFault::ExecutionFailed {
                    reason: format!("{} declined: {}", report.venue, report.message),
                };
                s.tracker.fail(fault.to_string());
                s.conclude(SessionOutcome::NoTrade, fault.to_string());
                s.record.errors.push(fault);
                s.record.execution = Some(report);
            }
            Err(e) => {
                error!(venue = %self.venue.name(), error = %e, "Execution failed");
                let fault = SessionFault::ExecutionFailed {
                    reason: e.to_string(),
                };
                s.tracker.fail(fault.to_string());
                s.conclude(SessionOutcome::NoTrade, fault.to_string());
                s.record.errors.push(fault);
            }
        }
        Ok(())
    }

    /// P5. Always attempted, with whatever the session produced.
    async fn run_reporting(&self, s: &mut Session) {
        s.enter(Phase::Reporting);

        let mut request = s.request(Phase::Reporting, &self.config);
        let mut context = s.record.clone();
        context.phases = s.tracker.outcomes().to_vec();
        match serde_json::to_value(&context) {
            Ok(value) => {
                request.prior_phase_outputs.insert("session".to_string(), value);
            }
            Err(e) => warn!(error = %e, "Could not serialize session for the reporter"),
        }

        let reporter = &self.roster.reporter;
        let started_at = Utc::now();
        let started = Instant::now();
        let result = call_specialist(Arc::clone(reporter), request, self.specialist_timeout()).await;
        s.track(activity(
            reporter.name(),
            Phase::Reporting,
            started_at,
            started.elapsed(),
            result.as_ref().err(),
        ));
        match result {
            Ok(report @ Value::Object(_)) => {
                s.record.report = Some(report);
                s.tracker.complete(format!("{} reported", reporter.name()));
            }
            other => {
                let reason = match other {
                    Ok(value) => format!("expected a JSON object, got {value}"),
                    Err(e) => e.to_string(),
                };
                let fault = SessionFault::MandatoryAgentMissing {
                    agent: reporter.name().to_string(),
                    phase: Phase::Reporting,
                    reason,
                };
                s.tracker.fail(fault.to_string());
                s.record.errors.push(fault);
            }
        }

        if s.record.reason.is_empty() {
            s.record.reason = "Session ended without a decision".to_string();
        }
    }
}

/// Activity entry for a call that began at `started_at` and settled after
/// `elapsed`.
fn activity(
    agent: &str,
    phase: Phase,
    started_at: DateTime<Utc>,
    elapsed: Duration,
    error: Option<&AgentError>,
) -> AgentActivity {
    let status = match error {
        None => ActivityStatus::Responded,
        Some(AgentError::Timeout(_)) => ActivityStatus::TimedOut,
        Some(_) => ActivityStatus::Failed,
    };
    let finished_at = chrono::Duration::from_std(elapsed)
        .ok()
        .and_then(|d| started_at.checked_add_signed(d))
        .unwrap_or(started_at);
    AgentActivity {
        agent: agent.to_string(),
        phase,
        started_at,
        finished_at,
        elapsed_ms: elapsed.as_millis() as u64,
        status,
        error: error.map(|e| e.to_string()),
    }
}

/// One specialist call bounded by `timeout`. The call is dropped on expiry.
async fn call_specialist(
    agent: Arc<dyn SpecialistAgent>,
    request: AgentRequest,
    timeout: Duration,
) -> Result<Value, AgentError> {
    match tokio::time::timeout(timeout, agent.evaluate(&request)).await {
        Ok(result) => result,
        Err(_) => Err(AgentError::Timeout(timeout.as_secs())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedSpecialist;
    use serde_json::json;

    fn scripted(name: &str) -> Arc<dyn SpecialistAgent> {
        Arc::new(ScriptedSpecialist::responding(name, "test", json!({})))
    }

    fn full_roster() -> Vec<Arc<dyn SpecialistAgent>> {
        AgentsConfig::default()
            .specialists
            .iter()
            .map(|s| scripted(&s.name))
            .collect()
    }

    #[test]
    fn roster_groups_by_phase() {
        let roster = SpecialistRoster::assemble(full_roster(), &AgentsConfig::default()).unwrap();
        assert_eq!(roster.news.name(), "news-analyst");
        assert_eq!(roster.intelligence.name(), "market-intelligence");
        assert_eq!(roster.reporter.name(), "reporter");
        let analysts: Vec<&str> = roster.analysts.iter().map(|a| a.name()).collect();
        assert_eq!(
            analysts,
            ["risk-manager", "technical-analyst", "data-analyst", "futures-analyst"]
        );
    }

    #[test]
    fn disabled_specialists_are_left_out() {
        let mut agents = AgentsConfig::default();
        for spec in &mut agents.specialists {
            if spec.name == "futures-analyst" {
                spec.enabled = false;
            }
        }
        let roster = SpecialistRoster::assemble(full_roster(), &agents).unwrap();
        assert_eq!(roster.analysts.len(), 3);
    }

    #[test]
    fn missing_risk_agent_is_a_roster_error() {
        let specialists: Vec<_> = full_roster()
            .into_iter()
            .filter(|s| s.name() != "risk-manager")
            .collect();
        let result = SpecialistRoster::assemble(specialists, &AgentsConfig::default());
        assert!(matches!(result, Err(AgentError::Roster(msg)) if msg.contains("risk-manager")));
    }

    #[tokio::test]
    async fn call_specialist_times_out() {
        let slow: Arc<dyn SpecialistAgent> = Arc::new(ScriptedSpecialist::delayed(
            "data-analyst",
            "data",
            Duration::from_secs(5),
            json!({}),
        ));
        let request = AgentRequest {
            request_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            phase: Phase::Analysis,
            portfolio: None,
            prior_phase_outputs: Map::new(),
            session_mode: None,
            history: None,
            assets: vec![],
            event: None,
        };
        let result = call_specialist(slow, request, Duration::from_millis(20)).await;
        assert!(matches!(result, Err(AgentError::Timeout(0))));
    }

    #[test]
    fn activity_status_follows_the_call_error() {
        let started_at = Utc::now();
        let elapsed = Duration::from_millis(1500);

        let ok = activity("news-analyst", Phase::News, started_at, elapsed, None);
        assert_eq!(ok.status, ActivityStatus::Responded);
        assert_eq!(ok.elapsed_ms, 1500);
        assert_eq!(ok.finished_at - ok.started_at, chrono::Duration::milliseconds(1500));
        assert!(ok.error.is_none());

        let timed_out = activity(
            "data-analyst",
            Phase::Analysis,
            started_at,
            elapsed,
            Some(&AgentError::Timeout(45)),
        );
        assert_eq!(timed_out.status, ActivityStatus::TimedOut);
        assert_eq!(timed_out.error.as_deref(), Some("Agent timed out after 45 seconds"));

        let failed = activity(
            "reporter",
            Phase::Reporting,
            started_at,
            elapsed,
            Some(&AgentError::Cli("exit status 1".to_string())),
        );
        assert_eq!(failed.status, ActivityStatus::Failed);
    }
}

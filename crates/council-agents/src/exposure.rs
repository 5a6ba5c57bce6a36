//! P0.5 exposure evaluation. Pure: the ledger-derived history is passed in.

use council_models::config::ExposureConfig;
use council_models::exposure::{ExposureAssessment, ExposureHistory, ExposureState, SessionMode};
use council_models::portfolio::PortfolioSnapshot;
use council_models::session::SessionFault;
use rust_decimal::Decimal;

/// Percentages are kept to this many decimal places.
const PCT_SCALE: u32 = 4;

/// Share of total value held in volatile assets, 0-100.
pub fn risk_exposure_pct(snapshot: &PortfolioSnapshot) -> Decimal {
    if snapshot.total_value <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (snapshot.risk_value() / snapshot.total_value * Decimal::ONE_HUNDRED).round_dp(PCT_SCALE)
}

pub fn cash_pct(snapshot: &PortfolioSnapshot) -> Decimal {
    if snapshot.total_value <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (snapshot.cash.value_usd / snapshot.total_value * Decimal::ONE_HUNDRED).round_dp(PCT_SCALE)
}

/// Classify the snapshot against the exposure band and decide whether idle
/// cash has waited long enough to force deployment.
///
/// A missing or inconsistent snapshot is `DataUnavailable`.
pub fn evaluate_exposure(
    snapshot: Option<&PortfolioSnapshot>,
    config: &ExposureConfig,
    history: &ExposureHistory,
) -> Result<ExposureAssessment, SessionFault> {
    let snapshot = snapshot.ok_or_else(|| SessionFault::DataUnavailable {
        reason: "no portfolio snapshot".to_string(),
    })?;
    snapshot
        .validate()
        .map_err(|e| SessionFault::DataUnavailable {
            reason: e.to_string(),
        })?;

    let risk_pct = risk_exposure_pct(snapshot);
    let cash_pct = cash_pct(snapshot);

    let state = if risk_pct < config.min_exposure_pct {
        ExposureState::UnderExposed
    } else if risk_pct > config.max_exposure_pct {
        ExposureState::OverExposed
    } else {
        ExposureState::WithinRange
    };

    let forced_deployment_eligible = cash_pct > config.force_deploy_threshold_pct
        && history.high_cash_days > Decimal::from(config.force_deploy_after_days);

    Ok(ExposureAssessment {
        risk_exposure_pct: risk_pct,
        cash_pct,
        state,
        mode: SessionMode::from(state),
        forced_deployment_eligible,
        under_exposed_days: history.under_exposed_days,
        high_cash_days: history.high_cash_days,
    })
}

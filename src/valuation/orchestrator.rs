// src/valuation/orchestrator.rs
use crate::analysis::metrics::{self, HistoricalMetrics};
use crate::analysis::quality::DataQualityGate;
use crate::config::Config;
use crate::domain::errors::{HardStop, Warning};
use crate::domain::models::{
    DataQualityReport, EquityBridge, FetchDiagnostics, HistoricalRecord, ProjectionRow,
    UsableYear,
};
use crate::valuation::assumptions::{AssumptionEngine, AssumptionOverrides, ValuationAssumptions};
use crate::valuation::discounting::discount;
use crate::valuation::projection::project;
use crate::valuation::sensitivity::{centered_axis, sweep, SensitivityResult, SweepInputs};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Everything needed to value one company, as handed over by the fetch step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationRequest {
    pub history: Vec<HistoricalRecord>,
    pub diagnostics: FetchDiagnostics,
    pub bridge: EquityBridge,
    #[serde(default)]
    pub overrides: AssumptionOverrides,
}

/// The computed valuation of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Valuation {
    pub enterprise_value: Decimal,
    pub net_debt: Decimal,
    pub equity_value: Decimal,
    pub equity_value_per_share: Decimal,
    pub pv_explicit_fcff: Decimal,
    pub terminal_value: Decimal,
    pub pv_terminal_value: Decimal,
    pub projection: Vec<ProjectionRow>,
    pub assumptions: ValuationAssumptions,
}

/// Final artifact of a run. When `success` is false, `failure` explains why
/// and no valuation or sensitivity grid is present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValuationResult {
    pub ticker: String,
    pub currency: String,
    pub success: bool,
    pub failure: Option<HardStop>,
    pub quality_report: DataQualityReport,
    pub metrics: Option<HistoricalMetrics>,
    pub valuation: Option<Valuation>,
    pub sensitivity: Option<SensitivityResult>,
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioValuations {
    pub bear: Valuation,
    pub base: Valuation,
    pub bull: Valuation,
}

impl ValuationResult {
    fn failed(
        ticker: &str,
        currency: &str,
        quality_report: DataQualityReport,
        metrics: Option<HistoricalMetrics>,
        warnings: Vec<Warning>,
        reason: HardStop,
    ) -> Self {
        log::error!("[{}] Valuation stopped: {}", ticker, reason);
        Self {
            ticker: ticker.to_string(),
            currency: currency.to_string(),
            success: false,
            failure: Some(reason),
            quality_report,
            metrics,
            valuation: None,
            sensitivity: None,
            warnings,
        }
    }
}

/// Gate and metrics output shared by the single-case and scenario runs.
struct Prepared {
    report: DataQualityReport,
    metrics: HistoricalMetrics,
    warnings: Vec<Warning>,
}

/// Sequences gate, metrics, assumptions, projection, discounting and sensitivity.
pub struct ValuationOrchestrator {
    config: Config,
    gate: DataQualityGate,
    engine: AssumptionEngine,
}

impl ValuationOrchestrator {
    pub fn new(config: Config) -> Self {
        Self {
            gate: DataQualityGate::new(config.quality.clone()),
            engine: AssumptionEngine::new(config.assumptions.clone()),
            config,
        }
    }

    pub fn run_request(&self, request: &ValuationRequest) -> ValuationResult {
        self.run(
            &request.history,
            &request.diagnostics,
            &request.overrides,
            &request.bridge,
        )
    }

    pub fn run(
        &self,
        history: &[HistoricalRecord],
        diagnostics: &FetchDiagnostics,
        overrides: &AssumptionOverrides,
        bridge: &EquityBridge,
    ) -> ValuationResult {
        let ticker = diagnostics.ticker.as_str();
        let currency = reporting_currency(history);
        log::info!("[{}] Starting valuation over {} records", ticker, history.len());

        let prepared = match self.prepare(history, diagnostics) {
            Ok(prepared) => prepared,
            Err((report, reason)) => {
                let warnings = report.warnings.clone();
                return ValuationResult::failed(ticker, &currency, report, None, warnings, reason);
            }
        };
        let Prepared {
            report,
            metrics,
            warnings,
        } = prepared;

        let assumptions = match self.engine.resolve(&metrics, overrides, None) {
            Ok(assumptions) => assumptions,
            Err(e) => {
                return ValuationResult::failed(
                    ticker,
                    &currency,
                    report,
                    Some(metrics),
                    warnings,
                    e.into(),
                )
            }
        };

        let outcome = latest_year(&report).and_then(|base| {
            let valuation = value(base, assumptions, bridge)?;
            let sensitivity = self.sensitivity_grid(base, &valuation.assumptions, bridge)?;
            Ok((valuation, sensitivity))
        });

        match outcome {
            Ok((valuation, sensitivity)) => {
                log::info!(
                    "[{}] EV {} / equity {} / per share {}",
                    ticker,
                    valuation.enterprise_value.round_dp(2),
                    valuation.equity_value.round_dp(2),
                    valuation.equity_value_per_share.round_dp(4)
                );
                ValuationResult {
                    ticker: ticker.to_string(),
                    currency,
                    success: true,
                    failure: None,
                    quality_report: report,
                    metrics: Some(metrics),
                    valuation: Some(valuation),
                    sensitivity,
                    warnings,
                }
            }
            Err(reason) => {
                ValuationResult::failed(ticker, &currency, report, Some(metrics), warnings, reason)
            }
        }
    }

    /// Value bear, base and bull assumption sets over the same history.
    pub fn run_scenarios(&self, request: &ValuationRequest) -> Result<ScenarioValuations, HardStop> {
        let prepared = self
            .prepare(&request.history, &request.diagnostics)
            .map_err(|(_, reason)| reason)?;
        let scenarios = self
            .engine
            .resolve_scenarios(&prepared.metrics, &request.overrides, None)?;
        let base_year = latest_year(&prepared.report)?;

        Ok(ScenarioValuations {
            bear: value(base_year, scenarios.bear, &request.bridge)?,
            base: value(base_year, scenarios.base, &request.bridge)?,
            bull: value(base_year, scenarios.bull, &request.bridge)?,
        })
    }

    fn prepare(
        &self,
        history: &[HistoricalRecord],
        diagnostics: &FetchDiagnostics,
    ) -> Result<Prepared, (DataQualityReport, HardStop)> {
        let mut report = self.gate.evaluate_with_diagnostics(history, diagnostics);
        if let Some(reason) = report.hard_stop.clone() {
            return Err((report, reason));
        }

        let metrics = match metrics::derive(&report.usable) {
            Ok(metrics) => metrics,
            Err(e) => {
                let reason = HardStop::from(e);
                report.record_stop(reason.clone());
                return Err((report, reason));
            }
        };

        let mut warnings = report.warnings.clone();
        warnings.extend(metrics.growth_gap_warnings());

        Ok(Prepared {
            report,
            metrics,
            warnings,
        })
    }

    fn sensitivity_grid(
        &self,
        base_year: &UsableYear,
        assumptions: &ValuationAssumptions,
        bridge: &EquityBridge,
    ) -> Result<Option<SensitivityResult>, HardStop> {
        let settings = &self.config.sensitivity;
        if !settings.enabled {
            return Ok(None);
        }

        let wacc_values = centered_axis(assumptions.wacc(), settings.wacc_step, settings.steps_each_side);
        let growth_values = centered_axis(
            assumptions.terminal_growth(),
            settings.terminal_growth_step,
            settings.steps_each_side,
        );
        let inputs = SweepInputs {
            base_year,
            assumptions,
            bridge,
        };

        sweep(&inputs, &wacc_values, &growth_values)
            .map(Some)
            .map_err(|e| HardStop::ValuationFailed {
                message: e.to_string(),
            })
    }
}

fn value(
    base_year: &UsableYear,
    assumptions: ValuationAssumptions,
    bridge: &EquityBridge,
) -> Result<Valuation, HardStop> {
    let projection = project(base_year, &assumptions)?;
    let discounted = discount(&projection, &assumptions, bridge)?;

    Ok(Valuation {
        enterprise_value: discounted.enterprise_value,
        net_debt: discounted.net_debt,
        equity_value: discounted.equity_value,
        equity_value_per_share: discounted.equity_value_per_share,
        pv_explicit_fcff: discounted.pv_explicit_fcff,
        terminal_value: discounted.terminal_value,
        pv_terminal_value: discounted.pv_terminal_value,
        projection,
        assumptions,
    })
}

fn latest_year(report: &DataQualityReport) -> Result<&UsableYear, HardStop> {
    report.latest().ok_or(HardStop::InsufficientHistory {
        required: 1,
        available: 0,
    })
}

/// Currency of the most recent record.
fn reporting_currency(history: &[HistoricalRecord]) -> String {
    history
        .iter()
        .max_by_key(|r| r.fiscal_year)
        .map(|r| r.currency.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(year: i32, revenue: Decimal, ebit: Decimal, fcf: Decimal) -> HistoricalRecord {
        let mut r = HistoricalRecord::new(year, "USD");
        r.revenue = Some(revenue);
        r.ebit = Some(ebit);
        r.free_cash_flow = Some(fcf);
        r.sector = Some("Industrials".to_string());
        r
    }

    fn request() -> ValuationRequest {
        ValuationRequest {
            history: vec![
                record(2020, dec!(1000), dec!(150), dec!(90)),
                record(2021, dec!(1080), dec!(162), dec!(95)),
                record(2022, dec!(1166.4), dec!(175), dec!(100)),
                record(2023, dec!(1259.712), dec!(189), dec!(110)),
            ],
            diagnostics: FetchDiagnostics::new("ACME", "fixture", 4, 4),
            bridge: EquityBridge {
                net_debt: dec!(200),
                shares_outstanding: dec!(50),
            },
            overrides: AssumptionOverrides {
                wacc: Some(dec!(0.09)),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_successful_run() {
        let result = ValuationOrchestrator::new(Config::default()).run_request(&request());

        assert!(result.success);
        assert!(result.failure.is_none());
        assert_eq!(result.ticker, "ACME");
        assert_eq!(result.currency, "USD");

        let valuation = result.valuation.as_ref().unwrap();
        assert_eq!(valuation.projection.len(), 5);
        assert_eq!(valuation.projection[0].fiscal_year, 2024);
        assert_eq!(
            valuation.equity_value,
            valuation.enterprise_value - dec!(200)
        );
        assert_eq!(
            valuation.equity_value_per_share,
            valuation.equity_value / dec!(50)
        );

        let grid = result.sensitivity.as_ref().unwrap();
        assert_eq!(grid.shape(), (5, 5));
        assert_eq!(
            grid.lookup(dec!(0.09), dec!(0.025)).and_then(|c| c.value()),
            Some(valuation.equity_value_per_share)
        );
    }

    #[test]
    fn test_hard_stop_returns_no_valuation() {
        let mut req = request();
        for r in req.history.iter_mut() {
            r.industry = Some("Insurance - Life".to_string());
        }
        let result = ValuationOrchestrator::new(Config::default()).run_request(&req);

        assert!(!result.success);
        assert!(result.valuation.is_none());
        assert!(result.sensitivity.is_none());
        assert!(matches!(
            result.failure,
            Some(HardStop::ClassificationExcluded { .. })
        ));
        assert_eq!(result.failure, result.quality_report.hard_stop);
    }

    #[test]
    fn test_too_few_usable_years_stops_at_metrics() {
        let mut req = request();
        for (r, revenue) in req.history.iter_mut().zip([dec!(-10), dec!(-20), dec!(-5)]) {
            r.revenue = Some(revenue);
        }
        let result = ValuationOrchestrator::new(Config::default()).run_request(&req);

        assert!(!result.success);
        assert_eq!(
            result.failure,
            Some(HardStop::InsufficientHistory {
                required: 2,
                available: 1
            })
        );
        assert!(result.metrics.is_none());
        assert!(result.valuation.is_none());
        assert!(result.sensitivity.is_none());
        // The report carries the stop as well as the years that proved insufficient
        assert_eq!(result.quality_report.hard_stop, result.failure);
        assert_eq!(result.quality_report.usable_fiscal_years(), vec![2023]);
        assert_eq!(result.quality_report.dropped.len(), 3);
    }

    #[test]
    fn test_invalid_spread_short_circuits() {
        let mut req = request();
        req.overrides.terminal_growth = Some(dec!(0.09));
        let result = ValuationOrchestrator::new(Config::default()).run_request(&req);

        assert!(!result.success);
        assert_eq!(
            result.failure,
            Some(HardStop::InvalidTerminalSpread {
                wacc: dec!(0.09),
                terminal_growth: dec!(0.09)
            })
        );
        assert!(result.valuation.is_none());
        assert!(result.metrics.is_some());
    }

    #[test]
    fn test_sensitivity_can_be_disabled() {
        let mut config = Config::default();
        config.sensitivity.enabled = false;
        let result = ValuationOrchestrator::new(config).run_request(&request());

        assert!(result.success);
        assert!(result.sensitivity.is_none());
    }

    #[test]
    fn test_scenarios_share_history_and_shift_paths() {
        let req = request();
        let orchestrator = ValuationOrchestrator::new(Config::default());
        let scenarios = orchestrator.run_scenarios(&req).unwrap();
        let single = orchestrator.run_request(&req);

        assert_eq!(Some(&scenarios.base), single.valuation.as_ref());

        let base_margin = scenarios.base.assumptions.ebit_margin().rates[0];
        assert_eq!(
            scenarios.bear.assumptions.ebit_margin().rates[0],
            base_margin - dec!(0.03)
        );
        assert_eq!(
            scenarios.bull.assumptions.ebit_margin().rates[0],
            base_margin + dec!(0.03)
        );
        assert!(scenarios.bull.projection[4].revenue > scenarios.base.projection[4].revenue);
        assert!(scenarios.bear.projection[4].revenue < scenarios.base.projection[4].revenue);
    }
}

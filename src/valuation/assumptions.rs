// src/valuation/assumptions.rs
use crate::analysis::metrics::HistoricalMetrics;
use crate::config::AssumptionConfig;
use crate::domain::errors::{AssumptionError, AssumptionResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const MIN_HORIZON: u32 = 5;
pub const MAX_HORIZON: u32 = 10;

/// Capital-structure inputs for the WACC formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaccInputs {
    pub risk_free_rate: Decimal,
    pub beta: Decimal,
    pub equity_risk_premium: Decimal,
    pub cost_of_debt: Decimal,
    pub tax_rate: Decimal,
    pub equity_weight: Decimal,
    pub debt_weight: Decimal,
}

impl WaccInputs {
    /// CAPM: rf + beta * ERP
    pub fn cost_of_equity(&self) -> Decimal {
        self.risk_free_rate + self.beta * self.equity_risk_premium
    }

    pub fn after_tax_cost_of_debt(&self) -> Decimal {
        self.cost_of_debt * (Decimal::ONE - self.tax_rate)
    }

    pub fn wacc(&self) -> Decimal {
        self.equity_weight * self.cost_of_equity() + self.debt_weight * self.after_tax_cost_of_debt()
    }
}

/// Shape of the fade from the latest historical growth to terminal growth.
/// Year `i` of `n` moves a fraction `(i/n)^k` of the way; linear is `k = 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum FadeCurve {
    Linear,
    Power { exponent: u32 },
}

impl FadeCurve {
    fn weight(&self, year: u32, horizon: u32) -> Decimal {
        let fraction = Decimal::from(year) / Decimal::from(horizon);
        let exponent = match self {
            FadeCurve::Linear => 1,
            FadeCurve::Power { exponent } => *exponent,
        };
        (0..exponent).fold(Decimal::ONE, |acc, _| acc * fraction)
    }

    /// A zero exponent would jump straight to terminal growth in year one.
    pub fn validate(&self) -> AssumptionResult<()> {
        match self {
            FadeCurve::Power { exponent: 0 } => Err(AssumptionError::InvalidFadeCurve { exponent: 0 }),
            _ => Ok(()),
        }
    }
}

/// How much of each year's operating profit is reinvested to fund growth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ReinvestmentPolicy {
    /// reinvestment = NOPAT * growth / ROIC
    GrowthOverRoic { roic: Decimal },
    /// reinvestment = change in revenue / sales-to-capital ratio
    SalesToCapital { ratio: Decimal },
}

/// Where a per-year rate path came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum PathSource {
    /// Latest historical value held constant
    Historical,
    /// Faded from `start` to terminal growth
    Faded { start: Decimal, curve: FadeCurve },
    /// Shifted from a base path for a scenario
    Shifted { shift: Decimal },
    /// Caller-supplied
    Override,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatePath {
    pub rates: Vec<Decimal>,
    pub source: PathSource,
}

impl RatePath {
    pub fn constant(rate: Decimal, horizon: u32, source: PathSource) -> Self {
        Self {
            rates: vec![rate; horizon as usize],
            source,
        }
    }
}

/// Revenue growth path ending exactly at `end` in the final year.
pub fn fade_path(start: Decimal, end: Decimal, horizon: u32, curve: FadeCurve) -> Vec<Decimal> {
    (1..=horizon)
        .map(|year| start + (end - start) * curve.weight(year, horizon))
        .collect()
}

/// A caller-supplied rate path: one rate for every year, or one per year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RatePathOverride {
    Constant(Decimal),
    PerYear(Vec<Decimal>),
}

impl RatePathOverride {
    fn expand(&self, field: &'static str, horizon: u32) -> AssumptionResult<RatePath> {
        match self {
            RatePathOverride::Constant(rate) => {
                Ok(RatePath::constant(*rate, horizon, PathSource::Override))
            }
            RatePathOverride::PerYear(rates) if rates.len() == horizon as usize => Ok(RatePath {
                rates: rates.clone(),
                source: PathSource::Override,
            }),
            RatePathOverride::PerYear(rates) => Err(AssumptionError::InvalidOverride {
                field,
                message: format!("{} rates given for a {}-year horizon", rates.len(), horizon),
            }),
        }
    }
}

/// Partial assumption set supplied by the caller. Each present field replaces
/// the default wholesale. Unknown keys are rejected at parse time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssumptionOverrides {
    #[serde(default)]
    pub revenue_growth_path: Option<RatePathOverride>,
    #[serde(default)]
    pub margin_path: Option<RatePathOverride>,
    #[serde(default)]
    pub wacc: Option<Decimal>,
    #[serde(default)]
    pub terminal_growth: Option<Decimal>,
    #[serde(default)]
    pub horizon: Option<u32>,
}

impl AssumptionOverrides {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// A complete, validated set of forward assumptions for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValuationAssumptions {
    revenue_growth: RatePath,
    ebit_margin: RatePath,
    wacc: Decimal,
    terminal_growth: Decimal,
    horizon: u32,
    tax_rate: Decimal,
    reinvestment: ReinvestmentPolicy,
}

impl ValuationAssumptions {
    /// Validates every invariant. The terminal spread is checked first so a
    /// terminal growth at or above WACC always reports `InvalidTerminalSpread`.
    pub fn new(
        revenue_growth: RatePath,
        ebit_margin: RatePath,
        wacc: Decimal,
        terminal_growth: Decimal,
        horizon: u32,
        tax_rate: Decimal,
        reinvestment: ReinvestmentPolicy,
    ) -> AssumptionResult<Self> {
        if terminal_growth >= wacc {
            return Err(AssumptionError::InvalidTerminalSpread {
                wacc,
                terminal_growth,
            });
        }
        if !(MIN_HORIZON..=MAX_HORIZON).contains(&horizon) {
            return Err(AssumptionError::InvalidHorizon(horizon));
        }
        if wacc <= Decimal::ZERO {
            return Err(AssumptionError::RateOutOfRange {
                field: "wacc",
                value: wacc,
            });
        }
        if tax_rate < Decimal::ZERO || tax_rate >= Decimal::ONE {
            return Err(AssumptionError::RateOutOfRange {
                field: "tax_rate",
                value: tax_rate,
            });
        }
        for (field, path) in [("revenue_growth_path", &revenue_growth), ("margin_path", &ebit_margin)] {
            if path.rates.len() != horizon as usize {
                return Err(AssumptionError::InvalidOverride {
                    field,
                    message: format!(
                        "path has {} rates for a {}-year horizon",
                        path.rates.len(),
                        horizon
                    ),
                });
            }
        }
        if let PathSource::Faded { curve, .. } = revenue_growth.source {
            curve.validate()?;
        }
        if let Some(rate) = revenue_growth.rates.iter().find(|g| **g <= -Decimal::ONE) {
            return Err(AssumptionError::RateOutOfRange {
                field: "revenue_growth_path",
                value: *rate,
            });
        }
        match reinvestment {
            ReinvestmentPolicy::GrowthOverRoic { roic } if roic <= Decimal::ZERO => {
                return Err(AssumptionError::RateOutOfRange {
                    field: "roic",
                    value: roic,
                });
            }
            ReinvestmentPolicy::SalesToCapital { ratio } if ratio <= Decimal::ZERO => {
                return Err(AssumptionError::RateOutOfRange {
                    field: "sales_to_capital",
                    value: ratio,
                });
            }
            _ => {}
        }

        Ok(Self {
            revenue_growth,
            ebit_margin,
            wacc,
            terminal_growth,
            horizon,
            tax_rate,
            reinvestment,
        })
    }

    pub fn revenue_growth(&self) -> &RatePath {
        &self.revenue_growth
    }

    pub fn ebit_margin(&self) -> &RatePath {
        &self.ebit_margin
    }

    pub fn wacc(&self) -> Decimal {
        self.wacc
    }

    pub fn terminal_growth(&self) -> Decimal {
        self.terminal_growth
    }

    pub fn horizon(&self) -> u32 {
        self.horizon
    }

    pub fn tax_rate(&self) -> Decimal {
        self.tax_rate
    }

    pub fn reinvestment(&self) -> ReinvestmentPolicy {
        self.reinvestment
    }

    /// A copy with both rate paths moved by `shift`; bear-side paths are floored at zero.
    fn shifted(&self, shift: Decimal) -> AssumptionResult<Self> {
        let move_path = |path: &RatePath| RatePath {
            rates: path
                .rates
                .iter()
                .map(|r| {
                    let moved = *r + shift;
                    if shift < Decimal::ZERO {
                        moved.max(Decimal::ZERO)
                    } else {
                        moved
                    }
                })
                .collect(),
            source: PathSource::Shifted { shift },
        };
        Self::new(
            move_path(&self.revenue_growth),
            move_path(&self.ebit_margin),
            self.wacc,
            self.terminal_growth,
            self.horizon,
            self.tax_rate,
            self.reinvestment,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioSet {
    pub bear: ValuationAssumptions,
    pub base: ValuationAssumptions,
    pub bull: ValuationAssumptions,
}

/// Resolves forward assumptions from historical metrics plus overrides.
pub struct AssumptionEngine {
    config: AssumptionConfig,
}

impl AssumptionEngine {
    pub fn new(config: AssumptionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AssumptionConfig {
        &self.config
    }

    pub fn resolve(
        &self,
        metrics: &HistoricalMetrics,
        overrides: &AssumptionOverrides,
        horizon: Option<u32>,
    ) -> AssumptionResult<ValuationAssumptions> {
        let horizon = overrides
            .horizon
            .or(horizon)
            .unwrap_or(self.config.default_horizon);
        if !(MIN_HORIZON..=MAX_HORIZON).contains(&horizon) {
            return Err(AssumptionError::InvalidHorizon(horizon));
        }

        let wacc = match (overrides.wacc, &self.config.capital_structure) {
            (Some(wacc), _) => wacc,
            (None, Some(inputs)) => inputs.wacc(),
            (None, None) => return Err(AssumptionError::MissingInput("wacc")),
        };

        let terminal_growth = overrides
            .terminal_growth
            .or(self.config.terminal_growth)
            .ok_or(AssumptionError::MissingInput("terminal_growth"))?;

        if terminal_growth >= wacc {
            return Err(AssumptionError::InvalidTerminalSpread {
                wacc,
                terminal_growth,
            });
        }

        let revenue_growth = match &overrides.revenue_growth_path {
            Some(path) => path.expand("revenue_growth_path", horizon)?,
            None => {
                let start = metrics
                    .latest_growth
                    .ok_or(AssumptionError::MissingInput("revenue_growth"))?;
                RatePath {
                    rates: fade_path(start, terminal_growth, horizon, self.config.fade_curve),
                    source: PathSource::Faded {
                        start,
                        curve: self.config.fade_curve,
                    },
                }
            }
        };

        let ebit_margin = match &overrides.margin_path {
            Some(path) => path.expand("margin_path", horizon)?,
            None => {
                let margin = metrics
                    .latest_margin
                    .ok_or(AssumptionError::MissingInput("ebit_margin"))?;
                RatePath::constant(margin, horizon, PathSource::Historical)
            }
        };

        let assumptions = ValuationAssumptions::new(
            revenue_growth,
            ebit_margin,
            wacc,
            terminal_growth,
            horizon,
            self.config.tax_rate,
            self.config.reinvestment,
        )?;

        log::info!(
            "Resolved assumptions: horizon {}, WACC {}, terminal growth {}, first-year growth {}",
            assumptions.horizon,
            assumptions.wacc.round_dp(4),
            assumptions.terminal_growth,
            assumptions.revenue_growth.rates[0].round_dp(4)
        );

        Ok(assumptions)
    }

    /// Bear/base/bull sets around the resolved base case.
    pub fn resolve_scenarios(
        &self,
        metrics: &HistoricalMetrics,
        overrides: &AssumptionOverrides,
        horizon: Option<u32>,
    ) -> AssumptionResult<ScenarioSet> {
        let base = self.resolve(metrics, overrides, horizon)?;
        let spread = self.config.scenario_spread;
        Ok(ScenarioSet {
            bear: base.shifted(-spread)?,
            bull: base.shifted(spread)?,
            base,
        })
    }
}

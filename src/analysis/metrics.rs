// src/analysis/metrics.rs
use crate::domain::errors::{MetricsError, MetricsResult, Warning};
use crate::domain::models::UsableYear;
use rust_decimal::{Decimal, MathematicalOps};
use serde::Serialize;

/// Years used for the trailing CAGR and FCF margin averages.
const TRAILING_WINDOW: usize = 5;

/// Minimum usable years needed to form a growth pair.
const MIN_METRIC_YEARS: usize = 2;

/// Revenue growth between two consecutive usable years.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrowthObservation {
    pub from_year: i32,
    pub to_year: i32,
    pub span_years: i32,
    /// Annualised growth; `None` when it cannot be computed from the endpoints.
    pub rate: Option<Decimal>,
    /// Set when the pair spans more than one fiscal year (a dropped year in between).
    pub low_confidence: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarginObservation {
    pub fiscal_year: i32,
    pub margin: Option<Decimal>,
}

/// Statistics derived from the usable years of a quality report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoricalMetrics {
    pub first_year: i32,
    pub latest_year: i32,
    pub latest_revenue: Decimal,
    pub revenue_growth: Vec<GrowthObservation>,
    pub ebit_margins: Vec<MarginObservation>,
    pub latest_growth: Option<Decimal>,
    pub average_growth: Option<Decimal>,
    pub latest_margin: Option<Decimal>,
    pub average_margin: Option<Decimal>,
    pub revenue_cagr: Option<Decimal>,
    pub average_fcf_margin: Option<Decimal>,
    pub fcf_volatility: Option<Decimal>,
}

impl HistoricalMetrics {
    /// Warnings for growth pairs that bridge a gap in the usable years.
    pub fn growth_gap_warnings(&self) -> Vec<Warning> {
        self.revenue_growth
            .iter()
            .filter(|g| g.low_confidence)
            .map(|g| Warning::MultiYearGrowthGap {
                from_year: g.from_year,
                to_year: g.to_year,
                span_years: g.span_years,
            })
            .collect()
    }
}

/// Derive growth, margin and volatility metrics from usable years.
/// Input must be in ascending fiscal-year order, as the quality gate produces it.
pub fn derive(usable: &[UsableYear]) -> MetricsResult<HistoricalMetrics> {
    if usable.len() < MIN_METRIC_YEARS {
        return Err(MetricsError::InsufficientHistory {
            required: MIN_METRIC_YEARS,
            available: usable.len(),
        });
    }

    let revenue_growth: Vec<GrowthObservation> = usable
        .windows(2)
        .map(|pair| growth_between(&pair[0], &pair[1]))
        .collect();

    let ebit_margins: Vec<MarginObservation> = usable
        .iter()
        .map(|y| MarginObservation {
            fiscal_year: y.fiscal_year,
            margin: ratio(y.ebit, y.revenue),
        })
        .collect();

    let growth_rates: Vec<Decimal> = revenue_growth.iter().filter_map(|g| g.rate).collect();
    let margins: Vec<Decimal> = ebit_margins.iter().filter_map(|m| m.margin).collect();

    let trailing = &usable[usable.len().saturating_sub(TRAILING_WINDOW)..];
    let fcf_margins: Vec<Decimal> = trailing
        .iter()
        .filter_map(|y| ratio(y.fcf, y.revenue))
        .collect();
    let fcf_series: Vec<Decimal> = usable.iter().map(|y| y.fcf).collect();

    let first = &usable[0];
    let latest = &usable[usable.len() - 1];

    let metrics = HistoricalMetrics {
        first_year: first.fiscal_year,
        latest_year: latest.fiscal_year,
        latest_revenue: latest.revenue,
        latest_growth: revenue_growth.iter().rev().find_map(|g| g.rate),
        average_growth: mean(&growth_rates),
        latest_margin: ebit_margins.iter().rev().find_map(|m| m.margin),
        average_margin: mean(&margins),
        revenue_cagr: cagr(&trailing[0], &trailing[trailing.len() - 1]),
        average_fcf_margin: mean(&fcf_margins),
        fcf_volatility: coefficient_of_variation(&fcf_series),
        revenue_growth,
        ebit_margins,
    };

    log::debug!(
        "Derived metrics {}-{}: latest growth {:?}, latest margin {:?}, FCF CV {:?}",
        metrics.first_year,
        metrics.latest_year,
        metrics.latest_growth,
        metrics.latest_margin,
        metrics.fcf_volatility
    );

    Ok(metrics)
}

fn growth_between(from: &UsableYear, to: &UsableYear) -> GrowthObservation {
    let span_years = to.fiscal_year - from.fiscal_year;
    GrowthObservation {
        from_year: from.fiscal_year,
        to_year: to.fiscal_year,
        span_years,
        rate: annualised_growth(from.revenue, to.revenue, span_years),
        low_confidence: span_years > 1,
    }
}

/// Geometric annual growth from `start` to `end` over `years`.
fn annualised_growth(start: Decimal, end: Decimal, years: i32) -> Option<Decimal> {
    if years <= 0 || start <= Decimal::ZERO {
        return None;
    }
    let ratio = end.checked_div(start)?;
    if years == 1 {
        return ratio.checked_sub(Decimal::ONE);
    }
    if end <= Decimal::ZERO {
        return None;
    }
    let exponent = Decimal::ONE / Decimal::from(years);
    ratio.checked_powd(exponent)?.checked_sub(Decimal::ONE)
}

fn cagr(from: &UsableYear, to: &UsableYear) -> Option<Decimal> {
    if from.revenue <= Decimal::ZERO || to.revenue <= Decimal::ZERO {
        return None;
    }
    annualised_growth(from.revenue, to.revenue, to.fiscal_year - from.fiscal_year)
}

fn ratio(numerator: Decimal, denominator: Decimal) -> Option<Decimal> {
    numerator.checked_div(denominator)
}

/// Arithmetic mean; `None` for an empty series or when the sum leaves the
/// Decimal range.
pub fn mean(values: &[Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }
    let sum = values
        .iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(*v))?;
    sum.checked_div(Decimal::from(values.len()))
}

/// Population standard deviation over absolute mean. `None` when the series is
/// empty, its mean is zero, or the spread is too wide to represent.
/// Values are scaled by |mean| first so large reporting currencies stay in range.
pub fn coefficient_of_variation(values: &[Decimal]) -> Option<Decimal> {
    let avg = mean(values)?;
    if avg.is_zero() {
        return None;
    }

    let scale = avg.abs();
    let scaled: Vec<Decimal> = values
        .iter()
        .map(|v| v.checked_div(scale))
        .collect::<Option<_>>()?;
    let scaled_avg = mean(&scaled)?;

    let sum_squared_diff = scaled.iter().try_fold(Decimal::ZERO, |acc, &v| {
        let diff = v.checked_sub(scaled_avg)?;
        acc.checked_add(diff.checked_mul(diff)?)
    })?;
    let variance = sum_squared_diff.checked_div(Decimal::from(values.len()))?;

    variance.sqrt()
}

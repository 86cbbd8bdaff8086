// src/valuation/sensitivity.rs
use crate::domain::errors::{ProjectionError, ProjectionResult, SensitivityError, SweepResult};
use crate::domain::models::{EquityBridge, ProjectionRow, UsableYear};
use crate::valuation::assumptions::{fade_path, PathSource, ValuationAssumptions};
use crate::valuation::discounting::discount_at;
use crate::valuation::projection::{project, project_with};
use rust_decimal::Decimal;
use serde::Serialize;

/// Read-only inputs shared by every cell of a sweep.
#[derive(Debug, Clone)]
pub struct SweepInputs<'a> {
    pub base_year: &'a UsableYear,
    pub assumptions: &'a ValuationAssumptions,
    pub bridge: &'a EquityBridge,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UndefinedReason {
    /// WACC at or below terminal growth
    SpreadNotPositive,
    ProjectionFailed { message: String },
    DiscountFailed { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SensitivityCell {
    Value(Decimal),
    Undefined(UndefinedReason),
}

impl SensitivityCell {
    pub fn value(&self) -> Option<Decimal> {
        match self {
            SensitivityCell::Value(v) => Some(*v),
            SensitivityCell::Undefined(_) => None,
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, SensitivityCell::Value(_))
    }
}

/// Equity value per share over WACC (rows) x terminal growth (columns).
/// Axes keep the order the caller supplied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensitivityResult {
    pub wacc_values: Vec<Decimal>,
    pub terminal_growth_values: Vec<Decimal>,
    pub cells: Vec<Vec<SensitivityCell>>,
}

impl SensitivityResult {
    pub fn shape(&self) -> (usize, usize) {
        (self.wacc_values.len(), self.terminal_growth_values.len())
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&SensitivityCell> {
        self.cells.get(row).and_then(|r| r.get(col))
    }

    /// Cell for an exact (WACC, terminal growth) pair, if both are on the axes.
    pub fn lookup(&self, wacc: Decimal, terminal_growth: Decimal) -> Option<&SensitivityCell> {
        let row = self.wacc_values.iter().position(|w| *w == wacc)?;
        let col = self
            .terminal_growth_values
            .iter()
            .position(|g| *g == terminal_growth)?;
        self.get(row, col)
    }
}

/// Evenly spaced values around `center`, ascending.
pub fn centered_axis(center: Decimal, step: Decimal, steps_each_side: u32) -> Vec<Decimal> {
    let side = steps_each_side as i64;
    (-side..=side)
        .map(|k| center + step * Decimal::from(k))
        .collect()
}

pub fn sweep(
    inputs: &SweepInputs,
    wacc_values: &[Decimal],
    terminal_growth_values: &[Decimal],
) -> SweepResult<SensitivityResult> {
    if wacc_values.is_empty() {
        return Err(SensitivityError::EmptyAxis("wacc"));
    }
    if terminal_growth_values.is_empty() {
        return Err(SensitivityError::EmptyAxis("terminal_growth"));
    }

    // The projection depends on terminal growth only through a faded growth path
    let base_projection = project(inputs.base_year, inputs.assumptions);
    let columns: Vec<ColumnProjection> = terminal_growth_values
        .iter()
        .map(|&g| ColumnProjection::for_terminal_growth(inputs, g, &base_projection))
        .collect();

    let cells: Vec<Vec<SensitivityCell>> = wacc_values
        .iter()
        .map(|&wacc| {
            terminal_growth_values
                .iter()
                .zip(columns.iter())
                .map(|(&g, column)| evaluate_cell(wacc, g, column, inputs.bridge))
                .collect()
        })
        .collect();

    let undefined = cells
        .iter()
        .flatten()
        .filter(|c| !c.is_defined())
        .count();
    log::info!(
        "Sensitivity grid {}x{} built, {} undefined cells",
        wacc_values.len(),
        terminal_growth_values.len(),
        undefined
    );

    Ok(SensitivityResult {
        wacc_values: wacc_values.to_vec(),
        terminal_growth_values: terminal_growth_values.to_vec(),
        cells,
    })
}

enum ColumnProjection<'a> {
    Shared(&'a ProjectionResult<Vec<ProjectionRow>>),
    Refaded(ProjectionResult<Vec<ProjectionRow>>),
}

impl<'a> ColumnProjection<'a> {
    fn for_terminal_growth(
        inputs: &SweepInputs,
        terminal_growth: Decimal,
        base: &'a ProjectionResult<Vec<ProjectionRow>>,
    ) -> Self {
        let assumptions = inputs.assumptions;
        match assumptions.revenue_growth().source {
            PathSource::Faded { start, curve } if terminal_growth != assumptions.terminal_growth() => {
                let growth = fade_path(start, terminal_growth, assumptions.horizon(), curve);
                ColumnProjection::Refaded(project_with(
                    inputs.base_year,
                    &growth,
                    &assumptions.ebit_margin().rates,
                    assumptions.tax_rate(),
                    assumptions.reinvestment(),
                ))
            }
            _ => ColumnProjection::Shared(base),
        }
    }

    fn rows(&self) -> Result<&[ProjectionRow], &ProjectionError> {
        let projection = match self {
            ColumnProjection::Shared(projection) => *projection,
            ColumnProjection::Refaded(projection) => projection,
        };
        projection.as_deref()
    }
}

fn evaluate_cell(
    wacc: Decimal,
    terminal_growth: Decimal,
    column: &ColumnProjection,
    bridge: &EquityBridge,
) -> SensitivityCell {
    if wacc <= terminal_growth {
        return SensitivityCell::Undefined(UndefinedReason::SpreadNotPositive);
    }
    let projection = match column.rows() {
        Ok(rows) => rows,
        Err(e) => {
            return SensitivityCell::Undefined(UndefinedReason::ProjectionFailed {
                message: e.to_string(),
            })
        }
    };
    match discount_at(projection, wacc, terminal_growth, bridge) {
        Ok(value) => SensitivityCell::Value(value.equity_value_per_share),
        Err(e) => {
            log::debug!("Cell WACC {} / g {} undefined: {}", wacc, terminal_growth, e);
            SensitivityCell::Undefined(UndefinedReason::DiscountFailed {
                message: e.to_string(),
            })
        }
    }
}

// src/domain/errors.rs
use crate::domain::models::RequiredField;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Valuation stopped: {0}")]
    HardStop(#[from] HardStop),

    #[error("Sensitivity error: {0}")]
    Sensitivity(#[from] SensitivityError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Task error: {0}")]
    Task(String),
}

/// A condition that aborts a valuation run. Only the orchestrator turns one of
/// these into a pipeline-level short-circuit; components return them as values.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HardStop {
    #[error("Company classified as financial ({field} '{value}' matches '{keyword}'); FCFF valuation does not apply")]
    ClassificationExcluded {
        field: String,
        value: String,
        keyword: String,
    },

    #[error("Required field(s) missing in a majority of {years_checked} years: {}", join_fields(.fields))]
    MissingRequiredField {
        fields: Vec<RequiredField>,
        years_checked: usize,
    },

    #[error("Insufficient history: need {required} usable years, found {available}")]
    InsufficientHistory { required: usize, available: usize },

    #[error("Terminal growth {terminal_growth} must be strictly below WACC {wacc}")]
    InvalidTerminalSpread { wacc: Decimal, terminal_growth: Decimal },

    #[error("Invalid assumption: {message}")]
    InvalidAssumption { message: String },

    #[error("Valuation failed: {message}")]
    ValuationFailed { message: String },
}

fn join_fields(fields: &[RequiredField]) -> String {
    fields
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetricsError {
    #[error("Insufficient history for metrics: need {required} usable years, found {available}")]
    InsufficientHistory { required: usize, available: usize },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssumptionError {
    #[error("Terminal growth {terminal_growth} must be strictly below WACC {wacc}")]
    InvalidTerminalSpread { wacc: Decimal, terminal_growth: Decimal },

    #[error("Forecast horizon {0} is outside 5..=10 years")]
    InvalidHorizon(u32),

    #[error("No value available for {0}: no override given and no default could be derived")]
    MissingInput(&'static str),

    #[error("Invalid override for {field}: {message}")]
    InvalidOverride { field: &'static str, message: String },

    #[error("Fade curve exponent must be at least 1, got {exponent}")]
    InvalidFadeCurve { exponent: u32 },

    #[error("Rate {field} = {value} is out of range")]
    RateOutOfRange { field: &'static str, value: Decimal },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProjectionError {
    #[error("Projection left the Decimal range in forecast year {year_index}")]
    Overflow { year_index: u32 },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DiscountError {
    #[error("WACC {wacc} must exceed terminal growth {terminal_growth}")]
    InvalidTerminalSpread { wacc: Decimal, terminal_growth: Decimal },

    #[error("Projection is empty")]
    EmptyProjection,

    #[error("Shares outstanding must be positive, got {0}")]
    NonPositiveShares(Decimal),

    #[error("Arithmetic overflow while discounting")]
    Overflow,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SensitivityError {
    #[error("Sensitivity axis '{0}' is empty")]
    EmptyAxis(&'static str),
}

impl From<MetricsError> for HardStop {
    fn from(e: MetricsError) -> Self {
        match e {
            MetricsError::InsufficientHistory {
                required,
                available,
            } => HardStop::InsufficientHistory {
                required,
                available,
            },
        }
    }
}

impl From<AssumptionError> for HardStop {
    fn from(e: AssumptionError) -> Self {
        match e {
            AssumptionError::InvalidTerminalSpread {
                wacc,
                terminal_growth,
            } => HardStop::InvalidTerminalSpread {
                wacc,
                terminal_growth,
            },
            other => HardStop::InvalidAssumption {
                message: other.to_string(),
            },
        }
    }
}

impl From<ProjectionError> for HardStop {
    fn from(e: ProjectionError) -> Self {
        HardStop::ValuationFailed {
            message: e.to_string(),
        }
    }
}

impl From<DiscountError> for HardStop {
    fn from(e: DiscountError) -> Self {
        match e {
            DiscountError::InvalidTerminalSpread {
                wacc,
                terminal_growth,
            } => HardStop::InvalidTerminalSpread {
                wacc,
                terminal_growth,
            },
            other => HardStop::ValuationFailed {
                message: other.to_string(),
            },
        }
    }
}

/// Non-fatal findings attached to a result; the run continues.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    FcfVolatility { coefficient: Decimal, threshold: Decimal },
    FcfVolatilityUndefined,
    YearDropped { fiscal_year: i32, reason: String },
    MultiYearGrowthGap { from_year: i32, to_year: i32, span_years: i32 },
    ShortHistory { requested: usize, returned: usize },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Warning::FcfVolatility {
                coefficient,
                threshold,
            } => write!(
                f,
                "FCF coefficient of variation {} exceeds threshold {}",
                coefficient.round_dp(4),
                threshold
            ),
            Warning::FcfVolatilityUndefined => {
                write!(f, "FCF volatility undefined (mean FCF is zero or the series is out of range)")
            }
            Warning::YearDropped { fiscal_year, reason } => {
                write!(f, "Dropped fiscal year {}: {}", fiscal_year, reason)
            }
            Warning::MultiYearGrowthGap {
                from_year,
                to_year,
                span_years,
            } => write!(
                f,
                "Revenue growth {}->{} spans {} years; annualised and marked low confidence",
                from_year, to_year, span_years
            ),
            Warning::ShortHistory {
                requested,
                returned,
            } => write!(
                f,
                "Requested {} years of history, source returned {}",
                requested, returned
            ),
        }
    }
}

// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
pub type MetricsResult<T> = Result<T, MetricsError>;
pub type AssumptionResult<T> = Result<T, AssumptionError>;
pub type ProjectionResult<T> = Result<T, ProjectionError>;
pub type DiscountResult<T> = Result<T, DiscountError>;
pub type SweepResult<T> = Result<T, SensitivityError>;

// src/domain/models.rs
use crate::domain::errors::{HardStop, Warning};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One fiscal year of reported financials, already mapped onto canonical fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalRecord {
    pub fiscal_year: i32,
    #[serde(default)]
    pub period_end: Option<NaiveDate>,
    #[serde(default)]
    pub revenue: Option<Decimal>,
    #[serde(default)]
    pub ebit: Option<Decimal>,
    #[serde(default)]
    pub free_cash_flow: Option<Decimal>,
    #[serde(default)]
    pub operating_cash_flow: Option<Decimal>,
    /// Sign as reported; most sources report capex as a negative outflow.
    #[serde(default)]
    pub capital_expenditure: Option<Decimal>,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    pub currency: String,
}

impl HistoricalRecord {
    pub fn new(fiscal_year: i32, currency: &str) -> Self {
        Self {
            fiscal_year,
            period_end: None,
            revenue: None,
            ebit: None,
            free_cash_flow: None,
            operating_cash_flow: None,
            capital_expenditure: None,
            sector: None,
            industry: None,
            currency: currency.to_string(),
        }
    }

    /// Reported free cash flow, else operating cash flow less capex.
    /// `None` when neither source is complete.
    pub fn resolved_fcf(&self) -> Option<Decimal> {
        if let Some(fcf) = self.free_cash_flow {
            return Some(fcf);
        }
        match (self.operating_cash_flow, self.capital_expenditure) {
            (Some(ocf), Some(capex)) => Some(ocf - capex.abs()),
            _ => None,
        }
    }

    /// Required fields that cannot be resolved for this year.
    pub fn missing_fields(&self) -> Vec<RequiredField> {
        let mut missing = Vec::new();
        if self.revenue.is_none() {
            missing.push(RequiredField::Revenue);
        }
        if self.ebit.is_none() {
            missing.push(RequiredField::Ebit);
        }
        if self.resolved_fcf().is_none() {
            missing.push(RequiredField::FreeCashFlow);
        }
        missing
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredField {
    Revenue,
    Ebit,
    FreeCashFlow,
}

impl RequiredField {
    pub const ALL: [RequiredField; 3] = [
        RequiredField::Revenue,
        RequiredField::Ebit,
        RequiredField::FreeCashFlow,
    ];
}

impl fmt::Display for RequiredField {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RequiredField::Revenue => write!(f, "revenue"),
            RequiredField::Ebit => write!(f, "EBIT"),
            RequiredField::FreeCashFlow => write!(f, "free cash flow"),
        }
    }
}

/// How the free cash flow series was obtained from the source statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FcfMode {
    ReportedLine,
    OperatingLessCapex,
    Unresolved,
}

/// Metadata about how a company's history was obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchDiagnostics {
    pub ticker: String,
    pub source: String,
    pub years_requested: usize,
    pub years_returned: usize,
    #[serde(default)]
    pub revenue_field: Option<String>,
    #[serde(default)]
    pub ebit_field: Option<String>,
    pub fcf_mode: FcfMode,
    #[serde(default)]
    pub operating_cash_flow_field: Option<String>,
    #[serde(default)]
    pub capital_expenditure_field: Option<String>,
}

impl FetchDiagnostics {
    pub fn new(ticker: &str, source: &str, years_requested: usize, years_returned: usize) -> Self {
        Self {
            ticker: ticker.to_string(),
            source: source.to_string(),
            years_requested,
            years_returned,
            revenue_field: None,
            ebit_field: None,
            fcf_mode: FcfMode::Unresolved,
            operating_cash_flow_field: None,
            capital_expenditure_field: None,
        }
    }
}

/// A year that passed the quality gate, with every required value resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsableYear {
    pub fiscal_year: i32,
    pub revenue: Decimal,
    pub ebit: Decimal,
    pub fcf: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DropReason {
    MissingFields { fields: Vec<RequiredField> },
    NegativeRevenue { revenue: Decimal },
    DuplicateYear,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DropReason::MissingFields { fields } => {
                let names: Vec<String> = fields.iter().map(|x| x.to_string()).collect();
                write!(f, "missing {}", names.join(", "))
            }
            DropReason::NegativeRevenue { revenue } => write!(f, "negative revenue {}", revenue),
            DropReason::DuplicateYear => write!(f, "duplicate fiscal year"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedYear {
    pub fiscal_year: i32,
    pub reason: DropReason,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataQualityReport {
    pub total_years: usize,
    pub usable: Vec<UsableYear>,
    pub dropped: Vec<DroppedYear>,
    pub warnings: Vec<Warning>,
    pub hard_stop: Option<HardStop>,
}

impl DataQualityReport {
    pub fn stopped(total_years: usize, reason: HardStop) -> Self {
        Self {
            total_years,
            usable: Vec::new(),
            dropped: Vec::new(),
            warnings: Vec::new(),
            hard_stop: Some(reason),
        }
    }

    /// Mark a stop found after the gate passed, such as too few usable years
    /// for metrics. The usable years stay for traceability.
    pub fn record_stop(&mut self, reason: HardStop) {
        self.hard_stop = Some(reason);
    }

    pub fn is_hard_stop(&self) -> bool {
        self.hard_stop.is_some()
    }

    pub fn usable_years_count(&self) -> usize {
        self.usable.len()
    }

    pub fn usable_fiscal_years(&self) -> Vec<i32> {
        self.usable.iter().map(|y| y.fiscal_year).collect()
    }

    /// Most recent usable year; the base of the projection.
    pub fn latest(&self) -> Option<&UsableYear> {
        self.usable.last()
    }
}

/// Bridge from enterprise value to per-share equity value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityBridge {
    pub net_debt: Decimal,
    pub shares_outstanding: Decimal,
}

/// One forecast year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectionRow {
    /// 1-based position in the forecast horizon.
    pub year_index: u32,
    pub fiscal_year: i32,
    pub growth: Decimal,
    pub margin: Decimal,
    pub revenue: Decimal,
    pub ebit: Decimal,
    pub taxes: Decimal,
    pub nopat: Decimal,
    pub reinvestment: Decimal,
    pub fcff: Decimal,
}

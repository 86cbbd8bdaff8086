// src/statements/resolver.rs
use crate::domain::models::{FcfMode, FetchDiagnostics, HistoricalRecord};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One fiscal year of statement line items keyed by the provider's field names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawStatement {
    pub fiscal_year: i32,
    #[serde(default)]
    pub period_end: Option<NaiveDate>,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    pub currency: String,
    pub line_items: BTreeMap<String, Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonicalField {
    Revenue,
    Ebit,
    FreeCashFlow,
    OperatingCashFlow,
    CapitalExpenditure,
}

/// Accepted provider names per canonical field, in preference order.
pub const FIELD_TABLE: &[(CanonicalField, &[&str])] = &[
    (CanonicalField::Revenue, &["Total Revenue", "Revenue"]),
    (CanonicalField::Ebit, &["EBIT", "Ebit", "Operating Income"]),
    (CanonicalField::FreeCashFlow, &["Free Cash Flow"]),
    (
        CanonicalField::OperatingCashFlow,
        &[
            "Operating Cash Flow",
            "Total Cash From Operating Activities",
            "Total Cash Flow From Operating Activities",
            "Cash Flow From Operating Activities",
            "Cash Flow From Continuing Operating Activities",
        ],
    ),
    (
        CanonicalField::CapitalExpenditure,
        &[
            "Capital Expenditure",
            "Capital Expenditures",
            "Purchase Of PPE",
            "Net PPE Purchase And Sale",
        ],
    ),
];

fn accepted_names(field: CanonicalField) -> &'static [&'static str] {
    FIELD_TABLE
        .iter()
        .find(|(f, _)| *f == field)
        .map(|(_, names)| *names)
        .unwrap_or(&[])
}

/// First accepted name present in the statement, with its value.
fn lookup(statement: &RawStatement, field: CanonicalField) -> Option<(&'static str, Decimal)> {
    accepted_names(field).iter().find_map(|name| {
        statement
            .line_items
            .get(*name)
            .map(|value| (*name, *value))
    })
}

/// Maps raw statements onto canonical records once, at ingestion.
/// The diagnostics record the source name used for each field (most recent
/// year that resolved it).
pub fn resolve(
    ticker: &str,
    source: &str,
    statements: &[RawStatement],
    years_requested: usize,
) -> (Vec<HistoricalRecord>, FetchDiagnostics) {
    let mut ordered: Vec<&RawStatement> = statements.iter().collect();
    ordered.sort_by_key(|s| s.fiscal_year);

    let mut diagnostics = FetchDiagnostics::new(ticker, source, years_requested, statements.len());
    let mut records = Vec::with_capacity(ordered.len());

    for statement in ordered {
        let revenue = lookup(statement, CanonicalField::Revenue);
        let ebit = lookup(statement, CanonicalField::Ebit);
        let fcf = lookup(statement, CanonicalField::FreeCashFlow);
        let ocf = lookup(statement, CanonicalField::OperatingCashFlow);
        let capex = lookup(statement, CanonicalField::CapitalExpenditure);

        if let Some((name, _)) = revenue {
            diagnostics.revenue_field = Some(name.to_string());
        }
        if let Some((name, _)) = ebit {
            diagnostics.ebit_field = Some(name.to_string());
        }
        match (fcf, ocf, capex) {
            (Some(_), _, _) => diagnostics.fcf_mode = FcfMode::ReportedLine,
            (None, Some((ocf_name, _)), Some((capex_name, _))) => {
                diagnostics.fcf_mode = FcfMode::OperatingLessCapex;
                diagnostics.operating_cash_flow_field = Some(ocf_name.to_string());
                diagnostics.capital_expenditure_field = Some(capex_name.to_string());
            }
            _ => {}
        }

        records.push(HistoricalRecord {
            fiscal_year: statement.fiscal_year,
            period_end: statement.period_end,
            revenue: revenue.map(|(_, v)| v),
            ebit: ebit.map(|(_, v)| v),
            free_cash_flow: fcf.map(|(_, v)| v),
            operating_cash_flow: ocf.map(|(_, v)| v),
            capital_expenditure: capex.map(|(_, v)| v),
            sector: statement.sector.clone(),
            industry: statement.industry.clone(),
            currency: statement.currency.clone(),
        });
    }

    log::debug!(
        "[{}] Resolved {} statements (revenue: {:?}, EBIT: {:?}, FCF mode: {:?})",
        ticker,
        records.len(),
        diagnostics.revenue_field,
        diagnostics.ebit_field,
        diagnostics.fcf_mode
    );

    (records, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn statement(year: i32, items: &[(&str, Decimal)]) -> RawStatement {
        RawStatement {
            fiscal_year: year,
            period_end: NaiveDate::from_ymd_opt(year, 12, 31),
            sector: Some("Technology".to_string()),
            industry: None,
            currency: "USD".to_string(),
            line_items: items
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
        }
    }

    #[test]
    fn test_prefers_first_accepted_name() {
        let (records, diagnostics) = resolve(
            "ACME",
            "fixture",
            &[statement(
                2023,
                &[
                    ("Revenue", dec!(90)),
                    ("Total Revenue", dec!(100)),
                    ("Operating Income", dec!(20)),
                    ("Free Cash Flow", dec!(12)),
                ],
            )],
            1,
        );

        assert_eq!(records[0].revenue, Some(dec!(100)));
        assert_eq!(records[0].ebit, Some(dec!(20)));
        assert_eq!(diagnostics.revenue_field.as_deref(), Some("Total Revenue"));
        assert_eq!(diagnostics.ebit_field.as_deref(), Some("Operating Income"));
        assert_eq!(diagnostics.fcf_mode, FcfMode::ReportedLine);
    }

    #[test]
    fn test_fcf_from_operating_cash_flow_and_capex() {
        let (records, diagnostics) = resolve(
            "ACME",
            "fixture",
            &[statement(
                2023,
                &[
                    ("Total Revenue", dec!(100)),
                    ("EBIT", dec!(20)),
                    ("Cash Flow From Continuing Operating Activities", dec!(30)),
                    ("Capital Expenditure", dec!(-8)),
                ],
            )],
            1,
        );

        assert_eq!(records[0].resolved_fcf(), Some(dec!(22)));
        assert_eq!(diagnostics.fcf_mode, FcfMode::OperatingLessCapex);
        assert_eq!(
            diagnostics.operating_cash_flow_field.as_deref(),
            Some("Cash Flow From Continuing Operating Activities")
        );
        assert_eq!(
            diagnostics.capital_expenditure_field.as_deref(),
            Some("Capital Expenditure")
        );
    }

    #[test]
    fn test_unknown_names_stay_missing_and_records_are_sorted() {
        let (records, diagnostics) = resolve(
            "ACME",
            "fixture",
            &[
                statement(2023, &[("Sales", dec!(100))]),
                statement(2021, &[("Total Revenue", dec!(80))]),
            ],
            5,
        );

        assert_eq!(records[0].fiscal_year, 2021);
        assert_eq!(records[1].revenue, None);
        assert_eq!(records[1].ebit, None);
        assert_eq!(diagnostics.years_requested, 5);
        assert_eq!(diagnostics.years_returned, 2);
        assert_eq!(diagnostics.fcf_mode, FcfMode::Unresolved);
    }
}

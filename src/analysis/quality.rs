// src/analysis/quality.rs
use crate::analysis::metrics::coefficient_of_variation;
use crate::config::QualityConfig;
use crate::domain::errors::{HardStop, Warning};
use crate::domain::models::{
    DataQualityReport, DropReason, DroppedYear, FetchDiagnostics, HistoricalRecord,
    RequiredField, UsableYear,
};
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashSet};

/// Validates raw history and decides whether the pipeline may proceed.
pub struct DataQualityGate {
    config: QualityConfig,
}

impl DataQualityGate {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    pub fn evaluate_with_diagnostics(
        &self,
        history: &[HistoricalRecord],
        diagnostics: &FetchDiagnostics,
    ) -> DataQualityReport {
        let mut report = self.evaluate(history);
        if !report.is_hard_stop() && diagnostics.years_returned < diagnostics.years_requested {
            log::warn!(
                "[{}] {} returned {} of {} requested years",
                diagnostics.ticker,
                diagnostics.source,
                diagnostics.years_returned,
                diagnostics.years_requested
            );
            report.warnings.push(Warning::ShortHistory {
                requested: diagnostics.years_requested,
                returned: diagnostics.years_returned,
            });
        }
        report
    }

    /// Apply the gate rules in precedence order: classification, required
    /// fields, minimum complete years, per-year drops, FCF volatility.
    pub fn evaluate(&self, history: &[HistoricalRecord]) -> DataQualityReport {
        let total = history.len();

        if let Some(stop) = self.check_classification(history) {
            log::error!("Quality gate stop: {}", stop);
            return DataQualityReport::stopped(total, stop);
        }

        if total == 0 {
            return DataQualityReport::stopped(
                total,
                HardStop::InsufficientHistory {
                    required: self.config.min_complete_years,
                    available: 0,
                },
            );
        }

        if let Some(stop) = check_required_fields(history) {
            log::error!("Quality gate stop: {}", stop);
            return DataQualityReport::stopped(total, stop);
        }

        // Distinct fiscal years; repeated filings of one year count once
        let complete_years = history
            .iter()
            .filter(|r| r.missing_fields().is_empty())
            .map(|r| r.fiscal_year)
            .collect::<BTreeSet<i32>>()
            .len();
        if complete_years < self.config.min_complete_years {
            let stop = HardStop::InsufficientHistory {
                required: self.config.min_complete_years,
                available: complete_years,
            };
            log::error!("Quality gate stop: {}", stop);
            return DataQualityReport::stopped(total, stop);
        }

        let mut ordered: Vec<&HistoricalRecord> = history.iter().collect();
        ordered.sort_by_key(|r| r.fiscal_year);

        let mut usable = Vec::new();
        let mut dropped = Vec::new();
        let mut seen = HashSet::new();

        for record in ordered {
            match screen_year(record, &mut seen) {
                Ok(year) => usable.push(year),
                Err(reason) => {
                    log::warn!("Dropping fiscal year {}: {}", record.fiscal_year, reason);
                    dropped.push(DroppedYear {
                        fiscal_year: record.fiscal_year,
                        reason,
                    });
                }
            }
        }

        let mut warnings: Vec<Warning> = dropped
            .iter()
            .map(|d| Warning::YearDropped {
                fiscal_year: d.fiscal_year,
                reason: d.reason.to_string(),
            })
            .collect();

        if let Some(warning) = self.check_fcf_volatility(&usable) {
            log::warn!("{}", warning);
            warnings.push(warning);
        }

        log::info!(
            "Quality gate passed: {} usable of {} years, {} dropped",
            usable.len(),
            total,
            dropped.len()
        );

        DataQualityReport {
            total_years: total,
            usable,
            dropped,
            warnings,
            hard_stop: None,
        }
    }

    fn check_classification(&self, history: &[HistoricalRecord]) -> Option<HardStop> {
        for record in history {
            let tags = [("sector", &record.sector), ("industry", &record.industry)];
            for (field, value) in tags {
                let Some(value) = value else { continue };
                let lowered = value.to_lowercase();
                if let Some(keyword) = self
                    .config
                    .excluded_keywords
                    .iter()
                    .find(|k| lowered.contains(k.as_str()))
                {
                    return Some(HardStop::ClassificationExcluded {
                        field: field.to_string(),
                        value: value.clone(),
                        keyword: keyword.clone(),
                    });
                }
            }
        }
        None
    }

    fn check_fcf_volatility(&self, usable: &[UsableYear]) -> Option<Warning> {
        if usable.len() < 2 {
            return None;
        }
        let fcf: Vec<Decimal> = usable.iter().map(|y| y.fcf).collect();
        match coefficient_of_variation(&fcf) {
            Some(cv) if cv > self.config.fcf_cv_threshold => Some(Warning::FcfVolatility {
                coefficient: cv,
                threshold: self.config.fcf_cv_threshold,
            }),
            Some(_) => None,
            None => Some(Warning::FcfVolatilityUndefined),
        }
    }
}

/// Stop when any required field is unresolvable in a strict majority of years.
/// Every such field is listed.
fn check_required_fields(history: &[HistoricalRecord]) -> Option<HardStop> {
    let total = history.len();
    let missing_by_year: Vec<Vec<RequiredField>> =
        history.iter().map(|r| r.missing_fields()).collect();

    let fields: Vec<RequiredField> = RequiredField::ALL
        .iter()
        .copied()
        .filter(|field| {
            let missing = missing_by_year.iter().filter(|m| m.contains(field)).count();
            missing * 2 > total
        })
        .collect();

    if fields.is_empty() {
        None
    } else {
        Some(HardStop::MissingRequiredField {
            fields,
            years_checked: total,
        })
    }
}

/// A year is claimed only by its first record that passes every check, so an
/// incomplete filing never shadows a later complete one.
fn screen_year(record: &HistoricalRecord, seen: &mut HashSet<i32>) -> Result<UsableYear, DropReason> {
    if seen.contains(&record.fiscal_year) {
        return Err(DropReason::DuplicateYear);
    }

    let (revenue, ebit, fcf) = match (record.revenue, record.ebit, record.resolved_fcf()) {
        (Some(revenue), Some(ebit), Some(fcf)) => (revenue, ebit, fcf),
        _ => {
            return Err(DropReason::MissingFields {
                fields: record.missing_fields(),
            })
        }
    };

    if revenue < Decimal::ZERO {
        return Err(DropReason::NegativeRevenue { revenue });
    }

    seen.insert(record.fiscal_year);

    Ok(UsableYear {
        fiscal_year: record.fiscal_year,
        revenue,
        ebit,
        fcf,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(year: i32, revenue: Option<Decimal>, ebit: Option<Decimal>, fcf: Option<Decimal>) -> HistoricalRecord {
        let mut r = HistoricalRecord::new(year, "USD");
        r.revenue = revenue;
        r.ebit = ebit;
        r.free_cash_flow = fcf;
        r.sector = Some("Technology".to_string());
        r.industry = Some("Software".to_string());
        r
    }

    fn complete(year: i32, revenue: Decimal) -> HistoricalRecord {
        record(year, Some(revenue), Some(revenue / dec!(10)), Some(revenue / dec!(20)))
    }

    fn gate() -> DataQualityGate {
        DataQualityGate::new(QualityConfig::default())
    }

    #[test]
    fn test_clean_history_passes() {
        let history = vec![
            complete(2020, dec!(100)),
            complete(2021, dec!(110)),
            complete(2022, dec!(120)),
            complete(2023, dec!(130)),
        ];
        let report = gate().evaluate(&history);

        assert!(!report.is_hard_stop());
        assert_eq!(report.usable_fiscal_years(), vec![2020, 2021, 2022, 2023]);
        assert!(report.dropped.is_empty());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_bank_is_excluded_before_anything_else() {
        let mut history = vec![record(2023, None, None, None)];
        history[0].sector = Some("Financial Services".to_string());
        history[0].industry = Some("Banks - Regional".to_string());

        let report = gate().evaluate(&history);
        match report.hard_stop {
            Some(HardStop::ClassificationExcluded { field, keyword, .. }) => {
                assert_eq!(field, "sector");
                assert_eq!(keyword, "financial services");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(report.usable.is_empty());
    }

    #[test]
    fn test_missing_ebit_majority_cites_ebit() {
        let history = vec![
            record(2020, None, None, Some(dec!(5))),
            record(2021, None, None, Some(dec!(5))),
            record(2022, Some(dec!(100)), Some(dec!(10)), Some(dec!(5))),
        ];
        let report = gate().evaluate(&history);

        match report.hard_stop {
            Some(HardStop::MissingRequiredField { fields, years_checked }) => {
                assert!(fields.contains(&RequiredField::Ebit));
                assert!(fields.contains(&RequiredField::Revenue));
                assert_eq!(years_checked, 3);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_fewer_than_three_complete_years_stops() {
        let history = vec![
            complete(2021, dec!(100)),
            complete(2022, dec!(110)),
            record(2023, Some(dec!(120)), Some(dec!(12)), None),
        ];
        let report = gate().evaluate(&history);

        assert_eq!(
            report.hard_stop,
            Some(HardStop::InsufficientHistory {
                required: 3,
                available: 2
            })
        );
    }

    #[test]
    fn test_empty_history_stops() {
        let report = gate().evaluate(&[]);
        assert!(matches!(
            report.hard_stop,
            Some(HardStop::InsufficientHistory { available: 0, .. })
        ));
    }

    #[test]
    fn test_negative_revenue_and_incomplete_years_are_dropped() {
        let history = vec![
            complete(2023, dec!(130)),
            complete(2019, dec!(90)),
            record(2020, Some(dec!(-5)), Some(dec!(1)), Some(dec!(1))),
            complete(2021, dec!(110)),
            record(2022, Some(dec!(120)), None, Some(dec!(6))),
        ];
        let report = gate().evaluate(&history);

        assert!(!report.is_hard_stop());
        assert_eq!(report.usable_fiscal_years(), vec![2019, 2021, 2023]);
        assert_eq!(report.dropped.len(), 2);
        assert_eq!(report.dropped[0].fiscal_year, 2020);
        assert_eq!(
            report.dropped[0].reason,
            DropReason::NegativeRevenue { revenue: dec!(-5) }
        );
        assert_eq!(
            report.dropped[1].reason,
            DropReason::MissingFields {
                fields: vec![RequiredField::Ebit]
            }
        );
        assert_eq!(
            report
                .warnings
                .iter()
                .filter(|w| matches!(w, Warning::YearDropped { .. }))
                .count(),
            2
        );
    }

    #[test]
    fn test_duplicate_year_keeps_first() {
        let history = vec![
            complete(2021, dec!(100)),
            complete(2022, dec!(110)),
            complete(2022, dec!(999)),
            complete(2023, dec!(120)),
        ];
        let report = gate().evaluate(&history);

        assert_eq!(report.usable_fiscal_years(), vec![2021, 2022, 2023]);
        assert_eq!(report.usable[1].revenue, dec!(110));
        assert_eq!(report.dropped[0].reason, DropReason::DuplicateYear);
    }

    #[test]
    fn test_repeated_years_count_once_toward_minimum() {
        let history = vec![
            complete(2022, dec!(100)),
            complete(2023, dec!(110)),
            complete(2023, dec!(111)),
            complete(2023, dec!(112)),
        ];
        let report = gate().evaluate(&history);

        assert_eq!(
            report.hard_stop,
            Some(HardStop::InsufficientHistory {
                required: 3,
                available: 2
            })
        );
        assert!(report.usable.is_empty());
    }

    #[test]
    fn test_incomplete_filing_does_not_shadow_complete_one() {
        let history = vec![
            complete(2020, dec!(90)),
            complete(2021, dec!(100)),
            record(2022, Some(dec!(110)), None, Some(dec!(5))),
            complete(2022, dec!(110)),
            complete(2023, dec!(120)),
        ];
        let report = gate().evaluate(&history);

        assert_eq!(report.usable_fiscal_years(), vec![2020, 2021, 2022, 2023]);
        assert_eq!(report.usable[2].ebit, dec!(11));
        assert_eq!(
            report.dropped,
            vec![DroppedYear {
                fiscal_year: 2022,
                reason: DropReason::MissingFields {
                    fields: vec![RequiredField::Ebit]
                },
            }]
        );
    }

    #[test]
    fn test_large_fcf_magnitudes_do_not_abort() {
        let history = vec![
            record(2021, Some(dec!(1000000000000000)), Some(dec!(100000000000000)), Some(dec!(300000000000000))),
            record(2022, Some(dec!(1100000000000000)), Some(dec!(100000000000000)), Some(dec!(-300000000000000))),
            record(2023, Some(dec!(1200000000000000)), Some(dec!(100000000000000)), Some(dec!(300000000000000))),
        ];
        let report = gate().evaluate(&history);

        assert!(!report.is_hard_stop());
        assert_eq!(report.usable.len(), 3);
        // CV of [3, -3, 3] relative to the mean: sqrt(8)
        match report.warnings.as_slice() {
            [Warning::FcfVolatility { coefficient, .. }] => {
                assert!((*coefficient - dec!(2.8284)).abs() < dec!(0.0001));
            }
            other => panic!("unexpected warnings: {:?}", other),
        }
    }

    #[test]
    fn test_volatile_fcf_warns_but_continues() {
        let history = vec![
            record(2021, Some(dec!(100)), Some(dec!(10)), Some(dec!(1))),
            record(2022, Some(dec!(100)), Some(dec!(10)), Some(dec!(40))),
            record(2023, Some(dec!(100)), Some(dec!(10)), Some(dec!(-30))),
        ];
        let report = gate().evaluate(&history);

        assert!(!report.is_hard_stop());
        assert!(report
            .warnings
            .iter()
            .any(|w| matches!(w, Warning::FcfVolatility { .. })));
    }

    #[test]
    fn test_short_fetch_warns() {
        let history = vec![
            complete(2021, dec!(100)),
            complete(2022, dec!(110)),
            complete(2023, dec!(120)),
        ];
        let diagnostics = FetchDiagnostics::new("ACME", "fixture", 5, 3);
        let report = gate().evaluate_with_diagnostics(&history, &diagnostics);

        assert_eq!(
            report.warnings,
            vec![Warning::ShortHistory {
                requested: 5,
                returned: 3
            }]
        );
    }
}

// src/valuation/projection.rs
use crate::domain::errors::{ProjectionError, ProjectionResult};
use crate::domain::models::{ProjectionRow, UsableYear};
use crate::valuation::assumptions::{ReinvestmentPolicy, ValuationAssumptions};
use rust_decimal::Decimal;

/// Year-by-year forecast from the last usable year using resolved assumptions.
pub fn project(
    base: &UsableYear,
    assumptions: &ValuationAssumptions,
) -> ProjectionResult<Vec<ProjectionRow>> {
    project_with(
        base,
        &assumptions.revenue_growth().rates,
        &assumptions.ebit_margin().rates,
        assumptions.tax_rate(),
        assumptions.reinvestment(),
    )
}

/// Forecast from explicit paths. Growth and margin paths are paired by year;
/// the forecast runs for the shorter of the two. Any step that leaves the
/// Decimal range is reported with its forecast year.
pub fn project_with(
    base: &UsableYear,
    growth: &[Decimal],
    margins: &[Decimal],
    tax_rate: Decimal,
    reinvestment: ReinvestmentPolicy,
) -> ProjectionResult<Vec<ProjectionRow>> {
    let mut rows = Vec::with_capacity(growth.len());
    let mut previous_revenue = base.revenue;

    for (i, (&g, &m)) in growth.iter().zip(margins.iter()).enumerate() {
        let year_index = i as u32 + 1;
        let overflow = ProjectionError::Overflow { year_index };

        let revenue = Decimal::ONE
            .checked_add(g)
            .and_then(|factor| previous_revenue.checked_mul(factor))
            .ok_or(overflow.clone())?;
        let ebit = revenue.checked_mul(m).ok_or(overflow.clone())?;
        // Negative EBIT yields a negative tax (credit)
        let taxes = ebit.checked_mul(tax_rate).ok_or(overflow.clone())?;
        let nopat = ebit.checked_sub(taxes).ok_or(overflow.clone())?;
        let reinvestment = match reinvestment {
            ReinvestmentPolicy::GrowthOverRoic { roic } => {
                nopat.checked_mul(g).and_then(|v| v.checked_div(roic))
            }
            ReinvestmentPolicy::SalesToCapital { ratio } => revenue
                .checked_sub(previous_revenue)
                .and_then(|delta| delta.checked_div(ratio)),
        }
        .ok_or(overflow.clone())?;
        let fcff = nopat.checked_sub(reinvestment).ok_or(overflow)?;

        rows.push(ProjectionRow {
            year_index,
            fiscal_year: base.fiscal_year + year_index as i32,
            growth: g,
            margin: m,
            revenue,
            ebit,
            taxes,
            nopat,
            reinvestment,
            fcff,
        });
        previous_revenue = revenue;
    }

    log::debug!(
        "Projected {} years from {}: final revenue {:?}, final FCFF {:?}",
        rows.len(),
        base.fiscal_year,
        rows.last().map(|r| r.revenue.round_dp(2)),
        rows.last().map(|r| r.fcff.round_dp(2))
    );

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::valuation::assumptions::{PathSource, RatePath};
    use rust_decimal_macros::dec;

    fn base_year() -> UsableYear {
        UsableYear {
            fiscal_year: 2023,
            revenue: dec!(1000),
            ebit: dec!(150),
            fcf: dec!(90),
        }
    }

    fn assumptions(reinvestment: ReinvestmentPolicy) -> ValuationAssumptions {
        ValuationAssumptions::new(
            RatePath::constant(dec!(0.10), 5, PathSource::Override),
            RatePath::constant(dec!(0.20), 5, PathSource::Override),
            dec!(0.09),
            dec!(0.02),
            5,
            dec!(0.25),
            reinvestment,
        )
        .unwrap()
    }

    #[test]
    fn test_first_year_arithmetic() {
        let rows = project(
            &base_year(),
            &assumptions(ReinvestmentPolicy::GrowthOverRoic { roic: dec!(0.10) }),
        )
        .unwrap();
        assert_eq!(rows.len(), 5);

        let first = &rows[0];
        assert_eq!(first.year_index, 1);
        assert_eq!(first.fiscal_year, 2024);
        assert_eq!(first.revenue, dec!(1100));
        assert_eq!(first.ebit, dec!(220));
        assert_eq!(first.taxes, dec!(55));
        assert_eq!(first.nopat, dec!(165));
        // growth / ROIC = 1.0, so the whole NOPAT is reinvested
        assert_eq!(first.reinvestment, dec!(165));
        assert_eq!(first.fcff, Decimal::ZERO);

        assert_eq!(rows[1].revenue, dec!(1210));
        assert_eq!(rows[4].fiscal_year, 2028);
    }

    #[test]
    fn test_sales_to_capital_reinvestment() {
        let rows = project(
            &base_year(),
            &assumptions(ReinvestmentPolicy::SalesToCapital { ratio: dec!(2) }),
        )
        .unwrap();
        // revenue +100, reinvest 50
        assert_eq!(rows[0].reinvestment, dec!(50));
        assert_eq!(rows[0].fcff, dec!(115));
    }

    #[test]
    fn test_negative_ebit_gives_tax_credit() {
        let rows = project_with(
            &base_year(),
            &[dec!(0)],
            &[dec!(-0.05)],
            dec!(0.2),
            ReinvestmentPolicy::GrowthOverRoic { roic: dec!(0.1) },
        )
        .unwrap();
        assert_eq!(rows[0].ebit, dec!(-50));
        assert_eq!(rows[0].taxes, dec!(-10));
        assert_eq!(rows[0].nopat, dec!(-40));
        assert_eq!(rows[0].reinvestment, Decimal::ZERO);
    }

    #[test]
    fn test_projection_is_deterministic() {
        let a = assumptions(ReinvestmentPolicy::GrowthOverRoic { roic: dec!(0.15) });
        assert_eq!(project(&base_year(), &a), project(&base_year(), &a));
    }

    #[test]
    fn test_runaway_growth_reports_overflow() {
        let base = UsableYear {
            fiscal_year: 2023,
            revenue: dec!(1200000000000),
            ebit: dec!(100000000000),
            fcf: dec!(50000000000),
        };
        let err = project_with(
            &base,
            &[dec!(200); 10],
            &[dec!(0.1); 10],
            dec!(0.21),
            ReinvestmentPolicy::GrowthOverRoic { roic: dec!(0.12) },
        )
        .unwrap_err();

        // 1.2e12 * 201^n leaves the range after a few years, never panics
        assert!(matches!(err, ProjectionError::Overflow { year_index } if year_index <= 10));
    }
}

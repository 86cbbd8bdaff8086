// src/valuation/discounting.rs
use crate::domain::errors::{DiscountError, DiscountResult};
use crate::domain::models::{EquityBridge, ProjectionRow};
use crate::valuation::assumptions::ValuationAssumptions;
use rust_decimal::Decimal;
use serde::Serialize;

/// Present values and the bridge from enterprise to per-share equity value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscountedValue {
    pub pv_fcff: Vec<Decimal>,
    pub pv_explicit_fcff: Decimal,
    pub terminal_value: Decimal,
    pub pv_terminal_value: Decimal,
    pub enterprise_value: Decimal,
    pub net_debt: Decimal,
    pub equity_value: Decimal,
    pub equity_value_per_share: Decimal,
}

pub fn discount(
    projection: &[ProjectionRow],
    assumptions: &ValuationAssumptions,
    bridge: &EquityBridge,
) -> DiscountResult<DiscountedValue> {
    discount_at(
        projection,
        assumptions.wacc(),
        assumptions.terminal_growth(),
        bridge,
    )
}

/// Discount at an explicit WACC and terminal growth. The spread is checked
/// here as well, since sensitivity sweeps call this without an assumption set.
pub fn discount_at(
    projection: &[ProjectionRow],
    wacc: Decimal,
    terminal_growth: Decimal,
    bridge: &EquityBridge,
) -> DiscountResult<DiscountedValue> {
    if wacc <= terminal_growth {
        return Err(DiscountError::InvalidTerminalSpread {
            wacc,
            terminal_growth,
        });
    }
    if bridge.shares_outstanding <= Decimal::ZERO {
        return Err(DiscountError::NonPositiveShares(bridge.shares_outstanding));
    }
    let last = projection.last().ok_or(DiscountError::EmptyProjection)?;

    let rate = Decimal::ONE + wacc;
    let mut factor = Decimal::ONE;
    let mut pv_fcff = Vec::with_capacity(projection.len());

    for row in projection {
        factor = factor.checked_mul(rate).ok_or(DiscountError::Overflow)?;
        let pv = row
            .fcff
            .checked_div(factor)
            .ok_or(DiscountError::Overflow)?;
        pv_fcff.push(pv);
    }

    // Gordon growth on the year after the horizon
    let next_fcff = last
        .fcff
        .checked_mul(Decimal::ONE + terminal_growth)
        .ok_or(DiscountError::Overflow)?;
    let terminal_value = next_fcff
        .checked_div(wacc - terminal_growth)
        .ok_or(DiscountError::Overflow)?;
    let pv_terminal_value = terminal_value
        .checked_div(factor)
        .ok_or(DiscountError::Overflow)?;

    let pv_explicit_fcff = pv_fcff
        .iter()
        .try_fold(Decimal::ZERO, |acc, pv| acc.checked_add(*pv))
        .ok_or(DiscountError::Overflow)?;
    let enterprise_value = pv_explicit_fcff
        .checked_add(pv_terminal_value)
        .ok_or(DiscountError::Overflow)?;
    let equity_value = enterprise_value
        .checked_sub(bridge.net_debt)
        .ok_or(DiscountError::Overflow)?;
    let equity_value_per_share = equity_value
        .checked_div(bridge.shares_outstanding)
        .ok_or(DiscountError::Overflow)?;

    Ok(DiscountedValue {
        pv_fcff,
        pv_explicit_fcff,
        terminal_value,
        pv_terminal_value,
        enterprise_value,
        net_debt: bridge.net_debt,
        equity_value,
        equity_value_per_share,
    })
}

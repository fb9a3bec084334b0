//! Unit-size calculator — spec §4.F, grounded in the reference crate's
//! `risk.rs::calculate_position_size_with_regime` (risk-amount-over-stop-
//! distance shape), simplified to the mechanical Turtle formula (no
//! regime/drawdown multipliers baked in here — drawdown is folded in
//! earlier by feeding `notional_equity` rather than actual equity, per the
//! `drawdown` module).

use crate::money::{Money, NotionalEquity};
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitSize {
    pub contracts: i64,
    pub risk_amount: Money,
    pub dollar_volatility: Money,
    pub stop_risk: Money,
}

impl UnitSize {
    /// Market is untradeable at this equity/N (spec §4.F: "this is a
    /// policy, not an error").
    pub fn is_zero(&self) -> bool {
        self.contracts < 1
    }
}

/// `contracts = floor(risk_amount / stop_risk)`, never rounded up. Returns
/// `contracts = 0` (not an error) when the risk-per-contract exceeds the
/// per-unit risk budget.
pub fn calculate_unit_size(
    notional_equity: NotionalEquity,
    n_value: Money,
    point_value: Decimal,
    risk_factor: Decimal,
    stop_multiplier: Decimal,
) -> UnitSize {
    let risk_amount = notional_equity.value() * risk_factor;
    let dollar_volatility = n_value * point_value;
    let stop_risk = dollar_volatility * stop_multiplier;

    let contracts = if stop_risk.is_zero() {
        0
    } else {
        (risk_amount / stop_risk).floor_to_i64()
    };

    UnitSize {
        contracts: contracts.max(0),
        risk_amount,
        dollar_volatility,
        stop_risk,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn floors_never_rounds_up() {
        let size = calculate_unit_size(
            NotionalEquity(Money::from_f64(100_000.0)),
            Money::from_f64(20.0),
            dec!(50),
            dec!(0.005),
            dec!(2),
        );
        // risk_amount = 500; dollar_volatility = 1000; stop_risk = 2000
        // contracts = floor(500/2000) = 0
        assert_eq!(size.contracts, 0);
        assert!(size.is_zero());
    }

    #[test]
    fn sizes_a_tradeable_market() {
        let size = calculate_unit_size(
            NotionalEquity(Money::from_f64(1_000_000.0)),
            Money::from_f64(20.0),
            dec!(50),
            dec!(0.005),
            dec!(2),
        );
        // risk_amount = 5000; stop_risk = 2000; contracts = floor(2.5) = 2
        assert_eq!(size.contracts, 2);
    }
}

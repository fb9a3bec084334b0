//! Stop calculator — spec §4.G.

use crate::domain::Direction;
use crate::money::Money;
use rust_decimal::Decimal;

/// `LONG: stop = entry - stop_multiplier*N`; `SHORT: stop = entry + stop_multiplier*N`.
pub fn calculate_stop(
    entry_price: Money,
    n_value: Money,
    direction: Direction,
    stop_multiplier: Decimal,
) -> Money {
    let offset = n_value * stop_multiplier;
    match direction {
        Direction::Long => entry_price - offset,
        Direction::Short => entry_price + offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn long_stop_calc_scenario_2() {
        // spec §8 scenario 2: entry=2800, N=20, LONG => stop = 2760
        let stop = calculate_stop(Money::from_f64(2800.0), Money::from_f64(20.0), Direction::Long, dec!(2));
        assert_eq!(stop, Money::from_f64(2760.0));
    }

    #[test]
    fn short_stop_is_above_entry() {
        let stop = calculate_stop(Money::from_f64(2800.0), Money::from_f64(20.0), Direction::Short, dec!(2));
        assert_eq!(stop, Money::from_f64(2840.0));
    }
}

//! Position monitor — spec §4.K. Per-position decision with a strict
//! priority order (stop before exit before pyramid before hold), grounded
//! in the reference crate's `Strategy::update_trailing_stop` /ongoing-
//! position check pattern, generalized to the fixed Turtle priority chain.

use crate::domain::market::MarketData;
use crate::domain::{Direction, Position, System};
use crate::money::Money;
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionAction {
    /// `fill_price` is the stop price, or the triggering bar's open when
    /// the bar gapped through the stop (spec §4.K step 1, fast-market rule).
    ExitStop { fill_price: Money },
    /// `trigger_price` is the channel bound touched (spec §4.K step 2).
    ExitBreakout { trigger_price: Money },
    /// `trigger_price` is the signed pyramid trigger price that fired
    /// (spec §4.K step 3).
    Pyramid { trigger_price: Money },
    Hold,
}

/// Evaluates, in order: EXIT_STOP, EXIT_BREAKOUT, PYRAMID, HOLD. Returns
/// exactly one action; the first matching condition wins even if a later
/// condition would also match (spec §4.K).
pub fn evaluate(position: &Position, market: &MarketData, pyramid_interval: Decimal, max_units_per_market: u32) -> PositionAction {
    if let Some(action) = check_stop(position, market) {
        return action;
    }
    if let Some(action) = check_breakout_exit(position, market) {
        return action;
    }
    if let Some(action) = check_pyramid(position, market, pyramid_interval, max_units_per_market) {
        return action;
    }
    PositionAction::Hold
}

fn check_stop(position: &Position, market: &MarketData) -> Option<PositionAction> {
    let stop = position.current_stop();
    let triggered = match position.direction {
        Direction::Long => market.bar_low <= stop,
        Direction::Short => market.bar_high >= stop,
    };
    if !triggered {
        return None;
    }

    // Fast-market rule: if the bar gapped through the stop, the fill is
    // the triggering bar's open, not the stop price.
    let fill_price = match position.direction {
        Direction::Long if market.bar_open < stop => market.bar_open,
        Direction::Short if market.bar_open > stop => market.bar_open,
        _ => stop,
    };

    Some(PositionAction::ExitStop { fill_price })
}

fn check_breakout_exit(position: &Position, market: &MarketData) -> Option<PositionAction> {
    let channel = match position.system {
        System::S1 => market.donchian_10,
        System::S2 => market.donchian_20,
    };

    let triggered = match position.direction {
        Direction::Long => market.current_price <= channel.lower,
        Direction::Short => market.current_price >= channel.upper,
    };
    if !triggered {
        return None;
    }

    let trigger_price = match position.direction {
        Direction::Long => channel.lower,
        Direction::Short => channel.upper,
    };
    Some(PositionAction::ExitBreakout { trigger_price })
}

fn check_pyramid(
    position: &Position,
    market: &MarketData,
    pyramid_interval: Decimal,
    max_units_per_market: u32,
) -> Option<PositionAction> {
    if !position.can_pyramid(max_units_per_market) {
        return None;
    }

    let trigger = position.next_pyramid_trigger(pyramid_interval);
    let fired = match position.direction {
        Direction::Long => market.current_price >= trigger,
        Direction::Short => market.current_price <= trigger,
    };
    fired.then_some(PositionAction::Pyramid { trigger_price: trigger })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::{DonchianChannel, MarketSpec, NMethod, NValue};
    use crate::domain::position::PyramidLevel;
    use crate::domain::{Symbol, System};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn sample_position() -> Position {
        Position::open(
            Symbol::new("ZW"),
            Direction::Long,
            System::S1,
            "grains".to_string(),
            dec!(50),
            PyramidLevel {
                unit_number: 1,
                entry_price: Money::from_f64(2800.0),
                entry_timestamp: Utc::now(),
                n_at_entry: Money::from_f64(20.0),
                contracts: 2,
                original_stop: Money::from_f64(2760.0),
            },
            Money::from_f64(2760.0),
            Utc::now(),
        )
    }

    fn market(price: f64, open: f64, high: f64, low: f64, donch10: (f64, f64), donch20: (f64, f64)) -> MarketData {
        let now = Utc::now();
        MarketData {
            spec: MarketSpec {
                symbol: Symbol::new("ZW"),
                point_value: dec!(50),
                tick_size: dec!(0.25),
                correlation_group: "grains".to_string(),
                asset_class: "futures".to_string(),
            },
            current_price: Money::from_f64(price),
            bar_open: Money::from_f64(open),
            bar_high: Money::from_f64(high),
            bar_low: Money::from_f64(low),
            n_value: NValue {
                value: Money::from_f64(20.0),
                period: 20,
                method: NMethod::Wilders,
                calculated_at: now,
            },
            donchian_10: DonchianChannel::new(Money::from_f64(donch10.0), Money::from_f64(donch10.1), 10, now),
            donchian_20: DonchianChannel::new(Money::from_f64(donch20.0), Money::from_f64(donch20.1), 20, now),
            donchian_55: DonchianChannel::new(Money::from_f64(3000.0), Money::from_f64(2700.0), 55, now),
            updated_at: now,
        }
    }

    #[test]
    fn hold_when_nothing_fires() {
        let p = sample_position();
        let m = market(2805.0, 2804.0, 2806.0, 2803.0, (2850.0, 2790.0), (2870.0, 2770.0));
        assert_eq!(evaluate(&p, &m, dec!(0.5), 4), PositionAction::Hold);
    }

    #[test]
    fn exit_stop_fires_on_intraday_low() {
        let p = sample_position();
        let m = market(2790.0, 2790.0, 2805.0, 2755.0, (2850.0, 2790.0), (2870.0, 2770.0));
        let action = evaluate(&p, &m, dec!(0.5), 4);
        assert_eq!(action, PositionAction::ExitStop { fill_price: Money::from_f64(2760.0) });
    }

    #[test]
    fn exit_stop_uses_open_on_gap_through() {
        let p = sample_position();
        // bar gapped: open at 2740, well below the 2760 stop
        let m = market(2740.0, 2740.0, 2745.0, 2730.0, (2850.0, 2790.0), (2870.0, 2770.0));
        let action = evaluate(&p, &m, dec!(0.5), 4);
        assert_eq!(action, PositionAction::ExitStop { fill_price: Money::from_f64(2740.0) });
    }

    #[test]
    fn stop_takes_priority_over_breakout_exit() {
        let p = sample_position();
        // both the stop (low <= 2760) and the 10-day lower channel touch fire
        let m = market(2761.0, 2761.0, 2765.0, 2755.0, (2850.0, 2762.0), (2870.0, 2770.0));
        let action = evaluate(&p, &m, dec!(0.5), 4);
        assert!(matches!(action, PositionAction::ExitStop { .. }));
    }

    #[test]
    fn breakout_exit_fires_on_channel_touch() {
        let p = sample_position();
        let m = market(2790.0, 2791.0, 2795.0, 2789.0, (2850.0, 2790.0), (2870.0, 2770.0));
        let action = evaluate(&p, &m, dec!(0.5), 4);
        assert_eq!(action, PositionAction::ExitBreakout { trigger_price: Money::from_f64(2790.0) });
    }

    #[test]
    fn pyramid_fires_when_price_advances_past_trigger() {
        let p = sample_position();
        // trigger = 2800 + 0.5*20 = 2810
        let m = market(2811.0, 2809.0, 2812.0, 2806.0, (2850.0, 2780.0), (2870.0, 2770.0));
        let action = evaluate(&p, &m, dec!(0.5), 4);
        assert_eq!(action, PositionAction::Pyramid { trigger_price: Money::from_f64(2810.0) });
    }

    #[test]
    fn pyramid_skipped_when_at_max_units() {
        let p = sample_position();
        let m = market(2811.0, 2809.0, 2812.0, 2806.0, (2850.0, 2780.0), (2870.0, 2770.0));
        let action = evaluate(&p, &m, dec!(0.5), 1);
        assert_eq!(action, PositionAction::Hold);
    }
}

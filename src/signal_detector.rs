//! Signal detector — spec §4.D. A pure function over `MarketData`; no
//! collaborator lookups here, following the Design Notes' "filter-history
//! lookup in a pure detector" guidance (the S1 filter history query lives
//! in `s1_filter`, invoked by the orchestrator between detection and
//! sizing, not inside this function).

use crate::domain::market::MarketData;
use crate::domain::{Direction, Signal, System};
use chrono::Utc;

/// Evaluates both S1 (spec's 20-day channel) and S2 (55-day channel)
/// independently; strict inequality, touching the channel is not a
/// breakout (spec §4.D, §8 boundary case).
pub fn detect(market: &MarketData, system: System) -> Option<Signal> {
    let channel = match system {
        System::S1 => market.donchian_20,
        System::S2 => market.donchian_55,
    };

    if market.current_price > channel.upper {
        Some(Signal {
            symbol: market.spec.symbol.clone(),
            system,
            direction: Direction::Long,
            breakout_price: channel.upper,
            triggered_at: Utc::now(),
            donchian_period: channel.period,
        })
    } else if market.current_price < channel.lower {
        Some(Signal {
            symbol: market.spec.symbol.clone(),
            system,
            direction: Direction::Short,
            breakout_price: channel.lower,
            triggered_at: Utc::now(),
            donchian_period: channel.period,
        })
    } else {
        None
    }
}

/// Convenience: both systems evaluated every scan (spec §4.N step 2).
pub fn detect_all(market: &MarketData) -> Vec<Signal> {
    [System::S1, System::S2]
        .into_iter()
        .filter_map(|system| detect(market, system))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::{DonchianChannel, NMethod, NValue};
    use crate::domain::{MarketSpec, Symbol};
    use crate::money::Money;
    use rust_decimal_macros::dec;

    fn market_with_price(price: f64, upper: f64, lower: f64) -> MarketData {
        let now = Utc::now();
        let channel = DonchianChannel::new(Money::from_f64(upper), Money::from_f64(lower), 20, now);
        MarketData {
            spec: MarketSpec {
                symbol: Symbol::new("CL"),
                point_value: dec!(1000),
                tick_size: dec!(0.01),
                correlation_group: "energy_oil".to_string(),
                asset_class: "futures".to_string(),
            },
            current_price: Money::from_f64(price),
            bar_open: Money::from_f64(price),
            bar_high: Money::from_f64(price),
            bar_low: Money::from_f64(price),
            n_value: NValue {
                value: Money::from_f64(2.0),
                period: 20,
                method: NMethod::Wilders,
                calculated_at: now,
            },
            donchian_10: channel,
            donchian_20: channel,
            donchian_55: channel,
            updated_at: now,
        }
    }

    #[test]
    fn strict_breakout_above_upper() {
        let m = market_with_price(101.0, 100.0, 90.0);
        let sig = detect(&m, System::S1).unwrap();
        assert_eq!(sig.direction, Direction::Long);
        assert_eq!(sig.breakout_price, Money::from_f64(100.0));
    }

    #[test]
    fn touching_channel_is_not_a_breakout() {
        // spec §8 boundary case: current_price == channel.upper => no signal
        let m = market_with_price(100.0, 100.0, 90.0);
        assert!(detect(&m, System::S1).is_none());
    }

    #[test]
    fn strict_breakout_below_lower() {
        let m = market_with_price(89.0, 100.0, 90.0);
        let sig = detect(&m, System::S2).unwrap();
        assert_eq!(sig.direction, Direction::Short);
        assert_eq!(sig.breakout_price, Money::from_f64(90.0));
    }

    #[test]
    fn both_systems_evaluated_independently() {
        let m = market_with_price(101.0, 100.0, 90.0);
        let signals = detect_all(&m);
        assert_eq!(signals.len(), 2);
    }
}

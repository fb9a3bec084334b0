//! Donchian channel calculator — spec §4.B. Hand-rolled against `Money`
//! since neither the `ta` crate nor the reference crate's `indicators.rs`
//! exposes a Decimal-precision Donchian channel; the shape (upper/lower
//! over a rolling window, strict failure below the window size) follows
//! `other_examples`'s fund-forge `donchian_momentum_indicator`, which frames
//! the channel the same way (period-bounded high/low window) before
//! layering momentum/volatility scoring this engine does not need.

use crate::domain::market::DonchianChannel;
use crate::domain::Bar;
use crate::errors::{TurtleError, TurtleResult};
use chrono::Utc;

/// Given the last `period` bars, upper = max(high), lower = min(low).
/// Fails with `InsufficientHistory` if fewer than `period` bars are given.
pub fn calculate_donchian(bars: &[Bar], period: usize) -> TurtleResult<DonchianChannel> {
    if bars.len() < period {
        return Err(TurtleError::InsufficientHistory {
            symbol: bars.first().map(|b| b.symbol.clone()).unwrap_or_else(|| "?".into()),
            needed: period,
            available: bars.len(),
        });
    }

    let window = &bars[bars.len() - period..];
    let upper = window
        .iter()
        .map(|b| b.high)
        .fold(window[0].high, |acc, h| acc.max(h));
    let lower = window
        .iter()
        .map(|b| b.low)
        .fold(window[0].low, |acc, l| acc.min(l));

    Ok(DonchianChannel::new(upper, lower, period, Utc::now()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Symbol;
    use crate::money::Money;
    use chrono::NaiveDate;

    fn bar(day: u32, high: f64, low: f64) -> Bar {
        Bar::new(
            Symbol::new("TEST"),
            NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            Money::from_f64((high + low) / 2.0),
            Money::from_f64(high),
            Money::from_f64(low),
            Money::from_f64((high + low) / 2.0),
            Money::ZERO,
        )
    }

    #[test]
    fn upper_and_lower_within_window_bounds() {
        let bars = vec![bar(1, 105.0, 95.0), bar(2, 110.0, 98.0), bar(3, 108.0, 90.0)];
        let ch = calculate_donchian(&bars, 3).unwrap();
        assert_eq!(ch.upper, Money::from_f64(110.0));
        assert_eq!(ch.lower, Money::from_f64(90.0));
        assert!(ch.upper >= ch.lower);
    }

    #[test]
    fn uses_only_the_trailing_window() {
        let bars = vec![
            bar(1, 200.0, 190.0), // outside the 2-bar window, should be ignored
            bar(2, 105.0, 95.0),
            bar(3, 108.0, 90.0),
        ];
        let ch = calculate_donchian(&bars, 2).unwrap();
        assert_eq!(ch.upper, Money::from_f64(108.0));
        assert_eq!(ch.lower, Money::from_f64(90.0));
    }

    #[test]
    fn insufficient_history_is_reported() {
        let bars = vec![bar(1, 105.0, 95.0)];
        let err = calculate_donchian(&bars, 10).unwrap_err();
        assert!(matches!(err, TurtleError::InsufficientHistory { .. }));
    }
}

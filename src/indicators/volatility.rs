//! Volatility calculator (N) — spec §4.A, grounded in the reference crate's
//! `indicators.rs::atr()` Wilder-smoothing recurrence, rewritten against
//! `Bar`/`Money` instead of `Candle`/`f64`.

use crate::domain::market::{NMethod, NValue};
use crate::domain::Bar;
use crate::errors::{TurtleError, TurtleResult};
use crate::money::Money;
use chrono::Utc;
use rust_decimal::Decimal;

/// True Range for bar `i` (`i >= 1`), spec §4.A.
pub fn true_range(bar: &Bar, prev_close: Money) -> Money {
    let hl = bar.high - bar.low;
    let hc = (bar.high - prev_close).abs();
    let cl = (prev_close - bar.low).abs();
    hl.max(hc).max(cl)
}

/// From-scratch Wilder's N over `bars`, reserved for initialization/backtest
/// (spec §4.A: "Recomputing from scratch is reserved for
/// initialization/backtest"). Requires at least `period + 1` bars.
pub fn calculate_n(bars: &[Bar], period: usize) -> TurtleResult<NValue> {
    if bars.len() < period + 1 {
        return Err(TurtleError::InsufficientHistory {
            symbol: bars.first().map(|b| b.symbol.clone()).unwrap_or_else(|| "?".into()),
            needed: period + 1,
            available: bars.len(),
        });
    }

    let true_ranges: Vec<Money> = (1..bars.len())
        .map(|i| true_range(&bars[i], bars[i - 1].close))
        .collect();

    // Seeding: N_P = (1/P) * sum(TR_1..P)
    let seed_window = &true_ranges[0..period];
    let seed_sum: Money = seed_window.iter().copied().sum();
    let mut n = seed_sum / Decimal::from(period);

    // Recurrence: N_i = ((P-1)*N_{i-1} + TR_i) / P for i > P
    for tr in &true_ranges[period..] {
        n = wilder_step(n, *tr, period);
    }

    Ok(NValue {
        value: n,
        period,
        method: NMethod::Wilders,
        calculated_at: Utc::now(),
    })
}

/// Stateful mode (production): given a persisted previous-day N and today's
/// TR, returns the next N without recomputing the whole series. The
/// stateful recurrence is authoritative once seeded — it must never be
/// silently replaced by a from-scratch recalculation (spec §4.A).
pub fn wilder_step(previous_n: Money, today_tr: Money, period: usize) -> Money {
    let p = Decimal::from(period);
    (previous_n * (p - Decimal::from(1)) + today_tr) / p
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Symbol;
    use chrono::NaiveDate;

    fn bar(day: u32, high: f64, low: f64, close: f64) -> Bar {
        Bar::new(
            Symbol::new("TEST"),
            NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            Money::from_f64((high + low) / 2.0),
            Money::from_f64(high),
            Money::from_f64(low),
            Money::from_f64(close),
            Money::ZERO,
        )
    }

    #[test]
    fn true_range_no_div_by_zero_on_flat_day() {
        // Bars with high == low (flat day) produce TR >= |close - prev_close|
        // spec §8 boundary case.
        let prev = bar(1, 100.0, 100.0, 100.0);
        let today = bar(2, 105.0, 105.0, 105.0);
        let tr = true_range(&today, prev.close);
        assert!(tr >= (today.close - prev.close).abs());
    }

    #[test]
    fn wilder_n_seed_scenario_1() {
        // Scenario 1 (spec §8): 21 bars with TR == 10 constant; N on bar 21
        // (the 20th TR, i.e. the seed) == 10. Then TR=30 on bar 22 gives
        // N_22 = (19*10 + 30)/20 = 11.
        // Construct 21 bars where each consecutive TR is exactly 10: a
        // simple way is high-low = 10 every day with close held so
        // |high-prev_close| and |prev_close-low| never exceed 10.
        let mut bars = Vec::new();
        let mut price = 100.0;
        bars.push(bar(1, price + 5.0, price - 5.0, price));
        for day in 2..=21 {
            bars.push(bar(day, price + 5.0, price - 5.0, price));
        }
        let n = calculate_n(&bars, 20).unwrap();
        assert_eq!(n.value, Money::from_f64(10.0));

        price = 100.0;
        let mut bars22 = bars.clone();
        bars22.push(bar(22, price + 15.0, price - 15.0, price));
        let last_close = bars22[bars22.len() - 2].close;
        let tr22 = true_range(&bars22[bars22.len() - 1], last_close);
        let n22 = wilder_step(n.value, tr22, 20);
        assert_eq!(tr22, Money::from_f64(30.0));
        assert_eq!(n22, Money::from_f64(11.0));
    }

    #[test]
    fn insufficient_history_is_reported() {
        let bars = vec![bar(1, 105.0, 95.0, 100.0)];
        let err = calculate_n(&bars, 20).unwrap_err();
        assert!(matches!(err, TurtleError::InsufficientHistory { .. }));
    }
}

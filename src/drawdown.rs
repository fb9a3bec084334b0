//! Drawdown tracker — spec §4.H, grounded in the reference crate's
//! `risk.rs::RiskManager` peak/current capital tracking and tiered
//! drawdown multiplier, simplified to the mechanical step-function the
//! spec defines (no continuous tiering, no consecutive-loss multiplier —
//! those are the reference crate's discretionary-strategy concerns, not
//! Turtle rules).

use crate::money::{Money, NotionalEquity};
use crate::rules::Rules;
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawdownTracker {
    actual: Money,
    peak: Money,
}

impl DrawdownTracker {
    pub fn new(initial_equity: Money) -> Self {
        DrawdownTracker {
            actual: initial_equity,
            peak: initial_equity,
        }
    }

    /// `peak <- max(peak, actual)`; recomputes drawdown/notional.
    pub fn update_equity(&mut self, actual: Money) {
        self.actual = actual;
        self.peak = self.peak.max(actual);
    }

    pub fn actual(&self) -> Money {
        self.actual
    }

    pub fn peak(&self) -> Money {
        self.peak
    }

    pub fn drawdown(&self) -> Decimal {
        if self.peak.is_zero() {
            return Decimal::ZERO;
        }
        ((self.peak - self.actual) / self.peak).max(Decimal::ZERO)
    }

    /// `notional = actual` whenever `actual >= peak` (full recovery resets
    /// the multiplier to 1); otherwise a stepped reduction (spec §4.H).
    pub fn notional(&self, rules: &Rules) -> NotionalEquity {
        if self.actual >= self.peak {
            return NotionalEquity(self.actual);
        }

        let drawdown = self.drawdown();
        let reductions = (drawdown / rules.drawdown_trigger).floor();
        let multiplier = (Decimal::ONE - reductions * rules.drawdown_notional_reduction).max(rules.notional_floor);
        NotionalEquity(self.actual * multiplier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Rules;
    use rust_decimal_macros::dec;

    #[test]
    fn peak_is_non_decreasing() {
        let mut t = DrawdownTracker::new(Money::from_f64(100_000.0));
        t.update_equity(Money::from_f64(120_000.0));
        t.update_equity(Money::from_f64(90_000.0));
        assert_eq!(t.peak(), Money::from_f64(120_000.0));
    }

    #[test]
    fn drawdown_reduction_scenario_6() {
        // spec §8 scenario 6: peak=100000, actual=88000 => drawdown=0.12,
        // reductions=1, multiplier=0.8, notional=70400
        let mut t = DrawdownTracker::new(Money::from_f64(100_000.0));
        t.update_equity(Money::from_f64(88_000.0));
        assert_eq!(t.drawdown(), dec!(0.12));

        let rules = Rules::default();
        let notional = t.notional(&rules);
        assert_eq!(notional.value(), Money::from_f64(70_400.0));

        t.update_equity(Money::from_f64(100_000.0));
        assert_eq!(t.notional(&rules).value(), Money::from_f64(100_000.0));
    }

    #[test]
    fn notional_never_below_floor() {
        let mut t = DrawdownTracker::new(Money::from_f64(100_000.0));
        t.update_equity(Money::from_f64(10_000.0)); // deep drawdown
        let rules = Rules::default();
        let notional = t.notional(&rules);
        let floor = t.actual() * rules.notional_floor;
        assert!(notional.value() >= floor);
    }
}

//! Limit checker — spec §4.I, grounded in the reference crate's
//! `risk.rs::RiskManager::check_correlation_limit`/exposure-cap checks
//! (ordered-sequence-of-caps shape), generalized to the three Turtle caps
//! and invoked identically for initial entry and for pyramiding.

use crate::domain::{Portfolio, Symbol};
use crate::money::NotionalEquity;
use crate::money::Money;
use crate::rules::ExposureMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitDenialReason {
    PerMarket,
    Correlation,
    TotalExposure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitVerdict {
    Allow,
    Deny(LimitDenialReason),
}

impl LimitVerdict {
    pub fn is_allowed(self) -> bool {
        matches!(self, LimitVerdict::Allow)
    }
}

/// Checked in order: per-market, correlation-group, total-exposure. The
/// first failing limit names the verdict (spec §4.I).
pub fn check_limits(
    portfolio: &Portfolio,
    symbol: &Symbol,
    correlation_group: &str,
    units_to_add: u32,
    candidate_risk: Money,
    notional_equity: NotionalEquity,
) -> LimitVerdict {
    let rules = &portfolio.rules;

    let total_after_market = portfolio.units_for_symbol(symbol) + units_to_add;
    if total_after_market > rules.max_units_per_market {
        return LimitVerdict::Deny(LimitDenialReason::PerMarket);
    }

    let total_after_group = portfolio.units_in_group(correlation_group) + units_to_add;
    if total_after_group > rules.max_units_correlated {
        return LimitVerdict::Deny(LimitDenialReason::Correlation);
    }

    match rules.max_total_exposure_mode {
        ExposureMode::UnitCap { max_total_units } => {
            if portfolio.total_units() + units_to_add > max_total_units {
                return LimitVerdict::Deny(LimitDenialReason::TotalExposure);
            }
        }
        ExposureMode::RiskCap { fraction } => {
            let total_risk = portfolio.total_open_risk() + candidate_risk;
            let cap = notional_equity.value() * fraction;
            if total_risk > cap {
                return LimitVerdict::Deny(LimitDenialReason::TotalExposure);
            }
        }
    }

    LimitVerdict::Allow
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::PyramidLevel;
    use crate::domain::{Direction, Position, System};
    use crate::rules::Rules;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn level(unit: u32, entry: f64, stop: f64, contracts: i64) -> PyramidLevel {
        PyramidLevel {
            unit_number: unit,
            entry_price: Money::from_f64(entry),
            entry_timestamp: Utc::now(),
            n_at_entry: Money::from_f64(20.0),
            contracts,
            original_stop: Money::from_f64(stop),
        }
    }

    fn portfolio_with(units: u32, group: &str, rules: Rules) -> Portfolio {
        let mut portfolio = Portfolio::new("acct".to_string(), Money::from_f64(100_000.0), rules);
        let mut p = Position::open(
            Symbol::new("ZW"),
            Direction::Long,
            System::S1,
            group.to_string(),
            dec!(50),
            level(1, 2800.0, 2760.0, 2),
            Money::from_f64(2760.0),
            Utc::now(),
        );
        for u in 2..=units {
            p.append_pyramid(level(u, 2800.0 + u as f64, 2760.0 + u as f64, 2), Money::from_f64(2760.0 + u as f64))
                .unwrap();
        }
        portfolio.positions.insert(Symbol::new("ZW"), p);
        portfolio
    }

    #[test]
    fn denies_when_per_market_cap_exceeded() {
        let mut rules = Rules::default();
        rules.max_units_per_market = 4;
        let portfolio = portfolio_with(4, "grains", rules);

        let verdict = check_limits(
            &portfolio,
            &Symbol::new("ZW"),
            "grains",
            1,
            Money::from_f64(100.0),
            NotionalEquity(Money::from_f64(100_000.0)),
        );
        assert_eq!(verdict, LimitVerdict::Deny(LimitDenialReason::PerMarket));
    }

    #[test]
    fn denies_on_correlation_before_total_exposure() {
        let mut rules = Rules::default();
        rules.max_units_per_market = 10;
        rules.max_units_correlated = 2;
        let portfolio = portfolio_with(2, "grains", rules);

        let verdict = check_limits(
            &portfolio,
            &Symbol::new("ZC"),
            "grains",
            1,
            Money::from_f64(100.0),
            NotionalEquity(Money::from_f64(100_000.0)),
        );
        assert_eq!(verdict, LimitVerdict::Deny(LimitDenialReason::Correlation));
    }

    #[test]
    fn allows_within_all_caps() {
        let rules = Rules::default();
        let portfolio = portfolio_with(1, "grains", rules);

        let verdict = check_limits(
            &portfolio,
            &Symbol::new("ZW"),
            "grains",
            1,
            Money::from_f64(100.0),
            NotionalEquity(Money::from_f64(100_000.0)),
        );
        assert!(verdict.is_allowed());
    }

    #[test]
    fn denies_risk_cap_mode_when_over_fraction() {
        let mut rules = Rules::default();
        rules.max_units_per_market = 10;
        rules.max_units_correlated = 10;
        rules.max_total_exposure_mode = ExposureMode::RiskCap { fraction: dec!(0.001) };
        let portfolio = portfolio_with(1, "grains", rules);

        let verdict = check_limits(
            &portfolio,
            &Symbol::new("ZW"),
            "grains",
            1,
            Money::from_f64(1000.0),
            NotionalEquity(Money::from_f64(100_000.0)),
        );
        assert_eq!(verdict, LimitVerdict::Deny(LimitDenialReason::TotalExposure));
    }
}

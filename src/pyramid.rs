//! Pyramid handler — spec §4.L. Builds the full pyramid opportunity (new
//! unit size, stop-for-all-units, limit verdict) as a pure computation; the
//! orchestrator is responsible for placing the order and, on fill, calling
//! `Position::append_pyramid` with the result.

use crate::domain::market::MarketData;
use crate::domain::position::PyramidLevel;
use crate::domain::{Portfolio, Position};
use crate::limits::{check_limits, LimitDenialReason};
use crate::money::{Money, NotionalEquity};
use crate::rules::Rules;
use crate::sizing::calculate_unit_size;
use crate::stop::calculate_stop;
use chrono::Utc;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PyramidOpportunity {
    pub new_level: PyramidLevel,
    pub new_stop: Money,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PyramidOutcome {
    Ready(PyramidOpportunity),
    /// Risk too large for one contract at current equity/N (spec §4.F
    /// policy outcome, not an error).
    ZeroSize,
    Denied(LimitDenialReason),
}

/// `trigger_price` is the price at which the monitor's PYRAMID condition
/// fired (spec §4.K step 3); used as the new unit's entry price since fill
/// price is not yet known when this opportunity is built.
pub fn build_pyramid_opportunity(
    position: &Position,
    market: &MarketData,
    portfolio: &Portfolio,
    rules: &Rules,
    notional_equity: NotionalEquity,
    trigger_price: Money,
) -> PyramidOutcome {
    let n = market.n_value.value;

    let size = calculate_unit_size(
        notional_equity,
        n,
        market.spec.point_value,
        rules.risk_factor,
        rules.stop_multiplier,
    );
    if size.is_zero() {
        return PyramidOutcome::ZeroSize;
    }

    // Stop-advance rule: the new stop covers every existing unit, not only
    // the new one (spec §4.L step 3).
    let new_stop = calculate_stop(trigger_price, n, position.direction, rules.stop_multiplier);

    let verdict = check_limits(
        portfolio,
        &position.symbol,
        &position.correlation_group,
        1,
        size.stop_risk,
        notional_equity,
    );
    if let crate::limits::LimitVerdict::Deny(reason) = verdict {
        return PyramidOutcome::Denied(reason);
    }

    let new_level = PyramidLevel {
        unit_number: position.total_units() + 1,
        entry_price: trigger_price,
        entry_timestamp: Utc::now(),
        n_at_entry: n,
        contracts: size.contracts,
        original_stop: new_stop,
    };

    PyramidOutcome::Ready(PyramidOpportunity { new_level, new_stop })
}

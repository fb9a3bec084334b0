//! Exit handler — spec §4.M. Builds the realized P&L and the finalized
//! Trade record for a position closed on EXIT_STOP or EXIT_BREAKOUT (or a
//! rollover exit, §4.P); the orchestrator is responsible for the Broker
//! call and for persisting the resulting Trade/updating S1 filter history.

use crate::domain::{ExitReason, Position, System, Trade};
use crate::money::Money;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitResult {
    pub realized_pnl: Money,
    pub net_pnl: Money,
}

/// `realized_pnl = (exit_price - average_entry) * total_contracts * point_value`
/// for LONG, negated for SHORT (spec §4.M).
pub fn calculate_realized_pnl(position: &Position, exit_price: Money, commission_total: Money) -> ExitResult {
    let price_delta = exit_price - position.average_entry();
    let signed_delta = match position.direction {
        crate::domain::Direction::Long => price_delta,
        crate::domain::Direction::Short => -price_delta,
    };
    let realized_pnl = signed_delta * position.point_value * position.total_contracts();
    let net_pnl = realized_pnl - commission_total;
    ExitResult { realized_pnl, net_pnl }
}

/// Whether closing this position should update S1 filter history: every
/// exit except a rollover (spec §4.M, §4.P).
pub fn updates_s1_history(position: &Position, reason: ExitReason) -> bool {
    position.system == System::S1 && reason != ExitReason::Rollover
}

/// Assembles the closing half of the Trade audit record.
pub fn finalize_trade(
    mut trade: Trade,
    exit_date: DateTime<Utc>,
    exit_price: Money,
    exit_reason: ExitReason,
    commission_total: Money,
) -> Trade {
    let result = calculate_realized_pnl_from_trade(&trade, exit_price, commission_total);
    trade.exit_date = Some(exit_date);
    trade.exit_price = Some(exit_price);
    trade.exit_reason = Some(exit_reason);
    trade.realized_pnl = Some(result.realized_pnl);
    trade.commission_total += commission_total;
    trade.net_pnl = Some(result.net_pnl);
    trade
}

fn calculate_realized_pnl_from_trade(trade: &Trade, exit_price: Money, commission_total: Money) -> ExitResult {
    let total_contracts: i64 = trade.pyramid_levels.iter().map(|l| l.contracts).sum();
    let weighted: Money = trade
        .pyramid_levels
        .iter()
        .map(|l| l.entry_price * l.contracts)
        .sum();
    let average_entry = if total_contracts == 0 {
        Money::ZERO
    } else {
        weighted / rust_decimal::Decimal::from(total_contracts)
    };

    let price_delta = exit_price - average_entry;
    let signed_delta = match trade.direction {
        crate::domain::Direction::Long => price_delta,
        crate::domain::Direction::Short => -price_delta,
    };
    let realized_pnl = signed_delta * trade.point_value * total_contracts;
    let net_pnl = realized_pnl - commission_total;
    ExitResult { realized_pnl, net_pnl }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::PyramidLevel;
    use crate::domain::{Direction, Symbol};
    use chrono::Utc as UtcNow;
    use rust_decimal_macros::dec;

    fn position() -> Position {
        Position::open(
            Symbol::new("ZW"),
            Direction::Long,
            System::S1,
            "grains".to_string(),
            dec!(50),
            PyramidLevel {
                unit_number: 1,
                entry_price: Money::from_f64(2800.0),
                entry_timestamp: UtcNow::now(),
                n_at_entry: Money::from_f64(20.0),
                contracts: 2,
                original_stop: Money::from_f64(2760.0),
            },
            Money::from_f64(2760.0),
            UtcNow::now(),
        )
    }

    #[test]
    fn long_exit_pnl_is_positive_on_a_gain() {
        let p = position();
        let result = calculate_realized_pnl(&p, Money::from_f64(2850.0), Money::from_f64(10.0));
        // (2850-2800)*50*2 = 5000; net = 4990
        assert_eq!(result.realized_pnl, Money::from_f64(5000.0));
        assert_eq!(result.net_pnl, Money::from_f64(4990.0));
    }

    #[test]
    fn short_exit_pnl_is_negated() {
        let p = Position::open(
            Symbol::new("ZW"),
            Direction::Short,
            System::S1,
            "grains".to_string(),
            dec!(50),
            PyramidLevel {
                unit_number: 1,
                entry_price: Money::from_f64(2800.0),
                entry_timestamp: UtcNow::now(),
                n_at_entry: Money::from_f64(20.0),
                contracts: 2,
                original_stop: Money::from_f64(2840.0),
            },
            Money::from_f64(2840.0),
            UtcNow::now(),
        );
        let result = calculate_realized_pnl(&p, Money::from_f64(2850.0), Money::from_f64(0.0));
        // price moved against the short: (2850-2800) negated *50*2 = -5000
        assert_eq!(result.realized_pnl, Money::from_f64(-5000.0));
    }

    #[test]
    fn rollover_does_not_update_s1_history() {
        let p = position();
        assert!(updates_s1_history(&p, ExitReason::StopHit));
        assert!(!updates_s1_history(&p, ExitReason::Rollover));
    }
}

//! Position reconciliation (spec §5 "Reconciliation", §7 `ReconciliationRequired`).
//! On startup, and after any broker error of ambiguous outcome, the
//! in-memory position set is compared against `Broker::get_positions()`;
//! mismatches are flagged rather than silently corrected, and the affected
//! symbol is blocked from new entries until cleared.

use crate::domain::{Portfolio, Symbol};
use crate::interfaces::{Broker, RawPosition};
use crate::repository::{Alert, AlertRepository, AlertType};
use chrono::Utc;
use std::collections::{HashMap, HashSet};

/// A symbol where the in-memory contract count disagrees with the broker's,
/// or exists on only one side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub symbol: Symbol,
    pub in_memory_contracts: i64,
    pub broker_contracts: i64,
}

/// Pure comparison: in-memory `Portfolio` positions vs. the broker's raw
/// position list. A symbol absent from one side is reported with 0 on that
/// side, not silently skipped.
pub fn diff_positions(portfolio: &Portfolio, broker_positions: &[RawPosition]) -> Vec<Mismatch> {
    let broker_by_symbol: HashMap<&Symbol, i64> = broker_positions.iter().map(|p| (&p.symbol, p.contracts)).collect();

    let mut mismatches = Vec::new();
    let mut seen: HashSet<&Symbol> = HashSet::new();

    for (symbol, position) in &portfolio.positions {
        seen.insert(symbol);
        let in_memory = position.total_contracts();
        let broker = broker_by_symbol.get(symbol).copied().unwrap_or(0);
        if in_memory != broker {
            mismatches.push(Mismatch { symbol: symbol.clone(), in_memory_contracts: in_memory, broker_contracts: broker });
        }
    }

    for raw in broker_positions {
        if !seen.contains(&raw.symbol) {
            mismatches.push(Mismatch { symbol: raw.symbol.clone(), in_memory_contracts: 0, broker_contracts: raw.contracts });
        }
    }

    mismatches
}

/// Fetches the broker's current positions, diffs against the in-memory
/// `Portfolio`, and records a `ReconciliationRequired` alert for every
/// mismatch. Returns the set of symbols now blocked from new entries —
/// callers (the scanner) must consult this before placing an order.
pub async fn reconcile(portfolio: &Portfolio, broker: &dyn Broker, alerts: &dyn AlertRepository) -> HashSet<Symbol> {
    let broker_positions = match broker.get_positions().await {
        Ok(positions) => positions,
        Err(e) => {
            tracing::warn!(error = %e, "reconciliation: could not fetch broker positions, blocking no symbols this run");
            return HashSet::new();
        }
    };

    let mismatches = diff_positions(portfolio, &broker_positions);
    let mut blocked = HashSet::new();
    for mismatch in mismatches {
        tracing::warn!(
            symbol = %mismatch.symbol,
            in_memory = mismatch.in_memory_contracts,
            broker = mismatch.broker_contracts,
            "position reconciliation mismatch"
        );
        let alert = Alert {
            id: None,
            timestamp: Utc::now(),
            symbol: mismatch.symbol.clone(),
            alert_type: AlertType::ReconciliationRequired,
            details: serde_json::json!({
                "in_memory_contracts": mismatch.in_memory_contracts,
                "broker_contracts": mismatch.broker_contracts,
            }),
            acknowledged: false,
        };
        if let Err(e) = alerts.insert(&alert).await {
            tracing::warn!(symbol = %mismatch.symbol, error = %e, "failed to record reconciliation alert");
        }
        blocked.insert(mismatch.symbol);
    }
    blocked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::PyramidLevel;
    use crate::domain::{Direction, Position, System};
    use crate::money::Money;
    use crate::rules::Rules;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn position(symbol: &str, contracts: i64) -> Position {
        Position::open(
            Symbol::new(symbol),
            Direction::Long,
            System::S1,
            "grains".to_string(),
            dec!(50),
            PyramidLevel {
                unit_number: 1,
                entry_price: Money::from_f64(100.0),
                entry_timestamp: Utc::now(),
                n_at_entry: Money::from_f64(2.0),
                contracts,
                original_stop: Money::from_f64(96.0),
            },
            Money::from_f64(96.0),
            Utc::now(),
        )
    }

    #[test]
    fn agreeing_positions_produce_no_mismatch() {
        let mut portfolio = Portfolio::new("acct".to_string(), Money::from_f64(100_000.0), Rules::default());
        portfolio.positions.insert(Symbol::new("ZW"), position("ZW", 3));

        let broker_positions = vec![RawPosition { symbol: Symbol::new("ZW"), contracts: 3 }];
        assert!(diff_positions(&portfolio, &broker_positions).is_empty());
    }

    #[test]
    fn contract_count_drift_is_flagged() {
        let mut portfolio = Portfolio::new("acct".to_string(), Money::from_f64(100_000.0), Rules::default());
        portfolio.positions.insert(Symbol::new("ZW"), position("ZW", 3));

        let broker_positions = vec![RawPosition { symbol: Symbol::new("ZW"), contracts: 2 }];
        let mismatches = diff_positions(&portfolio, &broker_positions);
        assert_eq!(mismatches, vec![Mismatch { symbol: Symbol::new("ZW"), in_memory_contracts: 3, broker_contracts: 2 }]);
    }

    #[test]
    fn broker_only_position_is_flagged() {
        let portfolio = Portfolio::new("acct".to_string(), Money::from_f64(100_000.0), Rules::default());
        let broker_positions = vec![RawPosition { symbol: Symbol::new("CL"), contracts: 1 }];
        let mismatches = diff_positions(&portfolio, &broker_positions);
        assert_eq!(mismatches, vec![Mismatch { symbol: Symbol::new("CL"), in_memory_contracts: 0, broker_contracts: 1 }]);
    }

    #[test]
    fn in_memory_only_position_is_flagged() {
        let mut portfolio = Portfolio::new("acct".to_string(), Money::from_f64(100_000.0), Rules::default());
        portfolio.positions.insert(Symbol::new("ZW"), position("ZW", 3));
        let mismatches = diff_positions(&portfolio, &[]);
        assert_eq!(mismatches, vec![Mismatch { symbol: Symbol::new("ZW"), in_memory_contracts: 3, broker_contracts: 0 }]);
    }
}

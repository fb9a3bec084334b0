//! Portfolio snapshot (spec §3): equity figures plus open positions keyed by
//! symbol. Conceptually immutable for the duration of one monitor cycle
//! (spec §5 Shared Resources).

use crate::domain::{Position, Symbol};
use crate::money::Money;
use crate::rules::Rules;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Portfolio {
    pub id: String,
    pub actual_equity: Money,
    pub peak_equity: Money,
    pub positions: HashMap<Symbol, Position>,
    pub rules: Rules,
    pub updated_at: DateTime<Utc>,
}

impl Portfolio {
    pub fn new(id: String, initial_equity: Money, rules: Rules) -> Self {
        Portfolio {
            id,
            actual_equity: initial_equity,
            peak_equity: initial_equity,
            positions: HashMap::new(),
            rules,
            updated_at: Utc::now(),
        }
    }

    /// Σ per-market units (spec §8 invariant: sums to total_units across the
    /// portfolio).
    pub fn total_units(&self) -> u32 {
        self.positions.values().map(|p| p.total_units()).sum()
    }

    /// Σ over positions with the given correlation_group (spec §8
    /// invariant).
    pub fn units_in_group(&self, group: &str) -> u32 {
        self.positions
            .values()
            .filter(|p| p.correlation_group == group)
            .map(|p| p.total_units())
            .sum()
    }

    pub fn units_for_symbol(&self, symbol: &Symbol) -> u32 {
        self.positions
            .get(symbol)
            .map(|p| p.total_units())
            .unwrap_or(0)
    }

    /// Σ `Position::open_risk()` across all open positions (spec §4.I
    /// RISK_CAP mode).
    pub fn total_open_risk(&self) -> Money {
        self.positions.values().map(|p| p.open_risk()).sum()
    }
}

//! Closed-trade audit record (spec §3), following the reference crate's
//! `types.rs::Trade` (Money-based variant) and `state_manager.rs::TradeRecord`
//! persistence shape.

use crate::domain::position::PyramidLevel;
use crate::domain::{Direction, Symbol, System};
use crate::money::Money;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopHit,
    BreakoutExit,
    Manual,
    Rollover,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: i64,
    pub symbol: Symbol,
    pub system: System,
    pub direction: Direction,
    pub point_value: Decimal,
    pub entry_date: DateTime<Utc>,
    pub entry_price: Money,
    pub n_at_entry: Money,
    pub initial_stop: Money,
    pub pyramid_levels: Vec<PyramidLevel>,
    pub max_units: u32,
    pub exit_date: Option<DateTime<Utc>>,
    pub exit_price: Option<Money>,
    pub exit_reason: Option<ExitReason>,
    pub realized_pnl: Option<Money>,
    pub commission_total: Money,
    pub net_pnl: Option<Money>,
}

impl Trade {
    /// `was_winner = net_pnl > 0` once closed, used by the S1 filter
    /// (spec §4.E).
    pub fn was_winner(&self) -> Option<bool> {
        self.net_pnl.map(|pnl| pnl.is_positive())
    }

    pub fn is_closed(&self) -> bool {
        self.exit_date.is_some()
    }
}

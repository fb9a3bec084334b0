//! Breakout signal (spec §4.D), immutable.

use crate::domain::{Direction, Symbol, System};
use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: Symbol,
    pub system: System,
    pub direction: Direction,
    pub breakout_price: Money,
    pub triggered_at: DateTime<Utc>,
    pub donchian_period: usize,
}

//! Position aggregate (spec §4.J) — an ownership-rooted aggregate with
//! exactly two state-changing operations, following the mutation-restricted
//! style of the reference crate's `oms::position_manager::PositionManager`
//! (which funnels every mutation through `add_fill`) generalized here to the
//! pyramid-level model spec §3/§4.J actually requires.

use crate::domain::{Direction, Symbol, System};
use crate::money::Money;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_POSITION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PositionId(pub u64);

pub fn next_position_id() -> PositionId {
    PositionId(NEXT_POSITION_ID.fetch_add(1, Ordering::Relaxed))
}

/// One pyramid unit. Immutable once appended (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PyramidLevel {
    pub unit_number: u32,
    pub entry_price: Money,
    pub entry_timestamp: DateTime<Utc>,
    pub n_at_entry: Money,
    pub contracts: i64,
    pub original_stop: Money,
}

#[derive(Debug, thiserror::Error)]
pub enum PositionInvariantError {
    #[error("pyramid level unit_number {given} does not follow current total_units {current}")]
    OutOfOrderUnit { given: u32, current: u32 },
    #[error("position is already closed")]
    AlreadyClosed,
}

/// Position aggregate root. All fields besides `pyramid_levels` and
/// `current_stop` are set at construction and never change; those two
/// advance monotonically only through `append_pyramid`. `close()` is
/// terminal (spec §4.J).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub symbol: Symbol,
    pub direction: Direction,
    pub system: System,
    pub correlation_group: String,
    pub point_value: Decimal,
    pyramid_levels: Vec<PyramidLevel>,
    current_stop: Money,
    pub opened_at: DateTime<Utc>,
    closed: bool,
}

impl Position {
    pub fn open(
        symbol: Symbol,
        direction: Direction,
        system: System,
        correlation_group: String,
        point_value: Decimal,
        first_level: PyramidLevel,
        initial_stop: Money,
        opened_at: DateTime<Utc>,
    ) -> Self {
        debug_assert_eq!(first_level.unit_number, 1);
        Position {
            id: next_position_id(),
            symbol,
            direction,
            system,
            correlation_group,
            point_value,
            pyramid_levels: vec![first_level],
            current_stop: initial_stop,
            opened_at,
            closed: false,
        }
    }

    /// Requires `level.unit_number == total_units() + 1`; atomically
    /// appends the level and advances `current_stop` to `new_stop`. This is
    /// the core Turtle stop-advance rule (spec §4.L step 3): the new stop
    /// covers every existing unit, not only the new one.
    pub fn append_pyramid(
        &mut self,
        level: PyramidLevel,
        new_stop: Money,
    ) -> Result<(), PositionInvariantError> {
        if self.closed {
            return Err(PositionInvariantError::AlreadyClosed);
        }
        let expected = self.total_units() + 1;
        if level.unit_number != expected {
            return Err(PositionInvariantError::OutOfOrderUnit {
                given: level.unit_number,
                current: self.total_units(),
            });
        }
        self.pyramid_levels.push(level);
        self.current_stop = new_stop;
        Ok(())
    }

    /// Terminal; no further mutations accepted.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn pyramid_levels(&self) -> &[PyramidLevel] {
        &self.pyramid_levels
    }

    pub fn current_stop(&self) -> Money {
        self.current_stop
    }

    pub fn total_units(&self) -> u32 {
        self.pyramid_levels.len() as u32
    }

    pub fn total_contracts(&self) -> i64 {
        self.pyramid_levels.iter().map(|l| l.contracts).sum()
    }

    pub fn average_entry(&self) -> Money {
        let total = self.total_contracts();
        if total == 0 {
            return Money::ZERO;
        }
        let weighted: Money = self
            .pyramid_levels
            .iter()
            .map(|l| l.entry_price * l.contracts)
            .sum();
        weighted / Decimal::from(total)
    }

    pub fn latest_entry(&self) -> &PyramidLevel {
        self.pyramid_levels
            .last()
            .expect("position always has at least one pyramid level")
    }

    /// Direction-signed price at which the next pyramid addition fires
    /// (spec §3, §4.K rule 3).
    pub fn next_pyramid_trigger(&self, pyramid_interval: Decimal) -> Money {
        let latest = self.latest_entry();
        let offset = latest.n_at_entry * pyramid_interval;
        match self.direction {
            Direction::Long => latest.entry_price + offset,
            Direction::Short => latest.entry_price - offset,
        }
    }

    pub fn can_pyramid(&self, max_per_market: u32) -> bool {
        !self.closed && self.total_units() < max_per_market
    }

    /// Σ per-unit dollar risk at original stop distance (spec §4.I
    /// "Σ(unit_risk across open positions)"). Uses each level's
    /// `original_stop`, not the position's current (stop-advanced) stop,
    /// since the limit check is about risk committed at entry time.
    pub fn open_risk(&self) -> Money {
        self.pyramid_levels
            .iter()
            .map(|l| (l.entry_price - l.original_stop).abs() * self.point_value * l.contracts)
            .sum()
    }
}

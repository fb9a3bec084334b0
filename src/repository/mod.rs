//! Repository traits (spec §4.R): N-value, Trade, Alert/OpenPosition,
//! Event. The decision engine depends only on these narrow capability
//! sets, never on `rusqlite` directly (spec §9 Design Notes).

pub mod sqlite;

use crate::domain::{Event, NValue, Position, Symbol, Trade};
use crate::errors::TurtleResult;
use async_trait::async_trait;
use chrono::NaiveDate;

#[async_trait]
pub trait NRepository: Send + Sync {
    async fn last(&self, symbol: &Symbol) -> TurtleResult<Option<NValue>>;
    async fn upsert(&self, symbol: &Symbol, date: NaiveDate, value: NValue) -> TurtleResult<()>;
}

#[async_trait]
pub trait TradeRepository: Send + Sync {
    async fn append(&self, trade: &Trade) -> TurtleResult<i64>;
    /// Most recent closed S1 trade for the symbol (spec §4.E).
    async fn last_closed_s1(&self, symbol: &Symbol) -> TurtleResult<Option<Trade>>;
    /// The still-open trade record for a symbol, if any (spec §4.M: the
    /// orchestrator finalizes this record on exit).
    async fn open_by_symbol(&self, symbol: &Symbol) -> TurtleResult<Option<Trade>>;
    /// Appends a newly-filled pyramid level to the open trade's audit
    /// record (spec §4.L, §4.M).
    async fn record_pyramid(&self, symbol: &Symbol, level: crate::domain::position::PyramidLevel) -> TurtleResult<()>;
    async fn update_exit(&self, trade: &Trade) -> TurtleResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertType {
    EntrySignal,
    PositionOpened,
    PositionClosed,
    ExitStop,
    ExitBreakout,
    PyramidTrigger,
    ReconciliationRequired,
}

#[derive(Debug, Clone)]
pub struct Alert {
    pub id: Option<i64>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub symbol: Symbol,
    pub alert_type: AlertType,
    pub details: serde_json::Value,
    pub acknowledged: bool,
}

#[async_trait]
pub trait AlertRepository: Send + Sync {
    async fn insert(&self, alert: &Alert) -> TurtleResult<i64>;
    async fn acknowledge(&self, id: i64) -> TurtleResult<()>;
}

#[async_trait]
pub trait OpenPositionRepository: Send + Sync {
    async fn upsert(&self, position: &Position, current_price: Option<crate::money::Money>) -> TurtleResult<()>;
    async fn delete(&self, symbol: &Symbol) -> TurtleResult<()>;
    async fn all(&self) -> TurtleResult<Vec<Symbol>>;
}

#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn append(&self, event: &Event) -> TurtleResult<i64>;
}

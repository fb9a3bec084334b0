//! External interfaces (spec §4.R): DataFeed, Broker, and the contracts the
//! decision engine consumes in place of referencing transport libraries
//! directly (spec §9 Design Notes). Generalizes the reference crate's
//! single concrete `CoinDCXClient` (`exchange.rs`) into narrow trait
//! objects so a different feed/broker can be substituted without touching
//! the orchestrators.

use crate::domain::{Bar, Symbol};
use crate::errors::TurtleResult;
use crate::money::Money;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct AccountSummary {
    pub net_liquidation: Money,
    pub cash: Money,
}

#[derive(Debug, Clone)]
pub struct RawPosition {
    pub symbol: Symbol,
    pub contracts: i64,
}

/// Historical bar data provider and failover between them (out of scope
/// for a real implementation per spec §1; this trait is the seam).
#[async_trait]
pub trait DataFeed: Send + Sync {
    async fn get_bars(&self, symbol: &Symbol, days: usize) -> TurtleResult<Vec<Bar>>;
    async fn get_current_price(&self, symbol: &Symbol) -> TurtleResult<Money>;
    async fn get_positions(&self) -> TurtleResult<Vec<RawPosition>>;
    async fn get_account_summary(&self) -> TurtleResult<AccountSummary>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Buy,
    Sell,
}

#[derive(Debug, Clone)]
pub struct BracketOrder {
    pub symbol: Symbol,
    pub direction: OrderDirection,
    pub contracts: i64,
    pub stop_price: Money,
}

#[derive(Debug, Clone)]
pub struct Fill {
    pub symbol: Symbol,
    pub price: Money,
    pub contracts: i64,
    pub commission: Money,
    pub filled_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StopModification {
    pub position_id: crate::domain::PositionId,
    pub new_stop: Money,
}

/// Broker connectivity (order placement, fills, account snapshots) — out of
/// scope for a real implementation per spec §1; this trait is the seam.
/// Every call may block; idempotent calls (`modify_stop`, `cancel_all_orders`)
/// are safely retryable, entry placement is not (spec §4.R).
#[async_trait]
pub trait Broker: Send + Sync {
    async fn place_bracket_order(&self, order: BracketOrder) -> TurtleResult<Fill>;
    async fn modify_stop(
        &self,
        position_id: crate::domain::PositionId,
        new_stop: Money,
    ) -> TurtleResult<StopModification>;
    async fn close_position(
        &self,
        position_id: crate::domain::PositionId,
        quantity: i64,
    ) -> TurtleResult<Fill>;
    async fn cancel_all_orders(&self, symbol: &Symbol) -> TurtleResult<usize>;
    async fn get_positions(&self) -> TurtleResult<Vec<RawPosition>>;
}

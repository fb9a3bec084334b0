//! Append-only structured audit record (spec §4.Q), generalizing the
//! reference crate's `Strategy::notify_order`/`notify_trade` tracing-log
//! pattern into a persisted, queryable event stream.

use crate::domain::Symbol;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSource {
    Scanner,
    Monitor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventOutcome {
    Success,
    Skipped,
    Denied,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    ScanStarted,
    ScanCompleted,
    SignalDetected,
    FilterVerdict,
    SizingComputed,
    LimitVerdict,
    OrderPlaced,
    Fill,
    PyramidExecuted,
    ExitExecuted,
    Hold,
    Error,
    EntrySignal,
    TradeSkipped,
    PositionOpened,
    PositionClosed,
    ReconciliationRequired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub outcome: EventOutcome,
    pub run_id: String,
    pub sequence: u64,
    pub symbol: Option<Symbol>,
    pub context: serde_json::Value,
    pub source: EventSource,
    pub dry_run: bool,
}

//! Event emitter — spec §4.Q. Wraps `EventRepository` with the
//! monotonically-increasing `sequence`-within-`run_id` bookkeeping every
//! decision point needs, following the reference crate's
//! `Strategy::notify_order`/`notify_trade` call-one-hook-per-decision
//! pattern, generalized into a persisted, append-only event stream instead
//! of a tracing log line.

use crate::domain::{Event, EventOutcome, EventSource, EventType, Symbol};
use crate::errors::TurtleResult;
use crate::repository::EventRepository;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct EventEmitter<'a> {
    repo: &'a dyn EventRepository,
    run_id: String,
    source: EventSource,
    dry_run: bool,
    sequence: AtomicU64,
}

impl<'a> EventEmitter<'a> {
    pub fn new(repo: &'a dyn EventRepository, run_id: impl Into<String>, source: EventSource, dry_run: bool) -> Self {
        EventEmitter {
            repo,
            run_id: run_id.into(),
            source,
            dry_run,
            sequence: AtomicU64::new(0),
        }
    }

    /// Appends one `Event` and returns its assigned id. `sequence` is
    /// strictly increasing within this emitter's `run_id` (spec §4.Q);
    /// events are never amended once appended.
    pub async fn emit(
        &self,
        event_type: EventType,
        outcome: EventOutcome,
        symbol: Option<Symbol>,
        context: serde_json::Value,
    ) -> TurtleResult<i64> {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let event = Event {
            id: None,
            timestamp: Utc::now(),
            event_type,
            outcome,
            run_id: self.run_id.clone(),
            sequence,
            symbol,
            context,
            source: self.source,
            dry_run: self.dry_run,
        };
        self.repo.append(&event).await
    }
}

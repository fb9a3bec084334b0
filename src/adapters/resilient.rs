//! Resilience decorators for `DataFeed`/`Broker` (spec §9 "Resilience"):
//! every call is gated by a `CircuitBreaker` and a token-bucket
//! `RateLimiter`, carried forward unchanged from the reference crate's
//! `common::circuit_breaker`/`common::rate_limiter`. A call against an open
//! circuit short-circuits to `DataSourceUnavailable`/`BrokerTransient`
//! without touching the network, and is treated by the orchestrators
//! exactly like a transport failure (per-symbol skip, cycle continues).
//! Idempotent broker calls (`modify_stop`, `cancel_all_orders`) are retried
//! with bounded backoff on `BrokerTransient`; `place_bracket_order` and
//! `close_position` are never retried here — an ambiguous failure there is
//! the orchestrator's cue to reconcile (spec §4.R, §7).

use crate::common::{CircuitBreaker, CircuitBreakerConfig, CircuitState, RateLimiter, RateLimiterConfig};
use crate::domain::{Bar, PositionId, Symbol};
use crate::errors::{TurtleError, TurtleResult};
use crate::interfaces::{AccountSummary, BracketOrder, Broker, DataFeed, Fill, RawPosition, StopModification};
use crate::money::Money;
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_millis(200);

async fn retry_idempotent<T, F, Fut>(mut op: F) -> TurtleResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = TurtleResult<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(TurtleError::BrokerTransient { symbol, reason }) if attempt < MAX_RETRIES => {
                attempt += 1;
                let backoff = BASE_BACKOFF * 2u32.pow(attempt - 1);
                tracing::warn!(symbol = %symbol, attempt, reason = %reason, "broker transient error, retrying after backoff");
                tokio::time::sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Wraps a `DataFeed` with a circuit breaker and rate limiter.
pub struct ResilientDataFeed<'a> {
    inner: &'a dyn DataFeed,
    circuit: Mutex<CircuitBreaker>,
    limiter: RateLimiter,
}

impl<'a> ResilientDataFeed<'a> {
    pub fn new(inner: &'a dyn DataFeed) -> Self {
        ResilientDataFeed { inner, circuit: Mutex::new(CircuitBreaker::with_defaults()), limiter: RateLimiter::with_defaults() }
    }

    pub fn with_config(inner: &'a dyn DataFeed, circuit: CircuitBreakerConfig, rate: RateLimiterConfig) -> Self {
        ResilientDataFeed { inner, circuit: Mutex::new(CircuitBreaker::new(circuit)), limiter: RateLimiter::new(rate) }
    }

    fn guard(&self, symbol: &Symbol) -> TurtleResult<()> {
        let mut circuit = self.circuit.lock().expect("circuit breaker mutex poisoned");
        if circuit.can_attempt() {
            Ok(())
        } else {
            Err(TurtleError::DataSourceUnavailable { symbol: symbol.clone(), reason: "circuit open".to_string() })
        }
    }

    fn record<T>(&self, result: &TurtleResult<T>) {
        let mut circuit = self.circuit.lock().expect("circuit breaker mutex poisoned");
        match result {
            Ok(_) => circuit.record_success(),
            Err(_) => circuit.record_failure(),
        }
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.circuit.lock().expect("circuit breaker mutex poisoned").state()
    }
}

#[async_trait]
impl<'a> DataFeed for ResilientDataFeed<'a> {
    async fn get_bars(&self, symbol: &Symbol, days: usize) -> TurtleResult<Vec<Bar>> {
        self.guard(symbol)?;
        self.limiter.acquire().await;
        let result = self.inner.get_bars(symbol, days).await;
        self.record(&result);
        result
    }

    async fn get_current_price(&self, symbol: &Symbol) -> TurtleResult<Money> {
        self.guard(symbol)?;
        self.limiter.acquire().await;
        let result = self.inner.get_current_price(symbol).await;
        self.record(&result);
        result
    }

    async fn get_positions(&self) -> TurtleResult<Vec<RawPosition>> {
        self.limiter.acquire().await;
        let result = self.inner.get_positions().await;
        self.record(&result);
        result
    }

    async fn get_account_summary(&self) -> TurtleResult<AccountSummary> {
        self.limiter.acquire().await;
        let result = self.inner.get_account_summary().await;
        self.record(&result);
        result
    }
}

/// Wraps a `Broker` with a circuit breaker, rate limiter, and bounded-
/// backoff retry for the idempotent calls (spec §4.R).
pub struct ResilientBroker<'a> {
    inner: &'a dyn Broker,
    circuit: Mutex<CircuitBreaker>,
    limiter: RateLimiter,
}

impl<'a> ResilientBroker<'a> {
    pub fn new(inner: &'a dyn Broker) -> Self {
        ResilientBroker { inner, circuit: Mutex::new(CircuitBreaker::with_defaults()), limiter: RateLimiter::with_defaults() }
    }

    pub fn with_config(inner: &'a dyn Broker, circuit: CircuitBreakerConfig, rate: RateLimiterConfig) -> Self {
        ResilientBroker { inner, circuit: Mutex::new(CircuitBreaker::new(circuit)), limiter: RateLimiter::new(rate) }
    }

    fn guard(&self, symbol: &Symbol) -> TurtleResult<()> {
        let mut circuit = self.circuit.lock().expect("circuit breaker mutex poisoned");
        if circuit.can_attempt() {
            Ok(())
        } else {
            Err(TurtleError::BrokerTransient { symbol: symbol.clone(), reason: "circuit open".to_string() })
        }
    }

    fn record<T>(&self, result: &TurtleResult<T>) {
        let mut circuit = self.circuit.lock().expect("circuit breaker mutex poisoned");
        match result {
            Ok(_) => circuit.record_success(),
            Err(_) => circuit.record_failure(),
        }
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.circuit.lock().expect("circuit breaker mutex poisoned").state()
    }
}

#[async_trait]
impl<'a> Broker for ResilientBroker<'a> {
    /// Not retried: an ambiguous failure here means an order may or may not
    /// have reached the exchange, so the orchestrator must reconcile
    /// instead of blindly resending it (spec §4.R, §7).
    async fn place_bracket_order(&self, order: BracketOrder) -> TurtleResult<Fill> {
        self.guard(&order.symbol)?;
        self.limiter.acquire().await;
        let result = self.inner.place_bracket_order(order).await;
        self.record(&result);
        result
    }

    async fn modify_stop(&self, position_id: PositionId, new_stop: Money) -> TurtleResult<StopModification> {
        let symbol_hint = Symbol::new(format!("position-{}", position_id.0));
        self.guard(&symbol_hint)?;
        let result = retry_idempotent(|| async {
            self.limiter.acquire().await;
            self.inner.modify_stop(position_id, new_stop).await
        })
        .await;
        self.record(&result);
        result
    }

    /// Not retried: partial fills on resend would double-close the
    /// position. Ambiguous failures enter `ReconciliationRequired`.
    async fn close_position(&self, position_id: PositionId, quantity: i64) -> TurtleResult<Fill> {
        let symbol_hint = Symbol::new(format!("position-{}", position_id.0));
        self.guard(&symbol_hint)?;
        self.limiter.acquire().await;
        let result = self.inner.close_position(position_id, quantity).await;
        self.record(&result);
        result
    }

    async fn cancel_all_orders(&self, symbol: &Symbol) -> TurtleResult<usize> {
        self.guard(symbol)?;
        let result = retry_idempotent(|| async {
            self.limiter.acquire().await;
            self.inner.cancel_all_orders(symbol).await
        })
        .await;
        self.record(&result);
        result
    }

    async fn get_positions(&self) -> TurtleResult<Vec<RawPosition>> {
        self.limiter.acquire().await;
        let result = self.inner.get_positions().await;
        self.record(&result);
        result
    }
}

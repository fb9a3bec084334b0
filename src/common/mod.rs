//! Common utilities shared by the `DataFeed`/`Broker` collaborators
//!
//! - Circuit breaker pattern for fault tolerance
//! - Rate limiter using token bucket algorithm
//!
//! Wrapped around `DataFeed`/`Broker` implementations by
//! `crate::adapters::resilient` (spec §9 "Resilience").

pub mod circuit_breaker;
pub mod rate_limiter;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use rate_limiter::{RateLimiter, RateLimiterConfig};

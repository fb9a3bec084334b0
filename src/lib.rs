//! A mechanical trend-following engine implementing the classic Turtle
//! Trading rules: Donchian breakout entries, Wilder-smoothed volatility
//! position sizing, pyramiding, and a fixed stop-loss/breakout-exit
//! priority chain — driven by pluggable `DataFeed`/`Broker` collaborators
//! so paper and live trading share one decision core.

pub mod adapters;
pub mod backtest;
pub mod common;
pub mod config;
pub mod domain;
pub mod drawdown;
pub mod errors;
pub mod event_emitter;
pub mod exit;
pub mod filters;
pub mod indicators;
pub mod interfaces;
pub mod limits;
pub mod monitor;
pub mod monitor_loop;
pub mod money;
pub mod pyramid;
pub mod reconcile;
pub mod repository;
pub mod rollover;
pub mod rules;
pub mod scanner;
pub mod signal_detector;
pub mod sizing;
pub mod stop;
pub mod validation;

pub use config::Config;
pub use errors::{TurtleError, TurtleResult};
pub use money::{Money, NotionalEquity};
pub use rules::Rules;

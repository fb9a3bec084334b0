//! Error taxonomy (spec §7), following the reference crate's `thiserror` use.

use crate::domain::Symbol;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TurtleError {
    #[error("insufficient history for {symbol}: need {needed} bars, have {available}")]
    InsufficientHistory {
        symbol: Symbol,
        needed: usize,
        available: usize,
    },

    #[error("bar validation failed for {symbol} on {date}: {reason}")]
    BarValidation {
        symbol: Symbol,
        date: chrono::NaiveDate,
        reason: String,
    },

    #[error("data source unavailable for {symbol}: {reason}")]
    DataSourceUnavailable { symbol: Symbol, reason: String },

    #[error("broker transient error on {symbol}: {reason}")]
    BrokerTransient { symbol: Symbol, reason: String },

    #[error("broker rejected order for {symbol}: {reason}")]
    BrokerRejected { symbol: Symbol, reason: String },

    #[error("limit denied for {symbol}: {reason}")]
    LimitDenied { symbol: Symbol, reason: String },

    #[error("zero size for {symbol}: risk too large for one contract at current equity")]
    ZeroSize { symbol: Symbol },

    #[error("reconciliation required for {symbol}: in-memory position drifted from broker")]
    ReconciliationRequired { symbol: Symbol },

    #[error("fatal configuration error: {0}")]
    FatalConfig(String),
}

pub type TurtleResult<T> = Result<T, TurtleError>;

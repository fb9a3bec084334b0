//! OHLCV bar, the atomic unit of price history (spec §3).

use crate::domain::Symbol;
use crate::money::Money;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: Symbol,
    pub date: NaiveDate,
    pub open: Money,
    pub high: Money,
    pub low: Money,
    pub close: Money,
    pub volume: Money,
}

impl Bar {
    pub fn new(
        symbol: Symbol,
        date: NaiveDate,
        open: Money,
        high: Money,
        low: Money,
        close: Money,
        volume: Money,
    ) -> Self {
        Bar {
            symbol,
            date,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

//! Reference data and the per-cycle computed market snapshot (spec §3).

use crate::domain::Symbol;
use crate::money::Money;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Immutable reference data for a tradeable market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSpec {
    pub symbol: Symbol,
    pub point_value: Decimal,
    pub tick_size: Decimal,
    pub correlation_group: String,
    pub asset_class: String,
}

/// Wilder-smoothed volatility measure. Immutable once computed for a
/// (symbol, date) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NValue {
    pub value: Money,
    pub period: usize,
    pub method: NMethod,
    pub calculated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NMethod {
    Wilders,
    Sma,
}

/// Donchian high/low channel over the last `period` bars.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DonchianChannel {
    pub upper: Money,
    pub lower: Money,
    pub period: usize,
    pub calculated_at: DateTime<Utc>,
}

impl DonchianChannel {
    pub fn new(upper: Money, lower: Money, period: usize, calculated_at: DateTime<Utc>) -> Self {
        debug_assert!(upper >= lower, "Donchian channel invariant: upper >= lower");
        DonchianChannel {
            upper,
            lower,
            period,
            calculated_at,
        }
    }
}

/// Rebuilt each scan/cycle; never mutated in place (spec §3).
#[derive(Debug, Clone)]
pub struct MarketData {
    pub spec: MarketSpec,
    pub current_price: Money,
    /// Intraday open/high/low of the bar the decision is being evaluated
    /// against. All three fall back to `current_price` when only
    /// last-price polling is available (spec §4.K).
    pub bar_open: Money,
    pub bar_high: Money,
    pub bar_low: Money,
    pub n_value: NValue,
    pub donchian_10: DonchianChannel,
    pub donchian_20: DonchianChannel,
    pub donchian_55: DonchianChannel,
    pub updated_at: DateTime<Utc>,
}

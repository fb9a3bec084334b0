//! Rules configuration (spec §3, §9 Design Notes "Dynamic typed config").
//!
//! Every recognized option is an explicit field; unknown keys are rejected
//! at deserialization time (`deny_unknown_fields`) rather than silently
//! ignored, following the Design Notes' instruction to enumerate all
//! recognized configuration options and treat the rest as a startup error.
//! This generalizes the reference crate's `Config::from_file` (which loads
//! a loosely-typed `serde_json::Value` strategy sub-config) to a fully
//! typed, closed configuration surface.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AtrMethod {
    Wilders,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "mode")]
pub enum ExposureMode {
    UnitCap { max_total_units: u32 },
    RiskCap { fraction: Decimal },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntryExitPeriods {
    pub s1_entry: usize,
    pub s2_entry: usize,
    pub s1_exit: usize,
    pub s2_exit: usize,
}

impl Default for EntryExitPeriods {
    fn default() -> Self {
        EntryExitPeriods {
            s1_entry: 20,
            s2_entry: 55,
            s1_exit: 10,
            s2_exit: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rules {
    /// Fraction of notional equity risked per unit. Recognized: 0.005
    /// (modern), 0.01 (original Turtle).
    pub risk_factor: Decimal,
    /// Stop distance in units of N (spec default 2).
    pub stop_multiplier: Decimal,
    /// Price advance (in units of N) between pyramid additions. Either
    /// 0.5 (original) or 1.0 (later adaptation) are both valid — spec §9
    /// leaves this open and directs both to be supported.
    pub pyramid_interval: Decimal,
    pub max_units_per_market: u32,
    pub max_units_correlated: u32,
    pub max_total_exposure_mode: ExposureMode,
    pub atr_period: usize,
    pub atr_method: AtrMethod,
    pub periods: EntryExitPeriods,
    /// Drawdown fraction that triggers one reduction step.
    pub drawdown_trigger: Decimal,
    /// Notional multiplier reduction applied per triggered step.
    pub drawdown_notional_reduction: Decimal,
    /// Floor on the notional multiplier, as a fraction of actual equity.
    pub notional_floor: Decimal,
    pub check_interval_secs: u64,
    pub days_before_expiry: i64,
}

impl Default for Rules {
    fn default() -> Self {
        Rules {
            risk_factor: dec!(0.005),
            stop_multiplier: dec!(2),
            pyramid_interval: dec!(0.5),
            max_units_per_market: 4,
            max_units_correlated: 6,
            max_total_exposure_mode: ExposureMode::RiskCap { fraction: dec!(0.20) },
            atr_period: 20,
            atr_method: AtrMethod::Wilders,
            periods: EntryExitPeriods::default(),
            drawdown_trigger: dec!(0.10),
            drawdown_notional_reduction: dec!(0.20),
            notional_floor: dec!(0.40),
            check_interval_secs: 60,
            days_before_expiry: 14,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rules_match_spec_defaults() {
        let r = Rules::default();
        assert_eq!(r.risk_factor, dec!(0.005));
        assert_eq!(r.stop_multiplier, dec!(2));
        assert_eq!(r.max_units_per_market, 4);
        assert_eq!(r.max_units_correlated, 6);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let json = r#"{
            "risk_factor": "0.005", "stop_multiplier": "2", "pyramid_interval": "0.5",
            "max_units_per_market": 4, "max_units_correlated": 6,
            "max_total_exposure_mode": {"mode": "UNIT_CAP", "max_total_units": 12},
            "atr_period": 20, "atr_method": "WILDERS",
            "periods": {"s1_entry": 20, "s2_entry": 55, "s1_exit": 10, "s2_exit": 20},
            "drawdown_trigger": "0.10", "drawdown_notional_reduction": "0.20",
            "notional_floor": "0.40", "check_interval_secs": 60, "days_before_expiry": 14,
            "unknown_field": true
        }"#;
        let result: Result<Rules, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}

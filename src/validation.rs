//! Bar validator — spec §4.C, grounded in the reference crate's
//! `types.rs::CandleValidationError`/`Candle::validate()` (same rejection
//! conditions), extended with the previous-close bad-tick warning spec §4.C
//! adds on top of the reference crate's pure OHLC sanity check.

use crate::domain::Bar;
use crate::money::Money;
use rust_decimal_macros::dec;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum BarValidationError {
    #[error("high ({high}) < low ({low})")]
    HighLessThanLow { high: Money, low: Money },
    #[error("high ({high}) < open ({open})")]
    HighLessThanOpen { high: Money, open: Money },
    #[error("high ({high}) < close ({close})")]
    HighLessThanClose { high: Money, close: Money },
    #[error("low ({low}) > open ({open})")]
    LowGreaterThanOpen { low: Money, open: Money },
    #[error("low ({low}) > close ({close})")]
    LowGreaterThanClose { low: Money, close: Money },
    #[error("non-positive price encountered")]
    NonPositivePrice,
}

/// Non-fatal warning: `|close - previous_close| / previous_close > 20%`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BadTickWarning {
    pub pct_change: rust_decimal::Decimal,
}

/// Runs on every ingested bar prior to indicator computation (spec §4.C).
/// Returns `Ok(warning)` where `warning` is `Some` if the non-fatal bad-tick
/// threshold was crossed, or `Err` if the bar must be rejected outright.
pub fn validate_bar(
    bar: &Bar,
    previous_close: Option<Money>,
) -> Result<Option<BadTickWarning>, BarValidationError> {
    if bar.high < bar.low {
        return Err(BarValidationError::HighLessThanLow {
            high: bar.high,
            low: bar.low,
        });
    }
    if bar.high < bar.open {
        return Err(BarValidationError::HighLessThanOpen {
            high: bar.high,
            open: bar.open,
        });
    }
    if bar.high < bar.close {
        return Err(BarValidationError::HighLessThanClose {
            high: bar.high,
            close: bar.close,
        });
    }
    if bar.low > bar.open {
        return Err(BarValidationError::LowGreaterThanOpen {
            low: bar.low,
            open: bar.open,
        });
    }
    if bar.low > bar.close {
        return Err(BarValidationError::LowGreaterThanClose {
            low: bar.low,
            close: bar.close,
        });
    }
    if !bar.open.is_positive() || !bar.high.is_positive() || !bar.low.is_positive() || !bar.close.is_positive() {
        return Err(BarValidationError::NonPositivePrice);
    }

    if let Some(prev) = previous_close {
        if prev.is_positive() {
            let pct = (bar.close - prev).abs() / prev;
            if pct > dec!(0.20) {
                return Ok(Some(BadTickWarning { pct_change: pct }));
            }
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Symbol;
    use chrono::NaiveDate;

    fn bar(open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar::new(
            Symbol::new("TEST"),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            Money::from_f64(open),
            Money::from_f64(high),
            Money::from_f64(low),
            Money::from_f64(close),
            Money::from_f64(1000.0),
        )
    }

    #[test]
    fn valid_bar_passes() {
        assert_eq!(validate_bar(&bar(100.0, 105.0, 95.0, 102.0), None), Ok(None));
    }

    #[test]
    fn high_less_than_low_is_rejected() {
        let err = validate_bar(&bar(100.0, 90.0, 95.0, 92.0), None).unwrap_err();
        assert!(matches!(err, BarValidationError::HighLessThanLow { .. }));
    }

    #[test]
    fn non_positive_price_is_rejected() {
        let err = validate_bar(&bar(-1.0, 5.0, -2.0, 1.0), None).unwrap_err();
        assert_eq!(err, BarValidationError::NonPositivePrice);
    }

    #[test]
    fn large_gap_warns_but_does_not_reject() {
        let result = validate_bar(&bar(130.0, 132.0, 128.0, 130.0), Some(Money::from_f64(100.0)));
        assert!(matches!(result, Ok(Some(_))));
    }
}

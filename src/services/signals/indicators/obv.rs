//! On-Balance Volume (OBV) indicator.

use super::Indicator;
use crate::types::Candle;

/// OBV (On-Balance Volume) indicator.
///
/// Cumulative volume indicator:
/// - If close > previous close: OBV += volume
/// - If close < previous close: OBV -= volume
pub struct Obv;

impl Default for Obv {
    fn default() -> Self {
        Self
    }
}

impl Indicator for Obv {
    type Output = f64;

    fn id(&self) -> &str {
        "obv"
    }

    fn min_periods(&self) -> usize {
        2
    }

    fn compute(&self, candles: &[Candle]) -> Option<f64> {
        if candles.len() < self.min_periods() {
            return None;
        }

        let obv = candles.windows(2).fold(0.0, |obv, w| {
            if w[1].close > w[0].close {
                obv + w[1].volume
            } else if w[1].close < w[0].close {
                obv - w[1].volume
            } else {
                obv
            }
        });

        Some(obv)
    }
}

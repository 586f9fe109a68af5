//! Technical indicator implementations.

pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod obv;
pub mod rsi;
pub mod volume;

pub use adx::{Adx, AdxOutput};
pub use atr::{Atr, AtrOutput};
pub use bollinger::BollingerBands;
pub use ema::Ema;
pub use macd::{Macd, MacdOutput};
pub use obv::Obv;
pub use rsi::Rsi;
pub use volume::{VolumeOutput, VolumeProfile};

use crate::types::Candle;

/// Denominator floor for ratio features.
pub const EPSILON: f64 = 1e-12;

/// Trait for indicators computed over a candle window.
pub trait Indicator: Send + Sync {
    type Output;

    /// Unique identifier for this indicator.
    fn id(&self) -> &str;

    /// Minimum number of candles required.
    fn min_periods(&self) -> usize;

    /// Compute the latest value. Returns None on insufficient data.
    fn compute(&self, candles: &[Candle]) -> Option<Self::Output>;
}

/// Division with the denominator floored at [`EPSILON`] in magnitude.
pub fn safe_div(numerator: f64, denominator: f64) -> f64 {
    let denom = if denominator.abs() < EPSILON {
        if denominator.is_sign_negative() {
            -EPSILON
        } else {
            EPSILON
        }
    } else {
        denominator
    };
    let value = numerator / denom;
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Wilder running-sum smoothing: seed with the sum of the first `period`
/// values, then `x - x / period + new`.
pub fn wilder_sums(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }

    let mut result = Vec::with_capacity(values.len() - period + 1);
    let mut running: f64 = values.iter().take(period).sum();
    result.push(running);

    for value in values.iter().skip(period) {
        running = running - running / period as f64 + value;
        result.push(running);
    }

    result
}

//! Volume dynamics: rate of change, spike score and trend.

use super::{safe_div, Indicator};
use crate::types::Candle;

/// Volume profile over a short and a long lookback.
pub struct VolumeProfile {
    roc_period: usize,
    short: usize,
    long: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeOutput {
    /// Percent change of volume over `roc_period` bars.
    pub roc: f64,
    /// Last-bar volume relative to the long average, mapped to [0, 1].
    pub spike: f64,
    /// Short average over long average, minus one.
    pub trend: f64,
}

impl Default for VolumeProfile {
    fn default() -> Self {
        Self {
            roc_period: 10,
            short: 5,
            long: 20,
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

impl Indicator for VolumeProfile {
    type Output = VolumeOutput;

    fn id(&self) -> &str {
        "volume"
    }

    fn min_periods(&self) -> usize {
        self.long.max(self.roc_period + 1)
    }

    fn compute(&self, candles: &[Candle]) -> Option<VolumeOutput> {
        if candles.len() < self.min_periods() {
            return None;
        }

        let volumes: Vec<f64> = candles.iter().map(|c| c.volume.max(0.0)).collect();
        let n = volumes.len();
        let last = volumes[n - 1];

        let past = volumes[n - 1 - self.roc_period];
        let roc = if past > 0.0 {
            100.0 * safe_div(last - past, past)
        } else {
            0.0
        };

        let long_avg = mean(&volumes[n - self.long..]);
        let short_avg = mean(&volumes[n - self.short..]);

        // Zero-volume feeds read as neutral, not as a collapse.
        if long_avg <= 0.0 {
            return Some(VolumeOutput {
                roc,
                spike: 0.0,
                trend: 0.0,
            });
        }

        let ratio = safe_div(last, long_avg);
        let spike = ((ratio - 1.0) / 2.0).clamp(0.0, 1.0);
        let trend = safe_div(short_avg, long_avg) - 1.0;

        Some(VolumeOutput { roc, spike, trend })
    }
}

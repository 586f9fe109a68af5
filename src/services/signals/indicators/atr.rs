//! Average True Range (ATR) indicator.

use super::{safe_div, Indicator};
use crate::types::Candle;

/// ATR (Average True Range) indicator.
///
/// Measures market volatility by calculating the average of true ranges:
/// TR = max(High-Low, |High-PrevClose|, |Low-PrevClose|)
///
/// Besides the latest ATR, reports how it changed over one period.
pub struct Atr {
    period: usize,
}

/// Latest ATR and its change ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtrOutput {
    pub atr: f64,
    /// ATR now over ATR `period` bars earlier (1.0 when unavailable).
    pub change: f64,
}

impl Default for Atr {
    fn default() -> Self {
        Self { period: 14 }
    }
}

impl Atr {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
        }
    }

    /// Wilder-smoothed ATR for every bar from the first full period on.
    pub fn series(&self, candles: &[Candle]) -> Vec<f64> {
        if candles.len() < self.min_periods() {
            return Vec::new();
        }

        let true_ranges: Vec<f64> = candles
            .windows(2)
            .map(|w| w[1].true_range(&w[0]))
            .collect();

        let mut series = Vec::with_capacity(true_ranges.len() - self.period + 1);
        let mut atr = true_ranges.iter().take(self.period).sum::<f64>() / self.period as f64;
        series.push(atr);

        for tr in true_ranges.iter().skip(self.period) {
            atr = (atr * (self.period - 1) as f64 + tr) / self.period as f64;
            series.push(atr);
        }

        series
    }
}

impl Indicator for Atr {
    type Output = AtrOutput;

    fn id(&self) -> &str {
        "atr"
    }

    fn min_periods(&self) -> usize {
        self.period + 1
    }

    fn compute(&self, candles: &[Candle]) -> Option<AtrOutput> {
        let series = self.series(candles);
        let atr = *series.last()?;

        let change = if series.len() > self.period {
            let earlier = series[series.len() - 1 - self.period];
            if earlier > 0.0 {
                safe_div(atr, earlier)
            } else {
                1.0
            }
        } else {
            1.0
        };

        Some(AtrOutput { atr, change })
    }
}

//! MACD (Moving Average Convergence Divergence) indicator.

use super::{Ema, Indicator};
use crate::types::Candle;

/// MACD indicator.
///
/// Shows the relationship between two EMAs:
/// - MACD Line = EMA(12) - EMA(26)
/// - Signal Line = EMA(9) of MACD Line
/// - Histogram = MACD Line - Signal Line
pub struct Macd {
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
}

/// Latest MACD line, signal line and histogram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdOutput {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

impl Default for Macd {
    fn default() -> Self {
        Self {
            fast_period: 12,
            slow_period: 26,
            signal_period: 9,
        }
    }
}

impl Macd {
    pub fn slow_period(&self) -> usize {
        self.slow_period
    }
}

impl Indicator for Macd {
    type Output = MacdOutput;

    fn id(&self) -> &str {
        "macd"
    }

    fn min_periods(&self) -> usize {
        self.slow_period
    }

    fn compute(&self, candles: &[Candle]) -> Option<MacdOutput> {
        if candles.len() < self.min_periods() {
            return None;
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let fast = Ema::series(&closes, self.fast_period);
        let slow = Ema::series(&closes, self.slow_period);

        // Align fast to slow: both end on the last close.
        let offset = fast.len() - slow.len();
        let macd_line: Vec<f64> = slow
            .iter()
            .enumerate()
            .map(|(i, s)| fast[i + offset] - s)
            .collect();

        let macd = *macd_line.last()?;
        // Short histories use the MACD line itself as the signal, giving a
        // zero histogram.
        let signal = Ema::series(&macd_line, self.signal_period)
            .last()
            .copied()
            .unwrap_or(macd);

        Some(MacdOutput {
            macd,
            signal,
            histogram: macd - signal,
        })
    }
}

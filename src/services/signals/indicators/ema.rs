//! Exponential Moving Average (EMA) indicator.

use super::Indicator;
use crate::types::Candle;

/// EMA (Exponential Moving Average) indicator over closes.
///
/// Like an SMA but gives more weight to recent prices. Seeded with the SMA of
/// the first `period` values.
pub struct Ema {
    period: usize,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
        }
    }

    /// EMA series of arbitrary values; the first element aligns with
    /// `values[period - 1]`.
    pub fn series(values: &[f64], period: usize) -> Vec<f64> {
        if period == 0 || values.len() < period {
            return Vec::new();
        }

        let multiplier = 2.0 / (period as f64 + 1.0);
        let mut ema = Vec::with_capacity(values.len() - period + 1);
        let mut current = values.iter().take(period).sum::<f64>() / period as f64;
        ema.push(current);

        for value in &values[period..] {
            current = (value - current) * multiplier + current;
            ema.push(current);
        }

        ema
    }
}

impl Indicator for Ema {
    type Output = f64;

    fn id(&self) -> &str {
        "ema"
    }

    fn min_periods(&self) -> usize {
        self.period
    }

    fn compute(&self, candles: &[Candle]) -> Option<f64> {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        Self::series(&closes, self.period).last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ema_seed_is_sma() {
        let series = Ema::series(&[1.0, 2.0, 3.0], 3);
        assert_eq!(series, vec![2.0]);
    }

    #[test]
    fn test_ema_tracks_level() {
        let candles: Vec<Candle> = (0..60)
            .map(|i| Candle::new(i, 50.0, 50.0, 50.0, 50.0, 1.0))
            .collect();
        assert_eq!(Ema::new(20).compute(&candles), Some(50.0));
    }

    #[test]
    fn test_ema_fast_above_slow_in_uptrend() {
        let candles: Vec<Candle> = (0..80)
            .map(|i| {
                let c = 100.0 + i as f64;
                Candle::new(i, c, c, c, c, 1.0)
            })
            .collect();
        let fast = Ema::new(20).compute(&candles).unwrap();
        let slow = Ema::new(50).compute(&candles).unwrap();
        assert!(fast > slow);
    }

    #[test]
    fn test_ema_insufficient_data() {
        assert!(Ema::series(&[1.0, 2.0], 3).is_empty());
    }
}

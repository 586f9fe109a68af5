//! Empirical TP/SL ordering.
//!
//! Replays recent history: from each past bar, would a trade with the same
//! distances have reached its target before its stop within the horizon?

use crate::types::{Candle, SignalType};

/// Counts of a TP/SL ordering replay.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OrderingEstimate {
    pub tp_first: usize,
    pub sl_first: usize,
}

impl OrderingEstimate {
    pub fn resolved(&self) -> usize {
        self.tp_first + self.sl_first
    }

    /// Laplace-smoothed probability that TP is reached first.
    pub fn probability(&self) -> f64 {
        (self.tp_first as f64 + 1.0) / (self.resolved() as f64 + 2.0)
    }
}

/// Replay `direction` with `tp_pct`/`sl_pct` (percent of entry) from each
/// bar of the last `lookback` bars whose full horizon is in the past.
///
/// A bar that crosses both levels counts as a stop. Paths that reach
/// neither level are unresolved and ignored.
pub fn estimate(
    candles: &[Candle],
    direction: SignalType,
    tp_pct: f64,
    sl_pct: f64,
    horizon: usize,
    lookback: usize,
) -> OrderingEstimate {
    let mut estimate = OrderingEstimate::default();
    let n = candles.len();
    if !direction.is_actionable() || horizon == 0 || n <= horizon || tp_pct <= 0.0 || sl_pct <= 0.0
    {
        return estimate;
    }

    let last_start = n - 1 - horizon;
    let first_start = n.saturating_sub(lookback);
    if first_start > last_start {
        return estimate;
    }

    for i in first_start..=last_start {
        let entry = candles[i].close;
        if entry <= 0.0 {
            continue;
        }

        let (tp, sl) = match direction {
            SignalType::Long => (entry * (1.0 + tp_pct / 100.0), entry * (1.0 - sl_pct / 100.0)),
            _ => (entry * (1.0 - tp_pct / 100.0), entry * (1.0 + sl_pct / 100.0)),
        };

        for bar in &candles[i + 1..=i + horizon] {
            let (hit_tp, hit_sl) = match direction {
                SignalType::Long => (bar.high >= tp, bar.low <= sl),
                _ => (bar.low <= tp, bar.high >= sl),
            };
            if hit_sl {
                estimate.sl_first += 1;
                break;
            }
            if hit_tp {
                estimate.tp_first += 1;
                break;
            }
        }
    }

    estimate
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trending_candles(count: usize, step: f64) -> Vec<Candle> {
        (0..count)
            .map(|i| {
                let close = 100.0 + i as f64 * step;
                Candle::new(i as i64, close, close + 0.2, close - 0.2, close, 100.0)
            })
            .collect()
    }

    #[test]
    fn test_uptrend_long_reaches_target() {
        let candles = trending_candles(200, 0.5);
        let result = estimate(&candles, SignalType::Long, 1.0, 1.0, 10, 400);
        assert!(result.resolved() > 100);
        assert_eq!(result.sl_first, 0);
        assert!(result.probability() > 0.9);
    }

    #[test]
    fn test_uptrend_short_is_stopped() {
        let candles = trending_candles(200, 0.5);
        let result = estimate(&candles, SignalType::Short, 1.0, 1.0, 10, 400);
        assert_eq!(result.tp_first, 0);
        assert!(result.probability() < 0.1);
    }

    #[test]
    fn test_same_bar_counts_as_stop() {
        let mut candles = vec![Candle::new(0, 100.0, 100.0, 100.0, 100.0, 1.0)];
        candles.push(Candle::new(1, 100.0, 110.0, 90.0, 100.0, 1.0));
        candles.push(Candle::new(2, 100.0, 100.0, 100.0, 100.0, 1.0));
        let result = estimate(&candles, SignalType::Long, 5.0, 5.0, 1, 10);
        assert_eq!(result, OrderingEstimate { tp_first: 0, sl_first: 1 });
    }

    #[test]
    fn test_window_never_reads_past_the_end() {
        let candles = trending_candles(20, 0.5);
        let result = estimate(&candles, SignalType::Long, 0.1, 0.1, 19, 400);
        assert_eq!(result.resolved(), 1);
        assert_eq!(estimate(&candles, SignalType::Long, 0.1, 0.1, 19, 5).resolved(), 0);
    }

    #[test]
    fn test_hold_and_empty_are_unresolved() {
        let candles = trending_candles(50, 0.5);
        assert_eq!(estimate(&candles, SignalType::Hold, 1.0, 1.0, 5, 400).resolved(), 0);
        assert_eq!(estimate(&[], SignalType::Long, 1.0, 1.0, 5, 400).resolved(), 0);
        assert_eq!(OrderingEstimate::default().probability(), 0.5);
    }
}

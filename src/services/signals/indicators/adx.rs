//! Average Directional Index (ADX) indicator.

use super::{safe_div, wilder_sums, Indicator};
use crate::types::Candle;

/// ADX (Average Directional Index) indicator.
///
/// Measures trend strength (not direction):
/// - Below 20: Weak trend / ranging market
/// - 20-40: Trending
/// - Above 40: Strong trend
///
/// Combined with +DI and -DI for direction.
pub struct Adx {
    period: usize,
}

/// Latest ADX with its directional indicators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdxOutput {
    pub adx: f64,
    pub plus_di: f64,
    pub minus_di: f64,
}

impl Default for Adx {
    fn default() -> Self {
        Self { period: 14 }
    }
}

impl Adx {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
        }
    }
}

impl Indicator for Adx {
    type Output = AdxOutput;

    fn id(&self) -> &str {
        "adx"
    }

    fn min_periods(&self) -> usize {
        self.period + 1
    }

    fn compute(&self, candles: &[Candle]) -> Option<AdxOutput> {
        if candles.len() < self.min_periods() {
            return None;
        }

        let mut plus_dm = Vec::with_capacity(candles.len() - 1);
        let mut minus_dm = Vec::with_capacity(candles.len() - 1);
        let mut tr = Vec::with_capacity(candles.len() - 1);

        for w in candles.windows(2) {
            let (previous, current) = (&w[0], &w[1]);
            let up_move = current.high - previous.high;
            let down_move = previous.low - current.low;

            plus_dm.push(if up_move > down_move && up_move > 0.0 {
                up_move
            } else {
                0.0
            });
            minus_dm.push(if down_move > up_move && down_move > 0.0 {
                down_move
            } else {
                0.0
            });
            tr.push(current.true_range(previous));
        }

        let smoothed_tr = wilder_sums(&tr, self.period);
        let smoothed_plus = wilder_sums(&plus_dm, self.period);
        let smoothed_minus = wilder_sums(&minus_dm, self.period);

        let mut dx_values = Vec::with_capacity(smoothed_tr.len());
        let mut last_di = (0.0, 0.0);
        for i in 0..smoothed_tr.len() {
            let plus_di = 100.0 * safe_div(smoothed_plus[i], smoothed_tr[i]);
            let minus_di = 100.0 * safe_div(smoothed_minus[i], smoothed_tr[i]);
            let di_sum = plus_di + minus_di;
            let dx = if di_sum > 0.0 {
                100.0 * (plus_di - minus_di).abs() / di_sum
            } else {
                0.0
            };
            dx_values.push(dx);
            last_di = (plus_di, minus_di);
        }

        // ADX: mean of the first period of DX, then Wilder average. Short
        // histories average whatever DX exists.
        let seed_len = self.period.min(dx_values.len());
        let mut adx = dx_values.iter().take(seed_len).sum::<f64>() / seed_len as f64;
        for dx in dx_values.iter().skip(seed_len) {
            adx = (adx * (self.period - 1) as f64 + dx) / self.period as f64;
        }

        Some(AdxOutput {
            adx,
            plus_di: last_di.0,
            minus_di: last_di.1,
        })
    }
}

//! Feature extraction from a candle window.

use super::indicators::{
    safe_div, Adx, Atr, BollingerBands, Ema, Indicator, Macd, Obv, Rsi, VolumeProfile, EPSILON,
};
use crate::types::{Candle, FeatureSet, MarketContext};
use tracing::{debug, trace};

const TREND_FAST: usize = 20;
const TREND_SLOW: usize = 50;

/// Candles needed before any indicator is trusted: the longest of the ATR,
/// MACD slow and Bollinger periods, plus two.
pub fn min_candles() -> usize {
    Atr::default()
        .min_periods()
        .max(Macd::default().slow_period())
        .max(BollingerBands::default().period())
        + 2
}

/// Extract the feature set for the latest bar of `candles`.
///
/// `candles` must be chronologically sorted. Short windows yield neutral
/// defaults instead of failing.
pub fn extract_features(candles: &[Candle], market: &MarketContext) -> FeatureSet {
    let close = candles.last().map(|c| c.close).unwrap_or(0.0);

    let mut features = if candles.len() < min_candles() {
        debug!(
            "Only {} candles (need {}), using neutral features",
            candles.len(),
            min_candles()
        );
        FeatureSet::neutral(close)
    } else {
        compute(candles, close)
    };

    features.btc_dom = market.btc_dominance;
    features.btc_dom_up = market.is_rising();
    features
}

fn compute(candles: &[Candle], close: f64) -> FeatureSet {
    let n = candles.len();

    let rsi = latest(&Rsi::default(), candles).unwrap_or(50.0);
    let macd_hist = latest(&Macd::default(), candles)
        .map(|m| m.histogram)
        .unwrap_or(0.0);
    let atr = latest(&Atr::default(), candles);
    let adx = latest(&Adx::default(), candles);
    let bb_width = latest(&BollingerBands::default(), candles).unwrap_or(0.0);
    let obv = latest(&Obv, candles).unwrap_or(0.0);
    let volume = latest(&VolumeProfile::default(), candles);

    let atr_value = atr.map(|a| a.atr).unwrap_or(0.0);
    let ema20 = Ema::new(TREND_FAST.min(n)).compute(candles).unwrap_or(close);
    let ema50 = Ema::new(TREND_SLOW.min(n)).compute(candles).unwrap_or(close);

    let spread = ema20 - ema50;
    let trend_dir = if spread.abs() <= EPSILON * close.abs().max(1.0) {
        0
    } else if spread > 0.0 {
        1
    } else {
        -1
    };
    let trend_strength = if atr_value > 0.0 {
        safe_div(spread.abs(), atr_value)
    } else {
        0.0
    };

    FeatureSet {
        rsi: finite_or(rsi, 50.0),
        macd_hist: finite_or(macd_hist, 0.0),
        atr: finite_or(atr_value, 0.0),
        atr_pct: finite_or(100.0 * safe_div(atr_value, close), 0.0),
        atr_change: finite_or(atr.map(|a| a.change).unwrap_or(1.0), 1.0),
        adx: finite_or(adx.map(|a| a.adx).unwrap_or(0.0), 0.0),
        plus_di: finite_or(adx.map(|a| a.plus_di).unwrap_or(0.0), 0.0),
        minus_di: finite_or(adx.map(|a| a.minus_di).unwrap_or(0.0), 0.0),
        bb_width: finite_or(bb_width, 0.0),
        obv: finite_or(obv, 0.0),
        vol_roc: finite_or(volume.map(|v| v.roc).unwrap_or(0.0), 0.0),
        vol_spike: finite_or(volume.map(|v| v.spike).unwrap_or(0.0), 0.0),
        vol_trend: finite_or(volume.map(|v| v.trend).unwrap_or(0.0), 0.0),
        ema20,
        ema50,
        trend_dir,
        trend_strength: finite_or(trend_strength, 0.0),
        close,
        btc_dom: 0.0,
        btc_dom_up: false,
        sufficient: true,
    }
}

/// Latest indicator value, logging which indicator lacked data.
fn latest<I: Indicator>(indicator: &I, candles: &[Candle]) -> Option<I::Output> {
    let value = indicator.compute(candles);
    if value.is_none() {
        trace!(
            "{} unavailable ({} candles, needs {})",
            indicator.id(),
            candles.len(),
            indicator.min_periods()
        );
    }
    value
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        debug!("Non-finite feature replaced with {}", fallback);
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_uptrend_candles(count: usize) -> Vec<Candle> {
        (0..count)
            .map(|i| {
                let base = 100.0 + i as f64 * 0.5;
                Candle::new(i as i64 * 3_600_000, base, base + 0.6, base - 0.3, base + 0.4, 1000.0)
            })
            .collect()
    }

    #[test]
    fn test_min_candles() {
        assert_eq!(min_candles(), 28);
    }

    #[test]
    fn test_short_window_is_neutral() {
        let features = extract_features(&create_uptrend_candles(10), &MarketContext::default());
        assert!(!features.sufficient);
        assert_eq!(features.rsi, 50.0);
        assert_eq!(features.macd_hist, 0.0);
        assert_eq!(features.atr, 0.0);
        assert_eq!(features.adx, 0.0);
        assert_eq!(features.trend_dir, 0);
    }

    #[test]
    fn test_empty_window_is_neutral() {
        let features = extract_features(&[], &MarketContext::default());
        assert!(!features.sufficient);
        assert_eq!(features.close, 0.0);
    }

    #[test]
    fn test_uptrend_features() {
        let features = extract_features(&create_uptrend_candles(120), &MarketContext::default());
        assert!(features.sufficient);
        assert_eq!(features.trend_dir, 1);
        assert!(features.trend_strength > 1.0);
        assert!(features.ema20 > features.ema50);
        assert!(features.rsi > 70.0);
        assert!(features.atr_pct > 0.0);
        assert!(features.plus_di > features.minus_di);
    }

    #[test]
    fn test_flat_zero_volume_series_is_finite() {
        let candles: Vec<Candle> = (0..60)
            .map(|i| Candle::new(i, 10.0, 10.0, 10.0, 10.0, 0.0))
            .collect();
        let features = extract_features(&candles, &MarketContext::default());
        assert!(features.sufficient);
        assert_eq!(features.trend_dir, 0);
        assert_eq!(features.trend_strength, 0.0);
        assert_eq!(features.atr_pct, 0.0);
        assert_eq!(features.vol_trend, 0.0);
        assert_eq!(features.rsi, 50.0);
    }

    #[test]
    fn test_dominance_is_passed_through() {
        let market = MarketContext::new(56.0, 55.5);
        let features = extract_features(&create_uptrend_candles(40), &market);
        assert_eq!(features.btc_dom, 56.0);
        assert!(features.btc_dom_up);
    }
}

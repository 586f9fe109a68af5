//! Per-timeframe signal core: indicator features fused with the similarity vote.

use super::features::extract_features;
use super::similarity::similarity;
use crate::config::SimilarityConfig;
use crate::types::{Candle, FeatureSet, MarketContext, SignalCore, SignalType, Timeframe};

/// Weight of the similarity vote in the fused long probability.
const SIMILARITY_WEIGHT: f64 = 0.75;

/// Share of a long deviation kept for altcoins while BTC dominance rises.
const DOMINANCE_DAMPING: f64 = 0.9;

/// True for BTC pairs, which are not affected by dominance damping.
pub fn is_btc(symbol: &str) -> bool {
    symbol.to_uppercase().starts_with("BTC")
}

/// Long probability implied by the indicator features alone, in [0.3, 0.7].
pub fn feature_long_prob(features: &FeatureSet) -> f64 {
    let trend = 0.1 * features.trend_dir as f64 * features.trend_strength.min(1.0);
    let momentum = if features.macd_hist > 0.0 {
        0.05
    } else if features.macd_hist < 0.0 {
        -0.05
    } else {
        0.0
    };
    (0.5 + trend + momentum).clamp(0.3, 0.7)
}

/// Build the core for one timeframe.
///
/// `candles` must be sorted; `horizon` is the forward window used to score
/// historical matches.
pub fn build_core(
    symbol: &str,
    timeframe: Timeframe,
    candles: &[Candle],
    market: &MarketContext,
    horizon: usize,
    config: &SimilarityConfig,
) -> SignalCore {
    let features = extract_features(candles, market);
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let sim = similarity(&closes, horizon, config);

    let mut long_p =
        SIMILARITY_WEIGHT * sim.long_prob + (1.0 - SIMILARITY_WEIGHT) * feature_long_prob(&features);
    if !is_btc(symbol) && market.is_rising() {
        long_p = 0.5 + (long_p - 0.5) * DOMINANCE_DAMPING;
    }
    let long_p = long_p.clamp(0.0, 1.0);
    let short_p = 1.0 - long_p;

    SignalCore {
        timeframe,
        signal_type: SignalType::from_probabilities(long_p, short_p),
        long_p,
        short_p,
        win_prob: long_p.max(short_p),
        edge: (long_p - short_p).abs(),
        sim_avg: sim.avg_sim,
        sim_count: sim.count,
        sim_var: sim.variance,
        features,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn periodic_candles(count: usize, drift: f64) -> Vec<Candle> {
        (0..count)
            .map(|i| {
                let phase = 2.0 * std::f64::consts::PI * i as f64 / 24.0;
                let close = 100.0 * (1.0 + drift).powi(i as i32) * (1.0 + 0.004 * phase.sin());
                Candle::new(i as i64 * 3_600_000, close, close * 1.001, close * 0.999, close, 1000.0)
            })
            .collect()
    }

    #[test]
    fn test_is_btc() {
        assert!(is_btc("BTCUSDT"));
        assert!(is_btc("btcusd"));
        assert!(!is_btc("ETHUSDT"));
    }

    #[test]
    fn test_feature_long_prob_bounds() {
        let mut features = FeatureSet::neutral(100.0);
        assert_eq!(feature_long_prob(&features), 0.5);

        features.trend_dir = 1;
        features.trend_strength = 5.0;
        features.macd_hist = 1.0;
        assert!((feature_long_prob(&features) - 0.65).abs() < 1e-12);

        features.trend_dir = -1;
        features.macd_hist = -1.0;
        assert!((feature_long_prob(&features) - 0.35).abs() < 1e-12);
    }

    #[test]
    fn test_core_probabilities_are_complementary() {
        let candles = periodic_candles(400, 0.001);
        let core = build_core(
            "BTCUSDT",
            Timeframe::H1,
            &candles,
            &MarketContext::default(),
            12,
            &SimilarityConfig::default(),
        );
        assert!((core.long_p + core.short_p - 1.0).abs() < 1e-12);
        assert_eq!(core.signal_type, SignalType::Long);
        assert_eq!(core.win_prob, core.long_p);
        assert!(core.features.sufficient);
    }

    #[test]
    fn test_dominance_damps_altcoin_longs() {
        let candles = periodic_candles(400, 0.001);
        let market = MarketContext::new(56.0, 55.0);
        let config = SimilarityConfig::default();

        let btc = build_core("BTCUSDT", Timeframe::H1, &candles, &market, 12, &config);
        let alt = build_core("ETHUSDT", Timeframe::H1, &candles, &market, 12, &config);
        assert!(alt.long_p < btc.long_p);
        assert!(alt.long_p > 0.5);
    }

    #[test]
    fn test_short_history_is_insufficient() {
        let candles = periodic_candles(10, 0.001);
        let core = build_core(
            "ETHUSDT",
            Timeframe::H1,
            &candles,
            &MarketContext::default(),
            12,
            &SimilarityConfig::default(),
        );
        assert!(!core.features.sufficient);
        assert_eq!(core.sim_count, 0);
    }
}

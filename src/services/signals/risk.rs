//! Risk sizing and the HOLD rule set.

use super::signal_core::is_btc;
use crate::config::RiskConfig;
use crate::types::{ConfidenceTier, ConsensusResult, FeatureSet, MarketContext, SignalType, Timeframe};

/// Tier from calibrated win probability and edge.
pub fn classify_tier(win_prob: f64, edge: f64, config: &RiskConfig) -> ConfidenceTier {
    if win_prob >= config.high_win_prob && edge >= config.high_edge {
        ConfidenceTier::High
    } else if win_prob >= config.mid_win_prob && edge >= config.mid_edge {
        ConfidenceTier::Mid
    } else {
        ConfidenceTier::Low
    }
}

/// Risk:reward ratio of a tier.
pub fn reward_ratio(tier: ConfidenceTier, config: &RiskConfig) -> f64 {
    match tier {
        ConfidenceTier::High => config.high_rr,
        ConfidenceTier::Mid => config.mid_rr,
        ConfidenceTier::Low => config.low_rr,
    }
}

/// Take-profit scale of a tier.
pub fn tp_scale(tier: ConfidenceTier, config: &RiskConfig) -> f64 {
    match tier {
        ConfidenceTier::High => config.high_tp_scale,
        ConfidenceTier::Mid => config.mid_tp_scale,
        ConfidenceTier::Low => config.low_tp_scale,
    }
}

/// Target and stop distances for one sizing pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sizing {
    pub tier: ConfidenceTier,
    pub reward_ratio: f64,
    /// Percent of entry.
    pub tp_pct: f64,
    pub sl_pct: f64,
    /// Target was cut to the maximum TP%.
    pub capped: bool,
}

impl Sizing {
    /// Take-profit and stop-loss prices for `direction`; `None` for HOLD.
    pub fn levels(&self, direction: SignalType, entry: f64) -> Option<(f64, f64)> {
        let tp_dist = entry * self.tp_pct / 100.0;
        let sl_dist = entry * self.sl_pct / 100.0;
        match direction {
            SignalType::Long => Some((entry + tp_dist, entry - sl_dist)),
            SignalType::Short => Some((entry - tp_dist, entry + sl_dist)),
            SignalType::Hold => None,
        }
    }
}

/// Size target and stop from ATR, timeframe and the confidence tier.
///
/// TP distance is `max(ATR, entry * min_atr_frac) * tf multiplier * tier
/// scale`, capped at `max_tp_pct`; SL distance is TP distance over the
/// tier's risk:reward, so the ratio holds after capping.
pub fn size(
    entry: f64,
    atr: f64,
    timeframe: Timeframe,
    win_prob: f64,
    edge: f64,
    config: &RiskConfig,
) -> Sizing {
    let tier = classify_tier(win_prob, edge, config);
    let rr = reward_ratio(tier, config);

    if entry <= 0.0 || !entry.is_finite() {
        return Sizing {
            tier,
            reward_ratio: rr,
            tp_pct: 0.0,
            sl_pct: 0.0,
            capped: false,
        };
    }

    let atr = if atr.is_finite() { atr } else { 0.0 };
    let base = atr.max(entry * config.min_atr_frac);
    let tp_dist = base * timeframe.tp_multiplier() * tp_scale(tier, config);
    let raw_pct = 100.0 * tp_dist / entry;
    let capped = raw_pct > config.max_tp_pct;
    let tp_pct = raw_pct.min(config.max_tp_pct);

    Sizing {
        tier,
        reward_ratio: rr,
        tp_pct,
        sl_pct: tp_pct / rr,
        capped,
    }
}

/// Everything the HOLD rules look at.
pub struct HoldInputs<'a> {
    pub symbol: &'a str,
    pub timeframe: Timeframe,
    pub consensus: &'a ConsensusResult,
    pub features: &'a FeatureSet,
    pub market: &'a MarketContext,
    /// Calibrated edge.
    pub edge: f64,
    pub tp_pct: f64,
    pub hard_hold: Option<&'a str>,
}

/// Every HOLD rule that fires, as human-readable reasons. Empty means the
/// signal may be emitted.
pub fn hold_reasons(input: &HoldInputs<'_>, config: &RiskConfig) -> Vec<String> {
    let mut reasons = Vec::new();
    let consensus = input.consensus;
    let features = input.features;
    let tf = input.timeframe;

    if consensus.votes.is_empty() {
        reasons.push("Insufficient candle data on every timeframe".to_string());
    } else if !consensus.signal_type.is_actionable() {
        reasons.push("No directional consensus".to_string());
    }

    if consensus.sim_count < config.min_sim_count {
        reasons.push(format!(
            "Only {} similar patterns found (need {})",
            consensus.sim_count, config.min_sim_count
        ));
    }
    if consensus.sim_avg < config.min_sim_avg {
        reasons.push(format!(
            "Average similarity {:.1} below {:.1}",
            consensus.sim_avg, config.min_sim_avg
        ));
    }
    if input.edge < config.min_edge {
        reasons.push(format!("Edge {:.3} below {:.3}", input.edge, config.min_edge));
    }
    if input.tp_pct < config.min_tp_pct {
        reasons.push(format!(
            "Target {:.2}% below {:.2}%",
            input.tp_pct, config.min_tp_pct
        ));
    }
    if consensus.agree < consensus.required_agree {
        reasons.push(format!(
            "Only {}/{} timeframes agree (need {})",
            consensus.agree,
            consensus.votes.len(),
            consensus.required_agree
        ));
    }
    if features.trend_strength < tf.min_trend_strength() {
        reasons.push(format!(
            "Trend strength {:.2} below {:.2} for {}",
            features.trend_strength,
            tf.min_trend_strength(),
            tf
        ));
    }
    if features.atr_pct > tf.max_atr_pct() {
        reasons.push(format!(
            "ATR {:.2}% above {:.2}% for {}",
            features.atr_pct,
            tf.max_atr_pct(),
            tf
        ));
    }

    if !is_btc(input.symbol) {
        let dominance = input.market.btc_dominance;
        let delta = input.market.delta();
        match consensus.signal_type {
            SignalType::Long if delta > 0.0 && dominance >= config.dom_high => {
                reasons.push(format!(
                    "BTC dominance rising at {:.1}% against an altcoin long",
                    dominance
                ));
            }
            SignalType::Short if delta < 0.0 && dominance > 0.0 && dominance <= config.dom_low => {
                reasons.push(format!(
                    "BTC dominance falling at {:.1}% against an altcoin short",
                    dominance
                ));
            }
            _ => {}
        }
    }

    if features.vol_trend < config.min_vol_trend {
        reasons.push(format!(
            "Volume trend {:.2} below {:.2}",
            features.vol_trend, config.min_vol_trend
        ));
    }

    if let Some(reason) = input.hard_hold {
        reasons.push(reason.to_string());
    }

    reasons
}

#[cfg(test)]
mod tests {
    use super::*;

    fn consensus(signal_type: SignalType) -> ConsensusResult {
        ConsensusResult {
            signal_type,
            long_p: 0.7,
            short_p: 0.3,
            win_prob: 0.7,
            edge: 0.4,
            agree: 2,
            required_agree: 2,
            votes: vec![signal_type, signal_type],
            timeframes: vec![Timeframe::H1, Timeframe::H4],
            sim_avg: 80.0,
            sim_count: 30,
            sim_var: 0.0,
            weights: vec![0.45, 0.55],
            degraded: false,
        }
    }

    fn features() -> FeatureSet {
        let mut features = FeatureSet::neutral(100.0);
        features.trend_strength = 1.0;
        features.atr_pct = 0.8;
        features.sufficient = true;
        features
    }

    fn inputs<'a>(
        symbol: &'a str,
        consensus: &'a ConsensusResult,
        features: &'a FeatureSet,
        market: &'a MarketContext,
    ) -> HoldInputs<'a> {
        HoldInputs {
            symbol,
            timeframe: Timeframe::H1,
            consensus,
            features,
            market,
            edge: 0.4,
            tp_pct: 1.0,
            hard_hold: None,
        }
    }

    // =========================================================================
    // Sizing
    // =========================================================================

    #[test]
    fn test_classify_tier() {
        let config = RiskConfig::default();
        assert_eq!(classify_tier(0.70, 0.35, &config), ConfidenceTier::High);
        assert_eq!(classify_tier(0.70, 0.20, &config), ConfidenceTier::Mid);
        assert_eq!(classify_tier(0.60, 0.15, &config), ConfidenceTier::Mid);
        assert_eq!(classify_tier(0.57, 0.40, &config), ConfidenceTier::Low);
    }

    #[test]
    fn test_size_uses_atr_multiplier_and_tier() {
        let config = RiskConfig::default();
        let sizing = size(100.0, 1.0, Timeframe::H1, 0.7, 0.35, &config);

        assert_eq!(sizing.tier, ConfidenceTier::High);
        assert!((sizing.tp_pct - 1.0 * 1.9 * 1.25).abs() < 1e-12);
        assert!((sizing.sl_pct - sizing.tp_pct / 2.0).abs() < 1e-12);
        assert!(!sizing.capped);

        let (tp, sl) = sizing.levels(SignalType::Long, 100.0).unwrap();
        assert!(tp > 100.0 && sl < 100.0);
        let (tp, sl) = sizing.levels(SignalType::Short, 100.0).unwrap();
        assert!(tp < 100.0 && sl > 100.0);
        assert!(sizing.levels(SignalType::Hold, 100.0).is_none());
    }

    #[test]
    fn test_size_floors_tiny_atr() {
        let config = RiskConfig::default();
        let sizing = size(100.0, 0.0, Timeframe::M5, 0.55, 0.05, &config);
        let expected = 100.0 * 0.0015 * 1.2 * 0.8;
        assert!((sizing.tp_pct - expected).abs() < 1e-12);
    }

    #[test]
    fn test_size_caps_tp_and_keeps_ratio() {
        let config = RiskConfig::default();
        let sizing = size(100.0, 10.0, Timeframe::D1, 0.7, 0.35, &config);
        assert!(sizing.capped);
        assert_eq!(sizing.tp_pct, config.max_tp_pct);
        assert!((sizing.tp_pct / sizing.sl_pct - config.high_rr).abs() < 1e-12);
    }

    #[test]
    fn test_size_invalid_entry() {
        let sizing = size(0.0, 1.0, Timeframe::H1, 0.7, 0.35, &RiskConfig::default());
        assert_eq!(sizing.tp_pct, 0.0);
    }

    // =========================================================================
    // HOLD rules
    // =========================================================================

    #[test]
    fn test_clean_signal_has_no_reasons() {
        let consensus = consensus(SignalType::Long);
        let features = features();
        let market = MarketContext::default();
        let reasons = hold_reasons(
            &inputs("ETHUSDT", &consensus, &features, &market),
            &RiskConfig::default(),
        );
        assert!(reasons.is_empty(), "{:?}", reasons);
    }

    #[test]
    fn test_every_triggered_rule_is_reported() {
        let mut consensus = consensus(SignalType::Long);
        consensus.sim_count = 5;
        consensus.sim_avg = 40.0;
        consensus.agree = 1;
        let mut features = features();
        features.trend_strength = 0.1;
        features.atr_pct = 5.0;
        features.vol_trend = -0.5;
        let market = MarketContext::new(56.0, 55.0);

        let mut input = inputs("ETHUSDT", &consensus, &features, &market);
        input.edge = 0.01;
        input.tp_pct = 0.1;
        input.hard_hold = Some("Failure pattern X");

        let reasons = hold_reasons(&input, &RiskConfig::default());
        assert_eq!(reasons.len(), 10, "{:?}", reasons);
        assert!(reasons[0].contains("similar patterns"));
        assert!(reasons.iter().any(|r| r.contains("dominance")));
        assert_eq!(reasons.last().map(String::as_str), Some("Failure pattern X"));
    }

    #[test]
    fn test_dominance_rules_spare_btc() {
        let consensus = consensus(SignalType::Long);
        let features = features();
        let market = MarketContext::new(56.0, 55.0);
        let reasons = hold_reasons(
            &inputs("BTCUSDT", &consensus, &features, &market),
            &RiskConfig::default(),
        );
        assert!(reasons.is_empty());
    }

    #[test]
    fn test_falling_dominance_blocks_altcoin_short() {
        let consensus = consensus(SignalType::Short);
        let features = features();
        let market = MarketContext::new(44.0, 44.5);
        let reasons = hold_reasons(
            &inputs("SOLUSDT", &consensus, &features, &market),
            &RiskConfig::default(),
        );
        assert_eq!(reasons.len(), 1);
        assert!(reasons[0].contains("falling"));
    }

    #[test]
    fn test_no_data_holds() {
        let consensus = ConsensusResult::empty();
        let features = FeatureSet::neutral(0.0);
        let market = MarketContext::default();
        let reasons = hold_reasons(
            &inputs("ETHUSDT", &consensus, &features, &market),
            &RiskConfig::default(),
        );
        assert!(reasons[0].contains("Insufficient"));
    }
}

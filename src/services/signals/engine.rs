//! Signal engine: candles in, explained decision out.

use super::calibration::{
    apply_stage, CalibrationContext, CalibrationEnv, CalibrationPipeline, EmpiricalOrdering,
};
use super::consensus::{anchor_core, combine};
use super::risk::{hold_reasons, size, HoldInputs};
use super::signal_core::build_core;
use crate::config::EngineConfig;
use crate::services::memory::AdaptiveMemory;
use crate::types::{
    prepare_candles, Candle, CloseReason, ClosedTrade, Explain, FeatureSet, MarketContext,
    SignalDecision, SignalMode, SignalType, Timeframe, TrackedPosition,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Input of one inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalRequest {
    pub symbol: String,
    pub timeframe: Timeframe,
    #[serde(default)]
    pub mode: SignalMode,
    /// Candles by timeframe; timeframes the mode needs but that are missing
    /// here simply do not vote.
    pub candles: BTreeMap<Timeframe, Vec<Candle>>,
    #[serde(default)]
    pub market: MarketContext,
}

/// Signal inference over shared adaptive memory.
///
/// `build_signal` only reads memory, so it is deterministic for identical
/// candles and memory contents. `record_outcome` is the single write path.
pub struct SignalEngine {
    config: EngineConfig,
    memory: AdaptiveMemory,
    pipeline: CalibrationPipeline,
}

impl SignalEngine {
    pub fn new(config: EngineConfig) -> Self {
        let memory = AdaptiveMemory::new(&config.memory);
        Self::with_memory(config, memory)
    }

    /// Use existing (possibly shared) memory stores.
    pub fn with_memory(config: EngineConfig, memory: AdaptiveMemory) -> Self {
        Self {
            config,
            memory,
            pipeline: CalibrationPipeline::standard(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn memory(&self) -> &AdaptiveMemory {
        &self.memory
    }

    /// Forward horizon in bars for `timeframe`.
    pub fn horizon(&self, timeframe: Timeframe) -> usize {
        self.config
            .similarity
            .horizon
            .unwrap_or_else(|| timeframe.horizon_bars())
    }

    /// Build a decision for `request.symbol` on `request.timeframe`.
    pub fn build_signal(&self, request: &SignalRequest) -> SignalDecision {
        let primary = request.timeframe;
        let symbol = request.symbol.to_uppercase();

        let prepared: BTreeMap<Timeframe, Vec<Candle>> = request
            .mode
            .timeframes(primary)
            .into_iter()
            .filter_map(|tf| request.candles.get(&tf).map(|c| (tf, prepare_candles(c))))
            .collect();

        let cores: Vec<_> = prepared
            .iter()
            .map(|(tf, candles)| {
                build_core(
                    &symbol,
                    *tf,
                    candles,
                    &request.market,
                    self.horizon(*tf),
                    &self.config.similarity,
                )
            })
            .collect();

        let consensus = combine(request.mode, primary, &cores);
        let primary_candles: &[Candle] = prepared.get(&primary).map(Vec::as_slice).unwrap_or(&[]);
        let features = anchor_core(primary, &cores)
            .map(|core| core.features.clone())
            .unwrap_or_else(|| {
                FeatureSet::neutral(primary_candles.last().map(|c| c.close).unwrap_or(0.0))
            });
        let entry = primary_candles
            .last()
            .map(|c| c.close)
            .unwrap_or(features.close);
        let generated_at = primary_candles.last().map(|c| c.time).unwrap_or(0);

        let env = CalibrationEnv {
            config: &self.config.calibration,
            risk: &self.config.risk,
            memory: &self.memory,
            candles: primary_candles,
            horizon: self.horizon(primary),
        };

        let mut ctx = CalibrationContext::new(
            &symbol,
            primary,
            request.mode,
            &consensus,
            &features,
            request.market,
        );
        let actionable = consensus.signal_type.is_actionable();

        let mut sizing = None;
        if actionable {
            ctx = self.pipeline.run(ctx, &env);

            // First pass sizes from the model estimate; the empirical
            // ordering stage then refines it and the trade is re-sized.
            let first = size(entry, features.atr, primary, ctx.win_prob, ctx.edge, &self.config.risk);
            ctx.tp_pct = first.tp_pct;
            ctx.sl_pct = first.sl_pct;
            ctx = apply_stage(&EmpiricalOrdering, ctx, &env);

            let second = size(entry, features.atr, primary, ctx.win_prob, ctx.edge, &self.config.risk);
            ctx.tp_pct = second.tp_pct;
            ctx.sl_pct = second.sl_pct;
            sizing = Some(second);
        }

        let reasons = hold_reasons(
            &HoldInputs {
                symbol: &symbol,
                timeframe: primary,
                consensus: &consensus,
                features: &features,
                market: &request.market,
                edge: ctx.edge,
                tp_pct: ctx.tp_pct,
                hard_hold: ctx.hard_hold.as_deref(),
            },
            &self.config.risk,
        );

        let levels = sizing
            .filter(|_| reasons.is_empty())
            .and_then(|s| s.levels(consensus.signal_type, entry));
        let signal_type = if levels.is_some() {
            consensus.signal_type
        } else {
            SignalType::Hold
        };

        let explain = Explain {
            mode: request.mode,
            votes: consensus.votes.clone(),
            agree: consensus.agree,
            required_agree: consensus.required_agree,
            raw_win_prob: consensus.win_prob,
            raw_edge: consensus.edge,
            long_p: consensus.long_p,
            short_p: consensus.short_p,
            win_prob: ctx.win_prob,
            edge: ctx.edge,
            regime: features.sufficient.then_some(ctx.regime),
            sim_avg: consensus.sim_avg,
            sim_count: consensus.sim_count,
            sim_var: consensus.sim_var,
            atr_pct: features.atr_pct,
            trend_strength: features.trend_strength,
            btc_dom: request.market.btc_dominance,
            btc_dom_up: request.market.is_rising(),
            pattern_penalty: ctx.pattern_penalty,
            pattern_hard_hold: ctx.hard_hold.is_some(),
            meta_win_rate: ctx.meta_win_rate,
            meta_alpha: ctx.meta_alpha,
            empirical_prob: ctx.empirical_prob,
            tier: sizing.map(|s| s.tier),
            trail: std::mem::take(&mut ctx.trail),
            hold_reasons: reasons,
        };

        let decision = match levels {
            Some((tp, sl)) => SignalDecision {
                symbol,
                tf: primary,
                signal_type,
                entry,
                tp: Some(tp),
                sl: Some(sl),
                tp_pct: ctx.tp_pct,
                sl_pct: ctx.sl_pct,
                explain,
                signature: ctx.signature.take(),
                meta_key: ctx.meta_key.take(),
                generated_at,
            },
            None => SignalDecision {
                symbol,
                tf: primary,
                signal_type,
                entry,
                tp: None,
                sl: None,
                tp_pct: 0.0,
                sl_pct: 0.0,
                explain,
                signature: None,
                meta_key: None,
                generated_at,
            },
        };

        if decision.is_hold() {
            debug!(
                "{} {} HOLD: {}",
                decision.symbol,
                decision.tf,
                decision.explain.hold_reasons.join("; ")
            );
        } else {
            info!(
                "{} {} {} entry={:.6} win_prob={:.3} edge={:.3}",
                decision.symbol,
                decision.tf,
                decision.signal_type.as_str(),
                decision.entry,
                decision.explain.win_prob,
                decision.explain.edge
            );
        }

        decision
    }

    /// Settle a closed position.
    ///
    /// Every close is kept in the trade history; only TP/SL closes teach the
    /// Pattern-Failure DB and the Meta-Brain.
    pub fn record_outcome(
        &self,
        position: &TrackedPosition,
        win: bool,
        reason: CloseReason,
        closed_at: i64,
    ) {
        self.memory.history.record(ClosedTrade {
            symbol: position.symbol.clone(),
            timeframe: position.timeframe,
            direction: position.direction,
            win,
            reason,
            closed_at,
        });

        if !reason.is_resolved() {
            debug!(
                "{} {} closed on time, not learned",
                position.symbol, position.timeframe
            );
            return;
        }

        let pattern = self.memory.patterns.record_outcome(&position.signature, win);
        let meta = self.memory.meta.record_meta(&position.meta_key, win);
        info!(
            "Settled {} {} {} ({}): pattern {}/{}, meta {}/{}",
            position.symbol,
            position.timeframe,
            position.direction.as_str(),
            if win { "win" } else { "loss" },
            pattern.win,
            pattern.n,
            meta.w,
            meta.n
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn periodic_candles(count: usize, drift: f64) -> Vec<Candle> {
        let mut previous: Option<f64> = None;
        (0..count)
            .map(|i| {
                let phase = 2.0 * std::f64::consts::PI * i as f64 / 24.0;
                let close = 100.0 * (1.0 + drift).powi(i as i32) * (1.0 + 0.004 * phase.sin());
                let open = previous.unwrap_or(close);
                previous = Some(close);
                Candle::new(
                    i as i64 * 3_600_000,
                    open,
                    open.max(close) * 1.001,
                    open.min(close) * 0.999,
                    close,
                    1000.0,
                )
            })
            .collect()
    }

    fn request(candles: Vec<Candle>) -> SignalRequest {
        SignalRequest {
            symbol: "BTCUSDT".to_string(),
            timeframe: Timeframe::H1,
            mode: SignalMode::TwoTf,
            candles: BTreeMap::from([(Timeframe::H1, candles)]),
            market: MarketContext::default(),
        }
    }

    #[test]
    fn test_empty_request_holds() {
        let engine = SignalEngine::new(EngineConfig::default());
        let decision = engine.build_signal(&request(Vec::new()));

        assert!(decision.is_hold());
        assert!(decision.tp.is_none() && decision.sl.is_none());
        assert!(decision.signature.is_none());
        assert!(decision.explain.hold_reasons[0].contains("Insufficient"));
        assert_eq!(decision.generated_at, 0);
    }

    #[test]
    fn test_uptrend_goes_long() {
        let engine = SignalEngine::new(EngineConfig::default());
        let decision = engine.build_signal(&request(periodic_candles(900, 0.001)));

        assert_eq!(decision.signal_type, SignalType::Long, "{:?}", decision.explain.hold_reasons);
        assert!(decision.tp.unwrap() > decision.entry);
        assert!(decision.sl.unwrap() < decision.entry);
        assert_eq!(decision.explain.trail.len(), 7);
        assert!(decision.signature.is_some());
    }

    #[test]
    fn test_time_close_is_not_learned() {
        let engine = SignalEngine::new(EngineConfig::default());
        let decision = engine.build_signal(&request(periodic_candles(900, 0.001)));
        let position = TrackedPosition::from_decision(&decision, decision.generated_at).unwrap();

        engine.record_outcome(&position, false, CloseReason::Time, 1);
        assert!(engine.memory().patterns.is_empty());
        assert!(engine.memory().meta.is_empty());
        assert_eq!(engine.memory().history.len(), 1);

        engine.record_outcome(&position, true, CloseReason::Tp, 2);
        assert_eq!(engine.memory().patterns.len(), 1);
        assert_eq!(engine.memory().meta.len(), 1);
        assert_eq!(engine.memory().history.len(), 2);
    }

    #[test]
    fn test_horizon_override() {
        let mut config = EngineConfig::default();
        assert_eq!(SignalEngine::new(config.clone()).horizon(Timeframe::H4), 8);
        config.similarity.horizon = Some(3);
        assert_eq!(SignalEngine::new(config).horizon(Timeframe::H4), 3);
    }
}

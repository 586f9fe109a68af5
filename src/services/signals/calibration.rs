//! Ordered calibration of the consensus win probability and edge.
//!
//! Each stage maps a [`CalibrationContext`] to a new one. The pipeline
//! re-clamps `win_prob` to [0.5, 0.99] and `edge` to >= 0 after every stage
//! and records the result in the trail.

use super::ordering;
use super::risk::classify_tier;
use crate::config::{CalibrationConfig, RiskConfig};
use crate::services::memory::AdaptiveMemory;
use crate::types::{
    CalibrationStep, Candle, ConsensusResult, FeatureSet, MarketContext, MetaKey,
    PatternSignature, Regime, SignalMode, SignalType, Timeframe,
};
use tracing::debug;

pub const MIN_WIN_PROB: f64 = 0.5;
pub const MAX_WIN_PROB: f64 = 0.99;

/// Working state threaded through the stages.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationContext {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub mode: SignalMode,
    pub direction: SignalType,
    pub win_prob: f64,
    pub edge: f64,
    pub consensus: ConsensusResult,
    /// Features of the anchor timeframe.
    pub features: FeatureSet,
    pub market: MarketContext,
    pub regime: Regime,
    /// Sized distances, percent of entry; zero until the first sizing pass.
    pub tp_pct: f64,
    pub sl_pct: f64,
    pub signature: Option<PatternSignature>,
    pub meta_key: Option<MetaKey>,
    pub pattern_penalty: f64,
    pub hard_hold: Option<String>,
    pub meta_win_rate: Option<f64>,
    pub meta_alpha: f64,
    pub empirical_prob: Option<f64>,
    pub trail: Vec<CalibrationStep>,
    /// Note left by the stage that just ran.
    pub note: Option<String>,
}

impl CalibrationContext {
    pub fn new(
        symbol: &str,
        timeframe: Timeframe,
        mode: SignalMode,
        consensus: &ConsensusResult,
        features: &FeatureSet,
        market: MarketContext,
    ) -> Self {
        Self {
            symbol: symbol.to_uppercase(),
            timeframe,
            mode,
            direction: consensus.signal_type,
            win_prob: consensus.win_prob,
            edge: consensus.edge,
            consensus: consensus.clone(),
            features: features.clone(),
            market,
            regime: Regime::classify(features.trend_strength, features.atr_pct),
            tp_pct: 0.0,
            sl_pct: 0.0,
            signature: None,
            meta_key: None,
            pattern_penalty: 0.0,
            hard_hold: None,
            meta_win_rate: None,
            meta_alpha: 0.0,
            empirical_prob: None,
            trail: Vec::new(),
            note: None,
        }
    }

    fn clamp(&mut self) {
        self.win_prob = if self.win_prob.is_finite() {
            self.win_prob.clamp(MIN_WIN_PROB, MAX_WIN_PROB)
        } else {
            MIN_WIN_PROB
        };
        self.edge = if self.edge.is_finite() {
            self.edge.max(0.0)
        } else {
            0.0
        };
    }

    fn adjust(&mut self, win_prob: f64, edge: f64) {
        self.win_prob += win_prob;
        self.edge += edge;
    }
}

/// Read-only inputs shared by the stages.
pub struct CalibrationEnv<'a> {
    pub config: &'a CalibrationConfig,
    pub risk: &'a RiskConfig,
    pub memory: &'a AdaptiveMemory,
    /// Primary timeframe candles, sorted.
    pub candles: &'a [Candle],
    pub horizon: usize,
}

/// A single calibration transform.
pub trait CalibrationStage: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, ctx: CalibrationContext, env: &CalibrationEnv<'_>) -> CalibrationContext;
}

/// Blend in the realized win rate of recent closed trades.
pub struct RecencyBlend;

impl CalibrationStage for RecencyBlend {
    fn name(&self) -> &'static str {
        "recency"
    }

    fn apply(&self, mut ctx: CalibrationContext, env: &CalibrationEnv<'_>) -> CalibrationContext {
        let config = env.config;
        let trades = env
            .memory
            .history
            .recent(&ctx.symbol, ctx.timeframe, config.recency_window);
        if trades.len() < config.recency_min_trades {
            return ctx;
        }

        let weighted = |outcomes: &mut dyn Iterator<Item = bool>| {
            let (mut wins, mut total, mut weight) = (0.0, 0.0, 1.0);
            for win in outcomes {
                if win {
                    wins += weight;
                }
                total += weight;
                weight *= config.recency_decay;
            }
            if total > 0.0 {
                wins / total
            } else {
                0.5
            }
        };

        let overall = weighted(&mut trades.iter().map(|t| t.win));
        let directional: Vec<bool> = trades
            .iter()
            .filter(|t| t.direction == ctx.direction)
            .map(|t| t.win)
            .collect();

        let realized = if directional.len() >= config.recency_min_directional {
            (overall + weighted(&mut directional.into_iter())) / 2.0
        } else {
            overall
        };

        let alpha = config.recency_alpha;
        ctx.win_prob = (1.0 - alpha) * ctx.win_prob + alpha * realized;
        ctx.note = Some(format!("realized {:.3} over {} trades", realized, trades.len()));
        ctx
    }
}

/// 6TF only: reward broad agreement, penalize thin agreement.
pub struct AgreementBonus;

impl CalibrationStage for AgreementBonus {
    fn name(&self) -> &'static str {
        "agreement"
    }

    fn apply(&self, mut ctx: CalibrationContext, _env: &CalibrationEnv<'_>) -> CalibrationContext {
        if ctx.mode != SignalMode::SixTf {
            return ctx;
        }

        let agree = ctx.consensus.agree as i64;
        let steps = (agree - 2).clamp(0, 4) as f64;
        ctx.adjust(0.01 * steps, 0.015 * steps);
        if agree <= 2 {
            ctx.adjust(-0.02, -0.03);
        }
        ctx.note = Some(format!("agree {}", agree));
        ctx
    }
}

/// Regime-specific adjustment.
pub struct RegimeAdjustment;

impl CalibrationStage for RegimeAdjustment {
    fn name(&self) -> &'static str {
        "regime"
    }

    fn apply(&self, mut ctx: CalibrationContext, _env: &CalibrationEnv<'_>) -> CalibrationContext {
        let ratio = ctx.consensus.agree_ratio();
        match ctx.regime {
            Regime::Trend if ratio >= 0.66 => ctx.adjust(0.02, 0.03),
            Regime::Volatile => {
                let scale = 1.0 - 0.5 * ratio;
                ctx.adjust(-0.04 * scale, -0.05 * scale);
            }
            Regime::Calm => ctx.edge *= 0.85,
            Regime::Range if ratio < 0.5 => ctx.adjust(-0.02, -0.03),
            _ => {}
        }
        ctx.note = Some(ctx.regime.as_str().to_string());
        ctx
    }
}

/// Haircuts for thin, conflicting or dissimilar evidence.
pub struct SimilarityQuality;

impl CalibrationStage for SimilarityQuality {
    fn name(&self) -> &'static str {
        "similarity"
    }

    fn apply(&self, mut ctx: CalibrationContext, env: &CalibrationEnv<'_>) -> CalibrationContext {
        let config = env.config;
        let (count, variance, avg) = (
            ctx.consensus.sim_count,
            ctx.consensus.sim_var,
            ctx.consensus.sim_avg,
        );

        if count <= 1 {
            ctx.adjust(-0.06, -0.08);
        } else if count <= 2 {
            ctx.adjust(-0.03, -0.05);
        }

        if variance > config.sim_var_threshold {
            let haircut = ((variance - config.sim_var_threshold) * 4.0).min(0.08);
            ctx.adjust(-haircut, -1.5 * haircut);
        }

        if avg < config.low_sim_avg && ctx.win_prob > config.low_sim_high_prob {
            ctx.adjust(-0.03, -0.02);
        }

        ctx.note = Some(format!("count {} var {:.4} avg {:.1}", count, variance, avg));
        ctx
    }
}

/// Penalize signatures that historically failed; flag hard holds.
pub struct PatternPenalty;

impl CalibrationStage for PatternPenalty {
    fn name(&self) -> &'static str {
        "pattern"
    }

    fn apply(&self, mut ctx: CalibrationContext, env: &CalibrationEnv<'_>) -> CalibrationContext {
        let config = env.config;
        let signature = PatternSignature::new(
            &ctx.symbol,
            ctx.timeframe,
            ctx.direction,
            ctx.features.atr_pct,
            ctx.features.trend_strength,
            ctx.edge,
            ctx.consensus.sim_avg,
            ctx.consensus.agree,
            classify_tier(ctx.win_prob, ctx.edge, env.risk),
            ctx.market.btc_dominance,
            ctx.market.prev_btc_dominance,
        );

        if let Some(entry) = env.memory.patterns.avoid_entry(&signature) {
            let bad = env.memory.patterns.bad_winrate();
            let deficit = if bad > 0.0 {
                ((bad - entry.wr) / bad).max(0.0)
            } else {
                0.0
            };
            let size = (entry.n as f64 / 40.0).min(1.0);
            let penalty = (deficit * 0.25 * (0.5 + 0.5 * size)).min(config.pattern_max_penalty);

            ctx.adjust(-penalty, -1.5 * penalty);
            ctx.pattern_penalty = penalty;

            if entry.wr <= config.hard_hold_winrate && entry.n >= config.hard_hold_samples {
                ctx.hard_hold = Some(format!(
                    "Failure pattern {} won {:.0}% of {} trades",
                    signature.key(),
                    entry.wr * 100.0,
                    entry.n
                ));
            }
            ctx.note = Some(format!("avoid n={} wr={:.2} penalty {:.3}", entry.n, entry.wr, penalty));
        }

        ctx.signature = Some(signature);
        ctx
    }
}

/// Blend in the Bayesian-smoothed Meta-Brain win rate.
pub struct MetaBlend;

impl CalibrationStage for MetaBlend {
    fn name(&self) -> &'static str {
        "meta"
    }

    fn apply(&self, mut ctx: CalibrationContext, env: &CalibrationEnv<'_>) -> CalibrationContext {
        let config = env.config;
        let features = &ctx.features;
        let key = MetaKey::new(
            &ctx.symbol,
            ctx.timeframe,
            ctx.direction,
            ctx.regime,
            features.atr_pct,
            features.trend_strength,
            features.adx,
            features.bb_width,
            features.vol_spike,
            ctx.market.is_rising(),
        );

        if let Some(stat) = env.memory.meta.stat(&key) {
            if stat.n >= config.meta_min_samples {
                let smoothed = stat.smoothed_win_rate(config.meta_prior_wr, config.meta_prior_n);
                let alpha = (stat.n as f64 / config.meta_alpha_scale).min(config.meta_alpha_cap);
                let blended = (1.0 - alpha) * ctx.win_prob + alpha * smoothed;

                ctx.edge += blended - ctx.win_prob;
                ctx.win_prob = blended;
                ctx.meta_win_rate = Some(smoothed);
                ctx.meta_alpha = alpha;
                ctx.note = Some(format!("n={} wr={:.3} alpha {:.3}", stat.n, smoothed, alpha));
            }
        }

        ctx.meta_key = Some(key);
        ctx
    }
}

/// Blend in how often the sized TP was historically reached before the SL.
/// Skipped until the first sizing pass has set the distances.
pub struct EmpiricalOrdering;

impl CalibrationStage for EmpiricalOrdering {
    fn name(&self) -> &'static str {
        "empirical"
    }

    fn apply(&self, mut ctx: CalibrationContext, env: &CalibrationEnv<'_>) -> CalibrationContext {
        let config = env.config;
        let estimate = ordering::estimate(
            env.candles,
            ctx.direction,
            ctx.tp_pct,
            ctx.sl_pct,
            env.horizon,
            config.empirical_lookback,
        );
        if estimate.resolved() < config.empirical_min_samples {
            ctx.note = Some(format!("{} resolved, skipped", estimate.resolved()));
            return ctx;
        }

        let p = estimate.probability();
        let alpha = config.empirical_alpha;
        ctx.win_prob = (1.0 - alpha) * ctx.win_prob + alpha * p;
        ctx.edge = (1.0 - alpha) * ctx.edge + alpha * (2.0 * p - 1.0).max(0.0);
        ctx.empirical_prob = Some(p);
        ctx.note = Some(format!("p={:.3} over {} resolved", p, estimate.resolved()));
        ctx
    }
}

/// Ordered list of stages.
pub struct CalibrationPipeline {
    stages: Vec<Box<dyn CalibrationStage>>,
}

impl CalibrationPipeline {
    pub fn new(stages: Vec<Box<dyn CalibrationStage>>) -> Self {
        Self { stages }
    }

    /// Stages that run before sizing: recency, agreement, regime,
    /// similarity quality, pattern DB, meta-brain.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(RecencyBlend),
            Box::new(AgreementBonus),
            Box::new(RegimeAdjustment),
            Box::new(SimilarityQuality),
            Box::new(PatternPenalty),
            Box::new(MetaBlend),
        ])
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    pub fn run(&self, ctx: CalibrationContext, env: &CalibrationEnv<'_>) -> CalibrationContext {
        self.stages
            .iter()
            .fold(ctx, |ctx, stage| apply_stage(stage.as_ref(), ctx, env))
    }
}

impl Default for CalibrationPipeline {
    fn default() -> Self {
        Self::standard()
    }
}

/// Run one stage, clamp, and record it in the trail.
pub fn apply_stage(
    stage: &dyn CalibrationStage,
    ctx: CalibrationContext,
    env: &CalibrationEnv<'_>,
) -> CalibrationContext {
    let mut ctx = stage.apply(ctx, env);
    ctx.clamp();

    let note = ctx.note.take();
    debug!(
        "{} {} [{}]: win_prob={:.4} edge={:.4} {}",
        ctx.symbol,
        ctx.timeframe,
        stage.name(),
        ctx.win_prob,
        ctx.edge,
        note.as_deref().unwrap_or("")
    );
    ctx.trail.push(CalibrationStep {
        stage: stage.name().to_string(),
        win_prob: ctx.win_prob,
        edge: ctx.edge,
        note,
    });
    ctx
}

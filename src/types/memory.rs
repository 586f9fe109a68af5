use super::candle::Timeframe;
use super::signals::{ConfidenceTier, MarketContext, Regime, SignalDecision, SignalType};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Floor-division bin of `value` by `step`; non-finite values land in bin 0.
pub fn bin(value: f64, step: f64) -> i64 {
    if !value.is_finite() || step <= 0.0 {
        return 0;
    }
    (value / step).floor() as i64
}

/// Discretised context of a signal, keyed into the Pattern-Failure DB.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternSignature {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub direction: SignalType,
    pub atr_bin: i64,
    pub strength_bin: i64,
    pub edge_bin: i64,
    pub sim_bin: i64,
    pub agree: usize,
    pub tier: ConfidenceTier,
    pub dom_bin: i64,
    /// -1 falling, 0 flat, +1 rising.
    pub dom_momentum: i8,
}

impl PatternSignature {
    pub const ATR_STEP: f64 = 0.25;
    pub const STRENGTH_STEP: f64 = 0.25;
    pub const EDGE_STEP: f64 = 0.05;
    pub const SIM_STEP: f64 = 5.0;
    pub const DOM_STEP: f64 = 2.0;
    /// Dominance change (percentage points) counted as movement.
    pub const DOM_MOMENTUM_EPS: f64 = 0.1;

    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: &str,
        timeframe: Timeframe,
        direction: SignalType,
        atr_pct: f64,
        trend_strength: f64,
        edge: f64,
        sim_avg: f64,
        agree: usize,
        tier: ConfidenceTier,
        btc_dom: f64,
        btc_dom_prev: f64,
    ) -> Self {
        let delta = MarketContext::new(btc_dom, btc_dom_prev).delta();
        let dom_momentum = if delta > Self::DOM_MOMENTUM_EPS {
            1
        } else if delta < -Self::DOM_MOMENTUM_EPS {
            -1
        } else {
            0
        };

        Self {
            symbol: symbol.to_uppercase(),
            timeframe,
            direction,
            atr_bin: bin(atr_pct, Self::ATR_STEP),
            strength_bin: bin(trend_strength, Self::STRENGTH_STEP),
            edge_bin: bin(edge, Self::EDGE_STEP),
            sim_bin: bin(sim_avg, Self::SIM_STEP),
            agree,
            tier,
            dom_bin: bin(btc_dom, Self::DOM_STEP),
            dom_momentum,
        }
    }

    /// Canonical bin string.
    pub fn key(&self) -> String {
        format!(
            "{}|{}|{}|a{}|s{}|e{}|m{}|g{}|{}|d{}|{:+}",
            self.symbol,
            self.timeframe,
            self.direction.as_str(),
            self.atr_bin,
            self.strength_bin,
            self.edge_bin,
            self.sim_bin,
            self.agree,
            self.tier.as_str(),
            self.dom_bin,
            self.dom_momentum
        )
    }

    /// SHA-256 hex digest of [`Self::key`].
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.key().as_bytes()))
    }
}

impl fmt::Display for PatternSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Win/loss counter for one signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PatternStat {
    pub n: u32,
    pub win: u32,
}

impl PatternStat {
    pub fn record(&mut self, win: bool) {
        self.n += 1;
        if win {
            self.win += 1;
        }
    }

    pub fn win_rate(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.win as f64 / self.n as f64
        }
    }
}

/// Derived entry of the avoid set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AvoidEntry {
    pub n: u32,
    pub wr: f64,
}

/// Coarser context key for the Meta-Brain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaKey {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub direction: SignalType,
    pub regime: Regime,
    pub atr_bin: i64,
    pub strength_bin: i64,
    pub adx_bin: i64,
    pub bb_bin: i64,
    pub vol_spike_bin: i64,
    pub dom_up: bool,
}

impl MetaKey {
    pub const ATR_STEP: f64 = 0.5;
    pub const STRENGTH_STEP: f64 = 0.5;
    pub const ADX_STEP: f64 = 10.0;
    pub const BB_STEP: f64 = 1.0;
    pub const VOL_SPIKE_STEP: f64 = 0.25;

    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: &str,
        timeframe: Timeframe,
        direction: SignalType,
        regime: Regime,
        atr_pct: f64,
        trend_strength: f64,
        adx: f64,
        bb_width: f64,
        vol_spike: f64,
        dom_up: bool,
    ) -> Self {
        Self {
            symbol: symbol.to_uppercase(),
            timeframe,
            direction,
            regime,
            atr_bin: bin(atr_pct, Self::ATR_STEP),
            strength_bin: bin(trend_strength, Self::STRENGTH_STEP),
            adx_bin: bin(adx, Self::ADX_STEP),
            bb_bin: bin(bb_width, Self::BB_STEP),
            vol_spike_bin: bin(vol_spike, Self::VOL_SPIKE_STEP),
            dom_up,
        }
    }

    pub fn key(&self) -> String {
        format!(
            "{}|{}|{}|{}|a{}|s{}|x{}|b{}|v{}|{}",
            self.symbol,
            self.timeframe,
            self.direction.as_str(),
            self.regime.as_str(),
            self.atr_bin,
            self.strength_bin,
            self.adx_bin,
            self.bb_bin,
            self.vol_spike_bin,
            if self.dom_up { "du" } else { "dd" }
        )
    }
}

impl fmt::Display for MetaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Win counter for one Meta-Brain key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MetaStat {
    pub n: u32,
    pub w: u32,
}

impl MetaStat {
    pub fn record(&mut self, win: bool) {
        self.n += 1;
        if win {
            self.w += 1;
        }
    }

    /// Win rate smoothed toward `prior_wr` with `prior_n` pseudo-observations.
    pub fn smoothed_win_rate(&self, prior_wr: f64, prior_n: f64) -> f64 {
        let denom = self.n as f64 + prior_n;
        if denom <= 0.0 {
            return prior_wr;
        }
        (self.w as f64 + prior_wr * prior_n) / denom
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CloseReason {
    Tp,
    Sl,
    Time,
}

impl CloseReason {
    /// TP/SL closes carry a clean outcome; time closes do not.
    pub fn is_resolved(&self) -> bool {
        matches!(self, CloseReason::Tp | CloseReason::Sl)
    }
}

impl FromStr for CloseReason {
    type Err = crate::error::EngineError;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s.to_uppercase().as_str() {
            "TP" => Ok(CloseReason::Tp),
            "SL" => Ok(CloseReason::Sl),
            "TIME" => Ok(CloseReason::Time),
            _ => Err(crate::error::EngineError::InvalidCloseReason(s.to_string())),
        }
    }
}

/// A closed trade as remembered for recency blending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosedTrade {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub direction: SignalType,
    pub win: bool,
    pub reason: CloseReason,
    pub closed_at: i64,
}

/// An open position derived from an actionable decision, handed back by the
/// settlement collaborator when it closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedPosition {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub direction: SignalType,
    pub entry: f64,
    pub tp: f64,
    pub sl: f64,
    pub signature: PatternSignature,
    pub meta_key: MetaKey,
    pub opened_at: i64,
}

impl TrackedPosition {
    /// `None` for HOLD decisions.
    pub fn from_decision(decision: &SignalDecision, opened_at: i64) -> Option<Self> {
        if !decision.signal_type.is_actionable() {
            return None;
        }
        Some(Self {
            symbol: decision.symbol.clone(),
            timeframe: decision.tf,
            direction: decision.signal_type,
            entry: decision.entry,
            tp: decision.tp?,
            sl: decision.sl?,
            signature: decision.signature.clone()?,
            meta_key: decision.meta_key.clone()?,
            opened_at,
        })
    }
}

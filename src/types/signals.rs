use super::candle::{SignalMode, Timeframe};
use super::memory::{MetaKey, PatternSignature};
use serde::{Deserialize, Serialize};

/// Direction of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalType {
    Long,
    Short,
    #[default]
    Hold,
}

impl SignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Long => "LONG",
            SignalType::Short => "SHORT",
            SignalType::Hold => "HOLD",
        }
    }

    /// Pick a direction from long/short probabilities; exact ties hold.
    pub fn from_probabilities(long_p: f64, short_p: f64) -> Self {
        if long_p > short_p {
            SignalType::Long
        } else if short_p > long_p {
            SignalType::Short
        } else {
            SignalType::Hold
        }
    }

    pub fn is_actionable(&self) -> bool {
        !matches!(self, SignalType::Hold)
    }
}

/// BTC dominance now and one observation earlier, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MarketContext {
    pub btc_dominance: f64,
    pub prev_btc_dominance: f64,
}

impl MarketContext {
    pub fn new(btc_dominance: f64, prev_btc_dominance: f64) -> Self {
        Self {
            btc_dominance,
            prev_btc_dominance,
        }
    }

    /// Dominance change in percentage points; zero when either side is unknown.
    pub fn delta(&self) -> f64 {
        let delta = self.btc_dominance - self.prev_btc_dominance;
        if delta.is_finite() && self.btc_dominance > 0.0 && self.prev_btc_dominance > 0.0 {
            delta
        } else {
            0.0
        }
    }

    pub fn is_rising(&self) -> bool {
        self.delta() > 0.0
    }
}

/// Scalar feature snapshot for one candle window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSet {
    pub rsi: f64,
    pub macd_hist: f64,
    pub atr: f64,
    /// ATR as a percentage of the last close.
    pub atr_pct: f64,
    /// Current ATR over the ATR one period earlier.
    pub atr_change: f64,
    pub adx: f64,
    pub plus_di: f64,
    pub minus_di: f64,
    /// Bollinger bandwidth, percent of the middle band.
    pub bb_width: f64,
    pub obv: f64,
    /// Volume rate of change, percent.
    pub vol_roc: f64,
    /// Latest-bar volume spike score in [0, 1].
    pub vol_spike: f64,
    /// Short volume average over long volume average, minus one.
    pub vol_trend: f64,
    pub ema20: f64,
    pub ema50: f64,
    /// +1 up, -1 down, 0 flat.
    pub trend_dir: i8,
    /// EMA20/EMA50 separation in ATR units.
    pub trend_strength: f64,
    pub close: f64,
    pub btc_dom: f64,
    pub btc_dom_up: bool,
    /// False when the window was too short and neutral defaults were used.
    pub sufficient: bool,
}

impl FeatureSet {
    /// Neutral defaults for windows too short to measure.
    pub fn neutral(close: f64) -> Self {
        Self {
            rsi: 50.0,
            macd_hist: 0.0,
            atr: 0.0,
            atr_pct: 0.0,
            atr_change: 1.0,
            adx: 0.0,
            plus_di: 0.0,
            minus_di: 0.0,
            bb_width: 0.0,
            obv: 0.0,
            vol_roc: 0.0,
            vol_spike: 0.0,
            vol_trend: 0.0,
            ema20: close,
            ema50: close,
            trend_dir: 0,
            trend_strength: 0.0,
            close,
            btc_dom: 0.0,
            btc_dom_up: false,
            sufficient: false,
        }
    }
}

impl Default for FeatureSet {
    fn default() -> Self {
        Self::neutral(0.0)
    }
}

/// Outcome of the historical pattern search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarityResult {
    pub long_prob: f64,
    pub short_prob: f64,
    /// Recency-weighted similarity in [0, 100].
    pub avg_sim: f64,
    pub count: usize,
    /// Variance of `long_prob` across the window ensemble.
    pub variance: f64,
}

impl SimilarityResult {
    /// Maximally uncertain result used when nothing is comparable.
    pub fn neutral() -> Self {
        Self {
            long_prob: 0.5,
            short_prob: 0.5,
            avg_sim: 0.0,
            count: 0,
            variance: 0.0,
        }
    }
}

impl Default for SimilarityResult {
    fn default() -> Self {
        Self::neutral()
    }
}

/// Fused estimate for a single timeframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalCore {
    pub timeframe: Timeframe,
    #[serde(rename = "type")]
    pub signal_type: SignalType,
    pub long_p: f64,
    pub short_p: f64,
    pub win_prob: f64,
    pub edge: f64,
    pub sim_avg: f64,
    pub sim_count: usize,
    pub sim_var: f64,
    #[serde(flatten)]
    pub features: FeatureSet,
}

/// Weighted multi-timeframe vote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusResult {
    #[serde(rename = "type")]
    pub signal_type: SignalType,
    pub long_p: f64,
    pub short_p: f64,
    pub win_prob: f64,
    pub edge: f64,
    /// Votes matching `signal_type`.
    pub agree: usize,
    pub required_agree: usize,
    pub votes: Vec<SignalType>,
    pub timeframes: Vec<Timeframe>,
    pub sim_avg: f64,
    pub sim_count: usize,
    pub sim_var: f64,
    pub weights: Vec<f64>,
    /// Only one timeframe had enough data.
    pub degraded: bool,
}

impl ConsensusResult {
    /// Result used when no timeframe had enough data.
    pub fn empty() -> Self {
        Self {
            signal_type: SignalType::Hold,
            long_p: 0.5,
            short_p: 0.5,
            win_prob: 0.5,
            edge: 0.0,
            agree: 0,
            required_agree: 0,
            votes: Vec::new(),
            timeframes: Vec::new(),
            sim_avg: 0.0,
            sim_count: 0,
            sim_var: 0.0,
            weights: Vec::new(),
            degraded: false,
        }
    }

    /// Share of votes agreeing with the consensus direction.
    pub fn agree_ratio(&self) -> f64 {
        if self.votes.is_empty() {
            0.0
        } else {
            self.agree as f64 / self.votes.len() as f64
        }
    }
}

/// Coarse market condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Regime {
    Trend,
    Volatile,
    Calm,
    Range,
}

impl Regime {
    /// Classify from trend strength and ATR%.
    pub fn classify(trend_strength: f64, atr_pct: f64) -> Self {
        if trend_strength >= 0.55 && atr_pct >= 0.45 {
            Regime::Trend
        } else if atr_pct >= 1.25 {
            Regime::Volatile
        } else if atr_pct <= 0.25 {
            Regime::Calm
        } else {
            Regime::Range
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Regime::Trend => "TREND",
            Regime::Volatile => "VOLATILE",
            Regime::Calm => "CALM",
            Regime::Range => "RANGE",
        }
    }
}

/// Confidence tier controlling risk:reward and target scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceTier {
    High,
    Mid,
    Low,
}

impl ConfidenceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceTier::High => "HIGH",
            ConfidenceTier::Mid => "MID",
            ConfidenceTier::Low => "LOW",
        }
    }
}

/// One entry of the calibration trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationStep {
    pub stage: String,
    pub win_prob: f64,
    pub edge: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Every intermediate behind a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Explain {
    pub mode: SignalMode,
    pub votes: Vec<SignalType>,
    pub agree: usize,
    pub required_agree: usize,
    pub raw_win_prob: f64,
    pub raw_edge: f64,
    pub long_p: f64,
    pub short_p: f64,
    pub win_prob: f64,
    pub edge: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regime: Option<Regime>,
    pub sim_avg: f64,
    pub sim_count: usize,
    pub sim_var: f64,
    pub atr_pct: f64,
    pub trend_strength: f64,
    pub btc_dom: f64,
    pub btc_dom_up: bool,
    pub pattern_penalty: f64,
    pub pattern_hard_hold: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta_win_rate: Option<f64>,
    pub meta_alpha: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub empirical_prob: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<ConfidenceTier>,
    pub trail: Vec<CalibrationStep>,
    pub hold_reasons: Vec<String>,
}

/// Final output of an inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalDecision {
    pub symbol: String,
    pub tf: Timeframe,
    #[serde(rename = "type")]
    pub signal_type: SignalType,
    pub entry: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sl: Option<f64>,
    pub tp_pct: f64,
    pub sl_pct: f64,
    pub explain: Explain,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<PatternSignature>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta_key: Option<MetaKey>,
    /// Open time of the last primary candle.
    pub generated_at: i64,
}

impl SignalDecision {
    pub fn is_hold(&self) -> bool {
        self.signal_type == SignalType::Hold
    }
}

use std::env;

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Historical pattern search parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityConfig {
    /// Canonical window length; the ensemble also runs 0.8x and 1.2x.
    pub base_window: usize,
    /// Forward horizon override in bars (defaults to the timeframe horizon).
    pub horizon: Option<usize>,
    /// Stride between candidate windows.
    pub step: usize,
    /// Nearest neighbours kept per window length.
    pub top_k: usize,
    /// Recency half-life, in steps.
    pub half_life: f64,
    /// Candidates below this ZNCC are not counted as similar. The default
    /// of -1 keeps every finite match; anti-correlated windows vote with a
    /// low similarity instead of being dropped.
    pub min_corr: f64,
    /// Extra weight of the canonical window in the ensemble.
    pub base_weight: f64,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            base_window: 32,
            horizon: None,
            step: 2,
            top_k: 40,
            half_life: 60.0,
            min_corr: -1.0,
            base_weight: 1.15,
        }
    }
}

/// Calibration pipeline parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationConfig {
    /// Closed trades considered by the recency blend.
    pub recency_window: usize,
    /// Minimum closed trades before the recency blend applies.
    pub recency_min_trades: usize,
    /// Minimum same-direction trades for the directional sub-sample.
    pub recency_min_directional: usize,
    /// Per-trade decay of the recency weights (newest = 1).
    pub recency_decay: f64,
    pub recency_alpha: f64,
    /// ZNCC-variance threshold above which the similarity haircut applies.
    pub sim_var_threshold: f64,
    /// Low-similarity/high-confidence suppression thresholds.
    pub low_sim_avg: f64,
    pub low_sim_high_prob: f64,
    /// Pattern DB penalty cap.
    pub pattern_max_penalty: f64,
    /// Win rate / sample size that force a hard hold.
    pub hard_hold_winrate: f64,
    pub hard_hold_samples: u32,
    pub meta_min_samples: u32,
    pub meta_prior_wr: f64,
    pub meta_prior_n: f64,
    /// Samples at which the meta alpha would reach 1 before capping.
    pub meta_alpha_scale: f64,
    pub meta_alpha_cap: f64,
    pub empirical_alpha: f64,
    pub empirical_min_samples: usize,
    /// Bars scanned by the empirical TP/SL ordering estimate.
    pub empirical_lookback: usize,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            recency_window: 20,
            recency_min_trades: 5,
            recency_min_directional: 3,
            recency_decay: 0.9,
            recency_alpha: 0.25,
            sim_var_threshold: 0.01,
            low_sim_avg: 58.0,
            low_sim_high_prob: 0.62,
            pattern_max_penalty: 0.12,
            hard_hold_winrate: 0.32,
            hard_hold_samples: 25,
            meta_min_samples: 20,
            meta_prior_wr: 0.5,
            meta_prior_n: 20.0,
            meta_alpha_scale: 200.0,
            meta_alpha_cap: 0.35,
            empirical_alpha: 0.2,
            empirical_min_samples: 30,
            empirical_lookback: 400,
        }
    }
}

/// Risk sizing and hold-rule parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskConfig {
    /// ATR floor as a fraction of entry.
    pub min_atr_frac: f64,
    pub max_tp_pct: f64,
    pub min_tp_pct: f64,
    pub high_win_prob: f64,
    pub high_edge: f64,
    pub mid_win_prob: f64,
    pub mid_edge: f64,
    pub high_rr: f64,
    pub mid_rr: f64,
    pub low_rr: f64,
    pub high_tp_scale: f64,
    pub mid_tp_scale: f64,
    pub low_tp_scale: f64,
    pub min_sim_count: usize,
    pub min_sim_avg: f64,
    pub min_edge: f64,
    /// Volume trend below this holds.
    pub min_vol_trend: f64,
    /// BTC dominance levels treated as adverse for altcoin longs / shorts.
    pub dom_high: f64,
    pub dom_low: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            min_atr_frac: 0.0015,
            max_tp_pct: 6.0,
            min_tp_pct: 0.25,
            high_win_prob: 0.68,
            high_edge: 0.30,
            mid_win_prob: 0.58,
            mid_edge: 0.15,
            high_rr: 2.0,
            mid_rr: 1.6,
            low_rr: 1.3,
            high_tp_scale: 1.25,
            mid_tp_scale: 1.0,
            low_tp_scale: 0.8,
            min_sim_count: 12,
            min_sim_avg: 55.0,
            min_edge: 0.05,
            min_vol_trend: -0.35,
            dom_high: 55.0,
            dom_low: 45.0,
        }
    }
}

/// Adaptive memory store parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryConfig {
    pub pattern_min_samples: u32,
    pub pattern_bad_winrate: f64,
    /// Maximum size of the derived avoid set.
    pub avoid_cap: usize,
    /// Maximum raw signature counters kept; `None` keeps everything.
    pub pattern_retention: Option<usize>,
    /// Maximum raw Meta-Brain counters kept; `None` keeps everything.
    pub meta_retention: Option<usize>,
    /// Closed trades kept per symbol/timeframe.
    pub history_per_key: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            pattern_min_samples: 12,
            pattern_bad_winrate: 0.42,
            avoid_cap: 200,
            pattern_retention: Some(50_000),
            meta_retention: Some(50_000),
            history_per_key: 100,
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EngineConfig {
    pub similarity: SimilarityConfig,
    pub calibration: CalibrationConfig,
    pub risk: RiskConfig,
    pub memory: MemoryConfig,
}

impl EngineConfig {
    /// Defaults overlaid with environment variables.
    pub fn from_env() -> Self {
        let d = Self::default();

        let retention = |key: &str, default: Option<usize>| match env::var(key) {
            Ok(v) if v == "0" || v.eq_ignore_ascii_case("none") => None,
            Ok(v) => v.parse().ok().or(default),
            Err(_) => default,
        };

        Self {
            similarity: SimilarityConfig {
                base_window: env_parse("SIM_BASE_WINDOW", d.similarity.base_window),
                horizon: env::var("SIM_HORIZON").ok().and_then(|v| v.parse().ok()),
                step: env_parse("SIM_STEP", d.similarity.step).max(1),
                top_k: env_parse("SIM_TOP_K", d.similarity.top_k),
                half_life: env_parse("SIM_HALF_LIFE", d.similarity.half_life),
                ..d.similarity
            },
            calibration: CalibrationConfig {
                recency_alpha: env_parse("RECENCY_ALPHA", d.calibration.recency_alpha),
                meta_alpha_cap: env_parse("META_ALPHA_CAP", d.calibration.meta_alpha_cap),
                meta_min_samples: env_parse("META_MIN_SAMPLES", d.calibration.meta_min_samples),
                empirical_alpha: env_parse("EMPIRICAL_ALPHA", d.calibration.empirical_alpha),
                ..d.calibration
            },
            risk: RiskConfig {
                min_sim_count: env_parse("MIN_SIM_COUNT", d.risk.min_sim_count),
                min_sim_avg: env_parse("MIN_SIM_AVG", d.risk.min_sim_avg),
                min_edge: env_parse("MIN_EDGE", d.risk.min_edge),
                min_tp_pct: env_parse("MIN_TP_PCT", d.risk.min_tp_pct),
                max_tp_pct: env_parse("MAX_TP_PCT", d.risk.max_tp_pct),
                ..d.risk
            },
            memory: MemoryConfig {
                pattern_min_samples: env_parse(
                    "PATTERN_MIN_SAMPLES",
                    d.memory.pattern_min_samples,
                ),
                pattern_bad_winrate: env_parse(
                    "PATTERN_BAD_WINRATE",
                    d.memory.pattern_bad_winrate,
                ),
                avoid_cap: env_parse("PATTERN_AVOID_CAP", d.memory.avoid_cap),
                pattern_retention: retention("PATTERN_RETENTION", d.memory.pattern_retention),
                meta_retention: retention("META_RETENTION", d.memory.meta_retention),
                ..d.memory
            },
        }
    }
}

/// Batch scan binary configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Scan file to read when no path is given on the command line.
    pub input_path: Option<String>,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Maximum inferences in flight.
    pub concurrency: usize,
    pub engine: EngineConfig,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            input_path: env::var("SCAN_INPUT").ok(),
            log_filter: env::var("LOG_FILTER").unwrap_or_else(|_| "augur=info".to_string()),
            concurrency: env_parse("SCAN_CONCURRENCY", 8usize).max(1),
            engine: EngineConfig::from_env(),
        }
    }
}

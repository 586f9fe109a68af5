use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// A single OHLCV candle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Open time, unix milliseconds.
    #[serde(alias = "t")]
    pub time: i64,
    #[serde(alias = "o")]
    pub open: f64,
    #[serde(alias = "h")]
    pub high: f64,
    #[serde(alias = "l")]
    pub low: f64,
    #[serde(alias = "c")]
    pub close: f64,
    #[serde(alias = "v", default)]
    pub volume: f64,
}

impl Candle {
    pub fn new(time: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    fn is_finite(&self) -> bool {
        self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
            && self.volume.is_finite()
    }

    /// True range against the previous candle.
    pub fn true_range(&self, previous: &Candle) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - previous.close).abs();
        let lc = (self.low - previous.close).abs();
        hl.max(hc).max(lc)
    }
}

/// Validate a candle sequence at the collaborator boundary.
///
/// Rejects non-finite or non-positive prices and any timestamp that is not
/// strictly greater than its predecessor.
pub fn validate_candles(candles: &[Candle]) -> Result<()> {
    for (index, candle) in candles.iter().enumerate() {
        if !candle.is_finite() {
            return Err(EngineError::InvalidCandle {
                index,
                reason: "non-finite field".to_string(),
            });
        }
        if candle.close <= 0.0 || candle.low <= 0.0 {
            return Err(EngineError::InvalidCandle {
                index,
                reason: "non-positive price".to_string(),
            });
        }
        if candle.high < candle.low {
            return Err(EngineError::InvalidCandle {
                index,
                reason: "high below low".to_string(),
            });
        }
        if index > 0 && candle.time <= candles[index - 1].time {
            return Err(EngineError::UnsortedCandles(index));
        }
    }
    Ok(())
}

/// Sort chronologically, drop duplicate timestamps (last one wins) and rows
/// that would poison windowed computations.
pub fn prepare_candles(candles: &[Candle]) -> Vec<Candle> {
    let mut sorted: Vec<Candle> = candles
        .iter()
        .filter(|c| c.is_finite() && c.close > 0.0)
        .copied()
        .collect();

    let dropped = candles.len() - sorted.len();
    if dropped > 0 {
        warn!("Dropped {} malformed candles before inference", dropped);
    }

    sorted.sort_by_key(|c| c.time);

    let mut prepared: Vec<Candle> = Vec::with_capacity(sorted.len());
    for candle in sorted {
        match prepared.last_mut() {
            Some(last) if last.time == candle.time => *last = candle,
            _ => prepared.push(candle),
        }
    }
    prepared
}

/// A validated, chronologically ordered candle sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(candles: Vec<Candle>) -> Result<Self> {
        validate_candles(&candles)?;
        Ok(Self { candles })
    }

    pub fn as_slice(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn into_inner(self) -> Vec<Candle> {
        self.candles
    }
}

/// Candle timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    /// All timeframes, shortest first.
    pub const ALL: [Timeframe; 6] = [
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::M30 => "30m",
            Self::H1 => "1h",
            Self::H4 => "4h",
            Self::D1 => "1d",
        }
    }

    fn position(&self) -> usize {
        Self::ALL.iter().position(|tf| tf == self).unwrap_or(0)
    }

    /// Next longer timeframe.
    pub fn higher(&self) -> Option<Self> {
        Self::ALL.get(self.position() + 1).copied()
    }

    /// Next shorter timeframe.
    pub fn lower(&self) -> Option<Self> {
        self.position().checked_sub(1).map(|i| Self::ALL[i])
    }

    /// Multiplier applied to the ATR distance when sizing take-profit.
    pub fn tp_multiplier(&self) -> f64 {
        match self {
            Self::M5 => 1.2,
            Self::M15 => 1.4,
            Self::M30 => 1.6,
            Self::H1 => 1.9,
            Self::H4 => 2.4,
            Self::D1 => 3.0,
        }
    }

    /// Trend strength below which a signal on this timeframe is held.
    pub fn min_trend_strength(&self) -> f64 {
        match self {
            Self::M5 => 0.45,
            Self::M15 => 0.40,
            Self::M30 => 0.35,
            Self::H1 => 0.30,
            Self::H4 => 0.25,
            Self::D1 => 0.20,
        }
    }

    /// ATR% above which a signal on this timeframe is held.
    pub fn max_atr_pct(&self) -> f64 {
        match self {
            Self::M5 => 1.2,
            Self::M15 => 1.6,
            Self::M30 => 2.0,
            Self::H1 => 2.8,
            Self::H4 => 4.5,
            Self::D1 => 8.0,
        }
    }

    /// Evaluation horizon in bars: the forward window used for similarity
    /// outcomes and empirical TP/SL ordering.
    pub fn horizon_bars(&self) -> usize {
        match self {
            Self::M5 => 24,
            Self::M15 => 16,
            Self::M30 => 16,
            Self::H1 => 12,
            Self::H4 => 8,
            Self::D1 => 5,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "5m" => Ok(Self::M5),
            "15m" => Ok(Self::M15),
            "30m" => Ok(Self::M30),
            "1h" | "60m" => Ok(Self::H1),
            "4h" => Ok(Self::H4),
            "1d" | "24h" => Ok(Self::D1),
            _ => Err(EngineError::InvalidTimeframe(s.to_string())),
        }
    }
}

/// Multi-timeframe consensus mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SignalMode {
    #[serde(rename = "2TF")]
    #[default]
    TwoTf,
    #[serde(rename = "3TF")]
    ThreeTf,
    #[serde(rename = "6TF")]
    SixTf,
}

impl SignalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TwoTf => "2TF",
            Self::ThreeTf => "3TF",
            Self::SixTf => "6TF",
        }
    }

    /// Timeframes voting for a signal on `primary`, shortest first.
    pub fn timeframes(&self, primary: Timeframe) -> Vec<Timeframe> {
        match self {
            Self::TwoTf => match primary.higher() {
                Some(higher) => vec![primary, higher],
                None => vec![primary.lower().unwrap_or(primary), primary],
            },
            Self::ThreeTf => match (primary.lower(), primary.higher()) {
                (Some(lower), Some(higher)) => vec![lower, primary, higher],
                (None, _) => Timeframe::ALL[..3].to_vec(),
                (_, None) => Timeframe::ALL[3..].to_vec(),
            },
            Self::SixTf => Timeframe::ALL.to_vec(),
        }
    }

    /// Fixed vote weights by position in [`Self::timeframes`]; longer
    /// timeframes weigh more.
    pub fn weights(&self) -> &'static [f64] {
        match self {
            Self::TwoTf => &[0.45, 0.55],
            Self::ThreeTf => &[0.25, 0.35, 0.40],
            Self::SixTf => &[0.08, 0.12, 0.15, 0.18, 0.22, 0.25],
        }
    }

    /// Minimum matching votes given how many timeframes actually voted.
    pub fn required_agree(&self, available: usize) -> usize {
        if available <= 1 {
            return available;
        }
        match self {
            Self::TwoTf | Self::ThreeTf => 2.min(available),
            Self::SixTf => ((available as f64) * 0.6).ceil() as usize,
        }
    }
}

impl fmt::Display for SignalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "2TF" | "2" => Ok(Self::TwoTf),
            "3TF" | "3" => Ok(Self::ThreeTf),
            "6TF" | "6" => Ok(Self::SixTf),
            _ => Err(EngineError::InvalidMode(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(time: i64, close: f64) -> Candle {
        Candle::new(time, close, close + 1.0, close - 1.0, close, 100.0)
    }

    // =========================================================================
    // Candle preparation
    // =========================================================================

    #[test]
    fn test_prepare_sorts_and_dedups() {
        let candles = vec![candle(3, 103.0), candle(1, 101.0), candle(2, 102.0), candle(2, 99.0)];
        let prepared = prepare_candles(&candles);
        let times: Vec<i64> = prepared.iter().map(|c| c.time).collect();
        assert_eq!(times, vec![1, 2, 3]);
        assert_eq!(prepared[1].close, 99.0);
    }

    #[test]
    fn test_prepare_drops_non_finite() {
        let mut bad = candle(2, 100.0);
        bad.high = f64::NAN;
        let prepared = prepare_candles(&[candle(1, 100.0), bad]);
        assert_eq!(prepared.len(), 1);
    }

    #[test]
    fn test_validate_rejects_unsorted() {
        let result = validate_candles(&[candle(2, 100.0), candle(1, 100.0)]);
        assert!(matches!(result, Err(EngineError::UnsortedCandles(1))));
    }

    #[test]
    fn test_candle_series_accepts_sorted() {
        let series = CandleSeries::new(vec![candle(1, 100.0), candle(2, 101.0)]).unwrap();
        assert_eq!(series.len(), 2);
        assert!(!series.is_empty());

        let times: Vec<i64> = series.as_slice().iter().map(|c| c.time).collect();
        assert_eq!(times, vec![1, 2]);
        assert_eq!(series.into_inner(), vec![candle(1, 100.0), candle(2, 101.0)]);
    }

    #[test]
    fn test_candle_series_rejects_invalid() {
        assert!(matches!(
            CandleSeries::new(vec![candle(2, 100.0), candle(2, 101.0)]),
            Err(EngineError::UnsortedCandles(1))
        ));
        assert!(matches!(
            CandleSeries::new(vec![candle(1, -5.0)]),
            Err(EngineError::InvalidCandle { index: 0, .. })
        ));
        assert!(CandleSeries::new(Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn test_candle_deserializes_short_names() {
        let json = r#"{"t":1,"o":1.0,"h":2.0,"l":0.5,"c":1.5,"v":10.0}"#;
        let parsed: Candle = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.close, 1.5);
        assert_eq!(parsed.volume, 10.0);
    }

    // =========================================================================
    // Timeframe / mode
    // =========================================================================

    #[test]
    fn test_timeframe_neighbours() {
        assert_eq!(Timeframe::H1.higher(), Some(Timeframe::H4));
        assert_eq!(Timeframe::H1.lower(), Some(Timeframe::M30));
        assert_eq!(Timeframe::D1.higher(), None);
        assert_eq!(Timeframe::M5.lower(), None);
    }

    #[test]
    fn test_timeframe_from_str() {
        assert_eq!("1h".parse::<Timeframe>().unwrap(), Timeframe::H1);
        assert_eq!("4H".parse::<Timeframe>().unwrap(), Timeframe::H4);
        assert!("2h".parse::<Timeframe>().is_err());
    }

    #[test]
    fn test_mode_timeframes_and_weights_align() {
        for mode in [SignalMode::TwoTf, SignalMode::ThreeTf, SignalMode::SixTf] {
            for tf in Timeframe::ALL {
                let tfs = mode.timeframes(tf);
                assert_eq!(tfs.len(), mode.weights().len());
                assert!(tfs.windows(2).all(|w| w[0] < w[1]));
            }
        }
    }

    #[test]
    fn test_required_agree() {
        assert_eq!(SignalMode::TwoTf.required_agree(2), 2);
        assert_eq!(SignalMode::ThreeTf.required_agree(3), 2);
        assert_eq!(SignalMode::SixTf.required_agree(6), 4);
        assert_eq!(SignalMode::SixTf.required_agree(1), 1);
    }

    #[test]
    fn test_mode_serialization() {
        assert_eq!(serde_json::to_string(&SignalMode::SixTf).unwrap(), "\"6TF\"");
        assert_eq!("3tf".parse::<SignalMode>().unwrap(), SignalMode::ThreeTf);
    }
}

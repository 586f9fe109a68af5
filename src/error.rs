use thiserror::Error;

/// Engine error types.
///
/// Inference never fails; these are raised only at the boundaries
/// (candle validation, parsing, memory snapshots).
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid candle at index {index}: {reason}")]
    InvalidCandle { index: usize, reason: String },

    #[error("Candles not strictly increasing at index {0}")]
    UnsortedCandles(usize),

    #[error("Invalid timeframe: {0}")]
    InvalidTimeframe(String),

    #[error("Invalid signal mode: {0}")]
    InvalidMode(String),

    #[error("Invalid close reason: {0}")]
    InvalidCloseReason(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;

//! Signal inference service module.
//!
//! Indicator features and historical pattern similarity per timeframe, a
//! weighted multi-timeframe vote, ordered calibration against the adaptive
//! memory, and risk sizing with explained HOLD rules.

pub mod calibration;
pub mod consensus;
pub mod engine;
pub mod features;
pub mod indicators;
pub mod ordering;
pub mod risk;
pub mod signal_core;
pub mod similarity;

pub use calibration::{CalibrationContext, CalibrationEnv, CalibrationPipeline, CalibrationStage};
pub use engine::{SignalEngine, SignalRequest};
pub use features::extract_features;
pub use indicators::Indicator;

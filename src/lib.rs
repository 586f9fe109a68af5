//! Augur - multi-timeframe signal inference with self-calibrating memory

pub mod config;
pub mod error;
pub mod services;
pub mod types;

// Re-export commonly used types
pub use error::{EngineError, Result};
pub use services::{AdaptiveMemory, MemorySnapshot, SignalEngine, SignalRequest};
pub use types::*;

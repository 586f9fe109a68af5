pub mod memory;
pub mod signals;

pub use memory::{AdaptiveMemory, MemorySnapshot, MetaBrain, PatternFailureDb, TradeHistory};
pub use signals::{SignalEngine, SignalRequest};

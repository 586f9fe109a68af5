//! Adaptive memory: the learning tables fed by trade settlement.

pub mod history;
pub mod meta_brain;
pub mod pattern_db;
pub mod snapshot;
pub mod store;

pub use history::TradeHistory;
pub use meta_brain::MetaBrain;
pub use pattern_db::PatternFailureDb;
pub use snapshot::MemorySnapshot;
pub use store::{CounterTable, StatStore};

use crate::config::MemoryConfig;
use std::sync::Arc;

/// Shared handles to every store read at inference and written at settlement.
#[derive(Clone)]
pub struct AdaptiveMemory {
    pub patterns: Arc<PatternFailureDb>,
    pub meta: Arc<MetaBrain>,
    pub history: Arc<TradeHistory>,
}

impl AdaptiveMemory {
    pub fn new(config: &MemoryConfig) -> Self {
        Self {
            patterns: Arc::new(PatternFailureDb::new(config)),
            meta: Arc::new(MetaBrain::new(config)),
            history: Arc::new(TradeHistory::new(config.history_per_key)),
        }
    }

    /// Assemble from externally constructed stores.
    pub fn from_parts(
        patterns: Arc<PatternFailureDb>,
        meta: Arc<MetaBrain>,
        history: Arc<TradeHistory>,
    ) -> Self {
        Self {
            patterns,
            meta,
            history,
        }
    }
}

//! Serializable copy of the adaptive memory for external state stores.

use super::AdaptiveMemory;
use crate::error::{EngineError, Result};
use crate::types::{ClosedTrade, MetaStat, PatternStat};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySnapshot {
    /// Pattern-Failure DB counters by signature key.
    #[serde(default)]
    pub patterns: BTreeMap<String, PatternStat>,
    /// Meta-Brain counters by meta key.
    #[serde(default)]
    pub meta: BTreeMap<String, MetaStat>,
    #[serde(default)]
    pub history: Vec<ClosedTrade>,
}

impl MemorySnapshot {
    /// Reject counters with more wins than observations.
    pub fn validate(&self) -> Result<()> {
        if let Some((key, _)) = self.patterns.iter().find(|(_, s)| s.win > s.n) {
            return Err(EngineError::Snapshot(format!(
                "pattern {} has more wins than samples",
                key
            )));
        }
        if let Some((key, _)) = self.meta.iter().find(|(_, s)| s.w > s.n) {
            return Err(EngineError::Snapshot(format!(
                "meta key {} has more wins than samples",
                key
            )));
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self = serde_json::from_str(json)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&json).map_err(|e| {
            warn!("Failed to load memory snapshot {:?}: {}", path.as_ref(), e);
            e
        })
    }
}

impl AdaptiveMemory {
    /// Point-in-time copy of every store.
    pub fn export(&self) -> MemorySnapshot {
        MemorySnapshot {
            patterns: self.patterns.stats().into_iter().collect(),
            meta: self.meta.stats().into_iter().collect(),
            history: self.history.all(),
        }
    }

    /// Replace every store with `snapshot`; the avoid set is re-derived.
    pub fn import(&self, snapshot: MemorySnapshot) -> Result<()> {
        snapshot.validate()?;
        let MemorySnapshot {
            patterns,
            meta,
            history,
        } = snapshot;

        self.patterns.load(patterns);
        self.meta.load(meta);
        self.history.load(history);
        info!(
            "Imported memory: {} patterns, {} meta keys, {} trades",
            self.patterns.len(),
            self.meta.len(),
            self.history.len()
        );
        Ok(())
    }
}

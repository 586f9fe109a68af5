//! Meta-Brain: coarse context outcome counters.

use super::store::{CounterTable, Retention, StatStore};
use crate::config::MemoryConfig;
use crate::types::{MetaKey, MetaStat};
use tracing::{debug, info};

pub struct MetaBrain {
    stats: Box<dyn StatStore<String, MetaStat>>,
    retention: Retention,
}

impl MetaBrain {
    pub fn new(config: &MemoryConfig) -> Self {
        Self::with_store(config, Box::new(CounterTable::<String, MetaStat>::new()))
    }

    pub fn with_store(config: &MemoryConfig, stats: Box<dyn StatStore<String, MetaStat>>) -> Self {
        Self {
            stats,
            retention: Retention::new(config.meta_retention),
        }
    }

    /// Record a resolved outcome for `key`. Returns the updated counter.
    pub fn record_meta(&self, key: &MetaKey, win: bool) -> MetaStat {
        let key = key.key();
        let stat = self.stats.update(key.clone(), &mut |stat| stat.record(win));
        debug!("Meta {}: {}/{} wins", key, stat.w, stat.n);

        let evicted = self
            .retention
            .enforce(self.stats.as_ref(), &key, |stat: &MetaStat| stat.n);
        if !evicted.is_empty() {
            debug!("Retention evicted {} meta counters", evicted.len());
        }
        stat
    }

    pub fn stat(&self, key: &MetaKey) -> Option<MetaStat> {
        self.stats.get(&key.key())
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    /// Every raw counter, sorted by key.
    pub fn stats(&self) -> Vec<(String, MetaStat)> {
        let mut entries = self.stats.entries();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Replace all counters.
    pub fn load(&self, entries: impl IntoIterator<Item = (String, MetaStat)>) {
        self.stats.clear();
        for (key, stat) in entries {
            self.stats.put(key, stat);
        }
        info!("Loaded {} meta counters", self.stats.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Regime, SignalType, Timeframe};

    fn key(regime: Regime) -> MetaKey {
        MetaKey::new(
            "solusdt",
            Timeframe::H4,
            SignalType::Short,
            regime,
            1.3,
            0.7,
            27.0,
            3.4,
            0.1,
            false,
        )
    }

    #[test]
    fn test_record_meta_counts_wins() {
        let brain = MetaBrain::new(&MemoryConfig::default());
        brain.record_meta(&key(Regime::Trend), true);
        brain.record_meta(&key(Regime::Trend), false);
        let stat = brain.record_meta(&key(Regime::Trend), true);

        assert_eq!(stat, MetaStat { n: 3, w: 2 });
        assert_eq!(brain.stat(&key(Regime::Trend)), Some(stat));
        assert!(brain.stat(&key(Regime::Range)).is_none());
    }

    #[test]
    fn test_retention_bounds_counters() {
        let config = MemoryConfig {
            meta_retention: Some(1),
            ..MemoryConfig::default()
        };
        let brain = MetaBrain::new(&config);
        brain.record_meta(&key(Regime::Trend), true);
        brain.record_meta(&key(Regime::Calm), true);

        assert_eq!(brain.len(), 1);
        assert!(brain.stat(&key(Regime::Calm)).is_some());
    }

    #[test]
    fn test_load_replaces_counters() {
        let brain = MetaBrain::new(&MemoryConfig::default());
        brain.record_meta(&key(Regime::Trend), true);
        brain.load(vec![(key(Regime::Calm).key(), MetaStat { n: 40, w: 30 })]);

        assert_eq!(brain.len(), 1);
        assert_eq!(brain.stat(&key(Regime::Calm)), Some(MetaStat { n: 40, w: 30 }));
    }
}

//! Pattern-Failure DB: per-signature outcome counters and the bounded
//! avoid set derived from them.

use super::store::{CounterTable, Retention, StatStore};
use crate::config::MemoryConfig;
use crate::types::{AvoidEntry, PatternSignature, PatternStat};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

/// Outcome counters per [`PatternSignature`] key.
///
/// A signature is in the avoid set iff it has at least `min_samples`
/// outcomes and a win rate at or below `bad_winrate`. The avoid set never
/// holds more than `avoid_cap` entries; the least observed is evicted first.
pub struct PatternFailureDb {
    stats: Box<dyn StatStore<String, PatternStat>>,
    avoid: RwLock<HashMap<String, AvoidEntry>>,
    min_samples: u32,
    bad_winrate: f64,
    avoid_cap: usize,
    retention: Retention,
}

impl PatternFailureDb {
    pub fn new(config: &MemoryConfig) -> Self {
        Self::with_store(config, Box::new(CounterTable::<String, PatternStat>::new()))
    }

    /// Use an externally supplied counter store.
    pub fn with_store(config: &MemoryConfig, stats: Box<dyn StatStore<String, PatternStat>>) -> Self {
        let db = Self {
            stats,
            avoid: RwLock::new(HashMap::new()),
            min_samples: config.pattern_min_samples,
            bad_winrate: config.pattern_bad_winrate,
            avoid_cap: config.avoid_cap.max(1),
            retention: Retention::new(config.pattern_retention),
        };
        db.rebuild_avoid();
        db
    }

    /// Record a resolved outcome for `signature`. Returns the updated counter.
    pub fn record_outcome(&self, signature: &PatternSignature, win: bool) -> PatternStat {
        let key = signature.key();
        let stat = self.stats.update(key.clone(), &mut |stat| stat.record(win));
        debug!(
            "Pattern {}: {}/{} wins ({:.2})",
            key,
            stat.win,
            stat.n,
            stat.win_rate()
        );

        self.refresh_avoid(&key);
        self.apply_retention(&key);
        stat
    }

    pub fn stat(&self, signature: &PatternSignature) -> Option<PatternStat> {
        self.stats.get(&signature.key())
    }

    /// Avoid-set entry for `signature`, if flagged.
    pub fn avoid_entry(&self, signature: &PatternSignature) -> Option<AvoidEntry> {
        self.read_avoid().get(&signature.key()).copied()
    }

    /// Win rate at or below which a well-sampled signature is avoided.
    pub fn bad_winrate(&self) -> f64 {
        self.bad_winrate
    }

    pub fn avoid_len(&self) -> usize {
        self.read_avoid().len()
    }

    /// Number of raw signature counters.
    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    /// Every raw counter, sorted by key.
    pub fn stats(&self) -> Vec<(String, PatternStat)> {
        let mut entries = self.stats.entries();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Replace all counters and rebuild the avoid set.
    pub fn load(&self, entries: impl IntoIterator<Item = (String, PatternStat)>) {
        self.stats.clear();
        for (key, stat) in entries {
            self.stats.put(key, stat);
        }
        self.rebuild_avoid();
        info!(
            "Loaded {} pattern counters ({} avoided)",
            self.stats.len(),
            self.avoid_len()
        );
    }

    // A settlement that panicked mid-update leaves at worst one stale avoid
    // entry; every later write re-derives from the counters, so recover.
    fn read_avoid(&self) -> RwLockReadGuard<'_, HashMap<String, AvoidEntry>> {
        self.avoid.read().unwrap_or_else(|poisoned| {
            warn!("Avoid set lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write_avoid(&self) -> RwLockWriteGuard<'_, HashMap<String, AvoidEntry>> {
        self.avoid.write().unwrap_or_else(|poisoned| {
            warn!("Avoid set lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn qualifies(&self, stat: &PatternStat) -> bool {
        stat.n >= self.min_samples && stat.win_rate() <= self.bad_winrate
    }

    /// Re-derive the avoid entry for `key` from the latest counter.
    fn refresh_avoid(&self, key: &str) {
        let mut avoid = self.write_avoid();

        match self.stats.get(&key.to_string()) {
            Some(stat) if self.qualifies(&stat) => {
                avoid.insert(
                    key.to_string(),
                    AvoidEntry {
                        n: stat.n,
                        wr: stat.win_rate(),
                    },
                );
            }
            _ => {
                avoid.remove(key);
            }
        }

        Self::enforce_cap(&mut avoid, self.avoid_cap);
    }

    fn rebuild_avoid(&self) {
        let mut avoid = self.write_avoid();

        avoid.clear();
        for (key, stat) in self.stats.entries() {
            if self.qualifies(&stat) {
                avoid.insert(
                    key,
                    AvoidEntry {
                        n: stat.n,
                        wr: stat.win_rate(),
                    },
                );
            }
        }
        Self::enforce_cap(&mut avoid, self.avoid_cap);
    }

    fn enforce_cap(avoid: &mut HashMap<String, AvoidEntry>, cap: usize) {
        while avoid.len() > cap {
            let Some(victim) = avoid
                .iter()
                .min_by(|a, b| a.1.n.cmp(&b.1.n).then_with(|| a.0.cmp(b.0)))
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            debug!("Avoid set full, evicting {}", victim);
            avoid.remove(&victim);
        }
    }

    fn apply_retention(&self, keep: &str) {
        let evicted = self
            .retention
            .enforce(self.stats.as_ref(), &keep.to_string(), |stat: &PatternStat| {
                stat.n
            });
        if evicted.is_empty() {
            return;
        }

        debug!("Retention evicted {} pattern counters", evicted.len());
        let mut avoid = self.write_avoid();
        for key in &evicted {
            avoid.remove(key);
        }
    }
}

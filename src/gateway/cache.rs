use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};

use crate::clock::Clock;
use crate::model::{AcquisitionMode, Interval, Range, Series};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub symbol: String,
    pub interval: Interval,
    pub range: Range,
    pub mode: AcquisitionMode,
}

struct Entry {
    series: Arc<Series>,
    fetched_at: DateTime<Utc>,
    ttl: Duration,
}

/// Result of a cache probe.
#[derive(Debug, Clone)]
pub enum Lookup {
    Fresh(Arc<Series>),
    /// Past its TTL; kept only as a last resort when the upstream fails.
    Stale(Arc<Series>),
    Absent,
}

impl Lookup {
    pub fn into_stale(self) -> Option<Arc<Series>> {
        match self {
            Lookup::Stale(series) => Some(series),
            _ => None,
        }
    }
}

/// In-process series cache with a per-entry time-to-live.
///
/// An entry is fresh while its age is strictly below its TTL. Expired entries
/// stay in place until overwritten, removed, or cleared.
pub struct SeriesCache {
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<CacheKey, Entry>>,
}

impl SeriesCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<CacheKey, Entry>> {
        // A panic while holding the lock cannot leave a half-written entry.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &CacheKey) -> Lookup {
        let now = self.clock.now();
        match self.entries().get(key) {
            Some(entry) if now - entry.fetched_at < entry.ttl => {
                Lookup::Fresh(Arc::clone(&entry.series))
            }
            Some(entry) => Lookup::Stale(Arc::clone(&entry.series)),
            None => Lookup::Absent,
        }
    }

    pub fn insert(&self, key: CacheKey, series: Arc<Series>, ttl: Duration) {
        let entry = Entry {
            series,
            fetched_at: self.clock.now(),
            ttl,
        };
        self.entries().insert(key, entry);
    }

    pub fn remove(&self, key: &CacheKey) -> bool {
        self.entries().remove(key).is_some()
    }

    /// Drop every entry, returning how many there were.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries();
        let dropped = entries.len();
        entries.clear();
        dropped
    }
}

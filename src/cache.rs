//! Session-scoped cache of per-region county geometry.
//!
//! Each region's county set is fetched from the data source at most once per
//! process run. Entries are immutable after insert and live for the session;
//! a failed fetch leaves no entry so the next selection can retry.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Instant;

use crate::data::{CountyRecord, GeometrySource, Region};
use crate::error::Result;

/// One cached region: counties plus fetch timestamp. Never mutated, only
/// replaced wholesale.
#[derive(Debug)]
pub struct RegionEntry {
    pub region: Region,
    pub counties: Vec<CountyRecord>,
    pub fetched_at: Instant,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<Region, Arc<RegionEntry>>,
    in_flight: HashSet<Region>,
}

/// Region -> county-set cache with at-most-one in-flight fetch per region.
/// Concurrent callers for the same region block until the fetch settles and
/// then share its outcome.
pub struct RegionCache {
    state: Mutex<CacheState>,
    settled: Condvar,
}

impl RegionCache {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            settled: Condvar::new(),
        }
    }

    /// Entry for a region if it has already been loaded
    pub fn get(&self, region: Region) -> Option<Arc<RegionEntry>> {
        self.state.lock().unwrap().entries.get(&region).cloned()
    }

    /// Return the cached entry, or fetch, insert, and return it. The fetch
    /// runs outside the lock; the in-flight marker keeps a second caller
    /// from issuing a duplicate request meanwhile.
    pub fn get_or_load(
        &self,
        region: Region,
        source: &dyn GeometrySource,
    ) -> Result<Arc<RegionEntry>> {
        {
            let mut state = self.state.lock().unwrap();
            loop {
                if let Some(entry) = state.entries.get(&region) {
                    tracing::debug!(region = region.name(), "cache hit");
                    return Ok(entry.clone());
                }
                if !state.in_flight.contains(&region) {
                    state.in_flight.insert(region);
                    break;
                }
                state = self.settled.wait(state).unwrap();
            }
        }

        tracing::info!(region = region.name(), "fetching counties");
        let result = source.fetch_counties(region.state_fips());

        let mut state = self.state.lock().unwrap();
        state.in_flight.remove(&region);
        let outcome = match result {
            Ok(counties) => {
                tracing::info!(region = region.name(), count = counties.len(), "cached");
                let entry = Arc::new(RegionEntry {
                    region,
                    counties,
                    fetched_at: Instant::now(),
                });
                state.entries.insert(region, entry.clone());
                Ok(entry)
            }
            // Not cached: the next selection retries
            Err(e) => Err(e),
        };
        drop(state);
        self.settled.notify_all();
        outcome
    }
}

impl Default for RegionCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::StateRecord;
    use crate::error::MapError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Fake source counting fetches, optionally failing
    struct CountingSource {
        fetches: AtomicUsize,
        fail: AtomicBool,
        counties_per_state: usize,
    }

    impl CountingSource {
        fn new(counties_per_state: usize) -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
                counties_per_state,
            }
        }

        fn fetch_count(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    impl GeometrySource for CountingSource {
        fn fetch_counties(&self, state_fips: &[&str]) -> Result<Vec<CountyRecord>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(MapError::Fetch("synthetic outage".into()));
            }
            let mut counties = Vec::new();
            for fips in state_fips {
                for i in 0..self.counties_per_state {
                    counties.push(CountyRecord {
                        fips: format!("{fips}{i:03}"),
                        name: format!("County {i}"),
                        state_fips: fips.to_string(),
                        population: (i as u64 + 1) * 100,
                        polygons: Vec::new(),
                    });
                }
            }
            Ok(counties)
        }

        fn fetch_states(&self) -> Result<Vec<StateRecord>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_second_load_hits_cache() {
        let cache = RegionCache::new();
        let source = CountingSource::new(3);

        let first = cache.get_or_load(Region::Southwest, &source).unwrap();
        let second = cache.get_or_load(Region::Southwest, &source).unwrap();

        assert_eq!(source.fetch_count(), 1);
        assert!(Arc::ptr_eq(&first, &second));
        // 4 southwestern states, 3 counties each
        assert_eq!(first.counties.len(), 12);
    }

    #[test]
    fn test_distinct_regions_fetch_separately() {
        let cache = RegionCache::new();
        let source = CountingSource::new(1);

        cache.get_or_load(Region::West, &source).unwrap();
        cache.get_or_load(Region::Midwest, &source).unwrap();
        assert_eq!(source.fetch_count(), 2);
    }

    #[test]
    fn test_failure_is_not_cached() {
        let cache = RegionCache::new();
        let source = CountingSource::new(2);
        source.fail.store(true, Ordering::SeqCst);

        let err = cache.get_or_load(Region::Northeast, &source).unwrap_err();
        assert!(matches!(err, MapError::Fetch(_)));
        assert!(cache.get(Region::Northeast).is_none());

        // Recovery: the next selection fetches again and succeeds
        source.fail.store(false, Ordering::SeqCst);
        let entry = cache.get_or_load(Region::Northeast, &source).unwrap();
        assert_eq!(source.fetch_count(), 2);
        assert!(!entry.counties.is_empty());
    }

    #[test]
    fn test_empty_region_is_valid_and_cached() {
        let cache = RegionCache::new();
        let source = CountingSource::new(0);

        let entry = cache.get_or_load(Region::Southeast, &source).unwrap();
        assert!(entry.counties.is_empty());

        cache.get_or_load(Region::Southeast, &source).unwrap();
        assert_eq!(source.fetch_count(), 1);
    }

    #[test]
    fn test_concurrent_loads_share_one_fetch() {
        struct SlowSource(CountingSource);
        impl GeometrySource for SlowSource {
            fn fetch_counties(&self, state_fips: &[&str]) -> Result<Vec<CountyRecord>> {
                std::thread::sleep(std::time::Duration::from_millis(50));
                self.0.fetch_counties(state_fips)
            }
            fn fetch_states(&self) -> Result<Vec<StateRecord>> {
                self.0.fetch_states()
            }
        }

        let cache = RegionCache::new();
        let source = SlowSource(CountingSource::new(1));

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    cache.get_or_load(Region::West, &source).unwrap();
                });
            }
        });

        assert_eq!(source.0.fetch_count(), 1);
    }
}

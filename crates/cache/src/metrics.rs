use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    invalidations: AtomicU64,
}

static COUNTERS: Lazy<Counters> = Lazy::new(Counters::default);

fn increment(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

pub fn record_hit(_cache: &str) {
    increment(&COUNTERS.hits);
}

pub fn record_miss(_cache: &str) {
    increment(&COUNTERS.misses);
}

pub fn record_load(_cache: &str) {
    increment(&COUNTERS.loads);
}

pub fn record_invalidation(_cache: &str) {
    increment(&COUNTERS.invalidations);
}

#[derive(Clone, Debug, Default)]
pub struct CacheMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub loads: u64,
    pub invalidations: u64,
}

pub fn snapshot() -> CacheMetricsSnapshot {
    CacheMetricsSnapshot {
        hits: COUNTERS.hits.load(Ordering::Relaxed),
        misses: COUNTERS.misses.load(Ordering::Relaxed),
        loads: COUNTERS.loads.load(Ordering::Relaxed),
        invalidations: COUNTERS.invalidations.load(Ordering::Relaxed),
    }
}

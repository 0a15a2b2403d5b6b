use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
struct Counters {
    scheduled: AtomicU64,
    completed: AtomicU64,
    dispatched: AtomicU64,
    dropped: AtomicU64,
}

static COUNTERS: Lazy<Counters> = Lazy::new(Counters::default);

fn increment(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

pub fn record_scheduled() {
    increment(&COUNTERS.scheduled);
}

pub fn record_completed() {
    increment(&COUNTERS.completed);
}

pub fn record_dispatched() {
    increment(&COUNTERS.dispatched);
}

pub fn record_dropped() {
    increment(&COUNTERS.dropped);
}

#[derive(Clone, Debug, Default)]
pub struct SchedulerMetricsSnapshot {
    pub scheduled: u64,
    pub completed: u64,
    pub dispatched: u64,
    pub dropped: u64,
}

pub fn snapshot() -> SchedulerMetricsSnapshot {
    SchedulerMetricsSnapshot {
        scheduled: COUNTERS.scheduled.load(Ordering::Relaxed),
        completed: COUNTERS.completed.load(Ordering::Relaxed),
        dispatched: COUNTERS.dispatched.load(Ordering::Relaxed),
        dropped: COUNTERS.dropped.load(Ordering::Relaxed),
    }
}

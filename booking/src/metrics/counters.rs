use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Minimal counters for operational visibility. They never influence booking
/// decisions; the ledger stays the source of truth.
#[derive(Clone, Default)]
pub struct Counters {
    pub requests_dispatched: Arc<AtomicU64>,
    pub results_collected: Arc<AtomicU64>,

    pub attempts_booked: Arc<AtomicU64>,
    pub attempts_failed: Arc<AtomicU64>,

    pub workers_started: Arc<AtomicU64>,
    pub workers_exited: Arc<AtomicU64>,
}

/// Point-in-time copy of [`Counters`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CountersSnapshot {
    pub requests_dispatched: u64,
    pub results_collected: u64,
    pub attempts_booked: u64,
    pub attempts_failed: u64,
    pub workers_started: u64,
    pub workers_exited: u64,
}

impl Counters {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            requests_dispatched: self.requests_dispatched.load(Ordering::Relaxed),
            results_collected: self.results_collected.load(Ordering::Relaxed),
            attempts_booked: self.attempts_booked.load(Ordering::Relaxed),
            attempts_failed: self.attempts_failed.load(Ordering::Relaxed),
            workers_started: self.workers_started.load(Ordering::Relaxed),
            workers_exited: self.workers_exited.load(Ordering::Relaxed),
        }
    }
}

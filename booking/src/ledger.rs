//! Authoritative ticket counts.
//!
//! The ledger is the only state shared between workers. Every mutation goes
//! through [`Ledger::attempt_book`], which performs the capacity test and the
//! increment inside one critical section. The lock is never held across an
//! `.await` and is never nested, so it cannot deadlock.

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::types::{Outcome, UserId};

#[derive(Debug, Default)]
struct LedgerState {
    booked: u64,
    failed: u64,
    per_user: HashMap<UserId, u64>,
}

pub struct Ledger {
    capacity: u64,
    state: Mutex<LedgerState>,
}

/// Read-only copy of the ledger, taken under its lock.
///
/// `per_user` is ordered so that reports built from a snapshot are stable.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LedgerSnapshot {
    pub capacity: u64,
    pub booked: u64,
    pub failed: u64,
    pub per_user: BTreeMap<UserId, u64>,
}

impl Ledger {
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            state: Mutex::new(LedgerState::default()),
        }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Tickets still available.
    pub fn remaining(&self) -> u64 {
        self.capacity - self.state.lock().booked
    }

    /// Tries to book one ticket for `user_id`.
    ///
    /// On success `booked` and the user's count go up by one; otherwise
    /// `failed` goes up by one. Either way the outcome is final.
    #[instrument(skip(self), target = "ledger", level = "trace")]
    pub fn attempt_book(&self, user_id: UserId) -> Outcome {
        let mut st = self.state.lock();

        let outcome = if st.booked < self.capacity {
            st.booked += 1;
            *st.per_user.entry(user_id).or_insert(0) += 1;
            Outcome::Booked
        } else {
            st.failed += 1;
            Outcome::Failed
        };

        debug_assert!(
            st.booked <= self.capacity,
            "ledger oversold: booked={} capacity={}",
            st.booked,
            self.capacity
        );

        let booked = st.booked;
        drop(st);

        debug!(user_id, ?outcome, booked, capacity = self.capacity, "booking attempt");
        outcome
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let st = self.state.lock();
        LedgerSnapshot {
            capacity: self.capacity,
            booked: st.booked,
            failed: st.failed,
            per_user: st.per_user.iter().map(|(u, c)| (*u, *c)).collect(),
        }
    }
}

impl LedgerSnapshot {
    /// Total attempts that reached the ledger.
    pub fn attempts(&self) -> u64 {
        self.booked + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn books_until_capacity_then_fails() {
        let ledger = Ledger::new(2);

        assert_eq!(ledger.attempt_book(1), Outcome::Booked);
        assert_eq!(ledger.remaining(), 1);
        assert_eq!(ledger.attempt_book(2), Outcome::Booked);
        assert_eq!(ledger.attempt_book(3), Outcome::Failed);
        assert_eq!(ledger.attempt_book(4), Outcome::Failed);

        let snap = ledger.snapshot();
        assert_eq!(snap.booked, 2);
        assert_eq!(snap.failed, 2);
        assert_eq!(snap.attempts(), 4);
        assert_eq!(snap.per_user.get(&1), Some(&1));
        assert_eq!(snap.per_user.get(&2), Some(&1));
        assert!(!snap.per_user.contains_key(&3), "failed users are not counted");
        assert_eq!(ledger.remaining(), 0);
    }

    #[test]
    fn zero_capacity_fails_everything() {
        let ledger = Ledger::new(0);
        for u in 1..=5 {
            assert_eq!(ledger.attempt_book(u), Outcome::Failed);
        }
        let snap = ledger.snapshot();
        assert_eq!(snap.booked, 0);
        assert_eq!(snap.failed, 5);
        assert!(snap.per_user.is_empty());
    }

    #[test]
    fn repeated_user_is_counted_per_booking() {
        // The ledger itself does not deduplicate; the collector flags this.
        let ledger = Ledger::new(3);
        ledger.attempt_book(9);
        ledger.attempt_book(9);
        assert_eq!(ledger.snapshot().per_user.get(&9), Some(&2));
    }

    #[test]
    fn concurrent_threads_never_oversell() {
        let ledger = Arc::new(Ledger::new(100));

        let handles: Vec<_> = (0..8u64)
            .map(|t| {
                let ledger = ledger.clone();
                std::thread::spawn(move || {
                    for i in 0..50u64 {
                        ledger.attempt_book(t * 50 + i + 1);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        let snap = ledger.snapshot();
        assert_eq!(snap.booked, 100);
        assert_eq!(snap.failed, 300);
        assert_eq!(snap.per_user.len(), 100);
        assert!(snap.per_user.values().all(|c| *c == 1));
    }
}

//! Result collection and audit.
//!
//! The collector drains the result stream while the pool is running and keeps
//! its own per-user success tally. Once the stream is closed the tally is
//! checked against the ledger, which stays the authoritative source.

use std::collections::{BTreeMap, BTreeSet};

use tokio::sync::mpsc::Receiver;
use tracing::{debug, error, info, instrument};

use crate::ledger::LedgerSnapshot;
use crate::metrics::counters::Counters;
use crate::report::{Report, Violation};
use crate::types::{BookingResult, UserId};

pub struct Collector {
    counters: Counters,
}

/// Everything the collector saw on the result stream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Collected {
    /// Results in arrival order.
    pub results: Vec<BookingResult>,
    /// Successful bookings per user, as reported by the workers.
    pub tally: BTreeMap<UserId, u64>,
}

impl Collected {
    pub fn record(&mut self, result: BookingResult) {
        if result.outcome.is_booked() {
            *self.tally.entry(result.user_id).or_insert(0) += 1;
        }
        self.results.push(result);
    }
}

impl Collector {
    pub fn new(counters: Counters) -> Self {
        Self { counters }
    }

    /// Consumes results until every sender is gone.
    pub async fn drain(self, mut rx: Receiver<BookingResult>) -> Collected {
        info!(component = "collector", event = "startup");

        let mut collected = Collected::default();
        while let Some(result) = rx.recv().await {
            debug!(worker_id = result.worker_id, "{result}");
            Counters::incr(&self.counters.results_collected);
            collected.record(result);
        }

        info!(
            component = "collector",
            event = "shutdown",
            results = collected.results.len(),
            "result stream drained"
        );
        collected
    }
}

/// Audits a finished run. Pure: the same inputs always give the same report.
///
/// `total_users` is the number of users the run was configured for; it may
/// exceed the processed request count when the run was cancelled.
#[instrument(skip_all, target = "collector", fields(total_users = total_users))]
pub fn audit(snapshot: &LedgerSnapshot, collected: &Collected, total_users: u64) -> Report {
    let mut violations = Vec::new();

    for (user_id, count) in &snapshot.per_user {
        if *count > 1 {
            violations.push(Violation::DuplicateBooking {
                user_id: *user_id,
                count: *count,
            });
        }
    }

    if snapshot.booked > snapshot.capacity {
        violations.push(Violation::Oversold {
            booked: snapshot.booked,
            capacity: snapshot.capacity,
        });
    }

    let users: BTreeSet<UserId> = snapshot
        .per_user
        .keys()
        .chain(collected.tally.keys())
        .copied()
        .collect();

    for user_id in users {
        let ledger = snapshot.per_user.get(&user_id).copied().unwrap_or(0);
        let observed = collected.tally.get(&user_id).copied().unwrap_or(0);
        if ledger != observed {
            violations.push(Violation::TallyMismatch {
                user_id,
                ledger,
                observed,
            });
        }
    }

    let results = collected.results.len() as u64;
    if snapshot.attempts() != results {
        violations.push(Violation::LostResults {
            attempts: snapshot.attempts(),
            results,
        });
    }

    for v in &violations {
        error!(violation = ?v, "{v}");
    }
    if !violations
        .iter()
        .any(|v| matches!(v, Violation::DuplicateBooking { .. }))
    {
        info!("No duplicate ticket bookings found.");
    }

    Report {
        capacity: snapshot.capacity,
        total_users,
        total_requests: results,
        booked: snapshot.booked,
        failed: snapshot.failed,
        booked_users: snapshot
            .per_user
            .iter()
            .filter(|(_, c)| **c > 0)
            .map(|(u, _)| *u)
            .collect(),
        violations,
        cancelled: false,
        elapsed_ms: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Ledger;
    use crate::types::Outcome;
    use tokio::sync::mpsc;
    use tracing_test::traced_test;

    fn booked(user_id: UserId) -> BookingResult {
        BookingResult {
            user_id,
            outcome: Outcome::Booked,
            worker_id: 1,
        }
    }

    fn failed(user_id: UserId) -> BookingResult {
        BookingResult {
            user_id,
            outcome: Outcome::Failed,
            worker_id: 1,
        }
    }

    fn run_ledger(capacity: u64, users: &[UserId]) -> (LedgerSnapshot, Collected) {
        let ledger = Ledger::new(capacity);
        let mut collected = Collected::default();
        for u in users {
            let outcome = ledger.attempt_book(*u);
            collected.record(BookingResult {
                user_id: *u,
                outcome,
                worker_id: 1,
            });
        }
        (ledger.snapshot(), collected)
    }

    #[tokio::test]
    async fn drain_tallies_successes_only() {
        let counters = Counters::default();
        let (tx, rx) = mpsc::channel(8);
        tx.send(booked(1)).await.unwrap();
        tx.send(failed(2)).await.unwrap();
        tx.send(booked(3)).await.unwrap();
        drop(tx);

        let collected = Collector::new(counters.clone()).drain(rx).await;

        assert_eq!(collected.results.len(), 3);
        assert_eq!(collected.tally, BTreeMap::from([(1, 1), (3, 1)]));
        assert_eq!(counters.snapshot().results_collected, 3);
    }

    #[traced_test]
    #[test]
    fn clean_run_has_no_violations() {
        let (snap, collected) = run_ledger(2, &[1, 2, 3]);
        let report = audit(&snap, &collected, 3);

        assert!(report.is_clean(), "{:?}", report.violations);
        assert_eq!(report.booked, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.total_users, 3);
        assert_eq!(report.total_requests, 3);
        assert_eq!(report.booked_users, vec![1, 2]);
        assert!(logs_contain("No duplicate ticket bookings found."));
    }

    #[traced_test]
    #[test]
    fn duplicate_booking_is_reported_loudly() {
        // User 4 sent twice; the ledger books both, the audit must flag it.
        let (snap, collected) = run_ledger(5, &[4, 4, 5]);
        let report = audit(&snap, &collected, 5);

        assert_eq!(report.duplicate_users(), vec![4]);
        assert!(report.ensure_clean().is_err());
        assert!(logs_contain("User 4 booked multiple tickets: 2 times"));
    }

    #[test]
    fn tally_disagreement_is_a_violation() {
        let (snap, mut collected) = run_ledger(3, &[1, 2]);
        collected.tally.remove(&2);
        collected.tally.insert(9, 1);

        let report = audit(&snap, &collected, 2);
        assert_eq!(
            report.violations,
            vec![
                Violation::TallyMismatch {
                    user_id: 2,
                    ledger: 1,
                    observed: 0
                },
                Violation::TallyMismatch {
                    user_id: 9,
                    ledger: 0,
                    observed: 1
                },
            ]
        );
    }

    #[test]
    fn missing_results_are_detected() {
        let (snap, mut collected) = run_ledger(1, &[1, 2]);
        collected.results.pop();

        let report = audit(&snap, &collected, 2);
        assert!(report.violations.contains(&Violation::LostResults {
            attempts: 2,
            results: 1
        }));
    }

    #[test]
    fn oversold_snapshot_is_detected() {
        let snap = LedgerSnapshot {
            capacity: 1,
            booked: 2,
            failed: 0,
            per_user: BTreeMap::from([(1, 1), (2, 1)]),
        };
        let mut collected = Collected::default();
        collected.record(booked(1));
        collected.record(booked(2));

        let report = audit(&snap, &collected, 2);
        assert_eq!(
            report.violations,
            vec![Violation::Oversold {
                booked: 2,
                capacity: 1
            }]
        );
    }

    #[test]
    fn audit_is_idempotent() {
        let (snap, collected) = run_ledger(3, &[5, 1, 4, 2, 3, 3]);
        let first = audit(&snap, &collected, 5);
        let second = audit(&snap, &collected, 5);
        assert_eq!(first, second);
        assert_eq!(first.to_string(), second.to_string());
    }

    #[test]
    fn report_keeps_configured_users_apart_from_processed_requests() {
        // Only two of five users were served before the run stopped.
        let (snap, collected) = run_ledger(1, &[1, 2]);
        let report = audit(&snap, &collected, 5);

        assert_eq!(report.total_users, 5);
        assert_eq!(report.total_requests, 2);
        assert_eq!(report.booked + report.failed, report.total_requests);
        assert!(report.is_clean(), "{:?}", report.violations);
    }
}

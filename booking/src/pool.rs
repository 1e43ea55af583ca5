//! Fixed-size worker pool.
//!
//! Each worker pulls one request at a time from the shared queue, books it
//! against the ledger and pushes the result onto the result stream. Workers do
//! not talk to each other; all coordination goes through the ledger and the two
//! channels.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::mpsc::Sender;
use tracing::{Instrument, debug, info, warn};

use crate::error::{BookingError, Result};
use crate::ledger::Ledger;
use crate::metrics::counters::Counters;
use crate::queue::RequestReceiver;
use crate::shutdown::Shutdown;
use crate::types::{BookingResult, WorkerId};

pub struct WorkerPool {
    worker_count: usize,
    ledger: Arc<Ledger>,
    counters: Counters,
}

/// What the pool did, per worker.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PoolSummary {
    /// Requests processed by worker `i + 1`.
    pub processed: Vec<u64>,
}

impl PoolSummary {
    pub fn total(&self) -> u64 {
        self.processed.iter().sum()
    }
}

impl WorkerPool {
    pub fn new(worker_count: usize, ledger: Arc<Ledger>, counters: Counters) -> Self {
        Self {
            worker_count: worker_count.max(1),
            ledger,
            counters,
        }
    }

    /// Spawns every worker and waits for all of them to finish. The result
    /// stream is closed only after the last worker has exited.
    pub async fn start(
        &self,
        requests: RequestReceiver,
        results: Sender<BookingResult>,
        shutdown: Shutdown,
    ) -> Result<PoolSummary> {
        info!(component = "pool", event = "startup", workers = self.worker_count);

        let handles: Vec<_> = (1..=self.worker_count)
            .map(|worker_id| {
                let worker = Worker {
                    id: worker_id,
                    ledger: self.ledger.clone(),
                    counters: self.counters.clone(),
                };

                let span = common::logger::child_span("worker");
                span.record("worker_id", worker_id);

                tokio::spawn(
                    worker
                        .run(requests.clone(), results.clone(), shutdown.clone())
                        .instrument(span),
                )
            })
            .collect();

        drop(requests);

        let mut summary = PoolSummary::default();
        let mut join_error = None;

        for joined in join_all(handles).await {
            match joined {
                Ok(n) => summary.processed.push(n),
                Err(e) => {
                    warn!(component = "pool", error = ?e, "worker terminated abnormally");
                    summary.processed.push(0);
                    if join_error.is_none() {
                        join_error = Some(e);
                    }
                }
            }
        }

        // Every worker is gone; closing our sender closes the stream.
        drop(results);

        if let Some(e) = join_error {
            return Err(BookingError::WorkerJoin(e));
        }

        info!(
            component = "pool",
            event = "shutdown",
            processed = summary.total(),
            "all workers finished"
        );
        Ok(summary)
    }
}

struct Worker {
    id: WorkerId,
    ledger: Arc<Ledger>,
    counters: Counters,
}

impl Worker {
    /// Worker loop. Exits when the queue is closed and drained, when
    /// cancellation is requested, or when the result stream is gone.
    async fn run(
        self,
        requests: RequestReceiver,
        results: Sender<BookingResult>,
        mut shutdown: Shutdown,
    ) -> u64 {
        Counters::incr(&self.counters.workers_started);
        debug!(component = "worker", worker_id = self.id, event = "startup");

        let mut processed = 0u64;

        loop {
            let req = tokio::select! {
                biased;
                _ = shutdown.triggered() => {
                    debug!(component = "worker", worker_id = self.id, "cancellation observed");
                    break;
                }
                next = requests.recv() => match next {
                    Some(req) => req,
                    None => break,
                },
            };

            let outcome = self.ledger.attempt_book(req.user_id);
            if outcome.is_booked() {
                Counters::incr(&self.counters.attempts_booked);
            } else {
                Counters::incr(&self.counters.attempts_failed);
            }

            let result = BookingResult {
                user_id: req.user_id,
                outcome,
                worker_id: self.id,
            };

            if results.send(result).await.is_err() {
                warn!(
                    component = "worker",
                    worker_id = self.id,
                    user_id = req.user_id,
                    "result stream closed; dropping result"
                );
                break;
            }
            processed += 1;
        }

        Counters::incr(&self.counters.workers_exited);
        debug!(component = "worker", worker_id = self.id, processed, event = "shutdown");
        processed
    }
}

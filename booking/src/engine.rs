//! Orchestrates a single booking run.
//!
//! Flow:
//! 1) Collector starts draining the result stream.
//! 2) Dispatcher enqueues one request per user, then closes the queue.
//! 3) Worker pool books every request against the ledger and closes the
//!    result stream once the last worker exits.
//! 4) Collector finishes draining; the ledger snapshot is audited into a report.
//!
//! Dispatcher, pool and collector run concurrently. Cancellation is cooperative:
//! see [`Shutdown`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::logger::{TraceId, child_span, root_span, warn_if_slow};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{Instrument, info, warn};

use crate::collector::{self, Collector};
use crate::config::BookingConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{BookingError, Result};
use crate::ledger::Ledger;
use crate::metrics::counters::{Counters, CountersSnapshot};
use crate::pool::{PoolSummary, WorkerPool};
use crate::queue;
use crate::report::Report;
use crate::shutdown::Shutdown;
use crate::types::{BookingResult, RunState};

const SLOW_DRAIN: Duration = Duration::from_secs(1);

pub struct BookingEngine {
    config: BookingConfig,
    ledger: Arc<Ledger>,
    counters: Counters,
    /// Every state the engine has been in, oldest first. Never empty.
    states: Mutex<Vec<RunState>>,
    trace_id: TraceId,
}

/// Everything a finished run produced.
#[derive(Clone, Debug)]
pub struct RunOutput {
    pub report: Report,
    /// Results in the order the collector received them.
    pub results: Vec<BookingResult>,
    pub pool: PoolSummary,
    pub counters: CountersSnapshot,
}

impl BookingEngine {
    /// Validates the configuration and builds a fresh ledger. One engine
    /// serves exactly one run.
    pub fn new(config: BookingConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            ledger: Arc::new(Ledger::new(config.total_tickets)),
            config,
            counters: Counters::default(),
            states: Mutex::new(vec![RunState::Idle]),
            trace_id: TraceId::default(),
        })
    }

    pub fn with_trace_id(mut self, trace_id: TraceId) -> Self {
        self.trace_id = trace_id;
        self
    }

    pub fn config(&self) -> &BookingConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn state(&self) -> RunState {
        self.states.lock().last().copied().unwrap_or(RunState::Idle)
    }

    /// The states this engine has passed through, starting with `Idle`.
    pub fn state_history(&self) -> Vec<RunState> {
        self.states.lock().clone()
    }

    pub async fn run(&self) -> Result<RunOutput> {
        self.run_with_shutdown(Shutdown::never()).await
    }

    /// Runs to completion, or until `shutdown` fires. Requests already taken
    /// by a worker when cancellation is observed still complete.
    pub async fn run_with_shutdown(&self, shutdown: Shutdown) -> Result<RunOutput> {
        {
            let mut states = self.states.lock();
            let current = states.last().copied().unwrap_or(RunState::Idle);
            if current != RunState::Idle {
                return Err(BookingError::AlreadyStarted(current));
            }
            states.push(RunState::Running);
        }

        // Failed, panicked and abandoned runs end in `Done` too.
        let _finish = FinishOnDrop(self);

        let span = root_span("booking_run", &self.trace_id);
        span.record("capacity", self.config.total_tickets);
        span.record("users", self.config.total_users);

        self.execute(shutdown).instrument(span).await
    }

    async fn execute(&self, shutdown: Shutdown) -> Result<RunOutput> {
        let started = Instant::now();
        let cfg = &self.config;

        info!(
            total_tickets = cfg.total_tickets,
            total_users = cfg.total_users,
            worker_count = cfg.worker_count,
            "starting booking run"
        );

        let (req_tx, req_rx) = queue::bounded(cfg.buffer_capacity());
        let (res_tx, res_rx) = mpsc::channel::<BookingResult>(cfg.buffer_capacity());

        let collector = tokio::spawn(
            Collector::new(self.counters.clone())
                .drain(res_rx)
                .instrument(child_span("collector")),
        );

        let dispatcher = tokio::spawn(
            Dispatcher::new(cfg.total_users, cfg.dispatch_jitter(), self.counters.clone())
                .run(req_tx, shutdown.clone())
                .instrument(child_span("dispatcher")),
        );

        let pool = WorkerPool::new(cfg.worker_count, self.ledger.clone(), self.counters.clone())
            .start(req_rx, res_tx, shutdown.clone())
            .await?;

        let dispatched = dispatcher
            .await
            .map_err(|source| BookingError::TaskJoin {
                task: "dispatcher",
                source,
            })?;

        self.set_state(RunState::Draining);

        let collected = warn_if_slow("collector_drain", SLOW_DRAIN, collector)
            .await
            .map_err(|source| BookingError::TaskJoin {
                task: "collector",
                source,
            })?;

        let snapshot = self.ledger.snapshot();
        let mut report = collector::audit(&snapshot, &collected, cfg.total_users);
        report.cancelled = shutdown.is_triggered() && report.total_requests < cfg.total_users;
        report.elapsed_ms = started.elapsed().as_millis() as u64;

        if report.cancelled {
            warn!(
                dispatched,
                processed = report.total_requests,
                "run cancelled before every user was served"
            );
        }

        info!(
            booked = report.booked,
            failed = report.failed,
            violations = report.violations.len(),
            elapsed_ms = report.elapsed_ms,
            "booking run finished"
        );

        Ok(RunOutput {
            report,
            results: collected.results,
            pool,
            counters: self.counters.snapshot(),
        })
    }

    fn set_state(&self, next: RunState) {
        let mut states = self.states.lock();
        tracing::debug!(from = ?states.last(), to = ?next, "run state transition");
        states.push(next);
    }
}

struct FinishOnDrop<'a>(&'a BookingEngine);

impl Drop for FinishOnDrop<'_> {
    fn drop(&mut self) {
        self.0.set_state(RunState::Done);
    }
}

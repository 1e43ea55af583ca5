use std::fmt;

use serde::Serialize;

/// Users are identified by a dense range `1..=total_users`.
pub type UserId = u64;

/// Workers are numbered `1..=worker_count`.
pub type WorkerId = usize;

/// One pending booking attempt, owned by whichever stage currently holds it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BookingRequest {
    pub user_id: UserId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Outcome {
    Booked,
    /// Capacity was exhausted. Terminal: failed requests are never retried.
    Failed,
}

impl Outcome {
    pub fn is_booked(self) -> bool {
        matches!(self, Outcome::Booked)
    }
}

/// Envelope placed on the result stream right after the ledger call returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BookingResult {
    pub user_id: UserId,
    pub outcome: Outcome,
    pub worker_id: WorkerId,
}

impl fmt::Display for BookingResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.outcome {
            Outcome::Booked => write!(f, "User {} successfully booked a ticket.", self.user_id),
            Outcome::Failed => write!(f, "User {} failed to book a ticket.", self.user_id),
        }
    }
}

/// Lifecycle of a single run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RunState {
    Idle,
    /// Dispatcher, workers and collector are all active.
    Running,
    /// Workers are done and the result stream is closed; the collector is finishing.
    Draining,
    Done,
}

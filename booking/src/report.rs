use std::fmt;

use serde::Serialize;

use crate::error::{BookingError, Result};
use crate::types::UserId;

/// A broken correctness guarantee found while auditing a run. A well-formed
/// execution never produces any of these.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// A user holds more than one ticket.
    DuplicateBooking { user_id: UserId, count: u64 },
    /// The collector saw a different number of successes than the ledger recorded.
    TallyMismatch {
        user_id: UserId,
        ledger: u64,
        observed: u64,
    },
    Oversold { booked: u64, capacity: u64 },
    /// Attempts recorded by the ledger that never reached the collector, or the reverse.
    LostResults { attempts: u64, results: u64 },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::DuplicateBooking { user_id, count } => {
                write!(f, "User {user_id} booked multiple tickets: {count} times")
            }
            Violation::TallyMismatch {
                user_id,
                ledger,
                observed,
            } => write!(
                f,
                "User {user_id} has {ledger} ledger booking(s) but {observed} reported success(es)"
            ),
            Violation::Oversold { booked, capacity } => {
                write!(f, "Booked {booked} tickets with only {capacity} available")
            }
            Violation::LostResults { attempts, results } => {
                write!(
                    f,
                    "Ledger recorded {attempts} attempts but {results} results were collected"
                )
            }
        }
    }
}

/// Final, read-only summary of a run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    pub capacity: u64,
    /// Users configured for the run.
    pub total_users: u64,
    /// Requests that actually produced an outcome.
    pub total_requests: u64,
    pub booked: u64,
    pub failed: u64,
    /// Users holding a ticket, ascending.
    pub booked_users: Vec<UserId>,
    pub violations: Vec<Violation>,
    /// Cancellation stopped the run before every user was served.
    pub cancelled: bool,
    pub elapsed_ms: u64,
}

impl Report {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    /// Users with more than one successful booking.
    pub fn duplicate_users(&self) -> Vec<UserId> {
        self.violations
            .iter()
            .filter_map(|v| match v {
                Violation::DuplicateBooking { user_id, .. } => Some(*user_id),
                _ => None,
            })
            .collect()
    }

    /// Turns any violation into an error, for callers that must fail hard.
    pub fn ensure_clean(&self) -> Result<()> {
        if self.is_clean() {
            return Ok(());
        }

        let details = self
            .violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Err(BookingError::InvariantViolated(format!(
            "{} violation(s): {details}",
            self.violations.len()
        )))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for v in &self.violations {
            writeln!(f, "{v}")?;
        }
        if self.duplicate_users().is_empty() {
            writeln!(f, "No duplicate ticket bookings found.")?;
        }
        if self.cancelled {
            writeln!(
                f,
                "Run cancelled after {} of {} requests.",
                self.total_requests, self.total_users
            )?;
        }
        write!(
            f,
            "Total tickets booked: {} and total failed bookings are {}",
            self.booked, self.failed
        )
    }
}

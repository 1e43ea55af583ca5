use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::error::{BookingError, Result};

/// Largest user count a run can buffer without blocking the dispatcher.
pub const MAX_USERS: u64 = Semaphore::MAX_PERMITS as u64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BookingConfig {
    /// Number of tickets available for the whole run. Zero is allowed and
    /// makes every attempt fail.
    pub total_tickets: u64,

    /// Number of users competing for tickets. Each user sends exactly one
    /// request, identified by `1..=total_users`.
    pub total_users: u64,

    /// Size of the worker pool. Must be at least one.
    pub worker_count: usize,

    /// Optional artificial delay (milliseconds, inclusive range) applied by the
    /// dispatcher before each enqueue. Used to spread requests out over time
    /// and shake out interleavings.
    pub dispatch_jitter_ms: Option<RangeInclusive<u64>>,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            total_tickets: 50,
            total_users: 100,
            worker_count: 10,
            dispatch_jitter_ms: None,
        }
    }
}

impl BookingConfig {
    pub fn new(total_tickets: u64, total_users: u64, worker_count: usize) -> Self {
        Self {
            total_tickets,
            total_users,
            worker_count,
            dispatch_jitter_ms: None,
        }
    }

    /// Reads defaults from the environment, falling back to the built-in
    /// defaults for anything unset or unparsable.
    ///
    /// - `BOOKING_TOTAL_TICKETS`
    /// - `BOOKING_TOTAL_USERS`
    /// - `BOOKING_WORKER_COUNT`
    /// - `BOOKING_DISPATCH_JITTER_MS` (`MIN-MAX`)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            total_tickets: env_or("BOOKING_TOTAL_TICKETS", defaults.total_tickets),
            total_users: env_or("BOOKING_TOTAL_USERS", defaults.total_users),
            worker_count: env_or("BOOKING_WORKER_COUNT", defaults.worker_count),
            dispatch_jitter_ms: std::env::var("BOOKING_DISPATCH_JITTER_MS")
                .ok()
                .and_then(|v| parse_jitter(&v).ok()),
        }
    }

    pub fn with_dispatch_jitter(mut self, range_ms: RangeInclusive<u64>) -> Self {
        self.dispatch_jitter_ms = Some(range_ms);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(BookingError::InvalidConfig(
                "worker_count must be at least 1".into(),
            ));
        }

        // Every user gets a queue slot and a result slot, and tokio caps a
        // channel's buffer at the semaphore permit limit.
        if self.total_users > MAX_USERS {
            return Err(BookingError::InvalidConfig(format!(
                "total_users {} exceeds the supported maximum of {MAX_USERS}",
                self.total_users
            )));
        }

        if let Some(range) = &self.dispatch_jitter_ms {
            if range.start() > range.end() {
                return Err(BookingError::InvalidConfig(format!(
                    "dispatch jitter range {}-{} is inverted",
                    range.start(),
                    range.end()
                )));
            }
        }

        Ok(())
    }

    /// Queue and result buffers are sized to the expected load so neither the
    /// dispatcher nor the workers block on send. tokio channels need at least
    /// one slot and at most [`Semaphore::MAX_PERMITS`].
    pub fn buffer_capacity(&self) -> usize {
        usize::try_from(self.total_users)
            .unwrap_or(usize::MAX)
            .clamp(1, Semaphore::MAX_PERMITS)
    }

    pub fn dispatch_jitter(&self) -> Option<RangeInclusive<Duration>> {
        self.dispatch_jitter_ms
            .as_ref()
            .map(|r| Duration::from_millis(*r.start())..=Duration::from_millis(*r.end()))
    }
}

/// Parses a `MIN-MAX` millisecond range, or a single value meaning a fixed delay.
pub fn parse_jitter(s: &str) -> Result<RangeInclusive<u64>> {
    let bad = || {
        BookingError::InvalidConfig(format!("invalid jitter range `{s}`, expected MIN-MAX"))
    };

    let (lo, hi) = match s.split_once('-') {
        Some((lo, hi)) => (lo.trim(), hi.trim()),
        None => (s.trim(), s.trim()),
    };

    let lo: u64 = lo.parse().map_err(|_| bad())?;
    let hi: u64 = hi.parse().map_err(|_| bad())?;
    if lo > hi {
        return Err(bad());
    }
    Ok(lo..=hi)
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

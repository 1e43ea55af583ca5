use std::ops::RangeInclusive;

use booking::config::{BookingConfig, parse_jitter};
use clap::Parser;

#[derive(Debug, Parser)]
#[clap(name = "ticket-booking", version)]
pub struct Cli {
    /// Total number of tickets available
    #[clap(long, alias = "totalTickets")]
    pub total_tickets: Option<u64>,

    /// Total number of users trying to book tickets
    #[clap(long, alias = "totalUsers")]
    pub total_users: Option<u64>,

    /// Number of workers processing the bookings
    #[clap(long, alias = "workerCount")]
    pub worker_count: Option<usize>,

    /// Random delay before each request is enqueued, in ms (e.g. `100-500`)
    #[clap(long, value_parser = jitter_arg)]
    pub dispatch_jitter_ms: Option<RangeInclusive<u64>>,

    /// Do not print one line per booking attempt
    #[clap(long)]
    pub quiet: bool,

    /// Print the final report as JSON
    #[clap(long)]
    pub json: bool,

    /// Emit logs as JSON
    #[clap(long)]
    pub json_logs: bool,
}

fn jitter_arg(s: &str) -> Result<RangeInclusive<u64>, String> {
    parse_jitter(s).map_err(|e| e.to_string())
}

impl Cli {
    /// Flags win over environment defaults.
    pub fn to_config(&self) -> BookingConfig {
        let mut cfg = BookingConfig::from_env();

        if let Some(v) = self.total_tickets {
            cfg.total_tickets = v;
        }
        if let Some(v) = self.total_users {
            cfg.total_users = v;
        }
        if let Some(v) = self.worker_count {
            cfg.worker_count = v;
        }
        if let Some(r) = &self.dispatch_jitter_ms {
            cfg.dispatch_jitter_ms = Some(r.clone());
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let cli = Cli::parse_from([
            "ticket-booking",
            "--total-tickets",
            "5",
            "--total-users",
            "10",
            "--worker-count",
            "1",
            "--dispatch-jitter-ms",
            "100-500",
        ]);
        let cfg = cli.to_config();

        assert_eq!(cfg.total_tickets, 5);
        assert_eq!(cfg.total_users, 10);
        assert_eq!(cfg.worker_count, 1);
        assert_eq!(cfg.dispatch_jitter_ms, Some(100..=500));
    }

    #[test]
    fn camel_case_aliases_are_accepted() {
        let cli = Cli::parse_from([
            "ticket-booking",
            "--totalTickets",
            "500",
            "--totalUsers",
            "1500",
            "--workerCount",
            "50",
        ]);
        assert_eq!(cli.total_tickets, Some(500));
        assert_eq!(cli.total_users, Some(1500));
        assert_eq!(cli.worker_count, Some(50));
    }

    #[test]
    fn bad_jitter_is_a_parse_error() {
        let res = Cli::try_parse_from(["ticket-booking", "--dispatch-jitter-ms", "9-1"]);
        assert!(res.is_err());
    }
}

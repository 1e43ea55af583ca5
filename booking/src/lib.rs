//! Concurrent ticket booking engine.
//!
//! A fixed pool of tickets is shared by a set of users. The dispatcher enqueues
//! one request per user, a fixed pool of workers books against a single
//! mutex-guarded [`ledger::Ledger`], and the collector audits every outcome
//! before producing a [`report::Report`].

pub mod collector;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod pool;
pub mod queue;
pub mod report;
pub mod shutdown;
pub mod types;

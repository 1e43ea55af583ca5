use thiserror::Error;
use tokio::task::JoinError;

use crate::types::RunState;

#[derive(Error, Debug)]
pub enum BookingError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("engine already used (state {0:?}); build a new engine per run")]
    AlreadyStarted(RunState),

    #[error("booking worker failed to join: {0}")]
    WorkerJoin(#[from] JoinError),

    #[error("{task} task failed to join: {source}")]
    TaskJoin {
        task: &'static str,
        #[source]
        source: JoinError,
    },

    #[error("booking invariant violated: {0}")]
    InvariantViolated(String),
}

pub type Result<T> = std::result::Result<T, BookingError>;

//! Errors surfaced by the agent core.

use crate::types::TaskState;
use thiserror::Error;

/// Failure talking to the reasoning oracle. Always fatal to the task.
#[derive(Debug, Clone, Error)]
pub enum OracleError {
    #[error("Oracle unavailable: {0}")]
    Unavailable(String),
    #[error("Oracle request timed out after {0}s")]
    Timeout(u64),
    #[error("Oracle returned an unusable response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("max_steps must be at least 1")]
    InvalidStepBudget,

    /// The oracle failed mid-task. `partial` holds the transcript gathered
    /// up to the failed step.
    #[error("Oracle unavailable while working on '{goal}': {source}")]
    OracleUnavailable {
        goal: String,
        #[source]
        source: OracleError,
        partial: Box<TaskState>,
    },
}

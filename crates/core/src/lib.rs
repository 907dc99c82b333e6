//! Core of the Kalki assistant: turns a natural-language goal into a
//! sequence of capability invocations by repeatedly consulting a reasoning
//! oracle.

pub mod agent_loop;
pub mod completion;
pub mod error;
pub mod extractor;
pub mod oracle;
pub mod prompt;
pub mod types;

pub use agent_loop::{AgentLoop, DEFAULT_MAX_SUBGOALS};
pub use completion::{CompletionPolicy, KeywordCompletion};
pub use error::{AgentError, OracleError};
pub use extractor::{extract_action, parse_subgoals, ThoughtExtractor};
pub use oracle::Oracle;
pub use types::*;

//! Plain-text summaries of finished tasks.

use kalki_core::{AgentError, TaskState, TaskStatus};
use std::fmt::Write;

fn headline(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Completed => "completed",
        TaskStatus::BudgetExhausted => "not completed (step budget exhausted)",
        TaskStatus::Cancelled => "not completed (cancelled)",
        TaskStatus::Failed => "failed",
        TaskStatus::Running => "still running",
    }
}

fn transcript(out: &mut String, state: &TaskState) {
    for (idx, thought) in state.thoughts().iter().enumerate() {
        let _ = writeln!(
            out,
            "  {:>2}. [{}] {}",
            idx + 1,
            thought.kind(),
            thought.content().replace('\n', " ")
        );
    }
    for subtask in state.subtasks() {
        let _ = writeln!(
            out,
            "  sub-goal '{}': {} ({} steps)",
            subtask.goal, subtask.status, subtask.steps_consumed
        );
    }
}

pub fn render(goal: &str, result: &Result<TaskState, AgentError>) -> String {
    let mut out = String::new();
    match result {
        Ok(state) => {
            let _ = writeln!(
                out,
                "{goal}: {} after {} step(s)",
                headline(state.status()),
                state.steps_taken()
            );
            if let Some(outcome) = state.last_outcome() {
                let _ = writeln!(out, "  last outcome: {}", outcome.summary());
            }
            transcript(&mut out, state);
        }
        Err(AgentError::OracleUnavailable {
            source, partial, ..
        }) => {
            let _ = writeln!(out, "{goal}: oracle error: {source}");
            transcript(&mut out, partial);
        }
        Err(err) => {
            let _ = writeln!(out, "{goal}: {err}");
        }
    }
    out
}

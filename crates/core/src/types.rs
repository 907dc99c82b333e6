//! Task data model: thoughts, actions and the per-goal task state.

use chrono::{DateTime, Utc};
use kalki_tools::{ActionOutcome, Parameters};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThoughtKind {
    Planning,
    ActionSelection,
    Observation,
    Reflection,
}

impl fmt::Display for ThoughtKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ThoughtKind::Planning => "planning",
            ThoughtKind::ActionSelection => "action_selection",
            ThoughtKind::Observation => "observation",
            ThoughtKind::Reflection => "reflection",
        };
        f.write_str(label)
    }
}

/// One classified unit of a task's reasoning transcript. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thought {
    kind: ThoughtKind,
    content: String,
    created_at: DateTime<Utc>,
}

impl Thought {
    pub fn new(kind: ThoughtKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> ThoughtKind {
        self.kind
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// A capability call extracted from an action-selection thought.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub capability: String,
    pub parameters: Parameters,
}

/// Where a task stands. Everything but `Running` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Completed,
    BudgetExhausted,
    Cancelled,
    /// The oracle failed; see `AgentError::OracleUnavailable`.
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::BudgetExhausted => "budget exhausted",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// The action dispatched last and what came back. Kept as a pair so one is
/// never present without the other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dispatch {
    pub action: Action,
    pub outcome: ActionOutcome,
}

/// The parent's record of one sub-goal it delegated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtaskReport {
    pub goal: String,
    pub status: TaskStatus,
    /// Steps the sub-goal and its own descendants consumed.
    pub steps_consumed: usize,
}

/// Progress record for one goal, owned by a single loop invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskState {
    goal: String,
    status: TaskStatus,
    thoughts: Vec<Thought>,
    last_dispatch: Option<Dispatch>,
    subtasks: Vec<SubtaskReport>,
    steps_taken: usize,
}

impl TaskState {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            status: TaskStatus::Running,
            thoughts: Vec::new(),
            last_dispatch: None,
            subtasks: Vec::new(),
            steps_taken: 0,
        }
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn is_terminal(&self) -> bool {
        self.status != TaskStatus::Running
    }

    /// Chronological transcript.
    pub fn thoughts(&self) -> &[Thought] {
        &self.thoughts
    }

    pub fn last_action(&self) -> Option<&Action> {
        self.last_dispatch.as_ref().map(|d| &d.action)
    }

    pub fn last_outcome(&self) -> Option<&ActionOutcome> {
        self.last_dispatch.as_ref().map(|d| &d.outcome)
    }

    pub fn last_dispatch(&self) -> Option<&Dispatch> {
        self.last_dispatch.as_ref()
    }

    pub fn subtasks(&self) -> &[SubtaskReport] {
        &self.subtasks
    }

    /// Steps this task itself took, excluding its sub-goals.
    pub fn steps_taken(&self) -> usize {
        self.steps_taken
    }

    pub(crate) fn push_thought(&mut self, thought: Thought) {
        self.thoughts.push(thought);
    }

    pub(crate) fn record_dispatch(&mut self, action: Action, outcome: ActionOutcome) {
        self.last_dispatch = Some(Dispatch { action, outcome });
    }

    pub(crate) fn record_subtask(&mut self, report: SubtaskReport) {
        self.subtasks.push(report);
    }

    pub(crate) fn begin_step(&mut self) -> usize {
        self.steps_taken += 1;
        self.steps_taken
    }

    /// Moves a running task into a terminal status. Later calls are ignored,
    /// so a task completes at most once.
    pub(crate) fn finish(&mut self, status: TaskStatus) {
        if self.is_terminal() {
            debug!(goal = %self.goal, current = %self.status, ignored = %status, "Task already terminal");
            return;
        }
        self.status = status;
    }
}

//! The task-execution loop.
//!
//! Each step asks the oracle what to do next, classifies the reply and
//! branches:
//!
//! - **planning**: ask for sub-goals and run each one recursively,
//!   depth-first, drawing on the same step budget as the parent;
//! - **action selection**: extract an action payload and dispatch it
//!   through the capability registry, recording an observation;
//! - **reflection**: ask whether the goal is reached.
//!
//! The loop stops when the task completes, the shared budget runs out or
//! the cancellation token fires. Only oracle failures are errors.

use crate::completion::{CompletionPolicy, KeywordCompletion};
use crate::error::{AgentError, OracleError};
use crate::extractor::{extract_action, parse_subgoals, ThoughtExtractor};
use crate::oracle::Oracle;
use crate::prompt;
use crate::types::{Action, SubtaskReport, TaskState, TaskStatus, Thought, ThoughtKind};
use async_recursion::async_recursion;
use kalki_tools::{ActionOutcome, CapabilityInfo, CapabilityRegistry};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const DEFAULT_MAX_SUBGOALS: usize = 5;

/// Steps shared by a top-level task and every sub-goal below it.
#[derive(Debug)]
struct StepBudget {
    limit: usize,
    used: usize,
}

impl StepBudget {
    fn new(limit: usize) -> Self {
        Self { limit, used: 0 }
    }

    fn try_consume(&mut self) -> bool {
        if self.used >= self.limit {
            return false;
        }
        self.used += 1;
        true
    }

    fn remaining(&self) -> usize {
        self.limit - self.used
    }
}

/// How a step ended, short of an oracle failure.
enum StepFlow {
    Continue,
    Cancelled,
}

/// A task run cut short by the oracle.
struct Interrupted {
    source: OracleError,
    partial: TaskState,
}

pub struct AgentLoop {
    oracle: Arc<dyn Oracle>,
    registry: Arc<CapabilityRegistry>,
    extractor: ThoughtExtractor,
    completion: Arc<dyn CompletionPolicy>,
    max_subgoals: usize,
}

impl AgentLoop {
    pub fn new(oracle: Arc<dyn Oracle>, registry: Arc<CapabilityRegistry>) -> Self {
        Self {
            oracle,
            registry,
            extractor: ThoughtExtractor::default(),
            completion: Arc::new(KeywordCompletion::default()),
            max_subgoals: DEFAULT_MAX_SUBGOALS,
        }
    }

    pub fn with_extractor(mut self, extractor: ThoughtExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_completion_policy(mut self, policy: Arc<dyn CompletionPolicy>) -> Self {
        self.completion = policy;
        self
    }

    pub fn with_max_subgoals(mut self, max_subgoals: usize) -> Self {
        self.max_subgoals = max_subgoals;
        self
    }

    /// Run `goal` until it completes or `max_steps` steps have been used.
    pub async fn execute_task(&self, goal: &str, max_steps: usize) -> Result<TaskState, AgentError> {
        self.execute_task_with_cancel(goal, max_steps, CancellationToken::new())
            .await
    }

    /// Like [`execute_task`](Self::execute_task), but stops at the next
    /// suspension point once `cancel` fires and returns the partial state
    /// with status `Cancelled`. An in-flight capability call is allowed to
    /// finish.
    pub async fn execute_task_with_cancel(
        &self,
        goal: &str,
        max_steps: usize,
        cancel: CancellationToken,
    ) -> Result<TaskState, AgentError> {
        if max_steps == 0 {
            return Err(AgentError::InvalidStepBudget);
        }

        let mut budget = StepBudget::new(max_steps);
        match self.run(goal.to_string(), &mut budget, &cancel, 0).await {
            Ok(state) => {
                info!(
                    goal,
                    status = %state.status(),
                    steps = budget.used,
                    thoughts = state.thoughts().len(),
                    "Task finished"
                );
                Ok(state)
            }
            Err(Interrupted { source, partial }) => {
                error!(goal, steps = budget.used, "Task aborted: {}", source);
                Err(AgentError::OracleUnavailable {
                    goal: goal.to_string(),
                    source,
                    partial: Box::new(partial),
                })
            }
        }
    }

    #[async_recursion]
    async fn run(
        &self,
        goal: String,
        budget: &mut StepBudget,
        cancel: &CancellationToken,
        depth: usize,
    ) -> Result<TaskState, Interrupted> {
        let mut state = TaskState::new(goal);
        info!(goal = %state.goal(), depth, remaining = budget.remaining(), "Starting task");

        while !state.is_terminal() {
            if cancel.is_cancelled() {
                info!(goal = %state.goal(), "Task cancelled");
                state.finish(TaskStatus::Cancelled);
                break;
            }
            if !budget.try_consume() {
                warn!(goal = %state.goal(), steps = state.steps_taken(), "Step budget exhausted");
                state.finish(TaskStatus::BudgetExhausted);
                break;
            }

            let step = state.begin_step();
            debug!(goal = %state.goal(), depth, step, "Step");
            match self.step(&mut state, budget, cancel, depth).await {
                Ok(StepFlow::Continue) => {}
                Ok(StepFlow::Cancelled) => {
                    info!(goal = %state.goal(), step, "Task cancelled");
                    state.finish(TaskStatus::Cancelled);
                }
                Err(source) => {
                    state.finish(TaskStatus::Failed);
                    return Err(Interrupted {
                        source,
                        partial: state,
                    });
                }
            }
        }

        Ok(state)
    }

    async fn step(
        &self,
        state: &mut TaskState,
        budget: &mut StepBudget,
        cancel: &CancellationToken,
        depth: usize,
    ) -> Result<StepFlow, OracleError> {
        let capabilities = self.registry.list();
        let prompt = prompt::thinking_prompt(state, &capabilities);
        let Some(reply) = self.ask(&prompt, cancel).await? else {
            return Ok(StepFlow::Cancelled);
        };

        let thought = self.extractor.classify(&reply);
        let kind = thought.kind();
        debug!(goal = %state.goal(), %kind, "Classified reply");
        state.push_thought(thought);

        match kind {
            ThoughtKind::Planning => self.plan(state, &capabilities, budget, cancel, depth).await,
            ThoughtKind::ActionSelection => {
                self.act(state, &reply).await;
                Ok(StepFlow::Continue)
            }
            ThoughtKind::Reflection => self.reflect(state, cancel).await,
            // The extractor never yields observations.
            ThoughtKind::Observation => Ok(StepFlow::Continue),
        }
    }

    /// One oracle round-trip, abandoned if `cancel` fires first.
    async fn ask(&self, prompt: &str, cancel: &CancellationToken) -> Result<Option<String>, OracleError> {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(None),
            reply = self.oracle.generate(prompt) => reply.map(Some),
        }
    }

    async fn plan(
        &self,
        state: &mut TaskState,
        capabilities: &[CapabilityInfo],
        budget: &mut StepBudget,
        cancel: &CancellationToken,
        depth: usize,
    ) -> Result<StepFlow, OracleError> {
        let prompt = prompt::decomposition_prompt(state.goal(), capabilities);
        let Some(reply) = self.ask(&prompt, cancel).await? else {
            return Ok(StepFlow::Cancelled);
        };

        let subgoals = parse_subgoals(&reply, self.max_subgoals);
        if subgoals.is_empty() {
            warn!(goal = %state.goal(), "Planning produced no sub-goals");
            state.push_thought(Thought::new(
                ThoughtKind::Observation,
                "Planning produced no sub-goals",
            ));
            return Ok(StepFlow::Continue);
        }
        info!(goal = %state.goal(), count = subgoals.len(), "Delegating sub-goals");

        let mut flow = StepFlow::Continue;
        let mut lines = Vec::with_capacity(subgoals.len());
        for subgoal in subgoals {
            if cancel.is_cancelled() {
                flow = StepFlow::Cancelled;
                break;
            }
            if budget.remaining() == 0 {
                lines.push(format!("'{subgoal}': skipped, step budget exhausted"));
                continue;
            }

            let before = budget.used;
            let child = match self.run(subgoal.clone(), budget, cancel, depth + 1).await {
                Ok(child) => child,
                Err(Interrupted { source, .. }) => {
                    state.record_subtask(SubtaskReport {
                        goal: subgoal,
                        status: TaskStatus::Failed,
                        steps_consumed: budget.used - before,
                    });
                    return Err(source);
                }
            };
            let report = SubtaskReport {
                goal: subgoal,
                status: child.status(),
                steps_consumed: budget.used - before,
            };
            lines.push(format!(
                "'{}': {} after {} step(s)",
                report.goal, report.status, report.steps_consumed
            ));
            let cancelled = report.status == TaskStatus::Cancelled;
            state.record_subtask(report);
            if cancelled {
                flow = StepFlow::Cancelled;
                break;
            }
        }

        if !lines.is_empty() {
            state.push_thought(Thought::new(
                ThoughtKind::Observation,
                format!("Sub-goal results: {}", lines.join("; ")),
            ));
        }
        Ok(flow)
    }

    async fn act(&self, state: &mut TaskState, reply: &str) {
        let Some(action) = extract_action(reply) else {
            warn!(goal = %state.goal(), "No well-formed action payload in reply");
            state.push_thought(Thought::new(
                ThoughtKind::Observation,
                "No actionable step: the reply did not contain a well-formed action payload",
            ));
            return;
        };

        info!(goal = %state.goal(), capability = %action.capability, "Dispatching action");
        let outcome = self
            .registry
            .invoke(&action.capability, action.parameters.clone())
            .await;
        let observation = observe(&action, &outcome);
        state.record_dispatch(action, outcome);
        state.push_thought(Thought::new(ThoughtKind::Observation, observation));
    }

    async fn reflect(
        &self,
        state: &mut TaskState,
        cancel: &CancellationToken,
    ) -> Result<StepFlow, OracleError> {
        let prompt = prompt::reflection_prompt(state);
        let Some(reply) = self.ask(&prompt, cancel).await? else {
            return Ok(StepFlow::Cancelled);
        };

        if self.completion.is_complete(&reply) {
            info!(goal = %state.goal(), "Reflection judged the goal complete");
            state.finish(TaskStatus::Completed);
        } else {
            debug!(goal = %state.goal(), "Reflection: not complete");
        }
        Ok(StepFlow::Continue)
    }
}

fn observe(action: &Action, outcome: &ActionOutcome) -> String {
    if outcome.success {
        format!("Action {} succeeded: {}", action.capability, outcome.summary())
    } else {
        format!("Action {} failed: {}", action.capability, outcome.summary())
    }
}

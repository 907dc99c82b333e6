//! End-to-end behaviour of the agent loop against scripted oracles.

#![allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{CancellingCapability, RecordingCapability, ScriptedOracle, StalledOracle};
use kalki_core::*;
use kalki_tools::{CapabilityRegistry, EchoCapability, Registration};
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;

const OPEN_EXAMPLE: &str = r#"{"command":"open_url","params":{"url":"https://example.com"}}"#;

fn kinds(state: &TaskState) -> Vec<ThoughtKind> {
    state.thoughts().iter().map(Thought::kind).collect()
}

fn registry_with(capability: Arc<RecordingCapability>) -> Arc<CapabilityRegistry> {
    let registry = Arc::new(CapabilityRegistry::new());
    registry.register_capability(capability);
    registry
}

#[tokio::test]
async fn test_open_example_com_scenario() {
    let opener = Arc::new(RecordingCapability::new("open_url"));
    let oracle = Arc::new(ScriptedOracle::new(&[OPEN_EXAMPLE, "task complete"]));
    let agent = AgentLoop::new(oracle.clone(), registry_with(opener.clone()));

    let state = agent.execute_task("open example.com", 5).await.unwrap();

    assert!(state.completed());
    assert_eq!(state.steps_taken(), 2);
    assert_eq!(
        kinds(&state),
        vec![
            ThoughtKind::ActionSelection,
            ThoughtKind::Observation,
            ThoughtKind::Reflection
        ]
    );
    assert!(state.last_outcome().unwrap().success);
    assert_eq!(state.last_action().unwrap().capability, "open_url");
    assert_eq!(opener.calls(), 1);
    assert_eq!(
        opener.seen.lock().unwrap()[0].get("url"),
        Some(&json!("https://example.com"))
    );
}

#[tokio::test]
async fn test_not_complete_after_action_step() {
    let opener = Arc::new(RecordingCapability::new("open_url"));
    let oracle = Arc::new(ScriptedOracle::new(&[OPEN_EXAMPLE, "task complete"]));
    let agent = AgentLoop::new(oracle, registry_with(opener));

    let state = agent.execute_task("open example.com", 1).await.unwrap();

    assert!(!state.completed());
    assert_eq!(state.status(), TaskStatus::BudgetExhausted);
    assert!(state.last_outcome().unwrap().success);
}

#[tokio::test]
async fn test_completion_in_exactly_one_step() {
    for max_steps in [1, 2, 7, 50] {
        let oracle = Arc::new(ScriptedOracle::new(&["Task complete."]));
        let agent = AgentLoop::new(oracle.clone(), Arc::new(CapabilityRegistry::new()));

        let state = agent.execute_task("say hi", max_steps).await.unwrap();

        assert!(state.completed());
        assert_eq!(state.steps_taken(), 1);
        // thinking round-trip plus reflection round-trip
        assert_eq!(oracle.calls(), 2);
    }
}

#[tokio::test]
async fn test_budget_exhausted_after_exactly_n_steps() {
    for max_steps in [1, 3, 10] {
        let oracle = Arc::new(ScriptedOracle::new(&["Still looking around."]));
        let agent = AgentLoop::new(oracle, Arc::new(CapabilityRegistry::new()));

        let state = agent.execute_task("find the answer", max_steps).await.unwrap();

        assert!(!state.completed());
        assert_eq!(state.status(), TaskStatus::BudgetExhausted);
        assert_eq!(state.steps_taken(), max_steps);
        assert_eq!(state.thoughts().len(), max_steps);
    }
}

#[tokio::test]
async fn test_zero_step_budget_is_rejected() {
    let oracle = Arc::new(ScriptedOracle::new(&["task complete"]));
    let agent = AgentLoop::new(oracle.clone(), Arc::new(CapabilityRegistry::new()));

    let err = agent.execute_task("anything", 0).await.unwrap_err();

    assert!(matches!(err, AgentError::InvalidStepBudget));
    assert_eq!(oracle.calls(), 0);
}

#[tokio::test]
async fn test_unknown_capability_does_not_stop_the_task() {
    let oracle = Arc::new(ScriptedOracle::new(&[
        r#"{"command":"launch_rocket","params":{"target":"moon"}}"#,
        "Nothing more to try",
        "not complete",
    ]));
    let agent = AgentLoop::new(oracle, Arc::new(CapabilityRegistry::new()));

    let state = agent.execute_task("reach the moon", 3).await.unwrap();

    assert_eq!(state.status(), TaskStatus::BudgetExhausted);
    assert_eq!(state.steps_taken(), 3);
    let outcome = state.last_outcome().unwrap();
    assert!(!outcome.success);
    assert_eq!(
        outcome.error.as_deref(),
        Some("capability not found: launch_rocket")
    );
    assert_eq!(kinds(&state)[1], ThoughtKind::Observation);
    assert!(state.thoughts()[1].content().contains("failed"));
}

#[tokio::test]
async fn test_malformed_payload_dispatches_nothing() {
    let opener = Arc::new(RecordingCapability::new("open_url"));
    let oracle = Arc::new(ScriptedOracle::new(&[
        r#"Action: {"command":"open_url","params":{"url":"#,
        "task complete",
    ]));
    let agent = AgentLoop::new(oracle, registry_with(opener.clone()));

    let state = agent.execute_task("open example.com", 5).await.unwrap();

    assert_eq!(opener.calls(), 0);
    assert!(state.last_action().is_none());
    assert_eq!(
        kinds(&state)[..2],
        [ThoughtKind::ActionSelection, ThoughtKind::Observation]
    );
    assert!(state.thoughts()[1].content().starts_with("No actionable step"));
    // the malformed step still counted
    assert_eq!(state.steps_taken(), 2);
    assert!(state.completed());
}

#[tokio::test]
async fn test_planning_runs_subgoals_on_shared_budget() {
    let oracle = Arc::new(ScriptedOracle::new(&[
        "Let me plan this out.",
        "1. Open the browser\n2. Go to example.com",
        "Browser looks open",
        "complete",
        "Page is showing",
        "complete",
        "Both parts done",
        "complete",
    ]));
    let agent = AgentLoop::new(oracle.clone(), Arc::new(CapabilityRegistry::new()));

    let state = agent.execute_task("visit example.com", 10).await.unwrap();

    assert!(state.completed());
    assert_eq!(state.steps_taken(), 2);
    let subtasks = state.subtasks();
    assert_eq!(subtasks.len(), 2);
    assert_eq!(subtasks[0].goal, "Open the browser");
    assert_eq!(subtasks[1].goal, "Go to example.com");
    assert!(subtasks.iter().all(|s| s.status == TaskStatus::Completed));
    assert!(subtasks.iter().all(|s| s.steps_consumed == 1));
    assert_eq!(
        kinds(&state),
        vec![
            ThoughtKind::Planning,
            ThoughtKind::Observation,
            ThoughtKind::Reflection
        ]
    );

    // depth-first: both sub-goals are prompted before the parent continues
    let prompts = oracle.prompts();
    assert!(prompts[1].starts_with("Break down the task: visit example.com"));
    assert!(prompts[2].starts_with("Goal: Open the browser"));
    assert!(prompts[4].starts_with("Goal: Go to example.com"));
    assert!(prompts[6].starts_with("Goal: visit example.com"));
}

#[tokio::test]
async fn test_subgoal_completion_does_not_complete_parent() {
    let oracle = Arc::new(ScriptedOracle::new(&[
        "I will break down the goal.",
        "- only step",
        "done here",
        "complete",
        "Hmm, checking the parent",
        "not complete",
    ]));
    let agent = AgentLoop::new(oracle, Arc::new(CapabilityRegistry::new()));

    let state = agent.execute_task("parent goal", 4).await.unwrap();

    assert_eq!(state.subtasks()[0].status, TaskStatus::Completed);
    assert!(!state.completed());
    assert_eq!(state.status(), TaskStatus::BudgetExhausted);
    // 1 planning step, 1 sub-goal step, 2 parent reflection steps
    assert_eq!(state.steps_taken() + state.subtasks()[0].steps_consumed, 4);
}

#[tokio::test]
async fn test_subgoals_drain_parent_budget() {
    let oracle = Arc::new(ScriptedOracle::new(&[
        "Plan: decompose first.",
        "1. first part\n2. second part\n3. third part",
        "not there yet",
    ]));
    let agent = AgentLoop::new(oracle, Arc::new(CapabilityRegistry::new()));

    let state = agent.execute_task("big job", 3).await.unwrap();

    assert_eq!(state.status(), TaskStatus::BudgetExhausted);
    assert_eq!(state.steps_taken(), 1);
    let subtasks = state.subtasks();
    assert_eq!(subtasks.len(), 1);
    assert_eq!(subtasks[0].status, TaskStatus::BudgetExhausted);
    assert_eq!(subtasks[0].steps_consumed, 2);
    let summary = state.thoughts()[1].content();
    assert!(summary.contains("'second part': skipped"));
    assert!(summary.contains("'third part': skipped"));
}

#[tokio::test]
async fn test_planning_without_subgoals_is_observed() {
    let oracle = Arc::new(ScriptedOracle::new(&["Let me plan.", "   \n\n", "task complete"]));
    let agent = AgentLoop::new(oracle, Arc::new(CapabilityRegistry::new()));

    let state = agent.execute_task("goal", 5).await.unwrap();

    assert!(state.subtasks().is_empty());
    assert_eq!(state.thoughts()[1].content(), "Planning produced no sub-goals");
    assert!(state.completed());
}

#[tokio::test]
async fn test_max_subgoals_caps_decomposition() {
    let oracle = Arc::new(ScriptedOracle::new(&[
        "plan",
        "a\nb\nc\nd",
        "task complete",
    ]));
    let agent = AgentLoop::new(oracle, Arc::new(CapabilityRegistry::new())).with_max_subgoals(2);

    let state = agent.execute_task("goal", 10).await.unwrap();

    let goals: Vec<&str> = state.subtasks().iter().map(|s| s.goal.as_str()).collect();
    assert_eq!(goals, vec!["a", "b"]);
}

#[tokio::test]
async fn test_overwritten_capability_handles_invocation() {
    let first = Arc::new(RecordingCapability::new("open_url"));
    let second = Arc::new(RecordingCapability::new("open_url"));
    let registry = Arc::new(CapabilityRegistry::new());
    assert_eq!(registry.register_capability(first.clone()), Registration::Inserted);
    assert_eq!(registry.register_capability(second.clone()), Registration::Replaced);

    let oracle = Arc::new(ScriptedOracle::new(&[OPEN_EXAMPLE, "task complete"]));
    let agent = AgentLoop::new(oracle, registry);
    let state = agent.execute_task("open example.com", 5).await.unwrap();

    assert!(state.completed());
    assert_eq!(first.calls(), 0);
    assert_eq!(second.calls(), 1);
}

#[tokio::test]
async fn test_oracle_failure_is_distinct_and_keeps_partial_state() {
    let oracle = Arc::new(ScriptedOracle::from_results(vec![
        Ok(OPEN_EXAMPLE.to_string()),
        Err(OracleError::Unavailable("connection refused".to_string())),
    ]));
    let registry = registry_with(Arc::new(RecordingCapability::new("open_url")));
    let agent = AgentLoop::new(oracle, registry);

    let err = agent.execute_task("open example.com", 5).await.unwrap_err();

    match err {
        AgentError::OracleUnavailable {
            goal,
            source,
            partial,
        } => {
            assert_eq!(goal, "open example.com");
            assert!(matches!(source, OracleError::Unavailable(_)));
            assert_eq!(partial.status(), TaskStatus::Failed);
            assert_eq!(partial.thoughts().len(), 2);
            assert!(partial.last_outcome().unwrap().success);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_oracle_failure_inside_subgoal_aborts_whole_task() {
    let oracle = Arc::new(ScriptedOracle::from_results(vec![
        Ok("plan it".to_string()),
        Ok("1. one\n2. two".to_string()),
        Err(OracleError::Timeout(60)),
    ]));
    let agent = AgentLoop::new(oracle, Arc::new(CapabilityRegistry::new()));

    let err = agent.execute_task("top", 5).await.unwrap_err();

    let AgentError::OracleUnavailable { goal, partial, .. } = err else {
        panic!("expected oracle failure");
    };
    assert_eq!(goal, "top");
    assert_eq!(partial.goal(), "top");
    assert_eq!(partial.status(), TaskStatus::Failed);
    assert_eq!(kinds(&partial), vec![ThoughtKind::Planning]);
    let reports = partial.subtasks();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].goal, "one");
    assert_eq!(reports[0].status, TaskStatus::Failed);
    assert_eq!(reports[0].steps_consumed, 1);
}

#[tokio::test]
async fn test_cancel_before_start() {
    let oracle = Arc::new(ScriptedOracle::new(&["task complete"]));
    let agent = AgentLoop::new(oracle.clone(), Arc::new(CapabilityRegistry::new()));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let state = agent
        .execute_task_with_cancel("goal", 5, cancel)
        .await
        .unwrap();

    assert_eq!(state.status(), TaskStatus::Cancelled);
    assert!(!state.completed());
    assert_eq!(state.steps_taken(), 0);
    assert_eq!(oracle.calls(), 0);
}

#[tokio::test]
async fn test_cancel_during_action_keeps_its_outcome() {
    let cancel = CancellationToken::new();
    let registry = Arc::new(CapabilityRegistry::new());
    registry.register_capability(Arc::new(CancellingCapability {
        token: cancel.clone(),
    }));
    let oracle = Arc::new(ScriptedOracle::new(&[
        r#"{"command":"stop_all","params":{}}"#,
        "task complete",
    ]));
    let agent = AgentLoop::new(oracle.clone(), registry);

    let state = agent
        .execute_task_with_cancel("shut down", 5, cancel)
        .await
        .unwrap();

    assert_eq!(state.status(), TaskStatus::Cancelled);
    assert!(!state.completed());
    assert!(state.last_outcome().unwrap().success);
    assert_eq!(state.steps_taken(), 1);
    assert_eq!(oracle.calls(), 1);
    assert_eq!(
        kinds(&state),
        vec![ThoughtKind::ActionSelection, ThoughtKind::Observation]
    );
}

#[tokio::test]
async fn test_cancel_interrupts_pending_oracle_call() {
    let agent = AgentLoop::new(Arc::new(StalledOracle), Arc::new(CapabilityRegistry::new()));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let state = timeout(
        Duration::from_secs(5),
        agent.execute_task_with_cancel("goal", 5, cancel),
    )
    .await
    .expect("cancellation should interrupt the oracle call")
    .unwrap();

    assert_eq!(state.status(), TaskStatus::Cancelled);
    assert_eq!(state.steps_taken(), 1);
    assert!(state.thoughts().is_empty());
}

#[tokio::test]
async fn test_custom_completion_policy() {
    let oracle = Arc::new(ScriptedOracle::new(&["thinking", "complete", "DONE"]));
    let agent = AgentLoop::new(oracle, Arc::new(CapabilityRegistry::new()))
        .with_completion_policy(Arc::new(|reply: &str| reply.contains("DONE")));

    let state = agent.execute_task("goal", 5).await.unwrap();

    assert!(state.completed());
    assert_eq!(state.steps_taken(), 2);
}

#[tokio::test]
async fn test_concurrent_tasks_share_registry() {
    let registry = Arc::new(CapabilityRegistry::new());
    registry.register_capability(Arc::new(EchoCapability));
    let payload = r#"{"command":"echo","params":{"n":1}}"#;

    let first = AgentLoop::new(
        Arc::new(ScriptedOracle::new(&[payload, "task complete"])),
        Arc::clone(&registry),
    );
    let second = AgentLoop::new(
        Arc::new(ScriptedOracle::new(&["no idea"])),
        Arc::clone(&registry),
    );

    let (a, b) = tokio::join!(first.execute_task("echo", 4), second.execute_task("wait", 4));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert!(a.completed());
    assert_eq!(a.last_outcome().unwrap().data, Some(json!({"n": 1})));
    assert_eq!(b.status(), TaskStatus::BudgetExhausted);
}

const REPLY_POOL: &[&str] = &[
    "Let me plan this.",
    "1. part one\n2. part two\n3. part three",
    r#"{"command":"echo","params":{}}"#,
    "Action: {\"command\":",
    "task complete",
    "not complete",
    "Hmm.",
];

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn steps_never_exceed_budget(
        max_steps in 1usize..12,
        script in prop::collection::vec(0usize..REPLY_POOL.len(), 0..30),
    ) {
        let replies: Vec<&str> = script.iter().map(|i| REPLY_POOL[*i]).collect();
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let state = runtime.block_on(async {
            let registry = Arc::new(CapabilityRegistry::new());
            registry.register_capability(Arc::new(EchoCapability));
            let agent = AgentLoop::new(Arc::new(ScriptedOracle::new(&replies)), registry);
            agent.execute_task("goal", max_steps).await.unwrap()
        });

        let used: usize = state.steps_taken()
            + state.subtasks().iter().map(|s| s.steps_consumed).sum::<usize>();
        prop_assert!(used <= max_steps);
        prop_assert!(state.status() != TaskStatus::Running);
        prop_assert!(state.thoughts().len() <= 2 * state.steps_taken());
        if !state.completed() {
            prop_assert_eq!(state.status(), TaskStatus::BudgetExhausted);
        }
    }
}

//! Prompt rendering for the three oracle round-trips of a step.

use crate::types::TaskState;
use kalki_tools::CapabilityInfo;
use std::fmt::Write;

fn render_capabilities(out: &mut String, capabilities: &[CapabilityInfo]) {
    out.push_str("Available capabilities:\n");
    if capabilities.is_empty() {
        out.push_str("  (none)\n");
    }
    for capability in capabilities {
        let _ = writeln!(out, "  - {}: {}", capability.name, capability.description);
    }
}

fn render_history(out: &mut String, state: &TaskState) {
    out.push_str("Previous thoughts:\n");
    if state.thoughts().is_empty() {
        out.push_str("  (none yet)\n");
    }
    for (idx, thought) in state.thoughts().iter().enumerate() {
        let _ = writeln!(out, "  {}. [{}] {}", idx + 1, thought.kind(), thought.content());
    }
}

fn render_last_dispatch(out: &mut String, state: &TaskState) {
    match state.last_dispatch() {
        Some(dispatch) => {
            let params = serde_json::Value::Object(dispatch.action.parameters.clone());
            let _ = writeln!(
                out,
                "Last action: {} {}\nLast result: {}",
                dispatch.action.capability,
                params,
                if dispatch.outcome.success { "success" } else { "failure" },
            );
            let _ = writeln!(out, "Result detail: {}", dispatch.outcome.summary());
        }
        None => out.push_str("Last action: none\n"),
    }
}

/// The per-step "what next?" prompt.
pub fn thinking_prompt(state: &TaskState, capabilities: &[CapabilityInfo]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Goal: {}\n", state.goal());
    render_capabilities(&mut out, capabilities);
    out.push('\n');
    render_history(&mut out, state);
    out.push('\n');
    render_last_dispatch(&mut out, state);
    out.push_str(
        "\nDecide what to do next and answer in one of these ways:\n\
         1. If the goal needs several steps, say that you will plan it.\n\
         2. To act, reply with exactly one JSON object naming a capability:\n   \
         {\"command\": \"<capability name>\", \"params\": {<arguments>}}\n\
         3. Otherwise reflect on whether the goal has been reached.\n",
    );
    out
}

/// Asks for the goal broken into ordered sub-goals, one per line.
pub fn decomposition_prompt(goal: &str, capabilities: &[CapabilityInfo]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Break down the task: {goal}\n");
    render_capabilities(&mut out, capabilities);
    out.push_str(
        "\nList the sub-goals in the order they must be done, one per line, \
         with no other text. Each sub-goal should be achievable with the \
         capabilities above.\n",
    );
    out
}

/// Asks whether the goal has been reached.
pub fn reflection_prompt(state: &TaskState) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Goal: {}\n", state.goal());
    render_history(&mut out, state);
    out.push('\n');
    render_last_dispatch(&mut out, state);
    out.push_str(
        "\nIs this task complete? Start your answer with \"complete\" or \
         \"not complete\" and explain why.\n",
    );
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::types::{Action, Thought, ThoughtKind};
    use kalki_tools::ActionOutcome;
    use serde_json::json;

    fn capabilities() -> Vec<CapabilityInfo> {
        vec![CapabilityInfo {
            name: "open_url".to_string(),
            description: "Open a URL".to_string(),
            version: "0.1.0".to_string(),
        }]
    }

    #[test]
    fn test_thinking_prompt_contents() {
        let mut state = TaskState::new("open example.com");
        state.push_thought(Thought::new(ThoughtKind::Reflection, "Nothing done yet"));
        state.record_dispatch(
            Action {
                capability: "open_url".to_string(),
                parameters: json!({"url": "https://example.com"}).as_object().cloned().unwrap(),
            },
            ActionOutcome::failed("xdg-open missing"),
        );

        let prompt = thinking_prompt(&state, &capabilities());
        assert!(prompt.contains("Goal: open example.com"));
        assert!(prompt.contains("- open_url: Open a URL"));
        assert!(prompt.contains("1. [reflection] Nothing done yet"));
        assert!(prompt.contains("Last result: failure"));
        assert!(prompt.contains("xdg-open missing"));
        assert!(prompt.contains("\"command\""));
    }

    #[test]
    fn test_empty_state_renders_placeholders() {
        let prompt = thinking_prompt(&TaskState::new("goal"), &[]);
        assert!(prompt.contains("(none)"));
        assert!(prompt.contains("(none yet)"));
        assert!(prompt.contains("Last action: none"));
    }

    #[test]
    fn test_decomposition_and_reflection_prompts() {
        assert!(decomposition_prompt("tidy desktop", &capabilities())
            .starts_with("Break down the task: tidy desktop"));
        assert!(reflection_prompt(&TaskState::new("tidy desktop")).contains("Is this task complete?"));
    }
}

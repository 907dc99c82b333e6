//! Turning free-text oracle replies into thoughts, actions and sub-goals.
//!
//! Classification is a lexical heuristic. It is cheap and will misclassify
//! replies phrased in unexpected ways; that is an accepted outcome. What it
//! guarantees is that every reply yields exactly one thought and nothing
//! here ever fails.

use crate::types::{Action, Thought, ThoughtKind};
use kalki_tools::Parameters;
use serde_json::Value;

const CAPABILITY_KEYS: &[&str] = &["command", "capability", "plugin"];
const PARAMETER_KEYS: &[&str] = &["params", "parameters"];

pub const DEFAULT_PLAN_CUES: &[&str] = &["plan", "break down", "decompose", "subtask", "sub-goal"];
pub const DEFAULT_ACTION_CUES: &[&str] = &["action", "execute", "invoke"];

/// True if `cue` occurs in `haystack` starting at a word boundary.
///
/// Both arguments are expected lowercase. "planning" matches "plan";
/// "explanation" does not.
pub(crate) fn contains_cue(haystack: &str, cue: &str) -> bool {
    if cue.is_empty() {
        return false;
    }
    haystack.match_indices(cue).any(|(idx, _)| {
        haystack[..idx]
            .chars()
            .next_back()
            .map_or(true, |prev| !prev.is_alphanumeric())
    })
}

#[derive(Debug, Clone)]
pub struct ThoughtExtractor {
    plan_cues: Vec<String>,
    action_cues: Vec<String>,
}

impl Default for ThoughtExtractor {
    fn default() -> Self {
        Self::with_cues(
            DEFAULT_PLAN_CUES.iter().copied(),
            DEFAULT_ACTION_CUES.iter().copied(),
        )
    }
}

impl ThoughtExtractor {
    pub fn with_cues<P, A, S>(plan_cues: P, action_cues: A) -> Self
    where
        P: IntoIterator<Item = S>,
        A: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let normalize = |cue: S| cue.as_ref().trim().to_lowercase();
        Self {
            plan_cues: plan_cues
                .into_iter()
                .map(normalize)
                .filter(|c| !c.is_empty())
                .collect(),
            action_cues: action_cues
                .into_iter()
                .map(normalize)
                .filter(|c| !c.is_empty())
                .collect(),
        }
    }

    /// Classify a reply. A well-formed action payload wins over everything,
    /// then plan cues, then action cues; anything else is a reflection.
    /// The reply text is kept verbatim as the thought's content.
    pub fn classify(&self, reply: &str) -> Thought {
        let lower = reply.to_lowercase();

        let kind = if extract_action(reply).is_some() {
            ThoughtKind::ActionSelection
        } else if self.plan_cues.iter().any(|cue| contains_cue(&lower, cue)) {
            ThoughtKind::Planning
        } else if self.action_cues.iter().any(|cue| contains_cue(&lower, cue)) {
            ThoughtKind::ActionSelection
        } else {
            ThoughtKind::Reflection
        };

        Thought::new(kind, reply)
    }
}

/// Find the first JSON object in `text` naming a capability.
///
/// Accepts `command`/`capability`/`plugin` for the name and
/// `params`/`parameters` for the arguments. Missing arguments mean an empty
/// mapping; arguments that are not an object reject the candidate.
/// Surrounding prose and code fences are ignored.
pub fn extract_action(text: &str) -> Option<Action> {
    text.match_indices('{').find_map(|(start, _)| {
        let mut values = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        match values.next() {
            Some(Ok(Value::Object(object))) => action_from_object(&object),
            _ => None,
        }
    })
}

fn action_from_object(object: &serde_json::Map<String, Value>) -> Option<Action> {
    let capability = CAPABILITY_KEYS
        .iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))?
        .trim();
    if capability.is_empty() {
        return None;
    }

    let parameters = match PARAMETER_KEYS.iter().find_map(|key| object.get(*key)) {
        None | Some(Value::Null) => Parameters::new(),
        Some(Value::Object(params)) => params.clone(),
        Some(_) => return None,
    };

    Some(Action {
        capability: capability.to_string(),
        parameters,
    })
}

fn strip_list_marker(line: &str) -> &str {
    let line = line.trim().trim_start_matches(['-', '*', '•']).trim_start();
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            return rest.trim_start();
        }
    }
    line
}

/// Split a decomposition reply into at most `limit` sub-goals, one per line.
/// List markers are stripped; blank lines and headings ending in ':' are
/// dropped.
pub fn parse_subgoals(reply: &str, limit: usize) -> Vec<String> {
    reply
        .lines()
        .map(strip_list_marker)
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.ends_with(':') && !line.starts_with("```"))
        .take(limit)
        .map(str::to_string)
        .collect()
}

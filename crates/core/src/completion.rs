//! Deciding, from a reflection reply, whether the goal has been reached.

use crate::extractor::contains_cue;

pub const DEFAULT_COMPLETION_CUES: &[&str] = &["complete", "accomplished", "finished"];
pub const DEFAULT_COMPLETION_NEGATIONS: &[&str] = &[
    "not complete",
    "not yet complete",
    "not fully complete",
    "not finished",
    "not yet finished",
    "not accomplished",
    "isn't complete",
    "is not complete",
];

/// Pluggable completion rule, consulted once per reflection step.
pub trait CompletionPolicy: Send + Sync {
    fn is_complete(&self, reply: &str) -> bool;
}

/// Lexical rule: any cue present after negated phrases are blanked out.
#[derive(Debug, Clone)]
pub struct KeywordCompletion {
    cues: Vec<String>,
    negations: Vec<String>,
}

impl KeywordCompletion {
    pub fn new<C, N, S>(cues: C, negations: N) -> Self
    where
        C: IntoIterator<Item = S>,
        N: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let normalize = |s: S| s.as_ref().trim().to_lowercase();
        let mut negations: Vec<String> = negations
            .into_iter()
            .map(normalize)
            .filter(|n| !n.is_empty())
            .collect();
        // Longest first so "not yet complete" is blanked before "not complete".
        negations.sort_by_key(|n| std::cmp::Reverse(n.len()));
        Self {
            cues: cues
                .into_iter()
                .map(normalize)
                .filter(|c| !c.is_empty())
                .collect(),
            negations,
        }
    }
}

impl Default for KeywordCompletion {
    fn default() -> Self {
        Self::new(
            DEFAULT_COMPLETION_CUES.iter().copied(),
            DEFAULT_COMPLETION_NEGATIONS.iter().copied(),
        )
    }
}

impl CompletionPolicy for KeywordCompletion {
    fn is_complete(&self, reply: &str) -> bool {
        let mut text = reply.to_lowercase();
        for negation in &self.negations {
            text = text.replace(negation.as_str(), " ");
        }
        self.cues.iter().any(|cue| contains_cue(&text, cue))
    }
}

impl<F> CompletionPolicy for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_complete(&self, reply: &str) -> bool {
        self(reply)
    }
}

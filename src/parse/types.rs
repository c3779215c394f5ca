//! Types produced by the shell tokenizer and consumed by the classifier.

use serde::Serialize;

/// Shell control operator separating a segment from the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    /// `&&`: run next only if previous succeeded
    And,
    /// `||`: run next only if previous failed
    Or,
    /// `|` or `|&`: pipe output into the next command
    Pipe,
    /// `;`, newline, or a background `&`: run next unconditionally
    Sequence,
}

impl Operator {
    /// The operator's canonical shell syntax.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::And => "&&",
            Operator::Or => "||",
            Operator::Pipe => "|",
            Operator::Sequence => ";",
        }
    }
}

/// A single simple command extracted from a possibly compound command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    /// The segment's original text, trimmed. Quotes, substitutions and
    /// redirections are kept verbatim.
    pub raw: String,

    /// Words of the segment after POSIX word splitting.
    pub tokens: Vec<String>,

    /// Operator joining this segment to the next one, `None` for the last.
    pub following_operator: Option<Operator>,

    /// Inner command text of every `$(...)`, backtick, `<(...)` and `>(...)`
    /// found in this segment, outermost first.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub substitutions: Vec<String>,

    /// First output redirection to a file, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirection: Option<Redirection>,
}

impl Segment {
    /// Build a segment from raw text without any shell analysis.
    ///
    /// Used for non-shell tools and for commands the tokenizer rejected.
    pub fn opaque(raw: &str) -> Self {
        let raw = raw.trim().to_string();
        Self {
            tokens: crate::parse::tokenize(&raw),
            raw,
            following_operator: None,
            substitutions: Vec::new(),
            redirection: None,
        }
    }
}

/// Describes an output redirection that may mutate filesystem state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Redirection {
    /// Human-readable description, e.g. `"output redirection (>)"`.
    pub description: String,
}

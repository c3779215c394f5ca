//! Permission pattern strings: `Tool`, `Tool(prefix)` and `Tool(prefix:*)`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::eval::Tier;
use crate::parse::normalize_command;

/// A single classification rule, immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Tool the rule applies to, e.g. `Bash`.
    pub tool_scope: String,
    /// Command prefix normalized like segment command text. Empty means "any command".
    pub command_prefix: String,
    /// `true` for `prefix:*` patterns: the prefix followed by whitespace or
    /// end of text. `false` for exact patterns.
    pub wildcard_suffix: bool,
    /// Tier assigned to segments this rule matches.
    pub tier: Tier,
    /// The pattern text the rule was parsed from.
    pub pattern: String,
}

impl Rule {
    /// Parse a pattern string from one of the permission lists.
    pub fn parse(pattern: &str, tier: Tier) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = pattern.trim();
        let (tool, inner) = match trimmed.find('(') {
            None => (trimmed, None),
            Some(open) => {
                let Some(body) = trimmed[open + 1..].strip_suffix(')') else {
                    return Err(invalid("missing closing parenthesis"));
                };
                (&trimmed[..open], Some(body))
            }
        };

        if tool.is_empty() {
            return Err(invalid("missing tool name"));
        }
        if !tool
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':' | '.'))
        {
            return Err(invalid("tool name may only contain letters, digits, '_', '-', ':' and '.'"));
        }

        let (prefix, wildcard) = match inner {
            // Bare tool name: every command of that tool
            None => ("", true),
            Some("*") => ("", true),
            Some(body) => match body.strip_suffix(":*") {
                Some(prefix) => (prefix, true),
                None => (body, false),
            },
        };
        let prefix = normalize_command(prefix);
        if prefix.is_empty() && !wildcard {
            return Err(invalid("empty command prefix"));
        }

        Ok(Self {
            tool_scope: tool.to_string(),
            command_prefix: prefix,
            wildcard_suffix: wildcard,
            tier,
            pattern: trimmed.to_string(),
        })
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

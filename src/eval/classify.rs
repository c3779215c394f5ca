//! Matching one segment against the rule set.

use super::decision::{ClassificationResult, Tier};
use crate::parse::{self, Segment};
use crate::rules::RuleSet;

/// Reason attached to segments no rule matched.
pub const NO_RULE_REASON: &str = "no rule matched; defaulting to ask";

/// Assigns a tier to a single segment. Pure; holds only settings.
#[derive(Debug, Clone, Copy)]
pub struct Classifier {
    /// Escalate Allow → Ask when the segment writes to a file.
    redirection_escalates: bool,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Classifier {
    pub fn new(redirection_escalates: bool) -> Self {
        Self {
            redirection_escalates,
        }
    }

    /// Classify `segment` for `tool_scope` against `rules`.
    ///
    /// Evaluation order:
    /// 1. Longest matching prefix → its tier (ties: Deny > Ask > Allow)
    /// 2. No match → Ask
    /// 3. Allow with output redirection or env assignments → Ask
    pub fn classify(&self, tool_scope: &str, segment: &Segment, rules: &RuleSet) -> ClassificationResult {
        let cmd = parse::command_text(&segment.raw);

        let Some(found) = rules.lookup(tool_scope, &cmd.text) else {
            return ClassificationResult::fallback(segment.clone(), NO_RULE_REASON);
        };
        let rule = found.rule;

        let mut reason = format!("matched {}", rule.pattern);
        if let Some(weaker) = found.ambiguous_with {
            reason.push_str(&format!(" (ambiguous with a {weaker} rule; {} takes precedence)", rule.tier));
        }

        let mut tier = rule.tier;
        if tier == Tier::Allow {
            // Redirection escalates ALLOW → ASK
            if self.redirection_escalates
                && let Some(ref r) = segment.redirection
            {
                tier = Tier::Ask;
                reason = format!("{reason} with {}", r.description);
            } else if !cmd.env_vars.is_empty() {
                let names: Vec<&str> = cmd.env_vars.iter().map(|(k, _)| k.as_str()).collect();
                tier = Tier::Ask;
                reason = format!("{reason} with environment assignment {}", names.join(", "));
            }
        }

        ClassificationResult {
            segment: segment.clone(),
            tier,
            matched_rule: Some(rule.clone()),
            reason,
        }
    }
}

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::parse::Segment;
use crate::rules::Rule;

/// Authorization level of a segment or of a whole command.
///
/// Ordered by precedence: `Deny > Ask > Allow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Read-only or locally reversible; runs without prompting.
    Allow,
    /// Reversible but needs a human to confirm.
    Ask,
    /// Irreversible or destructive; never runs.
    Deny,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Allow => "allow",
            Tier::Ask => "ask",
            Tier::Deny => "deny",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Tier::Allow => "ALLOW",
            Tier::Ask => "ASK",
            Tier::Deny => "DENY",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The classification of one segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationResult {
    pub segment: Segment,
    pub tier: Tier,
    /// The rule that decided the tier. `None` only ever comes with `Ask`.
    pub matched_rule: Option<Rule>,
    pub reason: String,
}

impl ClassificationResult {
    /// An `Ask` result not backed by any rule.
    pub fn fallback(segment: Segment, reason: impl Into<String>) -> Self {
        Self {
            segment,
            tier: Tier::Ask,
            matched_rule: None,
            reason: reason.into(),
        }
    }

    /// Segment text shortened for rationales and logs.
    pub fn label(&self) -> String {
        let label: String = self.segment.raw.chars().take(60).collect();
        if label.len() < self.segment.raw.len() {
            format!("{label}...")
        } else {
            label
        }
    }

    /// The matched rule's pattern, or `"none"`.
    pub fn rule_id(&self) -> &str {
        self.matched_rule
            .as_ref()
            .map_or("none", |r| r.pattern.as_str())
    }
}

/// The overall verdict on a command. Never mutated after construction.
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub outcome: Tier,
    pub breakdown: Vec<ClassificationResult>,
    pub rationale: String,
    pub timestamp: DateTime<Utc>,
}

impl Decision {
    /// Whether two decisions agree on everything except when they were made.
    pub fn same_verdict(&self, other: &Decision) -> bool {
        self.outcome == other.outcome
            && self.breakdown == other.breakdown
            && self.rationale == other.rationale
    }

    /// Results that stopped the command from being auto-approved.
    pub fn blocking(&self) -> impl Iterator<Item = &ClassificationResult> {
        self.breakdown.iter().filter(|r| r.tier != Tier::Allow)
    }
}

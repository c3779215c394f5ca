//! Permission rules: pattern parsing and the indexed rule set.

/// `Tool(prefix:*)` pattern parsing and direct matching.
pub mod pattern;
/// Tier-partitioned rule collection with a per-tool prefix trie.
pub mod ruleset;

pub use pattern::Rule;
pub use ruleset::{RuleLookup, RuleSet};

//! The loaded rule collection and its per-tool prefix index.

use std::collections::{BTreeMap, HashMap};

use log::warn;

use super::pattern::Rule;
use crate::config::Permissions;
use crate::error::ConfigError;
use crate::eval::Tier;

/// One node of a byte-level prefix trie.
#[derive(Debug, Default)]
struct Node {
    children: BTreeMap<u8, usize>,
    /// Rules whose prefix ends here and accept a whitespace boundary.
    wildcard: Vec<usize>,
    /// Rules whose prefix ends here and must match the whole text.
    exact: Vec<usize>,
}

/// Prefix trie over the command prefixes of one tool scope.
///
/// Lookup walks the command text once, so its cost is bounded by the text
/// length, and the deepest terminal node passed is the most specific rule.
#[derive(Debug)]
struct PrefixTrie {
    nodes: Vec<Node>,
}

impl PrefixTrie {
    fn new() -> Self {
        Self {
            nodes: vec![Node::default()],
        }
    }

    fn insert(&mut self, prefix: &str, wildcard: bool, rule_idx: usize) {
        let mut cur = 0;
        for &b in prefix.as_bytes() {
            cur = match self.nodes[cur].children.get(&b) {
                Some(&next) => next,
                None => {
                    self.nodes.push(Node::default());
                    let next = self.nodes.len() - 1;
                    self.nodes[cur].children.insert(b, next);
                    next
                }
            };
        }
        let node = &mut self.nodes[cur];
        if wildcard {
            node.wildcard.push(rule_idx);
        } else {
            node.exact.push(rule_idx);
        }
    }

    /// Rules matching at the greatest depth, with the match length.
    fn longest_match(&self, text: &str) -> Option<(usize, Vec<usize>)> {
        let bytes = text.as_bytes();
        let mut best: Option<(usize, Vec<usize>)> = None;
        let mut cur = 0;
        let mut depth = 0;
        loop {
            let node = &self.nodes[cur];
            let at_end = depth == bytes.len();
            let boundary = depth == 0 || at_end || bytes[depth].is_ascii_whitespace();

            let mut hits = Vec::new();
            if boundary {
                hits.extend_from_slice(&node.wildcard);
            }
            if at_end {
                hits.extend_from_slice(&node.exact);
            }
            if !hits.is_empty() {
                best = Some((depth, hits));
            }

            if at_end {
                break;
            }
            match node.children.get(&bytes[depth]) {
                Some(&next) => {
                    cur = next;
                    depth += 1;
                }
                None => break,
            }
        }
        best
    }
}

/// Report prefixes defined in more than one tier, once per load.
fn warn_ambiguous(rules: &[Rule]) {
    let mut seen: HashMap<(&str, &str), &Rule> = HashMap::new();
    for rule in rules {
        let key = (rule.tool_scope.as_str(), rule.command_prefix.as_str());
        match seen.get(&key) {
            Some(other) if other.tier != rule.tier => {
                let winner = if rule.tier > other.tier { rule } else { *other };
                warn!(
                    "ambiguous rules: {} ({}) and {} ({}) share a prefix; {} takes precedence",
                    other.pattern, other.tier, rule.pattern, rule.tier, winner.pattern
                );
            }
            Some(_) => {}
            None => {
                seen.insert(key, rule);
            }
        }
    }
}

/// The outcome of looking a command up in a [`RuleSet`].
#[derive(Debug, Clone, Copy)]
pub struct RuleLookup<'a> {
    /// The winning rule.
    pub rule: &'a Rule,
    /// Other equally specific rules of a weaker tier, if any.
    pub ambiguous_with: Option<Tier>,
}

/// The full, loaded collection of rules.
///
/// Rules are partitioned by tier and indexed by tool scope. A `RuleSet` is
/// never mutated after construction; reloading builds a new one.
#[derive(Debug)]
pub struct RuleSet {
    rules: Vec<Rule>,
    index: HashMap<String, PrefixTrie>,
}

impl RuleSet {
    /// A rule set with no rules; every lookup misses.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Build a rule set from already-parsed rules.
    ///
    /// Duplicate rules are dropped. The same prefix defined in two tiers is
    /// kept (the stronger tier wins at lookup) and reported as a warning.
    pub fn new(rules: Vec<Rule>) -> Self {
        let mut deduped: Vec<Rule> = Vec::with_capacity(rules.len());
        for rule in rules {
            if !deduped.contains(&rule) {
                deduped.push(rule);
            }
        }

        warn_ambiguous(&deduped);

        let mut index: HashMap<String, PrefixTrie> = HashMap::new();
        for (idx, rule) in deduped.iter().enumerate() {
            index
                .entry(rule.tool_scope.clone())
                .or_insert_with(PrefixTrie::new)
                .insert(&rule.command_prefix, rule.wildcard_suffix, idx);
        }

        Self {
            rules: deduped,
            index,
        }
    }

    /// Parse the three permission lists into a rule set.
    pub fn from_permissions(permissions: &Permissions) -> Result<Self, ConfigError> {
        let mut rules = Vec::new();
        for (tier, patterns) in [
            (Tier::Allow, &permissions.allow),
            (Tier::Ask, &permissions.ask),
            (Tier::Deny, &permissions.deny),
        ] {
            for pattern in patterns {
                rules.push(Rule::parse(pattern, tier)?);
            }
        }
        Ok(Self::new(rules))
    }

    /// Rules of one tier, in load order.
    pub fn partition(&self, tier: Tier) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(move |r| r.tier == tier)
    }

    /// Total number of distinct rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Find the most specific rule for `command_text` within `tool_scope`.
    ///
    /// Longest prefix wins; equally long matches are resolved by tier
    /// precedence (`Deny > Ask > Allow`).
    pub fn lookup(&self, tool_scope: &str, command_text: &str) -> Option<RuleLookup<'_>> {
        let trie = self.index.get(tool_scope)?;
        let (_, hits) = trie.longest_match(command_text)?;
        let mut candidates: Vec<&Rule> = hits.into_iter().map(|i| &self.rules[i]).collect();
        candidates.sort_by(|a, b| b.tier.cmp(&a.tier));
        let rule = candidates[0];
        let ambiguous_with = candidates
            .iter()
            .map(|r| r.tier)
            .find(|&t| t != rule.tier);
        Some(RuleLookup {
            rule,
            ambiguous_with,
        })
    }
}

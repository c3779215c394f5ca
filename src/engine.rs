//! The policy engine facade: tokenize → classify → aggregate → log → return.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::audit::{AuditRecord, AuditSink, EvaluationStatus};
use crate::config::Config;
use crate::error::{ConfigError, TokenizeError};
use crate::eval::{ClassificationResult, Classifier, Decision, aggregate};
use crate::parse::{Segment, Tokenizer};
use crate::rules::RuleSet;

/// Reason given for every evaluation while the configuration is unusable.
pub const CONFIG_UNAVAILABLE_REASON: &str = "policy configuration unavailable";

/// Substitutions nested deeper than this are not evaluated; they force Ask.
const MAX_SUBSTITUTION_DEPTH: usize = 8;

/// An immutable snapshot of everything an evaluation needs.
///
/// Evaluations hold one `Arc<Policy>` for their whole duration, so a reload
/// never shows them a mix of old and new rules.
#[derive(Debug)]
pub struct Policy {
    state: PolicyState,
    tokenizer: Tokenizer,
    classifier: Classifier,
    max_input_bytes: usize,
    shell_tools: Vec<String>,
}

#[derive(Debug)]
enum PolicyState {
    Active(RuleSet),
    /// Configuration failed to load; everything is Ask.
    FailClosed(String),
}

impl Policy {
    /// Build a policy from a loaded configuration.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let rules = RuleSet::from_permissions(&config.permissions)?;
        debug!("policy loaded with {} rule(s)", rules.len());
        let settings = &config.settings;
        Ok(Self {
            state: PolicyState::Active(rules),
            tokenizer: Tokenizer::new(Duration::from_millis(settings.tokenize_budget_ms)),
            classifier: Classifier::new(settings.redirection_escalates),
            max_input_bytes: settings.max_input_bytes,
            shell_tools: settings.shell_tools.clone(),
        })
    }

    /// A policy that answers Ask to everything.
    pub fn fail_closed(error: impl Into<String>) -> Self {
        Self {
            state: PolicyState::FailClosed(error.into()),
            tokenizer: Tokenizer::default(),
            classifier: Classifier::default(),
            max_input_bytes: 64 * 1024,
            shell_tools: vec!["Bash".into()],
        }
    }

    /// Build from a load result, falling back to fail-closed on error.
    ///
    /// The error is logged once here, per load attempt.
    pub fn from_load(config: Result<Config, ConfigError>) -> Self {
        match config.and_then(|c| Self::from_config(&c)) {
            Ok(policy) => policy,
            Err(e) => {
                warn!("configuration error, every command will require confirmation: {e}");
                Self::fail_closed(e.to_string())
            }
        }
    }

    pub fn is_fail_closed(&self) -> bool {
        self.load_error().is_some()
    }

    /// Why the configuration could not be used, if it could not.
    pub fn load_error(&self) -> Option<&str> {
        match &self.state {
            PolicyState::Active(_) => None,
            PolicyState::FailClosed(error) => Some(error),
        }
    }
}

/// The single entry point for command authorization.
///
/// `Send + Sync`: share one engine across threads. The lock only guards the
/// pointer swap on reload; evaluations clone the `Arc` and release it.
pub struct PolicyEngine {
    policy: RwLock<Arc<Policy>>,
    audit: Box<dyn AuditSink>,
}

impl PolicyEngine {
    pub fn new(policy: Policy, audit: Box<dyn AuditSink>) -> Self {
        Self {
            policy: RwLock::new(Arc::new(policy)),
            audit,
        }
    }

    /// The policy snapshot evaluations currently see.
    pub fn snapshot(&self) -> Arc<Policy> {
        match self.policy.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Swap in a new policy. In-flight evaluations finish on the old one.
    pub fn replace(&self, policy: Policy) {
        let policy = Arc::new(policy);
        match self.policy.write() {
            Ok(mut guard) => *guard = policy,
            Err(poisoned) => *poisoned.into_inner() = policy,
        }
    }

    /// Rebuild the policy from a fresh load; failures switch to fail-closed.
    pub fn reload(&self, config: Result<Config, ConfigError>) {
        self.replace(Policy::from_load(config));
    }

    /// Decide whether `raw_command` for `tool_scope` may run.
    ///
    /// Never fails: every problem degrades toward Ask or Deny.
    pub fn evaluate(&self, tool_scope: &str, raw_command: &str) -> Decision {
        let policy = self.snapshot();
        let (results, status) = run(&policy, tool_scope, raw_command);
        let decision = aggregate(results);
        debug!(
            "{tool_scope} {:?} -> {} ({} segment(s))",
            raw_command.chars().take(200).collect::<String>(),
            decision.outcome,
            decision.breakdown.len()
        );

        let record = AuditRecord::new(&decision, tool_scope, raw_command, status);
        if let Err(e) = self.audit.record(&record) {
            warn!("audit record dropped: {e}");
        }
        decision
    }
}

/// Classify every segment of `raw_command` under `policy`.
fn run(policy: &Policy, tool_scope: &str, raw_command: &str) -> (Vec<ClassificationResult>, EvaluationStatus) {
    let rules = match &policy.state {
        PolicyState::Active(rules) => rules,
        PolicyState::FailClosed(error) => {
            debug!("policy is fail-closed ({error}); answering ask");
            let result = ClassificationResult::fallback(Segment::opaque(raw_command), CONFIG_UNAVAILABLE_REASON);
            return (vec![result], EvaluationStatus::Returned);
        }
    };

    let (input, overflow) = cap_input(raw_command, policy.max_input_bytes);
    let mut results = Vec::new();
    let mut status = EvaluationStatus::Returned;

    if policy.shell_tools.iter().any(|t| t == tool_scope) {
        // One deadline for the command and all of its substitutions
        let deadline = policy.tokenizer.deadline();
        if let Err(e) = classify_command(policy, rules, tool_scope, input, deadline, 0, &mut results) {
            debug!("tokenizer rejected command: {e}");
            results.clear();
            results.push(ClassificationResult::fallback(
                Segment::opaque(input),
                format!("could not parse command: {e}; defaulting to ask"),
            ));
            status = EvaluationStatus::Rejected;
        }
    } else {
        results.push(policy.classifier.classify(tool_scope, &Segment::opaque(input), rules));
    }

    if overflow > 0 {
        let segment = Segment {
            raw: format!("<{overflow} bytes beyond limit>"),
            tokens: Vec::new(),
            following_operator: None,
            substitutions: Vec::new(),
            redirection: None,
        };
        results.push(ClassificationResult::fallback(
            segment,
            format!(
                "input exceeds {} bytes; remainder not evaluated",
                policy.max_input_bytes
            ),
        ));
    }

    (results, status)
}

/// Tokenize `command` and classify each segment, recursing into substitutions.
fn classify_command(
    policy: &Policy,
    rules: &RuleSet,
    tool_scope: &str,
    command: &str,
    deadline: Option<Instant>,
    depth: usize,
    out: &mut Vec<ClassificationResult>,
) -> Result<(), TokenizeError> {
    let segments = policy.tokenizer.tokenize_until(command, deadline)?;
    for segment in &segments {
        debug!(
            "segment {:?} {}",
            segment.raw,
            segment.following_operator.map_or("", |op| op.as_str())
        );
        let mut result = policy.classifier.classify(tool_scope, segment, rules);
        if depth > 0 {
            result.reason = format!("in substitution: {}", result.reason);
        }
        out.push(result);

        for inner in &segment.substitutions {
            if depth + 1 >= MAX_SUBSTITUTION_DEPTH {
                out.push(ClassificationResult::fallback(
                    Segment::opaque(inner),
                    "substitution nested too deeply; defaulting to ask",
                ));
                continue;
            }
            classify_command(policy, rules, tool_scope, inner, deadline, depth + 1, out)?;
        }
    }
    Ok(())
}

/// Cut `input` at the largest char boundary not above `max` bytes.
/// Returns the kept prefix and how many bytes were cut.
fn cap_input(input: &str, max: usize) -> (&str, usize) {
    if input.len() <= max {
        return (input, 0);
    }
    let mut cut = max;
    while !input.is_char_boundary(cut) {
        cut -= 1;
    }
    (&input[..cut], input.len() - cut)
}

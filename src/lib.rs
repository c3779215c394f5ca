//! cmdgate: a policy engine that decides whether an agent may run a shell
//! command.
//!
//! Every request is answered with one of three tiers:
//! [`eval::Tier::Allow`], [`eval::Tier::Ask`] or [`eval::Tier::Deny`].
//! Compound commands are split into segments at shell control operators,
//! each segment is matched against prefix rules loaded from configuration,
//! and the most restrictive segment decides the whole command.
//!
//! # Architecture
//!
//! - **[`parse`]**: Quote-aware tokenizer splitting commands into segments.
//! - **[`rules`]**: Permission patterns and the longest-prefix rule index.
//! - **[`eval`]**: Segment classification and aggregation into a decision.
//! - **[`engine`]**: [`engine::PolicyEngine`], the facade tying it together.
//! - **[`audit`]**: NDJSON audit log of every evaluation.
//! - **[`config`]**: Embedded defaults plus TOML overlays.
//! - **[`hook`]**: Wire types for the stdin/stdout hook binary.
//! - **[`logging`]**: Diagnostic log initialization.

/// Audit records and sinks.
pub mod audit;
/// Configuration loading and overlay merging.
pub mod config;
/// Policy engine facade.
pub mod engine;
/// Error types, one enum per subsystem.
pub mod error;
/// Classification and aggregation.
pub mod eval;
/// Hook request/response types.
pub mod hook;
/// Diagnostic logging to `~/.local/share/cmdgate/cmdgate.log`.
pub mod logging;
/// Shell command tokenizing.
pub mod parse;
/// Permission rules and rule lookup.
pub mod rules;

use eval::Decision;

/// Evaluate a Bash command against the built-in default rules.
///
/// This is the main entry point for tests and simple usage. For user
/// configuration or auditing, build an [`engine::PolicyEngine`] directly.
pub fn evaluate(command: &str) -> Decision {
    let policy = engine::Policy::from_load(Ok(config::Config::default_config()));
    let engine = engine::PolicyEngine::new(policy, Box::new(audit::NullAudit));
    engine.evaluate("Bash", command)
}

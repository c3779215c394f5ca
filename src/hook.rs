//! JSON request/response types for the stdin/stdout hook protocol.

use serde::{Deserialize, Serialize};

use crate::eval::{Decision, Tier};

/// A request to authorize one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookRequest {
    pub tool: String,
    pub command: String,
}

/// Accepted wire shapes. The Claude Code PreToolUse payload nests the
/// command under `tool_input`.
#[derive(Deserialize)]
#[serde(untagged)]
enum Wire {
    Plain {
        tool: String,
        command: String,
    },
    PreToolUse {
        tool_name: String,
        tool_input: serde_json::Value,
    },
}

impl HookRequest {
    pub fn parse(input: &str) -> Result<Self, serde_json::Error> {
        Ok(match serde_json::from_str(input)? {
            Wire::Plain { tool, command } => Self { tool, command },
            Wire::PreToolUse {
                tool_name,
                tool_input,
            } => {
                // Non-shell tools carry a path or URL instead of a command.
                let command = ["command", "file_path", "url"]
                    .iter()
                    .find_map(|k| tool_input.get(k).and_then(|v| v.as_str()))
                    .map(str::to_string)
                    .unwrap_or_else(|| tool_input.to_string());
                Self {
                    tool: tool_name,
                    command,
                }
            }
        })
    }
}

/// What the hook prints to stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookResponse {
    pub decision: Tier,
    pub reason: String,
}

impl HookResponse {
    /// Response for a request that could not be understood.
    pub fn malformed(error: impl std::fmt::Display) -> Self {
        Self {
            decision: Tier::Ask,
            reason: format!("malformed hook request: {error}"),
        }
    }
}

impl From<&Decision> for HookResponse {
    fn from(decision: &Decision) -> Self {
        Self {
            decision: decision.outcome,
            reason: decision.rationale.clone(),
        }
    }
}

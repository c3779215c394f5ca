// error.rs: one error enum per subsystem.
//
// None of these ever reach the caller of `PolicyEngine::evaluate`: each one
// degrades the decision toward Ask instead.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading the rule configuration.
///
/// Any of these puts the engine into fail-closed mode.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested config file does not exist.
    #[error("config file not found: {path}")]
    Missing { path: PathBuf },

    /// The config file exists but could not be read.
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The config file is not valid TOML for our schema.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A permission entry is not of the form `Tool`, `Tool(prefix)` or `Tool(prefix:*)`.
    #[error("invalid rule pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Errors raised by the shell tokenizer. The command is then treated as Ask.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenizeError {
    #[error("unterminated single quote")]
    UnterminatedSingleQuote,

    #[error("unterminated double quote")]
    UnterminatedDoubleQuote,

    #[error("unterminated backtick substitution")]
    UnterminatedBacktick,

    /// An open `$(`, `<(` or `>(` without its closing parenthesis.
    #[error("unterminated {opener} substitution")]
    UnterminatedSubstitution { opener: &'static str },

    #[error("trailing backslash escape")]
    TrailingEscape,

    /// `<<` with no delimiter word after it.
    #[error("here-document without a delimiter")]
    MissingHeredocDelimiter,

    /// Input ended before the here-document's terminator line.
    #[error("here-document not terminated by {delimiter:?}")]
    UnterminatedHeredoc { delimiter: String },

    #[error("tokenizing exceeded its {budget_ms} ms budget")]
    BudgetExceeded { budget_ms: u128 },
}

/// Errors raised while handing a record to the audit log.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Failed to open or create the audit log file.
    #[error("failed to open audit log at {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to serialize a record.
    #[error("failed to serialize audit record: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The writer is behind and its queue is full; the record was dropped.
    #[error("audit queue full, record dropped")]
    QueueFull,

    /// The writer thread is gone.
    #[error("audit writer is closed")]
    Closed,
}

//! Append-only NDJSON audit log of every evaluation.
//!
//! Writing is best-effort: records are handed to a background writer over a
//! bounded queue, so a slow or broken log sink never delays a decision.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{error, warn};
use serde::{Deserialize, Serialize};

use crate::error::AuditError;
use crate::eval::{Decision, Tier};

/// Terminal state of an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationStatus {
    /// The command was tokenized and classified.
    Returned,
    /// The command could not be tokenized; the decision was forced to Ask.
    Rejected,
}

/// One line of the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub tool: String,
    pub command: String,
    pub outcome: Tier,
    pub status: EvaluationStatus,
    pub rationale: String,
    pub segments: Vec<AuditSegment>,
}

/// Per-segment part of an [`AuditRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSegment {
    pub segment: String,
    pub tier: Tier,
    /// Pattern of the matched rule, or `"none"`.
    pub rule: String,
    pub reason: String,
}

impl AuditRecord {
    pub fn new(decision: &Decision, tool: &str, command: &str, status: EvaluationStatus) -> Self {
        Self {
            timestamp: decision.timestamp,
            tool: tool.to_string(),
            command: command.to_string(),
            outcome: decision.outcome,
            status,
            rationale: decision.rationale.clone(),
            segments: decision
                .breakdown
                .iter()
                .map(|r| AuditSegment {
                    segment: r.segment.raw.clone(),
                    tier: r.tier,
                    rule: r.rule_id().to_string(),
                    reason: r.reason.clone(),
                })
                .collect(),
        }
    }
}

/// Destination for audit records.
pub trait AuditSink: Send + Sync {
    /// Hand over one record. Must not block on I/O.
    fn record(&self, record: &AuditRecord) -> Result<(), AuditError>;
}

/// Discards every record; used when auditing is disabled.
#[derive(Debug, Default)]
pub struct NullAudit;

impl AuditSink for NullAudit {
    fn record(&self, _record: &AuditRecord) -> Result<(), AuditError> {
        Ok(())
    }
}

/// NDJSON file log written by a background thread.
///
/// Dropping the log closes the queue and waits up to the flush timeout for
/// pending records to reach the file.
pub struct JsonlAuditLog {
    path: PathBuf,
    sender: Option<SyncSender<String>>,
    done: Mutex<Option<Receiver<()>>>,
    flush_timeout: Duration,
}

impl JsonlAuditLog {
    /// Open (or create) the log at `path` and start its writer.
    pub fn open(
        path: impl AsRef<Path>,
        capacity: usize,
        flush_timeout: Duration,
    ) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| AuditError::Open {
                path: path.clone(),
                source,
            })?;
        }

        // Append mode: existing records are never overwritten.
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| AuditError::Open {
                path: path.clone(),
                source,
            })?;

        let (sender, receiver) = mpsc::sync_channel::<String>(capacity.max(1));
        let (done_tx, done_rx) = mpsc::channel();
        let log_path = path.clone();
        std::thread::Builder::new()
            .name("cmdgate-audit".into())
            .spawn(move || {
                let mut writer = BufWriter::new(file);
                for line in receiver {
                    if let Err(e) = writeln!(writer, "{line}").and_then(|_| writer.flush()) {
                        error!("audit write to {} failed: {e}", log_path.display());
                    }
                }
                let _ = done_tx.send(());
            })
            .map_err(|source| AuditError::Open {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            path,
            sender: Some(sender),
            done: Mutex::new(Some(done_rx)),
            flush_timeout,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonlAuditLog {
    fn record(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let line = serde_json::to_string(record)?;
        let sender = self.sender.as_ref().ok_or(AuditError::Closed)?;
        sender.try_send(line).map_err(|e| match e {
            TrySendError::Full(_) => AuditError::QueueFull,
            TrySendError::Disconnected(_) => AuditError::Closed,
        })
    }
}

impl Drop for JsonlAuditLog {
    fn drop(&mut self) {
        // Closing the queue ends the writer loop once it has drained.
        self.sender.take();
        let done = match self.done.get_mut() {
            Ok(slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(done) = done
            && done.recv_timeout(self.flush_timeout).is_err()
        {
            warn!(
                "audit log {} not flushed within {:?}",
                self.path.display(),
                self.flush_timeout
            );
        }
    }
}

//! Structured audit logging for teardown actions.
//!
//! Provides the [`AuditLogger`] trait and associated types. The primary
//! implementation, [`JsonlAuditWriter`], appends JSONL records to
//! daily-rotating files under the logs directory.

pub mod writer;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event type classification for audit log entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// A container was asked to stop.
    ContainerKill,
    /// A stopped container was removed.
    ContainerRemove,
    /// The container id marker file was deleted.
    MarkerRemoved,
    /// A teardown step failed.
    Failure,
}

/// A structured record of one teardown action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// ISO 8601 timestamp with timezone.
    pub timestamp: DateTime<Utc>,
    /// Event classification.
    pub event_type: AuditEventType,
    /// Container the action targeted.
    pub container_id: Option<String>,
    /// Command line that was executed.
    pub command: Option<String>,
    /// Brief result description.
    pub result_summary: Option<String>,
    /// Error text for failures.
    pub reason: Option<String>,
}

impl AuditEntry {
    /// Construct a minimal audit entry for the given event type.
    #[must_use]
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
            container_id: None,
            command: None,
            result_summary: None,
            reason: None,
        }
    }

    /// Set the container id for this entry.
    #[must_use]
    pub fn with_container(mut self, container_id: String) -> Self {
        self.container_id = Some(container_id);
        self
    }

    /// Set the executed command for this entry.
    #[must_use]
    pub fn with_command(mut self, command: String) -> Self {
        self.command = Some(command);
        self
    }

    /// Set the result summary for this entry.
    #[must_use]
    pub fn with_result(mut self, summary: String) -> Self {
        self.result_summary = Some(summary);
        self
    }

    /// Set the failure reason for this entry.
    #[must_use]
    pub fn with_reason(mut self, reason: String) -> Self {
        self.reason = Some(reason);
        self
    }
}

/// Writes structured audit entries to a persistent store.
///
/// Implementations must be [`Send`] and [`Sync`] to allow sharing across
/// threads via [`std::sync::Arc`].
pub trait AuditLogger: Send + Sync {
    /// Record a single audit entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying write operation fails.
    fn log_entry(&self, entry: AuditEntry) -> crate::Result<()>;
}

pub use writer::JsonlAuditWriter;

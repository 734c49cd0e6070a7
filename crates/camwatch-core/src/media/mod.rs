//! Media capture sessions: snapshots, recordings, and scheduled
//! recordings, with per-device exclusivity.

pub mod capture;
pub mod manager;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Unique session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MediaKind {
    Snapshot,
    Recording,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionState {
    /// Snapshot created, capture not yet finished.
    Pending,
    /// Recording armed for a future start time.
    Scheduled,
    Running,
    /// Snapshot finished successfully.
    Done,
    Stopped,
    Failed,
}

impl SessionState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Done | SessionState::Stopped | SessionState::Failed
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Pending => "PENDING",
            SessionState::Scheduled => "SCHEDULED",
            SessionState::Running => "RUNNING",
            SessionState::Done => "DONE",
            SessionState::Stopped => "STOPPED",
            SessionState::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

/// One snapshot or recording operation instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaSession {
    pub id: SessionId,
    pub device: String,
    pub kind: MediaKind,
    pub state: SessionState,
    pub format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<DateTime<Utc>>,
    /// Requested duration for recordings; actual elapsed time once
    /// stopped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u64>,
    pub output_path: PathBuf,
}

impl MediaSession {
    /// Non-terminal RECORDING sessions block other recordings on the
    /// same device.
    #[must_use]
    pub fn blocks_device(&self, device: &str) -> bool {
        self.kind == MediaKind::Recording && self.device == device && !self.state.is_terminal()
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Interrupted,
    Paused,
    Aborted,
}

/// An execution context for one (feature, issue) pair. At most one
/// `Active` session may exist per pair; enforced by the store's lock file,
/// not by this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub feature_id: String,
    pub issue_number: u32,
    pub started_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub last_checkpoint: Option<String>,
}

impl Session {
    pub fn new(feature_id: impl Into<String>, issue_number: u32) -> Self {
        Self {
            session_id: format!("ses-{}", uuid::Uuid::new_v4()),
            feature_id: feature_id.into(),
            issue_number,
            started_at: Utc::now(),
            status: SessionStatus::Active,
            last_checkpoint: None,
        }
    }

    pub fn lock_key(&self) -> String {
        lock_key(&self.feature_id, self.issue_number)
    }
}

pub fn lock_key(feature_id: &str, issue_number: u32) -> String {
    format!("{feature_id}-{issue_number}")
}

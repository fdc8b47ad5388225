use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One of the four ordered recovery strategies (spec.md §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryLevel {
    RetrySame = 1,
    RetryAlternate = 2,
    RetryClarify = 3,
    Escalate = 4,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeAction {
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub artifacts: Vec<String>,
}

/// An append-only record of one unit of work: what was attempted, how it
/// went, and a short reflection fed back into future retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub episode_id: String,
    pub timestamp: DateTime<Utc>,
    pub goal: String,
    #[serde(default)]
    pub actions: Vec<EpisodeAction>,
    pub outcome: EpisodeOutcome,
    pub reflection: String,
    pub recovery_level_used: RecoveryLevel,
    pub cost_usd: f64,
    pub duration_seconds: f64,
    pub embedding: Vec<f32>,
}

impl Episode {
    pub fn new(goal: impl Into<String>, outcome: EpisodeOutcome, recovery_level: RecoveryLevel) -> Self {
        Self {
            episode_id: format!("ep-{}", uuid::Uuid::new_v4()),
            timestamp: Utc::now(),
            goal: goal.into(),
            actions: Vec::new(),
            outcome,
            reflection: String::new(),
            recovery_level_used: recovery_level,
            cost_usd: 0.0,
            duration_seconds: 0.0,
            embedding: Vec::new(),
        }
    }
}

/// A summary episode that replaces a run of aged-out episodes during
/// periodic compaction (spec.md §4.7), preserving reflection text and
/// aggregate outcome rather than the raw actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub summary_id: String,
    pub covers_episode_ids: Vec<String>,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub success_count: u32,
    pub failure_count: u32,
    pub total_cost_usd: f64,
    pub reflection: String,
}

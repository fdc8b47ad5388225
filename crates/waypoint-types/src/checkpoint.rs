use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of checkpoint triggers (spec.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointTrigger {
    CostSingle,
    CostCumulative,
    Time,
    ApprovalRequired,
    HighRisk,
    ScopeChange,
    UxChange,
    ErrorSpike,
    Blocker,
    Hiccup,
    EndOfSession,
}

impl CheckpointTrigger {
    /// Rough severity ordering used to pick the trigger to surface when
    /// several fire at once; the rest are recorded in context rather than
    /// dropped.
    pub fn severity(self) -> u8 {
        use CheckpointTrigger::*;
        match self {
            Hiccup => 10,
            Blocker => 9,
            HighRisk => 8,
            ErrorSpike => 7,
            CostCumulative => 6,
            CostSingle => 5,
            ScopeChange => 4,
            UxChange => 3,
            ApprovalRequired => 2,
            Time => 1,
            EndOfSession => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    Pending,
    Approved,
    Rejected,
    Superseded,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptionTradeoffs {
    #[serde(default)]
    pub pros: Vec<String>,
    #[serde(default)]
    pub cons: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointOption {
    pub id: String,
    pub label: String,
    pub description: String,
    #[serde(default)]
    pub tradeoffs: OptionTradeoffs,
    #[serde(default)]
    pub is_recommended: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub score: f64,
    pub cost_impact: f64,
    pub scope: f64,
    pub reversibility: f64,
    pub confidence: f64,
    pub precedent: f64,
    pub recommendation: RiskRecommendation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskRecommendation {
    Proceed,
    Checkpoint,
    Block,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarDecision {
    pub description: String,
    pub approved: bool,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub checkpoint_id: String,
    pub trigger: CheckpointTrigger,
    pub context: String,
    pub question: String,
    pub options: Vec<CheckpointOption>,
    #[serde(default)]
    pub other_triggers: Vec<CheckpointTrigger>,
    #[serde(default)]
    pub similar_decisions: Vec<SimilarDecision>,
    pub status: CheckpointStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_option_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_assessment: Option<RiskAssessment>,
    /// The session this checkpoint paused, so resolution knows what to
    /// resume (spec.md §3.1 Checkpoint invariant).
    pub session_id: String,
}

impl Checkpoint {
    pub fn new(
        trigger: CheckpointTrigger,
        context: impl Into<String>,
        question: impl Into<String>,
        options: Vec<CheckpointOption>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            checkpoint_id: format!("chk-{}", uuid::Uuid::new_v4()),
            trigger,
            context: context.into(),
            question: question.into(),
            options,
            other_triggers: Vec::new(),
            similar_decisions: Vec::new(),
            status: CheckpointStatus::Pending,
            created_at: Utc::now(),
            resolved_at: None,
            resolution_notes: None,
            resolution_option_id: None,
            risk_assessment: None,
            session_id: session_id.into(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == CheckpointStatus::Pending
    }

    /// Resolves the checkpoint. Idempotent: resolving an already-terminal
    /// checkpoint with the same option id is a no-op that still succeeds
    /// (spec.md §8 law: `resolve` applied twice equals applying it once).
    pub fn resolve(
        &mut self,
        option_id: &str,
        approved: bool,
        notes: Option<String>,
    ) -> Result<(), CheckpointResolutionError> {
        if !self.is_pending() {
            if self.resolution_option_id.as_deref() == Some(option_id) {
                return Ok(());
            }
            return Err(CheckpointResolutionError::AlreadyResolved {
                checkpoint_id: self.checkpoint_id.clone(),
            });
        }
        if !self.options.iter().any(|o| o.id == option_id) {
            return Err(CheckpointResolutionError::UnknownOption {
                option_id: option_id.to_string(),
            });
        }
        self.status = if approved {
            CheckpointStatus::Approved
        } else {
            CheckpointStatus::Rejected
        };
        self.resolution_option_id = Some(option_id.to_string());
        self.resolution_notes = notes;
        self.resolved_at = Some(Utc::now());
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CheckpointResolutionError {
    #[error("checkpoint {checkpoint_id} already resolved with a different option")]
    AlreadyResolved { checkpoint_id: String },
    #[error("unknown option id: {option_id}")]
    UnknownOption { option_id: String },
}

/// Feedback fed back into subsequent agent prompts after a checkpoint
/// resolves, tagged with applicability and an expiry the caller should
/// honor (spec.md §4.6.4 and §9 open question: no code path in the source
/// enforced `expires_at` — this port makes the field explicit instead of
/// silently ignoring it, and leaves enforcement to the caller).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncorporatedFeedback {
    pub checkpoint_id: String,
    pub notes: String,
    pub applies_to: FeedbackScope,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackScope {
    SameTask,
    SameFeature,
    Global,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn option(id: &str) -> CheckpointOption {
        CheckpointOption {
            id: id.to_string(),
            label: id.to_string(),
            description: String::new(),
            tradeoffs: OptionTradeoffs::default(),
            is_recommended: false,
        }
    }

    #[test]
    fn resolve_twice_with_same_option_is_idempotent() {
        let mut checkpoint = Checkpoint::new(
            CheckpointTrigger::CostCumulative,
            "ctx",
            "proceed?",
            vec![option("a"), option("b")],
            "ses-1",
        );
        checkpoint.resolve("a", true, None).unwrap();
        checkpoint.resolve("a", true, None).unwrap();
        assert_eq!(checkpoint.status, CheckpointStatus::Approved);
    }

    #[test]
    fn resolve_with_different_option_after_resolved_errors() {
        let mut checkpoint = Checkpoint::new(
            CheckpointTrigger::HighRisk,
            "ctx",
            "proceed?",
            vec![option("a"), option("b")],
            "ses-1",
        );
        checkpoint.resolve("a", true, None).unwrap();
        let err = checkpoint.resolve("b", true, None).unwrap_err();
        assert!(matches!(err, CheckpointResolutionError::AlreadyResolved { .. }));
    }

    #[test]
    fn unknown_option_is_rejected() {
        let mut checkpoint = Checkpoint::new(
            CheckpointTrigger::Time,
            "ctx",
            "proceed?",
            vec![option("a")],
            "ses-1",
        );
        let err = checkpoint.resolve("z", true, None).unwrap_err();
        assert!(matches!(err, CheckpointResolutionError::UnknownOption { .. }));
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BugPhase {
    Reported,
    Reproducing,
    Investigating,
    Planned,
    Fixing,
    Verifying,
    Fixed,
    Blocked,
}

impl BugPhase {
    pub fn legal_successors(self) -> &'static [BugPhase] {
        use BugPhase::*;
        match self {
            Reported => &[Reproducing],
            Reproducing => &[Investigating],
            Investigating => &[Planned],
            Planned => &[Fixing],
            Fixing => &[Verifying],
            Verifying => &[Fixed],
            Fixed | Blocked => &[],
        }
    }

    pub fn can_advance_to(self, next: BugPhase) -> bool {
        next == BugPhase::Blocked || self.legal_successors().contains(&next)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bug {
    pub bug_id: String,
    pub phase: BugPhase,
    #[serde(default)]
    pub evidence: Vec<String>,
    #[serde(default)]
    pub root_cause: Option<String>,
    #[serde(default)]
    pub fix_plan: Vec<String>,
    #[serde(default)]
    pub cost_usd: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bug {
    pub fn new(bug_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            bug_id: bug_id.into(),
            phase: BugPhase::Reported,
            evidence: Vec::new(),
            root_cause: None,
            fix_plan: Vec::new(),
            cost_usd: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn advance_phase(&mut self, next: BugPhase) -> Result<(), BugPhaseTransitionError> {
        if !self.phase.can_advance_to(next) {
            return Err(BugPhaseTransitionError {
                from: self.phase,
                to: next,
            });
        }
        self.phase = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("illegal bug phase transition: {from:?} -> {to:?}")]
pub struct BugPhaseTransitionError {
    pub from: BugPhase,
    pub to: BugPhase,
}

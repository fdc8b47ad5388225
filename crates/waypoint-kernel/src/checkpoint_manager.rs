use chrono::{Duration as ChronoDuration, Utc};
use waypoint_types::{
    Checkpoint, CheckpointOption, CheckpointTrigger, FeedbackScope, IncorporatedFeedback,
    RiskAssessment, RiskRecommendation, SimilarDecision,
};

const WEIGHT_COST_IMPACT: f64 = 0.25;
const WEIGHT_SCOPE: f64 = 0.20;
const WEIGHT_REVERSIBILITY: f64 = 0.25;
const WEIGHT_CONFIDENCE: f64 = 0.15;
const WEIGHT_PRECEDENT: f64 = 0.15;

/// Open question (`spec.md` §9): the source uses "30% of budget = 1.0
/// risk" in one place and a different normalization elsewhere; this port
/// picks the 30%-of-budget form as canonical (see DESIGN.md).
pub fn cost_impact_score(estimated_cost_usd: f64, budget_usd: f64) -> f64 {
    if budget_usd <= 0.0 {
        return 1.0;
    }
    (estimated_cost_usd / (budget_usd * 0.30)).clamp(0.0, 1.0)
}

/// Classifies an action description into a reversibility score
/// (`spec.md` §4.6.1): destructive verbs score highest, external-publish
/// verbs score middling, everything else is low.
pub fn reversibility_score(action_description: &str) -> f64 {
    let lower = action_description.to_ascii_lowercase();
    const DESTRUCTIVE: &[&str] = &["delete", "drop", "reset"];
    const EXTERNAL: &[&str] = &["publish", "deploy", "push"];
    if DESTRUCTIVE.iter().any(|verb| lower.contains(verb)) {
        1.0
    } else if EXTERNAL.iter().any(|verb| lower.contains(verb)) {
        0.7
    } else {
        0.2
    }
}

pub struct RiskInputs {
    pub cost_impact: f64,
    pub scope: f64,
    pub reversibility: f64,
    pub confidence: f64,
    pub precedent: f64,
}

/// Weighted sum over five normalized factors (`spec.md` §4.6.1).
pub fn score_risk(inputs: RiskInputs) -> RiskAssessment {
    let score = WEIGHT_COST_IMPACT * inputs.cost_impact.clamp(0.0, 1.0)
        + WEIGHT_SCOPE * inputs.scope.clamp(0.0, 1.0)
        + WEIGHT_REVERSIBILITY * inputs.reversibility.clamp(0.0, 1.0)
        + WEIGHT_CONFIDENCE * inputs.confidence.clamp(0.0, 1.0)
        + WEIGHT_PRECEDENT * inputs.precedent.clamp(0.0, 1.0);

    let recommendation = if score >= 0.7 {
        RiskRecommendation::Block
    } else if score >= 0.4 {
        RiskRecommendation::Checkpoint
    } else {
        RiskRecommendation::Proceed
    };

    RiskAssessment {
        score,
        cost_impact: inputs.cost_impact,
        scope: inputs.scope,
        reversibility: inputs.reversibility,
        confidence: inputs.confidence,
        precedent: inputs.precedent,
        recommendation,
    }
}

pub struct PreflightInputs {
    pub remaining_budget_usd: f64,
    pub estimated_cost_usd: f64,
    pub dependencies_available: bool,
    pub risk: RiskAssessment,
    pub file_conflict: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PreflightResult {
    Proceed,
    NeedsCheckpoint {
        trigger: CheckpointTrigger,
        reason: String,
    },
}

/// Pre-dispatch checks (`spec.md` §4.6.2): budget, dependencies, risk,
/// file conflicts. Budget exactly equal to the estimated cost still
/// proceeds — only a strict shortfall triggers a checkpoint.
pub fn preflight(inputs: &PreflightInputs) -> PreflightResult {
    if inputs.remaining_budget_usd < inputs.estimated_cost_usd {
        return PreflightResult::NeedsCheckpoint {
            trigger: CheckpointTrigger::CostSingle,
            reason: format!(
                "estimated cost ${:.2} exceeds remaining budget ${:.2}",
                inputs.estimated_cost_usd, inputs.remaining_budget_usd
            ),
        };
    }
    if !inputs.dependencies_available {
        return PreflightResult::NeedsCheckpoint {
            trigger: CheckpointTrigger::Blocker,
            reason: "a declared dependency is unavailable".to_string(),
        };
    }
    if inputs.file_conflict {
        return PreflightResult::NeedsCheckpoint {
            trigger: CheckpointTrigger::Blocker,
            reason: "concurrent session holds a conflicting file lock".to_string(),
        };
    }
    match inputs.risk.recommendation {
        RiskRecommendation::Block => PreflightResult::NeedsCheckpoint {
            trigger: CheckpointTrigger::HighRisk,
            reason: format!("risk score {:.2} requires human review", inputs.risk.score),
        },
        RiskRecommendation::Checkpoint => PreflightResult::NeedsCheckpoint {
            trigger: CheckpointTrigger::HighRisk,
            reason: format!("risk score {:.2} warrants a checkpoint", inputs.risk.score),
        },
        RiskRecommendation::Proceed => PreflightResult::Proceed,
    }
}

/// Picks the primary trigger to surface when several fire at once,
/// keeping the rest as context rather than dropping them (`spec.md`
/// §4.6).
pub fn primary_trigger(fired: &[CheckpointTrigger]) -> Option<(CheckpointTrigger, Vec<CheckpointTrigger>)> {
    let (index, primary) = fired
        .iter()
        .enumerate()
        .max_by_key(|(_, trigger)| trigger.severity())?;
    let others = fired
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != index)
        .map(|(_, t)| *t)
        .collect();
    Some((*primary, others))
}

/// Composes a well-formed checkpoint (`spec.md` §4.6.3).
#[allow(clippy::too_many_arguments)]
pub fn compose_checkpoint(
    trigger: CheckpointTrigger,
    other_triggers: Vec<CheckpointTrigger>,
    context: impl Into<String>,
    question: impl Into<String>,
    options: Vec<CheckpointOption>,
    similar_decisions: Vec<SimilarDecision>,
    risk: Option<RiskAssessment>,
    session_id: impl Into<String>,
) -> Checkpoint {
    let mut checkpoint = Checkpoint::new(trigger, context, question, options, session_id);
    checkpoint.other_triggers = other_triggers;
    checkpoint.similar_decisions = similar_decisions;
    checkpoint.risk_assessment = risk;
    checkpoint
}

/// Turns a resolved checkpoint's notes into feedback for future prompts
/// (`spec.md` §4.6.4). Returns `None` if there are no notes to carry
/// forward. Enforcement of `expires_at` is left to the caller — no
/// canonical semantics are described (`spec.md` §9 open question).
pub fn incorporate_feedback(
    checkpoint: &Checkpoint,
    applies_to: FeedbackScope,
    ttl_hours: i64,
) -> Option<IncorporatedFeedback> {
    let notes = checkpoint.resolution_notes.clone()?;
    Some(IncorporatedFeedback {
        checkpoint_id: checkpoint.checkpoint_id.clone(),
        notes,
        applies_to,
        expires_at: Utc::now() + ChronoDuration::hours(ttl_hours),
    })
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::bug::Bug;
use crate::feature::EstimatedSize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    SpecAuthor,
    SpecCritic,
    IssueCreator,
    ComplexityGate,
    IssueSplitter,
    Coder,
    Verifier,
    BugResearcher,
    RootCauseAnalyzer,
    FixPlanner,
    Recovery,
    Critic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractDirection {
    Input,
    Output,
}

/// Raised when a dispatched role's payload does not satisfy its declared
/// schema. Always fatal for the current unit of work (`spec.md` §4.3): it
/// indicates a code bug in the caller or callee, never a condition to retry.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[error("contract violation for {role:?} ({direction:?}): missing={missing:?} extra={extra:?}")]
pub struct ContractViolation {
    pub role: AgentRole,
    pub direction: ContractDirection,
    pub missing: Vec<String>,
    pub extra: Vec<String>,
    pub type_errors: BTreeMap<String, String>,
}

impl ContractViolation {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty() && self.type_errors.is_empty()
    }
}

// --- SpecAuthor ---------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecAuthorInput {
    pub feature_id: String,
    pub prd: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecAuthorOutput {
    pub spec_markdown: String,
}

// --- SpecCritic ----------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecCriticInput {
    pub feature_id: String,
    pub spec: String,
    pub prd: String,
    pub round: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecCriticOutput {
    pub score: f64,
    pub feedback: String,
}

// --- IssueCreator ----------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueCreatorInput {
    pub feature_id: String,
    pub spec: String,
    #[serde(default)]
    pub max_issues: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftIssue {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub estimated_size: EstimatedSize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueCreatorOutput {
    pub issues: Vec<DraftIssue>,
}

// --- ComplexityGate --------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplexityGateInput {
    pub issue: DraftIssue,
    #[serde(default)]
    pub spec: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplexityGateOutput {
    pub estimated_turns: u32,
    pub needs_split: bool,
    #[serde(default)]
    pub split_suggestions: Vec<String>,
    pub confidence: f64,
    pub reasoning: String,
}

// --- IssueSplitter --------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueSplitterInput {
    pub issue: DraftIssue,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueSplitterOutput {
    /// At least 2 sub-issues; enforced by the orchestrator that consumes
    /// this output, not by the type itself.
    pub sub_issues: Vec<DraftIssue>,
}

// --- Coder -----------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoderInput {
    pub feature_id: String,
    pub issue: DraftIssue,
    pub registry: Vec<String>,
    #[serde(default)]
    pub prior_summaries: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoderOutput {
    #[serde(default)]
    pub files_created: Vec<String>,
    #[serde(default)]
    pub files_modified: Vec<String>,
    #[serde(default)]
    pub classes_defined: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub test_file: Option<String>,
}

impl CoderOutput {
    /// `spec.md` §7: empty agent output is always a failure, never a
    /// silent success.
    pub fn is_empty(&self) -> bool {
        self.files_created.is_empty() && self.files_modified.is_empty()
    }
}

// --- Verifier ----------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierInput {
    pub feature_id: String,
    pub issue: DraftIssue,
    pub files: Vec<String>,
    pub test_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierOutput {
    pub tests_passed: bool,
    #[serde(default)]
    pub commit_sha: Option<String>,
    #[serde(default)]
    pub schema_conflicts: Vec<String>,
}

// --- BugResearcher -----------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BugResearcherInput {
    pub bug: Bug,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BugResearcherOutput {
    pub confirmed: bool,
    pub evidence: Vec<String>,
    pub affected_files: Vec<String>,
}

// --- RootCauseAnalyzer ---------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootCauseAnalyzerInput {
    pub bug: Bug,
    pub evidence: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootCauseAnalyzerOutput {
    pub root_cause: String,
    pub candidate_locations: Vec<String>,
}

// --- FixPlanner ----------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixPlannerInput {
    pub bug: Bug,
    pub root_cause: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixPlannerOutput {
    pub plan_steps: Vec<String>,
}

// --- Recovery ------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryInput {
    pub failure: String,
    pub context: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryOutput {
    pub recoverable: bool,
    pub strategy: String,
    pub plan: String,
    #[serde(default)]
    pub human_instructions: Option<String>,
}

// --- Critic (Spec/Code/Test x focus) -------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriticKind {
    Spec,
    Code,
    Test,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticInput {
    pub kind: CriticKind,
    pub focus: String,
    pub artifact: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticOutput {
    pub score: f64,
    pub approved: bool,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    pub reasoning: String,
}

/// Uniform result shape for every agent dispatch (`spec.md` §9 design
/// note): callers match on this instead of a raw `Result<T, Error>` so the
/// recovery manager's error-kind routing (§4.5, §7) is exhaustive at the
/// type level.
#[derive(Debug, Clone)]
pub enum AgentOutcome<T> {
    Ok(T),
    TransientErr(String),
    SystematicErr(String),
    AmbiguityErr(String),
    FatalErr(String),
    ContractErr(ContractViolation),
}

impl<T> AgentOutcome<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, AgentOutcome::Ok(_))
    }

    pub fn into_ok(self) -> Option<T> {
        match self {
            AgentOutcome::Ok(v) => Some(v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_coder_output_is_reported_as_empty() {
        let output = CoderOutput::default();
        assert!(output.is_empty());
    }

    #[test]
    fn non_empty_violation_has_at_least_one_field_set() {
        let violation = ContractViolation {
            role: AgentRole::Coder,
            direction: ContractDirection::Output,
            missing: vec!["files_created".to_string()],
            extra: Vec::new(),
            type_errors: BTreeMap::new(),
        };
        assert!(!violation.is_empty());
    }

    #[test]
    fn agent_outcome_extracts_ok_value_only_on_ok_variant() {
        let outcome: AgentOutcome<u32> = AgentOutcome::Ok(7);
        assert_eq!(outcome.into_ok(), Some(7));
        let failed: AgentOutcome<u32> = AgentOutcome::TransientErr("timeout".into());
        assert_eq!(failed.into_ok(), None);
    }
}

pub mod autopilot;
pub mod bug;
pub mod campaign;
pub mod checkpoint;
pub mod config;
pub mod contracts;
pub mod episode;
pub mod feature;
pub mod session;

pub use autopilot::{AutopilotSession, AutopilotStatus, Goal, GoalStatus, StopTrigger};
pub use bug::{Bug, BugPhase, BugPhaseTransitionError};
pub use campaign::{Campaign, CampaignBudgetError, CampaignState, DayPlan, Milestone, MilestoneStatus};
pub use checkpoint::{
    Checkpoint, CheckpointOption, CheckpointResolutionError, CheckpointStatus, CheckpointTrigger,
    FeedbackScope, IncorporatedFeedback, OptionTradeoffs, RiskAssessment, RiskRecommendation,
    SimilarDecision,
};
pub use config::{ExecutionStrategy, KernelConfig};
pub use contracts::{
    AgentOutcome, AgentRole, BugResearcherInput, BugResearcherOutput, CoderInput, CoderOutput,
    ComplexityGateInput, ComplexityGateOutput, ContractDirection, ContractViolation, CriticInput,
    CriticKind, CriticOutput, DraftIssue, FixPlannerInput, FixPlannerOutput, IssueCreatorInput,
    IssueCreatorOutput, IssueSplitterInput, IssueSplitterOutput, RecoveryInput, RecoveryOutput,
    RootCauseAnalyzerInput, RootCauseAnalyzerOutput, SpecAuthorInput, SpecAuthorOutput,
    SpecCriticInput, SpecCriticOutput, VerifierInput, VerifierOutput,
};
pub use episode::{Episode, EpisodeAction, EpisodeOutcome, EpisodeSummary, RecoveryLevel};
pub use feature::{EstimatedSize, Feature, PhaseTransitionError, FeaturePhase, Task, TaskStage};
pub use session::{lock_key, Session, SessionStatus};

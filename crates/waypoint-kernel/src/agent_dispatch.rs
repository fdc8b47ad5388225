use async_trait::async_trait;
use waypoint_types::{
    AgentOutcome, BugResearcherInput, BugResearcherOutput, ComplexityGateInput,
    ComplexityGateOutput, CoderInput, CoderOutput, CriticInput, CriticOutput, FixPlannerInput,
    FixPlannerOutput, IssueCreatorInput, IssueCreatorOutput, IssueSplitterInput,
    IssueSplitterOutput, RootCauseAnalyzerInput, RootCauseAnalyzerOutput, SpecAuthorInput,
    SpecAuthorOutput, SpecCriticInput, SpecCriticOutput, VerifierInput, VerifierOutput,
};

/// Opaque boundary to every agent role (`spec.md` §1, §4.3, §9 design
/// note): the kernel only knows the declared input/output contract for
/// each role, never how the call is actually made.
#[async_trait]
pub trait AgentDispatcher: Send + Sync {
    async fn spec_author(&self, input: SpecAuthorInput) -> AgentOutcome<SpecAuthorOutput>;
    async fn spec_critic(&self, input: SpecCriticInput) -> AgentOutcome<SpecCriticOutput>;
    async fn issue_creator(&self, input: IssueCreatorInput) -> AgentOutcome<IssueCreatorOutput>;
    async fn complexity_gate(
        &self,
        input: ComplexityGateInput,
    ) -> AgentOutcome<ComplexityGateOutput>;
    async fn issue_splitter(&self, input: IssueSplitterInput) -> AgentOutcome<IssueSplitterOutput>;
    async fn coder(&self, input: CoderInput) -> AgentOutcome<CoderOutput>;
    async fn verifier(&self, input: VerifierInput) -> AgentOutcome<VerifierOutput>;
    async fn bug_researcher(
        &self,
        input: BugResearcherInput,
    ) -> AgentOutcome<BugResearcherOutput>;
    async fn root_cause_analyzer(
        &self,
        input: RootCauseAnalyzerInput,
    ) -> AgentOutcome<RootCauseAnalyzerOutput>;
    async fn fix_planner(&self, input: FixPlannerInput) -> AgentOutcome<FixPlannerOutput>;
    async fn critic(&self, input: CriticInput) -> AgentOutcome<CriticOutput>;
}

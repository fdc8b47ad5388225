use serde_json::json;
use waypoint_memory::EpisodeStore;
use waypoint_observability::{emit_event, Component, KernelEvent};
use waypoint_store::{EventLog, EventRecord, LockManager, StateStore};
use waypoint_types::{
    AgentOutcome, CheckpointTrigger, CoderInput, ComplexityGateInput, DraftIssue, Episode,
    EpisodeOutcome, Feature, FeaturePhase, IssueCreatorInput, IssueSplitterInput, KernelConfig,
    RecoveryLevel, SpecAuthorInput, SpecCriticInput, Task, TaskStage, VerifierInput,
};

use crate::agent_dispatch::AgentDispatcher;
use crate::checkpoint_manager::{self, PreflightInputs, PreflightResult, RiskInputs};
use crate::complexity_gate::{self, GateDecision};
use crate::errors::{KernelError, KernelResult};
use crate::recovery::{self, ErrorClass, RecoveryDecision, RecoveryState};
use crate::validation::{self, CriticVote};

const MAX_CRITIC_ROUNDS: u32 = 3;

#[derive(Debug)]
pub enum SpecPhaseOutcome {
    Approved,
    NeedsCheckpoint { score: f64 },
}

#[derive(Debug)]
pub enum CycleOutcome {
    TaskCompleted { issue_number: u32 },
    TaskSplit { parent: u32, children: Vec<u32> },
    TaskFailed { issue_number: u32, reason: String },
    NothingReady,
    CheckpointRequired { trigger: CheckpointTrigger, reason: String },
}

pub struct FeatureOrchestrator<'a> {
    pub store: &'a StateStore,
    pub locks: &'a LockManager,
    pub events: &'a EventLog,
    pub episodes: &'a EpisodeStore,
    pub dispatcher: &'a dyn AgentDispatcher,
    pub config: &'a KernelConfig,
}

impl<'a> FeatureOrchestrator<'a> {
    async fn log(&self, feature_id: &str, event: &str, status: &str, detail: Option<&str>) {
        emit_event(
            tracing::Level::INFO,
            Component::Kernel,
            KernelEvent {
                event,
                feature_id: Some(feature_id),
                bug_id: None,
                session_id: None,
                checkpoint_id: None,
                status: Some(status),
                detail,
            },
        );
        let _ = self
            .events
            .append(
                feature_id,
                EventRecord::new("feature_orchestrator", event, json!({"status": status, "detail": detail})),
            )
            .await;
    }

    /// PRD_READY → SPEC_IN_PROGRESS → SPEC_NEEDS_APPROVAL (`spec.md`
    /// §4.10): author then a bounded critic/revise loop.
    pub async fn run_spec_phase(
        &self,
        feature: &mut Feature,
        prd: &str,
    ) -> KernelResult<SpecPhaseOutcome> {
        feature
            .advance_phase(FeaturePhase::SpecInProgress)
            .map_err(|e| KernelError::IllegalTransition(e.to_string()))?;

        let authored = self
            .dispatcher
            .spec_author(SpecAuthorInput {
                feature_id: feature.feature_id.clone(),
                prd: prd.to_string(),
            })
            .await;
        let mut spec_markdown = match authored {
            AgentOutcome::Ok(output) => output.spec_markdown,
            _ => return Err(KernelError::Fatal("spec author produced no spec".to_string())),
        };

        let mut score = 0.0;
        for round in 1..=MAX_CRITIC_ROUNDS {
            let critique = self
                .dispatcher
                .spec_critic(SpecCriticInput {
                    feature_id: feature.feature_id.clone(),
                    spec: spec_markdown.clone(),
                    prd: prd.to_string(),
                    round,
                })
                .await;
            match critique {
                AgentOutcome::Ok(output) => {
                    score = output.score;
                    if score >= self.config.spec_critic_score_threshold {
                        break;
                    }
                    spec_markdown = format!("{spec_markdown}\n\n<!-- revision note: {} -->", output.feedback);
                }
                _ => break,
            }
        }

        feature
            .advance_phase(FeaturePhase::SpecNeedsApproval)
            .map_err(|e| KernelError::IllegalTransition(e.to_string()))?;
        self.store.save_feature(feature).await?;

        if score >= self.config.spec_critic_score_threshold {
            Ok(SpecPhaseOutcome::Approved)
        } else {
            Ok(SpecPhaseOutcome::NeedsCheckpoint { score })
        }
    }

    /// SPEC_APPROVED → ISSUES_CREATED (`spec.md` §4.10).
    pub async fn create_issues(&self, feature: &mut Feature, spec: &str) -> KernelResult<()> {
        let created = self
            .dispatcher
            .issue_creator(IssueCreatorInput {
                feature_id: feature.feature_id.clone(),
                spec: spec.to_string(),
                max_issues: None,
            })
            .await;
        let issues = match created {
            AgentOutcome::Ok(output) => output.issues,
            _ => return Err(KernelError::Fatal("issue creator produced no issues".to_string())),
        };

        let number_of: Vec<(usize, u32)> = (0..issues.len()).map(|idx| (idx, idx as u32 + 1)).collect();

        for (idx, draft) in issues.iter().enumerate() {
            let (_, number) = number_of[idx];
            let mut task = Task::new(number, draft.title.clone(), draft.body.clone());
            task.estimated_size = draft.estimated_size;
            // Dependencies are declared by title in the draft; resolve to
            // issue numbers among this same batch.
            task.dependencies = draft
                .dependencies
                .iter()
                .filter_map(|dep_title| {
                    issues
                        .iter()
                        .position(|d| &d.title == dep_title)
                        .map(|pos| number_of[pos].1)
                })
                .collect();
            feature.tasks.push(task);
        }

        feature
            .advance_phase(FeaturePhase::IssuesCreated)
            .map_err(|e| KernelError::IllegalTransition(e.to_string()))?;
        self.store.save_feature(feature).await?;
        self.log(&feature.feature_id, "issues_created", "ok", None).await;
        Ok(())
    }

    pub fn greenlight(&self, feature: &mut Feature) -> KernelResult<()> {
        feature
            .advance_phase(FeaturePhase::Greenlit)
            .map_err(|e| KernelError::IllegalTransition(e.to_string()))
    }

    /// The implementation cycle for one task (`spec.md` §4.10 steps
    /// 1–6). Returns after one task's worth of progress; the caller loops
    /// until [`CycleOutcome::NothingReady`].
    pub async fn run_implementation_cycle(&self, feature: &mut Feature) -> KernelResult<CycleOutcome> {
        if feature.phase != FeaturePhase::Implementing {
            feature
                .advance_phase(FeaturePhase::Implementing)
                .map_err(|e| KernelError::IllegalTransition(e.to_string()))?;
        }

        let Some(task) = feature.next_ready_task().cloned() else {
            if feature.is_complete() {
                feature
                    .advance_phase(FeaturePhase::Complete)
                    .map_err(|e| KernelError::IllegalTransition(e.to_string()))?;
                self.store.save_feature(feature).await?;
            }
            return Ok(CycleOutcome::NothingReady);
        };

        let guard = match self.locks.acquire(&feature.feature_id, task.issue_number).await {
            Ok(guard) => guard,
            Err(held) => {
                return Ok(CycleOutcome::CheckpointRequired {
                    trigger: CheckpointTrigger::Blocker,
                    reason: held.to_string(),
                })
            }
        };

        // Step 2: complexity gate.
        let split_suggestions = match complexity_gate::decide(&task.body) {
            GateDecision::InstantPass => None,
            GateDecision::InstantFail { split_suggestions } => Some(split_suggestions),
            GateDecision::Borderline => {
                let outcome = self
                    .dispatcher
                    .complexity_gate(ComplexityGateInput { issue: to_draft(&task), spec: None })
                    .await;
                match outcome {
                    AgentOutcome::Ok(output) if output.needs_split => Some(output.split_suggestions),
                    _ => None,
                }
            }
        };

        if let Some(suggestions) = split_suggestions {
            let children = self.apply_split(feature, task.issue_number, suggestions).await?;
            self.store.save_feature(feature).await?;
            drop(guard);
            return Ok(CycleOutcome::TaskSplit {
                parent: task.issue_number,
                children,
            });
        }

        let task_index = feature
            .tasks
            .iter()
            .position(|t| t.issue_number == task.issue_number)
            .expect("task was just selected from this feature");
        feature.tasks[task_index].stage = TaskStage::InProgress;
        self.store.save_feature(feature).await?;

        // Step 3: dispatch coder through the recovery manager.
        let draft = to_draft(&task);
        let mut recovery_state = RecoveryState::new(
            self.config.error_streak_threshold,
            self.config.max_recovery_attempts,
        );
        let coder_output = loop {
            let outcome = self
                .dispatcher
                .coder(CoderInput {
                    feature_id: feature.feature_id.clone(),
                    issue: draft.clone(),
                    registry: Vec::new(),
                    prior_summaries: Vec::new(),
                })
                .await;

            match &outcome {
                AgentOutcome::Ok(output) if output.is_empty() && !self.config.skip_empty_output_validation => {
                    self.log(
                        &feature.feature_id,
                        "coder_no_files_generated",
                        "failure",
                        Some("coder output contained no file markers"),
                    )
                    .await;
                    drop(guard);
                    return Ok(CycleOutcome::TaskFailed {
                        issue_number: task.issue_number,
                        reason: "coder produced no files".to_string(),
                    });
                }
                AgentOutcome::Ok(output) => break output.clone(),
                AgentOutcome::ContractErr(violation) => {
                    drop(guard);
                    return Err(KernelError::Contract(violation.clone()));
                }
                other => {
                    let class = recovery::classify(other).unwrap_or(ErrorClass::Fatal);
                    match recovery_state.record_failure(class) {
                        RecoveryDecision::Retry { backoff, .. } => {
                            tokio::time::sleep(backoff).await;
                            continue;
                        }
                        RecoveryDecision::Checkpoint | RecoveryDecision::CircuitBroken => {
                            drop(guard);
                            return Ok(CycleOutcome::CheckpointRequired {
                                trigger: CheckpointTrigger::ErrorSpike,
                                reason: "coder dispatch exhausted recovery".to_string(),
                            });
                        }
                    }
                }
            }
        };
        recovery_state.record_success();

        // Step 4: validation layer.
        let votes = self.run_validation(&feature.feature_id, &task).await;
        let validation_result = validation::validate(&votes);
        if !validation_result.approved {
            feature.tasks[task_index].stage = TaskStage::Blocked;
            self.store.save_feature(feature).await?;
            drop(guard);
            return Ok(CycleOutcome::CheckpointRequired {
                trigger: CheckpointTrigger::HighRisk,
                reason: validation_result.consensus_summary,
            });
        }

        // Step 5: dispatch verifier.
        let verify_outcome = self
            .dispatcher
            .verifier(VerifierInput {
                feature_id: feature.feature_id.clone(),
                issue: draft.clone(),
                files: coder_output.files_created.clone(),
                test_file: coder_output.test_file.clone().unwrap_or_default(),
            })
            .await;

        let episode_outcome = match verify_outcome {
            AgentOutcome::Ok(ref output) if output.tests_passed => {
                feature.tasks[task_index].stage = TaskStage::Done;
                EpisodeOutcome { success: true, error: None, artifacts: coder_output.files_created.clone() }
            }
            _ => {
                feature.tasks[task_index].stage = TaskStage::InProgress;
                EpisodeOutcome {
                    success: false,
                    error: Some("verification failed".to_string()),
                    artifacts: Vec::new(),
                }
            }
        };

        // Step 6: commit, release lock, record episode, append events.
        self.store.save_feature(feature).await?;
        let episode = Episode::new(
            format!("implement issue {}", task.issue_number),
            episode_outcome.clone(),
            RecoveryLevel::RetrySame,
        );
        let _ = self.episodes.append(&episode).await;
        self.log(
            &feature.feature_id,
            "task_cycle_complete",
            if episode_outcome.success { "success" } else { "failure" },
            None,
        )
        .await;
        drop(guard);

        if episode_outcome.success {
            Ok(CycleOutcome::TaskCompleted { issue_number: task.issue_number })
        } else {
            Ok(CycleOutcome::TaskFailed {
                issue_number: task.issue_number,
                reason: "verification failed".to_string(),
            })
        }
    }

    async fn run_validation(&self, feature_id: &str, task: &Task) -> Vec<CriticVote> {
        use waypoint_types::{CriticInput, CriticKind};

        let mut votes = Vec::new();
        for (kind, focus) in [
            (CriticKind::Code, "general"),
            (CriticKind::Test, "coverage"),
            (CriticKind::Code, "security"),
        ] {
            let outcome = self
                .dispatcher
                .critic(CriticInput {
                    kind,
                    focus: focus.to_string(),
                    artifact: format!("{feature_id}#{}", task.issue_number),
                })
                .await;
            if let AgentOutcome::Ok(output) = outcome {
                votes.push(CriticVote {
                    critic_id: format!("{kind:?}:{focus}"),
                    is_security: focus == "security",
                    weight: 1.0,
                    approved: output.approved,
                    score: output.score,
                    issues: output.issues,
                });
            }
        }
        votes
    }

    /// Applies a split decision: replaces `parent_issue` with the
    /// splitter's sub-issues, chained by dependency, and rewires anything
    /// that depended on the parent onto the last child (`spec.md` §4.10,
    /// §8 scenario 2).
    async fn apply_split(
        &self,
        feature: &mut Feature,
        parent_issue: u32,
        suggestions: Vec<String>,
    ) -> KernelResult<Vec<u32>> {
        let parent = feature
            .tasks
            .iter()
            .find(|t| t.issue_number == parent_issue)
            .cloned()
            .ok_or_else(|| KernelError::Fatal(format!("unknown issue {parent_issue}")))?;

        let split_output = self
            .dispatcher
            .issue_splitter(IssueSplitterInput {
                issue: to_draft(&parent),
                suggestions,
            })
            .await;
        let sub_issues = match split_output {
            AgentOutcome::Ok(output) if output.sub_issues.len() >= 2 => output.sub_issues,
            _ => return Err(KernelError::Fatal("issue splitter did not return sub-issues".to_string())),
        };

        let mut next_number = feature.tasks.iter().map(|t| t.issue_number).max().unwrap_or(0) + 1;
        let mut children = Vec::new();
        let mut previous_child: Option<u32> = None;

        for draft in &sub_issues {
            let number = next_number;
            next_number += 1;
            let mut child = Task::new(number, draft.title.clone(), draft.body.clone());
            child.estimated_size = draft.estimated_size;
            child.parent_issue = Some(parent_issue);
            child.dependencies = match previous_child {
                None => parent.dependencies.clone(),
                Some(prev) => vec![prev],
            };
            children.push(number);
            previous_child = Some(number);
            feature.tasks.push(child);
        }

        let last_child = *children.last().expect("sub_issues.len() >= 2 checked above");
        for task in feature.tasks.iter_mut() {
            if task.dependencies.contains(&parent_issue) {
                task.dependencies.retain(|d| *d != parent_issue);
                task.dependencies.push(last_child);
            }
        }

        if let Some(parent_task) = feature.tasks.iter_mut().find(|t| t.issue_number == parent_issue) {
            parent_task.stage = TaskStage::Split;
            parent_task.child_issues = children.clone();
        }

        Ok(children)
    }
}

fn to_draft(task: &Task) -> DraftIssue {
    DraftIssue {
        title: task.title.clone(),
        body: task.body.clone(),
        labels: Vec::new(),
        dependencies: Vec::new(),
        estimated_size: task.estimated_size,
    }
}

/// Pre-flight risk wrapper used before selecting the next task (`spec.md`
/// §4.6.2), kept separate from the cycle itself so callers can surface a
/// checkpoint without having already mutated feature state.
pub fn preflight_for_task(
    remaining_budget_usd: f64,
    estimated_cost_usd: f64,
    task: &Task,
    all_tasks: &[Task],
    file_conflict: bool,
) -> PreflightResult {
    let risk = checkpoint_manager::score_risk(RiskInputs {
        cost_impact: checkpoint_manager::cost_impact_score(estimated_cost_usd, remaining_budget_usd.max(estimated_cost_usd)),
        scope: 0.2,
        reversibility: checkpoint_manager::reversibility_score(&task.body),
        confidence: 0.5,
        precedent: 0.5,
    });
    checkpoint_manager::preflight(&PreflightInputs {
        remaining_budget_usd,
        estimated_cost_usd,
        dependencies_available: task.is_ready(all_tasks),
        risk,
        file_conflict,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use tempfile::TempDir;
    use waypoint_types::{
        BugResearcherInput, BugResearcherOutput, CoderOutput, ComplexityGateOutput, CriticOutput,
        FixPlannerInput, FixPlannerOutput, IssueCreatorOutput, IssueSplitterOutput,
        RootCauseAnalyzerInput, RootCauseAnalyzerOutput, SpecAuthorOutput, SpecCriticOutput,
        VerifierOutput,
    };

    use super::*;

    struct StubDispatcher {
        coder_output: AgentOutcome<CoderOutput>,
        verifier_output: AgentOutcome<VerifierOutput>,
        gate_needs_split: bool,
        split_suggestions: Vec<String>,
        sub_issues: Vec<DraftIssue>,
        critic_approved: bool,
    }

    impl Default for StubDispatcher {
        fn default() -> Self {
            Self {
                coder_output: AgentOutcome::Ok(CoderOutput {
                    files_created: vec!["src/lib.rs".to_string()],
                    ..Default::default()
                }),
                verifier_output: AgentOutcome::Ok(VerifierOutput {
                    tests_passed: true,
                    commit_sha: None,
                    schema_conflicts: Vec::new(),
                }),
                gate_needs_split: false,
                split_suggestions: Vec::new(),
                sub_issues: Vec::new(),
                critic_approved: true,
            }
        }
    }

    #[async_trait]
    impl AgentDispatcher for StubDispatcher {
        async fn spec_author(&self, _input: SpecAuthorInput) -> AgentOutcome<SpecAuthorOutput> {
            AgentOutcome::Ok(SpecAuthorOutput { spec_markdown: String::new() })
        }

        async fn spec_critic(&self, _input: SpecCriticInput) -> AgentOutcome<SpecCriticOutput> {
            AgentOutcome::Ok(SpecCriticOutput { score: 1.0, feedback: String::new() })
        }

        async fn issue_creator(&self, _input: IssueCreatorInput) -> AgentOutcome<IssueCreatorOutput> {
            AgentOutcome::Ok(IssueCreatorOutput { issues: Vec::new() })
        }

        async fn complexity_gate(
            &self,
            _input: ComplexityGateInput,
        ) -> AgentOutcome<ComplexityGateOutput> {
            AgentOutcome::Ok(ComplexityGateOutput {
                estimated_turns: 5,
                needs_split: self.gate_needs_split,
                split_suggestions: self.split_suggestions.clone(),
                confidence: 0.9,
                reasoning: "stub".to_string(),
            })
        }

        async fn issue_splitter(&self, _input: IssueSplitterInput) -> AgentOutcome<IssueSplitterOutput> {
            AgentOutcome::Ok(IssueSplitterOutput { sub_issues: self.sub_issues.clone() })
        }

        async fn coder(&self, _input: CoderInput) -> AgentOutcome<CoderOutput> {
            self.coder_output.clone()
        }

        async fn verifier(&self, _input: VerifierInput) -> AgentOutcome<VerifierOutput> {
            self.verifier_output.clone()
        }

        async fn bug_researcher(&self, _input: BugResearcherInput) -> AgentOutcome<BugResearcherOutput> {
            AgentOutcome::Ok(BugResearcherOutput {
                confirmed: true,
                evidence: Vec::new(),
                affected_files: Vec::new(),
            })
        }

        async fn root_cause_analyzer(
            &self,
            _input: RootCauseAnalyzerInput,
        ) -> AgentOutcome<RootCauseAnalyzerOutput> {
            AgentOutcome::Ok(RootCauseAnalyzerOutput {
                root_cause: String::new(),
                candidate_locations: Vec::new(),
            })
        }

        async fn fix_planner(&self, _input: FixPlannerInput) -> AgentOutcome<FixPlannerOutput> {
            AgentOutcome::Ok(FixPlannerOutput { plan_steps: Vec::new() })
        }

        async fn critic(&self, _input: waypoint_types::CriticInput) -> AgentOutcome<CriticOutput> {
            AgentOutcome::Ok(CriticOutput {
                score: if self.critic_approved { 0.9 } else { 0.1 },
                approved: self.critic_approved,
                issues: if self.critic_approved { Vec::new() } else { vec!["rejected".to_string()] },
                suggestions: Vec::new(),
                reasoning: "stub".to_string(),
            })
        }
    }

    struct Harness {
        _dir: TempDir,
        store: StateStore,
        locks: LockManager,
        events: EventLog,
        episodes: EpisodeStore,
        config: KernelConfig,
    }

    impl Harness {
        async fn new() -> Self {
            let dir = TempDir::new().expect("tempdir");
            let store = StateStore::open(dir.path().join("state")).await.expect("state store");
            let locks = LockManager::new(dir.path().join("locks"), Duration::from_secs(300));
            let events = EventLog::new(dir.path().join("events"), 10_000_000);
            let episodes = EpisodeStore::open(dir.path().join("episodes"), 4).await.expect("episode store");
            Self { _dir: dir, store, locks, events, episodes, config: KernelConfig::default() }
        }

        fn orchestrator<'a>(&'a self, dispatcher: &'a dyn AgentDispatcher) -> FeatureOrchestrator<'a> {
            FeatureOrchestrator {
                store: &self.store,
                locks: &self.locks,
                events: &self.events,
                episodes: &self.episodes,
                dispatcher,
                config: &self.config,
            }
        }
    }

    fn small_task(issue_number: u32) -> Task {
        Task::new(issue_number, "small task", "- [ ] does the thing")
    }

    #[tokio::test]
    async fn empty_coder_output_fails_the_task_and_leaves_it_in_progress() {
        let harness = Harness::new().await;
        let dispatcher = StubDispatcher {
            coder_output: AgentOutcome::Ok(CoderOutput::default()),
            ..Default::default()
        };
        let orchestrator = harness.orchestrator(&dispatcher);

        let mut feature = Feature::new("f-empty");
        feature.phase = FeaturePhase::Implementing;
        feature.tasks = vec![small_task(1)];

        let outcome = orchestrator.run_implementation_cycle(&mut feature).await.unwrap();
        assert!(matches!(outcome, CycleOutcome::TaskFailed { issue_number: 1, .. }));
        assert_eq!(feature.tasks[0].stage, TaskStage::InProgress);
    }

    #[tokio::test]
    async fn borderline_split_rewires_dependents_onto_the_last_child() {
        let harness = Harness::new().await;
        let dispatcher = StubDispatcher {
            gate_needs_split: true,
            split_suggestions: vec!["group a".to_string(), "group b".to_string()],
            sub_issues: vec![
                DraftIssue {
                    title: "part 1".to_string(),
                    body: "- [ ] a".to_string(),
                    labels: Vec::new(),
                    dependencies: Vec::new(),
                    estimated_size: waypoint_types::EstimatedSize::Small,
                },
                DraftIssue {
                    title: "part 2".to_string(),
                    body: "- [ ] b".to_string(),
                    labels: Vec::new(),
                    dependencies: Vec::new(),
                    estimated_size: waypoint_types::EstimatedSize::Small,
                },
                DraftIssue {
                    title: "part 3".to_string(),
                    body: "- [ ] c".to_string(),
                    labels: Vec::new(),
                    dependencies: Vec::new(),
                    estimated_size: waypoint_types::EstimatedSize::Small,
                },
            ],
            ..Default::default()
        };
        let orchestrator = harness.orchestrator(&dispatcher);

        // 8 checkbox criteria, no referenced methods: borderline per the
        // complexity gate's tiers, so the cheap estimator is consulted.
        let body = (1..=8).map(|i| format!("- [ ] criterion {i}\n")).collect::<String>();
        let mut parent = Task::new(5, "parent", body);
        let mut dependent = Task::new(20, "dependent", "- [ ] d");
        dependent.dependencies = vec![5];
        parent.stage = TaskStage::Ready;

        let mut feature = Feature::new("f-split");
        feature.phase = FeaturePhase::Implementing;
        feature.tasks = vec![parent, dependent];

        let outcome = orchestrator.run_implementation_cycle(&mut feature).await.unwrap();
        let children = match outcome {
            CycleOutcome::TaskSplit { parent: 5, children } => children,
            other => panic!("expected a split outcome, got {other:?}"),
        };
        assert_eq!(children.len(), 3);

        let parent_task = feature.tasks.iter().find(|t| t.issue_number == 5).unwrap();
        assert_eq!(parent_task.stage, TaskStage::Split);
        assert_eq!(parent_task.child_issues, children);

        let dependent_task = feature.tasks.iter().find(|t| t.issue_number == 20).unwrap();
        assert_eq!(dependent_task.dependencies, vec![*children.last().unwrap()]);
    }

    #[tokio::test]
    async fn successful_cycle_completes_the_task() {
        let harness = Harness::new().await;
        let dispatcher = StubDispatcher::default();
        let orchestrator = harness.orchestrator(&dispatcher);

        let mut feature = Feature::new("f-happy");
        feature.phase = FeaturePhase::Implementing;
        feature.tasks = vec![small_task(1)];

        let outcome = orchestrator.run_implementation_cycle(&mut feature).await.unwrap();
        assert!(matches!(outcome, CycleOutcome::TaskCompleted { issue_number: 1 }));
        assert_eq!(feature.tasks[0].stage, TaskStage::Done);
    }

    #[tokio::test]
    async fn security_veto_blocks_the_task_even_with_passing_tests() {
        let harness = Harness::new().await;
        let dispatcher = StubDispatcher { critic_approved: false, ..Default::default() };
        let orchestrator = harness.orchestrator(&dispatcher);

        let mut feature = Feature::new("f-veto");
        feature.phase = FeaturePhase::Implementing;
        feature.tasks = vec![small_task(1)];

        let outcome = orchestrator.run_implementation_cycle(&mut feature).await.unwrap();
        assert!(matches!(
            outcome,
            CycleOutcome::CheckpointRequired { trigger: CheckpointTrigger::HighRisk, .. }
        ));
        assert_eq!(feature.tasks[0].stage, TaskStage::Blocked);
    }
}

use std::time::Duration;

use waypoint_memory::EpisodeStore;
use waypoint_observability::{emit_event, Component, KernelEvent};
use waypoint_store::{EventLog, EventRecord, LockManager, StateStore};
use waypoint_types::{
    AutopilotSession, AutopilotStatus, Checkpoint, CheckpointOption, CheckpointTrigger,
    ExecutionStrategy, Goal, GoalStatus, KernelConfig, OptionTradeoffs, StopTrigger,
};

use crate::agent_dispatch::AgentDispatcher;
use crate::checkpoint_manager;
use crate::errors::{KernelError, KernelResult};
use crate::feature_orchestrator::{CycleOutcome, FeatureOrchestrator};

/// How many times a blocked lock is retried before the goal surfaces as a
/// checkpoint (`spec.md` §8 scenario 5: concurrent sessions usually
/// release quickly).
const LOCK_CONTENTION_RETRIES: u32 = 3;
const LOCK_CONTENTION_BACKOFF: Duration = Duration::from_millis(200);

/// No canonical skip ceiling is named for autopilot's continue-on-block
/// mode; three consecutive skips before pausing is this port's choice.
const DEFAULT_SKIP_CEILING: u32 = 3;

#[derive(Debug)]
pub enum AutopilotStepOutcome {
    Completed,
    Checkpoint(Checkpoint),
    GoalFailed { goal_id: String, reason: String },
    Aborted,
}

/// Drives an [`AutopilotSession`] across its ordered goals, delegating each
/// goal's work to a [`FeatureOrchestrator`] over the feature tracked under
/// the goal's id (`spec.md` §4.12).
pub struct AutopilotRunner<'a> {
    pub store: &'a StateStore,
    pub locks: &'a LockManager,
    pub events: &'a EventLog,
    pub episodes: &'a EpisodeStore,
    pub dispatcher: &'a dyn AgentDispatcher,
    pub config: &'a KernelConfig,
}

impl<'a> AutopilotRunner<'a> {
    async fn log(&self, session_id: &str, event: &str, status: &str) {
        emit_event(
            tracing::Level::INFO,
            Component::Kernel,
            KernelEvent {
                event,
                feature_id: None,
                bug_id: None,
                session_id: Some(session_id),
                checkpoint_id: None,
                status: Some(status),
                detail: None,
            },
        );
        let _ = self
            .events
            .append(session_id, EventRecord::new("autopilot_runner", event, serde_json::json!({"status": status})))
            .await;
    }

    fn orchestrator(&self) -> FeatureOrchestrator<'a> {
        FeatureOrchestrator {
            store: self.store,
            locks: self.locks,
            events: self.events,
            episodes: self.episodes,
            dispatcher: self.dispatcher,
            config: self.config,
        }
    }

    fn allow_skip(&self) -> bool {
        matches!(self.config.execution_strategy, ExecutionStrategy::ContinueOnBlock)
    }

    /// Starts a fresh autopilot run over `goals`.
    pub async fn start(
        &self,
        goals: Vec<Goal>,
        budget_usd: f64,
        duration_limit_seconds: u64,
    ) -> KernelResult<(AutopilotSession, AutopilotStepOutcome)> {
        let mut session = AutopilotSession::new(goals, budget_usd, duration_limit_seconds);
        self.store.save_autopilot_session(&session).await?;
        self.log(&session.session_id, "autopilot_started", "ok").await;
        let outcome = self.drive(&mut session).await?;
        Ok((session, outcome))
    }

    /// Resumes a paused session. Errors if no session with that id exists.
    pub async fn resume(&self, session_id: &str) -> KernelResult<(AutopilotSession, AutopilotStepOutcome)> {
        let mut session = self
            .store
            .load_autopilot_session(session_id)
            .await?
            .ok_or_else(|| KernelError::Fatal(format!("no autopilot session {session_id}")))?;
        session.status = AutopilotStatus::Running;
        session.stop_trigger = None;
        self.log(session_id, "autopilot_resumed", "ok").await;
        let outcome = self.drive(&mut session).await?;
        Ok((session, outcome))
    }

    pub async fn cancel(&self, session_id: &str) -> KernelResult<AutopilotSession> {
        let mut session = self
            .store
            .load_autopilot_session(session_id)
            .await?
            .ok_or_else(|| KernelError::Fatal(format!("no autopilot session {session_id}")))?;
        session.abort();
        self.store.save_autopilot_session(&session).await?;
        self.log(session_id, "autopilot_cancelled", "ok").await;
        Ok(session)
    }

    pub async fn list_paused(&self) -> KernelResult<Vec<AutopilotSession>> {
        let all = self.store.list_autopilot_sessions().await?;
        Ok(all.into_iter().filter(|s| s.status == AutopilotStatus::Paused).collect())
    }

    pub fn describe_goal(session: &AutopilotSession) -> Option<&Goal> {
        session.current_goal()
    }

    async fn drive(&self, session: &mut AutopilotSession) -> KernelResult<AutopilotStepOutcome> {
        loop {
            if let Some(trigger) = session.advance(self.allow_skip(), DEFAULT_SKIP_CEILING) {
                return self.handle_stop(session, trigger).await;
            }

            let goal = session
                .current_goal()
                .cloned()
                .expect("advance() returns None only when a goal is ready to run");
            session.goals[session.current_goal_index].status = GoalStatus::InProgress;

            let mut feature = self
                .store
                .load_feature(&goal.goal_id)
                .await?
                .ok_or_else(|| KernelError::Fatal(format!("no feature tracked for goal {}", goal.goal_id)))?;

            match self.run_cycle_with_lock_retry(&mut feature).await? {
                CycleOutcome::TaskCompleted { .. } | CycleOutcome::TaskSplit { .. } => {
                    session.cost_spent_usd += self.config.min_execution_budget;
                    self.store.save_autopilot_session(session).await?;
                    continue;
                }
                CycleOutcome::NothingReady if feature.phase == waypoint_types::FeaturePhase::Complete => {
                    session.goals[session.current_goal_index].status = GoalStatus::Done;
                    session.current_goal_index += 1;
                    self.store.save_autopilot_session(session).await?;
                    continue;
                }
                CycleOutcome::NothingReady => {
                    session.goals[session.current_goal_index].status = GoalStatus::Failed;
                    session.status = AutopilotStatus::Paused;
                    self.store.save_autopilot_session(session).await?;
                    self.log(&session.session_id, "autopilot_deadlocked", "paused").await;
                    return Ok(AutopilotStepOutcome::GoalFailed {
                        goal_id: goal.goal_id,
                        reason: "no ready task and feature is not complete".to_string(),
                    });
                }
                CycleOutcome::TaskFailed { reason, .. } => {
                    session.goals[session.current_goal_index].status = GoalStatus::Failed;
                    if self.allow_skip() {
                        session.current_goal_index += 1;
                        self.store.save_autopilot_session(session).await?;
                        continue;
                    }
                    session.status = AutopilotStatus::Paused;
                    self.store.save_autopilot_session(session).await?;
                    self.log(&session.session_id, "autopilot_goal_failed", "paused").await;
                    return Ok(AutopilotStepOutcome::GoalFailed { goal_id: goal.goal_id, reason });
                }
                CycleOutcome::CheckpointRequired { trigger, reason } => {
                    let checkpoint = self.raise_checkpoint(session, trigger, reason);
                    self.store.save_checkpoint(&checkpoint).await?;
                    session.checkpoints.push(checkpoint.clone());
                    session.status = AutopilotStatus::Paused;
                    session.stop_trigger = Some(StopTrigger::CheckpointAwaitingInput);
                    self.store.save_autopilot_session(session).await?;
                    self.log(&session.session_id, "autopilot_checkpoint", "paused").await;
                    return Ok(AutopilotStepOutcome::Checkpoint(checkpoint));
                }
            }
        }
    }

    /// Retries a blocked lock a few times before surfacing it as a
    /// checkpoint, since a concurrently-running session usually finishes
    /// its own cycle quickly (`spec.md` §8 scenario 5).
    async fn run_cycle_with_lock_retry(
        &self,
        feature: &mut waypoint_types::Feature,
    ) -> KernelResult<CycleOutcome> {
        let orchestrator = self.orchestrator();
        let mut attempt = 0;
        loop {
            match orchestrator.run_implementation_cycle(feature).await? {
                CycleOutcome::CheckpointRequired { trigger: CheckpointTrigger::Blocker, .. }
                    if attempt < LOCK_CONTENTION_RETRIES =>
                {
                    attempt += 1;
                    tokio::time::sleep(LOCK_CONTENTION_BACKOFF).await;
                    continue;
                }
                other => return Ok(other),
            }
        }
    }

    async fn handle_stop(
        &self,
        session: &mut AutopilotSession,
        trigger: StopTrigger,
    ) -> KernelResult<AutopilotStepOutcome> {
        match trigger {
            StopTrigger::GoalsExhausted => {
                session.status = AutopilotStatus::Completed;
                self.store.save_autopilot_session(session).await?;
                self.log(&session.session_id, "autopilot_completed", "ok").await;
                Ok(AutopilotStepOutcome::Completed)
            }
            StopTrigger::ExplicitAbort => {
                self.store.save_autopilot_session(session).await?;
                Ok(AutopilotStepOutcome::Aborted)
            }
            StopTrigger::BudgetExhausted
            | StopTrigger::DurationExceeded
            | StopTrigger::SkipBudgetExceeded
            | StopTrigger::CheckpointAwaitingInput => {
                let checkpoint_trigger = match trigger {
                    StopTrigger::BudgetExhausted => CheckpointTrigger::CostCumulative,
                    StopTrigger::DurationExceeded => CheckpointTrigger::Time,
                    StopTrigger::SkipBudgetExceeded => CheckpointTrigger::Blocker,
                    _ => CheckpointTrigger::ApprovalRequired,
                };
                let reason = format!("autopilot stopped: {trigger:?}");
                let checkpoint = self.raise_checkpoint(session, checkpoint_trigger, reason);
                self.store.save_checkpoint(&checkpoint).await?;
                session.checkpoints.push(checkpoint.clone());
                session.status = AutopilotStatus::Paused;
                self.store.save_autopilot_session(session).await?;
                self.log(&session.session_id, "autopilot_stopped", "paused").await;
                Ok(AutopilotStepOutcome::Checkpoint(checkpoint))
            }
        }
    }

    fn raise_checkpoint(
        &self,
        session: &AutopilotSession,
        trigger: CheckpointTrigger,
        reason: String,
    ) -> Checkpoint {
        let options = vec![
            CheckpointOption {
                id: "proceed".to_string(),
                label: "Proceed".to_string(),
                description: "Resume the autopilot run as-is.".to_string(),
                tradeoffs: OptionTradeoffs::default(),
                is_recommended: true,
            },
            CheckpointOption {
                id: "abort".to_string(),
                label: "Abort".to_string(),
                description: "Stop the autopilot run.".to_string(),
                tradeoffs: OptionTradeoffs::default(),
                is_recommended: false,
            },
        ];
        checkpoint_manager::compose_checkpoint(
            trigger,
            Vec::new(),
            reason,
            "how should this autopilot run proceed?",
            options,
            Vec::new(),
            None,
            session.session_id.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tempfile::TempDir;
    use waypoint_types::{
        AgentOutcome, BugResearcherInput, BugResearcherOutput, ComplexityGateInput,
        ComplexityGateOutput, CoderInput, CoderOutput, CriticInput, CriticOutput, Feature,
        FeaturePhase, FixPlannerInput, FixPlannerOutput, IssueCreatorInput, IssueCreatorOutput,
        IssueSplitterInput, IssueSplitterOutput, RootCauseAnalyzerInput, RootCauseAnalyzerOutput,
        SpecAuthorInput, SpecAuthorOutput, SpecCriticInput, SpecCriticOutput, Task, VerifierInput,
        VerifierOutput,
    };

    use super::*;

    struct StubDispatcher;

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
        async fn complexity_gate(&self, _input: ComplexityGateInput) -> AgentOutcome<ComplexityGateOutput> {
            AgentOutcome::Ok(ComplexityGateOutput {
                estimated_turns: 1,
                needs_split: false,
                split_suggestions: Vec::new(),
                confidence: 1.0,
                reasoning: String::new(),
            })
        }
        async fn issue_splitter(&self, _input: IssueSplitterInput) -> AgentOutcome<IssueSplitterOutput> {
            AgentOutcome::Ok(IssueSplitterOutput { sub_issues: Vec::new() })
        }
        async fn coder(&self, _input: CoderInput) -> AgentOutcome<CoderOutput> {
            AgentOutcome::Ok(CoderOutput { files_created: vec!["src/lib.rs".to_string()], ..Default::default() })
        }
        async fn verifier(&self, _input: VerifierInput) -> AgentOutcome<VerifierOutput> {
            AgentOutcome::Ok(VerifierOutput { tests_passed: true, commit_sha: None, schema_conflicts: Vec::new() })
        }
        async fn bug_researcher(&self, _input: BugResearcherInput) -> AgentOutcome<BugResearcherOutput> {
            AgentOutcome::Ok(BugResearcherOutput { confirmed: true, evidence: Vec::new(), affected_files: Vec::new() })
        }
        async fn root_cause_analyzer(
            &self,
            _input: RootCauseAnalyzerInput,
        ) -> AgentOutcome<RootCauseAnalyzerOutput> {
            AgentOutcome::Ok(RootCauseAnalyzerOutput { root_cause: String::new(), candidate_locations: Vec::new() })
        }
        async fn fix_planner(&self, _input: FixPlannerInput) -> AgentOutcome<FixPlannerOutput> {
            AgentOutcome::Ok(FixPlannerOutput { plan_steps: Vec::new() })
        }
        async fn critic(&self, _input: CriticInput) -> AgentOutcome<CriticOutput> {
            AgentOutcome::Ok(CriticOutput {
                score: 0.9,
                approved: true,
                issues: Vec::new(),
                suggestions: Vec::new(),
                reasoning: String::new(),
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

        fn runner<'a>(&'a self, dispatcher: &'a dyn AgentDispatcher) -> AutopilotRunner<'a> {
            AutopilotRunner {
                store: &self.store,
                locks: &self.locks,
                events: &self.events,
                episodes: &self.episodes,
                dispatcher,
                config: &self.config,
            }
        }

        async fn seed_single_task_feature(&self, feature_id: &str) {
            let mut feature = Feature::new(feature_id);
            feature.phase = FeaturePhase::Implementing;
            feature.tasks.push(Task::new(1, "small task", "- [ ] does the thing"));
            self.store.save_feature(&feature).await.unwrap();
        }
    }

    fn goal(id: &str) -> Goal {
        Goal { goal_id: id.to_string(), description: id.to_string(), depends_on: Vec::new(), status: GoalStatus::Pending }
    }

    #[tokio::test]
    async fn a_session_over_completable_goals_runs_to_completion() {
        let harness = Harness::new().await;
        harness.seed_single_task_feature("g1").await;
        let dispatcher = StubDispatcher;
        let runner = harness.runner(&dispatcher);

        let (session, outcome) = runner.start(vec![goal("g1")], 100.0, 3600).await.unwrap();
        assert!(matches!(outcome, AutopilotStepOutcome::Completed));
        assert_eq!(session.status, AutopilotStatus::Completed);
        assert_eq!(session.goals[0].status, GoalStatus::Done);
    }

    #[tokio::test]
    async fn exhausted_budget_raises_a_cost_cumulative_checkpoint_and_resume_continues() {
        let harness = Harness::new().await;
        harness.seed_single_task_feature("g2").await;
        let dispatcher = StubDispatcher;
        let runner = harness.runner(&dispatcher);

        let tiny_budget = harness.config.min_execution_budget / 2.0;
        let (session, outcome) = runner.start(vec![goal("g2")], tiny_budget, 3600).await.unwrap();
        assert!(matches!(outcome, AutopilotStepOutcome::Checkpoint(_)));
        if let AutopilotStepOutcome::Checkpoint(checkpoint) = outcome {
            assert_eq!(checkpoint.trigger, CheckpointTrigger::CostCumulative);
        }
        assert_eq!(session.status, AutopilotStatus::Paused);

        let mut resumed = harness.store.load_autopilot_session(&session.session_id).await.unwrap().unwrap();
        resumed.budget_usd = 100.0;
        harness.store.save_autopilot_session(&resumed).await.unwrap();

        let (final_session, final_outcome) = runner.resume(&session.session_id).await.unwrap();
        assert!(matches!(final_outcome, AutopilotStepOutcome::Completed));
        assert_eq!(final_session.status, AutopilotStatus::Completed);
    }

    #[tokio::test]
    async fn a_held_lock_is_retried_before_checkpointing() {
        let harness = Harness::new().await;
        harness.seed_single_task_feature("g3").await;
        let dispatcher = StubDispatcher;
        let runner = harness.runner(&dispatcher);

        let _guard = harness.locks.acquire("g3", 1).await.unwrap();
        let (session, outcome) = runner.start(vec![goal("g3")], 100.0, 3600).await.unwrap();
        assert!(matches!(outcome, AutopilotStepOutcome::Checkpoint(_)));
        if let AutopilotStepOutcome::Checkpoint(checkpoint) = outcome {
            assert_eq!(checkpoint.trigger, CheckpointTrigger::Blocker);
        }
        assert_eq!(session.status, AutopilotStatus::Paused);
    }
}

use serde_json::json;
use waypoint_memory::EpisodeStore;
use waypoint_observability::{emit_event, Component, KernelEvent};
use waypoint_store::{EventLog, EventRecord, StateStore};
use waypoint_types::{
    AgentOutcome, Bug, BugPhase, BugResearcherInput, CheckpointTrigger, CoderInput, DraftIssue,
    Episode, EpisodeOutcome, EstimatedSize, FixPlannerInput, KernelConfig, RecoveryLevel,
    RootCauseAnalyzerInput, VerifierInput,
};

use crate::agent_dispatch::AgentDispatcher;
use crate::errors::{KernelError, KernelResult};
use crate::recovery::{self, ErrorClass, RecoveryDecision, RecoveryState};
use crate::validation::{self, CriticVote};

/// One step of bug triage, mirroring `FeatureOrchestrator`'s implementation
/// cycle but over `BugPhase`'s state machine (`spec.md` §4.11).
#[derive(Debug)]
pub enum BugStepOutcome {
    Advanced { to: BugPhase },
    NeedsApproval { plan_steps: Vec<String> },
    Fixed,
    Failed { reason: String },
    CheckpointRequired { trigger: CheckpointTrigger, reason: String },
}

pub struct BugOrchestrator<'a> {
    pub store: &'a StateStore,
    pub events: &'a EventLog,
    pub episodes: &'a EpisodeStore,
    pub dispatcher: &'a dyn AgentDispatcher,
    pub config: &'a KernelConfig,
}

impl<'a> BugOrchestrator<'a> {
    async fn log(&self, bug_id: &str, event: &str, status: &str) {
        emit_event(
            tracing::Level::INFO,
            Component::Kernel,
            KernelEvent {
                event,
                feature_id: None,
                bug_id: Some(bug_id),
                session_id: None,
                checkpoint_id: None,
                status: Some(status),
                detail: None,
            },
        );
        let _ = self
            .events
            .append(bug_id, EventRecord::new("bug_orchestrator", event, json!({"status": status})))
            .await;
    }

    /// Advances a bug one phase. `Planned -> Fixing` always returns
    /// [`BugStepOutcome::NeedsApproval`] without mutating `bug.phase`; the
    /// caller must resolve that checkpoint and call
    /// [`BugOrchestrator::approve_fix`] before the next call proceeds.
    pub async fn run_step(&self, bug: &mut Bug) -> KernelResult<BugStepOutcome> {
        match bug.phase {
            BugPhase::Reported => self.reproduce(bug).await,
            BugPhase::Reproducing => self.investigate(bug).await,
            BugPhase::Investigating => self.plan_fix(bug).await,
            BugPhase::Planned => Ok(BugStepOutcome::NeedsApproval { plan_steps: bug.fix_plan.clone() }),
            BugPhase::Fixing => self.fix(bug).await,
            BugPhase::Verifying => self.verify_fix(bug).await,
            BugPhase::Fixed | BugPhase::Blocked => Ok(BugStepOutcome::Fixed),
        }
    }

    /// Records the human approval that unblocks `Planned -> Fixing`
    /// (`spec.md` §4.11 checkpoint between plan and execution).
    pub async fn approve_fix(&self, bug: &mut Bug) -> KernelResult<()> {
        bug.advance_phase(BugPhase::Fixing)
            .map_err(|e| KernelError::IllegalTransition(e.to_string()))?;
        self.store.save_bug(bug).await?;
        self.log(&bug.bug_id, "fix_approved", "ok").await;
        Ok(())
    }

    async fn reproduce(&self, bug: &mut Bug) -> KernelResult<BugStepOutcome> {
        let outcome = self.dispatcher.bug_researcher(BugResearcherInput { bug: bug.clone() }).await;
        let output = match outcome {
            AgentOutcome::Ok(output) if output.confirmed => output,
            AgentOutcome::Ok(_) => {
                return Ok(BugStepOutcome::Failed { reason: "could not reproduce the report".to_string() })
            }
            _ => return Ok(BugStepOutcome::Failed { reason: "bug researcher dispatch failed".to_string() }),
        };
        bug.evidence = output.evidence;
        bug.advance_phase(BugPhase::Reproducing)
            .map_err(|e| KernelError::IllegalTransition(e.to_string()))?;
        self.store.save_bug(bug).await?;
        self.log(&bug.bug_id, "reproduced", "ok").await;
        Ok(BugStepOutcome::Advanced { to: BugPhase::Reproducing })
    }

    async fn investigate(&self, bug: &mut Bug) -> KernelResult<BugStepOutcome> {
        let outcome = self
            .dispatcher
            .root_cause_analyzer(RootCauseAnalyzerInput { bug: bug.clone(), evidence: bug.evidence.clone() })
            .await;
        let root_cause = match outcome {
            AgentOutcome::Ok(output) => output.root_cause,
            _ => return Ok(BugStepOutcome::Failed { reason: "root cause analysis failed".to_string() }),
        };
        bug.root_cause = Some(root_cause);
        bug.advance_phase(BugPhase::Investigating)
            .map_err(|e| KernelError::IllegalTransition(e.to_string()))?;
        self.store.save_bug(bug).await?;
        self.log(&bug.bug_id, "root_cause_identified", "ok").await;
        Ok(BugStepOutcome::Advanced { to: BugPhase::Investigating })
    }

    async fn plan_fix(&self, bug: &mut Bug) -> KernelResult<BugStepOutcome> {
        let root_cause = bug
            .root_cause
            .clone()
            .ok_or_else(|| KernelError::Fatal("cannot plan a fix with no root cause on record".to_string()))?;
        let outcome = self
            .dispatcher
            .fix_planner(FixPlannerInput { bug: bug.clone(), root_cause })
            .await;
        let plan_steps = match outcome {
            AgentOutcome::Ok(output) if !output.plan_steps.is_empty() => output.plan_steps,
            _ => return Ok(BugStepOutcome::Failed { reason: "fix planner produced no plan".to_string() }),
        };
        bug.fix_plan = plan_steps;
        bug.advance_phase(BugPhase::Planned)
            .map_err(|e| KernelError::IllegalTransition(e.to_string()))?;
        self.store.save_bug(bug).await?;
        self.log(&bug.bug_id, "fix_planned", "ok").await;
        Ok(BugStepOutcome::Advanced { to: BugPhase::Planned })
    }

    async fn fix(&self, bug: &mut Bug) -> KernelResult<BugStepOutcome> {
        let draft = fix_plan_to_draft(bug);
        let mut recovery_state =
            RecoveryState::new(self.config.error_streak_threshold, self.config.max_recovery_attempts);

        let coder_output = loop {
            let outcome = self
                .dispatcher
                .coder(CoderInput {
                    feature_id: bug.bug_id.clone(),
                    issue: draft.clone(),
                    registry: Vec::new(),
                    prior_summaries: Vec::new(),
                })
                .await;

            match &outcome {
                AgentOutcome::Ok(output) if output.is_empty() && !self.config.skip_empty_output_validation => {
                    self.log(&bug.bug_id, "coder_no_files_generated", "failure").await;
                    return Ok(BugStepOutcome::Failed { reason: "coder produced no files".to_string() });
                }
                AgentOutcome::Ok(output) => break output.clone(),
                AgentOutcome::ContractErr(violation) => return Err(KernelError::Contract(violation.clone())),
                other => {
                    let class = recovery::classify(other).unwrap_or(ErrorClass::Fatal);
                    match recovery_state.record_failure(class) {
                        RecoveryDecision::Retry { backoff, .. } => {
                            tokio::time::sleep(backoff).await;
                            continue;
                        }
                        RecoveryDecision::Checkpoint | RecoveryDecision::CircuitBroken => {
                            return Ok(BugStepOutcome::CheckpointRequired {
                                trigger: CheckpointTrigger::ErrorSpike,
                                reason: "fix dispatch exhausted recovery".to_string(),
                            });
                        }
                    }
                }
            }
        };
        recovery_state.record_success();

        let votes = self.run_validation(&bug.bug_id).await;
        let validation_result = validation::validate(&votes);
        if !validation_result.approved {
            return Ok(BugStepOutcome::CheckpointRequired {
                trigger: CheckpointTrigger::HighRisk,
                reason: validation_result.consensus_summary,
            });
        }

        bug.advance_phase(BugPhase::Verifying)
            .map_err(|e| KernelError::IllegalTransition(e.to_string()))?;
        self.store.save_bug(bug).await?;
        self.log(&bug.bug_id, "fix_applied", "ok").await;

        let episode = Episode::new(
            format!("fix bug {}", bug.bug_id),
            EpisodeOutcome { success: true, error: None, artifacts: coder_output.files_created.clone() },
            RecoveryLevel::RetrySame,
        );
        let _ = self.episodes.append(&episode).await;

        Ok(BugStepOutcome::Advanced { to: BugPhase::Verifying })
    }

    async fn verify_fix(&self, bug: &mut Bug) -> KernelResult<BugStepOutcome> {
        let draft = fix_plan_to_draft(bug);
        let outcome = self
            .dispatcher
            .verifier(VerifierInput {
                feature_id: bug.bug_id.clone(),
                issue: draft,
                files: Vec::new(),
                test_file: String::new(),
            })
            .await;

        match outcome {
            AgentOutcome::Ok(output) if output.tests_passed => {
                bug.advance_phase(BugPhase::Fixed)
                    .map_err(|e| KernelError::IllegalTransition(e.to_string()))?;
                self.store.save_bug(bug).await?;
                self.log(&bug.bug_id, "fix_verified", "ok").await;
                Ok(BugStepOutcome::Fixed)
            }
            _ => {
                let episode = Episode::new(
                    format!("fix bug {}", bug.bug_id),
                    EpisodeOutcome {
                        success: false,
                        error: Some("verification failed".to_string()),
                        artifacts: Vec::new(),
                    },
                    RecoveryLevel::RetrySame,
                );
                let _ = self.episodes.append(&episode).await;
                Ok(BugStepOutcome::Failed { reason: "fix did not pass verification".to_string() })
            }
        }
    }

    async fn run_validation(&self, bug_id: &str) -> Vec<CriticVote> {
        use waypoint_types::{CriticInput, CriticKind};

        let mut votes = Vec::new();
        for (kind, focus) in [(CriticKind::Code, "general"), (CriticKind::Code, "security")] {
            let outcome = self
                .dispatcher
                .critic(CriticInput { kind, focus: focus.to_string(), artifact: bug_id.to_string() })
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
}

fn fix_plan_to_draft(bug: &Bug) -> DraftIssue {
    DraftIssue {
        title: format!("fix {}", bug.bug_id),
        body: bug.fix_plan.join("\n"),
        labels: Vec::new(),
        dependencies: Vec::new(),
        estimated_size: EstimatedSize::Small,
    }
}

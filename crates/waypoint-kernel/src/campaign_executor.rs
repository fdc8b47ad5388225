use waypoint_memory::EpisodeStore;
use waypoint_store::{EventLog, LockManager, StateStore};
use waypoint_types::{
    Campaign, CampaignState, Checkpoint, Goal, GoalStatus, KernelConfig, MilestoneStatus,
};

use crate::agent_dispatch::AgentDispatcher;
use crate::autopilot_runner::{AutopilotRunner, AutopilotStepOutcome};
use crate::errors::{KernelError, KernelResult};

#[derive(Debug)]
pub enum CampaignDayOutcome {
    DayCompleted { day: u32, session_id: String },
    Checkpoint { day: u32, checkpoint: Checkpoint },
    NeedsReplan { day: u32, deficit: f64 },
    CampaignComplete,
}

/// Executes one day of a [`Campaign`]'s plan through the autopilot runner,
/// then checks whether the multi-day schedule has drifted enough to
/// require replanning (`spec.md` §4.13).
pub struct CampaignExecutor<'a> {
    pub store: &'a StateStore,
    pub locks: &'a LockManager,
    pub events: &'a EventLog,
    pub episodes: &'a EpisodeStore,
    pub dispatcher: &'a dyn AgentDispatcher,
    pub config: &'a KernelConfig,
}

impl<'a> CampaignExecutor<'a> {
    fn runner(&self) -> AutopilotRunner<'a> {
        AutopilotRunner {
            store: self.store,
            locks: self.locks,
            events: self.events,
            episodes: self.episodes,
            dispatcher: self.dispatcher,
            config: self.config,
        }
    }

    pub async fn run_day(&self, campaign: &mut Campaign) -> KernelResult<CampaignDayOutcome> {
        if campaign.is_complete() {
            campaign.state = CampaignState::Completed;
            self.store.save_campaign(campaign).await?;
            return Ok(CampaignDayOutcome::CampaignComplete);
        }

        let day = campaign.current_day;
        let plan = campaign
            .day_plans
            .iter()
            .find(|p| p.day == day)
            .cloned()
            .ok_or_else(|| KernelError::Fatal(format!("no day plan scheduled for day {day}")))?;

        let goals: Vec<Goal> = plan
            .goal_ids
            .iter()
            .map(|goal_id| Goal {
                goal_id: goal_id.clone(),
                description: goal_id.clone(),
                depends_on: Vec::new(),
                status: GoalStatus::Pending,
            })
            .collect();

        let budget = campaign.remaining_budget_for_day();
        let (session, outcome) = self
            .runner()
            .start(goals, budget, self.config.duration_limit_seconds)
            .await?;

        let spent = session.cost_spent_usd.min(budget);
        if spent > 0.0 {
            campaign
                .record_spend(spent)
                .map_err(|e| KernelError::Fatal(e.to_string()))?;
        }

        match outcome {
            AutopilotStepOutcome::Completed => {
                self.mark_milestone(campaign, &plan.milestone_id, MilestoneStatus::Done);
                campaign.current_day += 1;
                if campaign.needs_replan(campaign.current_day) {
                    let deficit = campaign.progress_deficit(campaign.current_day);
                    campaign.replan_count += 1;
                    campaign.state = CampaignState::Planning;
                    self.store.save_campaign(campaign).await?;
                    return Ok(CampaignDayOutcome::NeedsReplan { day, deficit });
                }
                self.store.save_campaign(campaign).await?;
                Ok(CampaignDayOutcome::DayCompleted { day, session_id: session.session_id })
            }
            AutopilotStepOutcome::Checkpoint(checkpoint) => {
                campaign.state = CampaignState::Paused;
                self.store.save_campaign(campaign).await?;
                Ok(CampaignDayOutcome::Checkpoint { day, checkpoint })
            }
            AutopilotStepOutcome::GoalFailed { goal_id, reason } => {
                self.mark_milestone(campaign, &plan.milestone_id, MilestoneStatus::Failed);
                campaign.state = CampaignState::Failed;
                self.store.save_campaign(campaign).await?;
                Err(KernelError::Fatal(format!("goal {goal_id} failed on day {day}: {reason}")))
            }
            AutopilotStepOutcome::Aborted => {
                campaign.state = CampaignState::Paused;
                self.store.save_campaign(campaign).await?;
                Ok(CampaignDayOutcome::Checkpoint {
                    day,
                    checkpoint: Checkpoint::new(
                        waypoint_types::CheckpointTrigger::Blocker,
                        "autopilot run was aborted mid-day",
                        "how should this campaign proceed?",
                        Vec::new(),
                        session.session_id,
                    ),
                })
            }
        }
    }

    fn mark_milestone(&self, campaign: &mut Campaign, milestone_id: &Option<String>, status: MilestoneStatus) {
        let Some(milestone_id) = milestone_id else { return };
        if let Some(milestone) = campaign.milestones.iter_mut().find(|m| &m.milestone_id == milestone_id) {
            milestone.status = status;
        }
    }
}

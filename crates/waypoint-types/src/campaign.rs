use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignState {
    Planning,
    Active,
    Paused,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneStatus {
    Pending,
    InProgress,
    Done,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    pub milestone_id: String,
    pub name: String,
    pub target_day: u32,
    #[serde(default)]
    pub success_criteria: Vec<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub status: MilestoneStatus,
}

/// A day's worth of goals to execute through the autopilot runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayPlan {
    pub day: u32,
    pub milestone_id: Option<String>,
    pub goal_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub campaign_id: String,
    pub milestones: Vec<Milestone>,
    pub day_plans: Vec<DayPlan>,
    pub state: CampaignState,
    pub current_day: u32,
    pub total_budget_usd: f64,
    pub daily_budget_usd: f64,
    pub spent_usd: f64,
    pub original_duration_days: u32,
    pub replanning_threshold: f64,
    #[serde(default)]
    pub replan_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    pub fn new(
        campaign_id: impl Into<String>,
        total_budget_usd: f64,
        daily_budget_usd: f64,
        original_duration_days: u32,
        replanning_threshold: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            campaign_id: campaign_id.into(),
            milestones: Vec::new(),
            day_plans: Vec::new(),
            state: CampaignState::Planning,
            current_day: 0,
            total_budget_usd,
            daily_budget_usd,
            spent_usd: 0.0,
            original_duration_days,
            replanning_threshold,
            replan_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// `spec.md` §3.1 Campaign invariant: a day's execution is bounded by
    /// `min(daily_budget_usd, total_budget_usd - spent_usd)`.
    pub fn remaining_budget_for_day(&self) -> f64 {
        (self.total_budget_usd - self.spent_usd)
            .max(0.0)
            .min(self.daily_budget_usd)
    }

    pub fn record_spend(&mut self, amount_usd: f64) -> Result<(), CampaignBudgetError> {
        if self.spent_usd + amount_usd > self.total_budget_usd + f64::EPSILON {
            return Err(CampaignBudgetError::WouldExceedTotal {
                spent: self.spent_usd,
                amount: amount_usd,
                total: self.total_budget_usd,
            });
        }
        self.spent_usd += amount_usd;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn expected_milestones_done_by_day(&self, day: u32) -> usize {
        if self.original_duration_days == 0 {
            return 0;
        }
        let per_day =
            self.milestones.len() as f64 / self.original_duration_days as f64;
        (per_day * day as f64).ceil() as usize
    }

    pub fn progress_deficit(&self, day: u32) -> f64 {
        let expected = self.expected_milestones_done_by_day(day).max(1) as f64;
        let actual = self
            .milestones
            .iter()
            .filter(|m| m.status == MilestoneStatus::Done)
            .count() as f64;
        ((expected - actual) / expected).max(0.0)
    }

    pub fn needs_replan(&self, day: u32) -> bool {
        self.progress_deficit(day) > self.replanning_threshold
    }

    pub fn is_complete(&self) -> bool {
        self.milestones
            .iter()
            .all(|m| m.status == MilestoneStatus::Done)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CampaignBudgetError {
    #[error("spend of {amount} on top of {spent} would exceed total budget {total}")]
    WouldExceedTotal {
        spent: f64,
        amount: f64,
        total: f64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spent_cannot_exceed_total_budget() {
        let mut campaign = Campaign::new("c1", 100.0, 50.0, 5, 0.3);
        campaign.record_spend(100.0).unwrap();
        let err = campaign.record_spend(0.01).unwrap_err();
        assert!(matches!(err, CampaignBudgetError::WouldExceedTotal { .. }));
    }

    #[test]
    fn daily_budget_is_capped_by_remaining_total() {
        let mut campaign = Campaign::new("c2", 30.0, 50.0, 5, 0.3);
        campaign.record_spend(20.0).unwrap();
        assert_eq!(campaign.remaining_budget_for_day(), 10.0);
    }

    #[test]
    fn deficit_beyond_threshold_triggers_replan() {
        let mut campaign = Campaign::new("c3", 500.0, 100.0, 5, 0.30);
        for i in 0..4 {
            campaign.milestones.push(Milestone {
                milestone_id: format!("m{i}"),
                name: format!("m{i}"),
                target_day: i + 1,
                success_criteria: Vec::new(),
                depends_on: Vec::new(),
                status: MilestoneStatus::Pending,
            });
        }
        campaign.milestones[0].status = MilestoneStatus::Done;
        // By day 3, expected ceil(4/5 * 3) = 3 milestones; only 1 done.
        assert!(campaign.needs_replan(3));
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checkpoint::Checkpoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutopilotStatus {
    Running,
    Completed,
    Paused,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopTrigger {
    BudgetExhausted,
    DurationExceeded,
    GoalsExhausted,
    CheckpointAwaitingInput,
    ExplicitAbort,
    SkipBudgetExceeded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Pending,
    InProgress,
    Done,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub goal_id: String,
    pub description: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub status: GoalStatus,
}

/// A run of the autopilot loop across an ordered list of goals, stopping on
/// budget/duration exhaustion, a blocking checkpoint, or explicit abort
/// (spec.md §4.12).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutopilotSession {
    pub session_id: String,
    pub goals: Vec<Goal>,
    pub current_goal_index: usize,
    pub budget_usd: f64,
    pub duration_limit_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_trigger: Option<StopTrigger>,
    pub status: AutopilotStatus,
    pub cost_spent_usd: f64,
    pub duration_seconds: u64,
    #[serde(default)]
    pub checkpoints: Vec<Checkpoint>,
    pub last_persisted_at: DateTime<Utc>,
    /// Consecutive skip count when continue-on-block is active; bounded by
    /// the caller against a configured skip ceiling.
    #[serde(default)]
    pub consecutive_skips: u32,
}

impl AutopilotSession {
    pub fn new(goals: Vec<Goal>, budget_usd: f64, duration_limit_seconds: u64) -> Self {
        Self {
            session_id: format!("auto-{}", uuid::Uuid::new_v4()),
            goals,
            current_goal_index: 0,
            budget_usd,
            duration_limit_seconds,
            stop_trigger: None,
            status: AutopilotStatus::Running,
            cost_spent_usd: 0.0,
            duration_seconds: 0,
            checkpoints: Vec::new(),
            last_persisted_at: Utc::now(),
            consecutive_skips: 0,
        }
    }

    pub fn remaining_budget_usd(&self) -> f64 {
        (self.budget_usd - self.cost_spent_usd).max(0.0)
    }

    pub fn current_goal(&self) -> Option<&Goal> {
        self.goals.get(self.current_goal_index)
    }

    /// Whether the goal at `index` can start: unknown goal ids are treated
    /// as unmet dependencies, never as satisfied.
    pub fn dependencies_satisfied(&self, index: usize) -> bool {
        let Some(goal) = self.goals.get(index) else {
            return false;
        };
        goal.depends_on.iter().all(|dep_id| {
            self.goals
                .iter()
                .any(|g| &g.goal_id == dep_id && g.status == GoalStatus::Done)
        })
    }

    /// Advances past the current goal, skipping it if it cannot run and
    /// `allow_skip` is set (continue-on-block). Returns the stop trigger
    /// if the run should halt.
    pub fn advance(&mut self, allow_skip: bool, skip_ceiling: u32) -> Option<StopTrigger> {
        if self.remaining_budget_usd() <= 0.0 {
            self.stop_trigger = Some(StopTrigger::BudgetExhausted);
            return self.stop_trigger;
        }
        if self.duration_seconds >= self.duration_limit_seconds {
            self.stop_trigger = Some(StopTrigger::DurationExceeded);
            return self.stop_trigger;
        }
        loop {
            if self.current_goal_index >= self.goals.len() {
                self.stop_trigger = Some(StopTrigger::GoalsExhausted);
                return self.stop_trigger;
            }
            if self.dependencies_satisfied(self.current_goal_index) {
                self.consecutive_skips = 0;
                return None;
            }
            if !allow_skip {
                self.stop_trigger = Some(StopTrigger::CheckpointAwaitingInput);
                return self.stop_trigger;
            }
            self.goals[self.current_goal_index].status = GoalStatus::Skipped;
            self.consecutive_skips += 1;
            self.current_goal_index += 1;
            if self.consecutive_skips >= skip_ceiling {
                self.stop_trigger = Some(StopTrigger::SkipBudgetExceeded);
                return self.stop_trigger;
            }
        }
    }

    pub fn abort(&mut self) {
        self.status = AutopilotStatus::Aborted;
        self.stop_trigger = Some(StopTrigger::ExplicitAbort);
    }
}

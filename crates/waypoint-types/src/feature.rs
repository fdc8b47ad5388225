use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Phases a feature moves through, per the feature DAG.
///
/// Every state but `Failed` may also move to `Blocked` on a recoverable
/// operator-actionable condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeaturePhase {
    PrdReady,
    SpecInProgress,
    SpecNeedsApproval,
    SpecApproved,
    IssuesCreated,
    Greenlit,
    Implementing,
    Complete,
    Failed,
    Blocked,
}

impl FeaturePhase {
    /// Legal successors per the feature DAG in spec.md §4.10, excluding the
    /// universally-reachable `Failed` and `Blocked` states.
    pub fn legal_successors(self) -> &'static [FeaturePhase] {
        use FeaturePhase::*;
        match self {
            PrdReady => &[SpecInProgress],
            SpecInProgress => &[SpecNeedsApproval],
            SpecNeedsApproval => &[SpecApproved],
            SpecApproved => &[IssuesCreated],
            IssuesCreated => &[Greenlit],
            Greenlit => &[Implementing],
            Implementing => &[Complete],
            Complete | Failed | Blocked => &[],
        }
    }

    /// Whether `next` is a legal advance from `self`: either the DAG's next
    /// step, or one of the two universal terminal/recoverable states.
    pub fn can_advance_to(self, next: FeaturePhase) -> bool {
        if matches!(self, FeaturePhase::Failed) {
            return false;
        }
        next == FeaturePhase::Failed
            || next == FeaturePhase::Blocked
            || self.legal_successors().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, FeaturePhase::Complete | FeaturePhase::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatedSize {
    Small,
    Medium,
    Large,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStage {
    Backlog,
    Ready,
    InProgress,
    Done,
    Blocked,
    Skipped,
    Split,
}

/// A task (issue) within a feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub issue_number: u32,
    pub stage: TaskStage,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub dependencies: Vec<u32>,
    pub estimated_size: EstimatedSize,
    #[serde(default)]
    pub parent_issue: Option<u32>,
    #[serde(default)]
    pub child_issues: Vec<u32>,
}

impl Task {
    pub fn new(issue_number: u32, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            issue_number,
            stage: TaskStage::Backlog,
            title: title.into(),
            body: body.into(),
            dependencies: Vec::new(),
            estimated_size: EstimatedSize::Medium,
            parent_issue: None,
            child_issues: Vec::new(),
        }
    }

    /// A task is ready iff every dependency is DONE, or SPLIT with every
    /// descendant DONE (spec.md §3.1 Task invariants).
    pub fn is_ready(&self, all_tasks: &[Task]) -> bool {
        if self.stage != TaskStage::Backlog && self.stage != TaskStage::Ready {
            return false;
        }
        self.dependencies
            .iter()
            .all(|dep_id| dependency_satisfied(*dep_id, all_tasks))
    }
}

fn dependency_satisfied(dep_id: u32, all_tasks: &[Task]) -> bool {
    let Some(dep) = all_tasks.iter().find(|t| t.issue_number == dep_id) else {
        // Dependency not tracked at all: cannot be considered satisfied.
        return false;
    };
    match dep.stage {
        TaskStage::Done => true,
        TaskStage::Split => dep
            .child_issues
            .iter()
            .all(|child_id| dependency_satisfied(*child_id, all_tasks)),
        _ => false,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    pub feature_id: String,
    pub phase: FeaturePhase,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub total_cost_usd: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Feature {
    pub fn new(feature_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            feature_id: feature_id.into(),
            phase: FeaturePhase::PrdReady,
            tasks: Vec::new(),
            total_cost_usd: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attempts a phase transition, enforcing the DAG invariant. Touches
    /// `updated_at` only on success.
    pub fn advance_phase(&mut self, next: FeaturePhase) -> Result<(), PhaseTransitionError> {
        if !self.phase.can_advance_to(next) {
            return Err(PhaseTransitionError {
                from: self.phase,
                to: next,
            });
        }
        self.phase = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Priority order for selecting the next task to dispatch: blocked tasks
    /// first (so operators see them), then approvals-pending work modeled as
    /// `Ready`, then in-progress, then untouched backlog. Terminal/split
    /// states are excluded entirely.
    pub fn next_ready_task(&self) -> Option<&Task> {
        let mut candidates: Vec<&Task> = self
            .tasks
            .iter()
            .filter(|t| {
                !matches!(
                    t.stage,
                    TaskStage::Done | TaskStage::Split | TaskStage::Skipped | TaskStage::Blocked
                )
            })
            .filter(|t| t.is_ready(&self.tasks))
            .collect();
        candidates.sort_by_key(|t| (priority_rank(t.stage), t.issue_number));
        candidates.into_iter().next()
    }

    pub fn is_complete(&self) -> bool {
        self.tasks
            .iter()
            .all(|t| matches!(t.stage, TaskStage::Done | TaskStage::Skipped | TaskStage::Split))
    }
}

fn priority_rank(stage: TaskStage) -> u8 {
    match stage {
        TaskStage::Ready => 0,
        TaskStage::InProgress => 1,
        TaskStage::Backlog => 2,
        _ => 3,
    }
}

#[derive(Debug, thiserror::Error)]
#[error("illegal phase transition: {from:?} -> {to:?}")]
pub struct PhaseTransitionError {
    pub from: FeaturePhase,
    pub to: FeaturePhase,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_dependency_task_is_ready_at_creation() {
        let task = Task::new(1, "t", "body");
        assert!(task.is_ready(&[task.clone()]));
    }

    #[test]
    fn split_task_with_all_children_done_satisfies_dependents() {
        let mut parent = Task::new(5, "parent", "");
        parent.stage = TaskStage::Split;
        parent.child_issues = vec![10, 11];
        let mut child_a = Task::new(10, "a", "");
        child_a.stage = TaskStage::Done;
        let mut child_b = Task::new(11, "b", "");
        child_b.stage = TaskStage::Done;
        let mut dependent = Task::new(20, "dependent", "");
        dependent.dependencies = vec![5];

        let all = vec![parent, child_a, child_b, dependent.clone()];
        assert!(dependent.is_ready(&all));
    }

    #[test]
    fn illegal_phase_jump_is_rejected() {
        let mut feature = Feature::new("f1");
        let err = feature
            .advance_phase(FeaturePhase::Greenlit)
            .unwrap_err();
        assert_eq!(err.from, FeaturePhase::PrdReady);
        assert_eq!(err.to, FeaturePhase::Greenlit);
    }

    #[test]
    fn any_state_can_fail_or_block() {
        let mut feature = Feature::new("f2");
        feature.advance_phase(FeaturePhase::SpecInProgress).unwrap();
        feature.advance_phase(FeaturePhase::Blocked).unwrap();
        assert_eq!(feature.phase, FeaturePhase::Blocked);
    }

    #[test]
    fn priority_selection_excludes_terminal_states() {
        let mut feature = Feature::new("f3");
        let mut done = Task::new(1, "done", "");
        done.stage = TaskStage::Done;
        let mut ready = Task::new(2, "ready", "");
        ready.stage = TaskStage::Ready;
        feature.tasks = vec![done, ready];
        let next = feature.next_ready_task().expect("one ready task");
        assert_eq!(next.issue_number, 2);
    }
}

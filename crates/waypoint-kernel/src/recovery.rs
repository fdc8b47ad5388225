use std::time::Duration;

use waypoint_types::{AgentOutcome, RecoveryLevel};

/// Error kinds from `spec.md` §7, restricted to the three the recovery
/// manager handles locally. `ContractViolation`, `PersistenceError`, and
/// `LockHeld` always surface and never enter this state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Systematic,
    Ambiguity,
    Fatal,
}

impl ErrorClass {
    pub fn entry_level(self) -> RecoveryLevel {
        match self {
            ErrorClass::Transient => RecoveryLevel::RetrySame,
            ErrorClass::Systematic => RecoveryLevel::RetryAlternate,
            ErrorClass::Ambiguity => RecoveryLevel::RetryClarify,
            ErrorClass::Fatal => RecoveryLevel::Escalate,
        }
    }
}

/// Classifies an agent outcome into the error kind the recovery manager
/// routes on. `Ok` and `ContractErr` are not representable here — the
/// former needs no recovery, the latter never retries (`spec.md` §7).
pub fn classify<T>(outcome: &AgentOutcome<T>) -> Option<ErrorClass> {
    match outcome {
        AgentOutcome::Ok(_) | AgentOutcome::ContractErr(_) => None,
        AgentOutcome::TransientErr(_) => Some(ErrorClass::Transient),
        AgentOutcome::SystematicErr(_) => Some(ErrorClass::Systematic),
        AgentOutcome::AmbiguityErr(_) => Some(ErrorClass::Ambiguity),
        AgentOutcome::FatalErr(_) => Some(ErrorClass::Fatal),
    }
}

fn max_attempts_for(level: RecoveryLevel) -> u32 {
    match level {
        RecoveryLevel::RetrySame => 3,
        RecoveryLevel::RetryAlternate => 2,
        RecoveryLevel::RetryClarify => 1,
        RecoveryLevel::Escalate => 1,
    }
}

fn next_level(level: RecoveryLevel) -> Option<RecoveryLevel> {
    match level {
        RecoveryLevel::RetrySame => Some(RecoveryLevel::RetryAlternate),
        RecoveryLevel::RetryAlternate => Some(RecoveryLevel::RetryClarify),
        RecoveryLevel::RetryClarify => Some(RecoveryLevel::Escalate),
        RecoveryLevel::Escalate => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryDecision {
    /// Retry at `level`, waiting `backoff` before the next dispatch.
    Retry {
        level: RecoveryLevel,
        backoff: Duration,
    },
    /// Level 4 reached (directly or by escalation): caller must create a
    /// checkpoint and pause rather than dispatch again.
    Checkpoint,
    /// Consecutive-failure threshold crossed: halt escalation immediately
    /// regardless of level, same as reaching level 4 (`spec.md` §4.5).
    CircuitBroken,
}

/// Tracks recovery progress for one unit of work. A fresh instance is
/// created per dispatch attempt chain; it does not survive across units.
#[derive(Debug, Clone)]
pub struct RecoveryState {
    level: RecoveryLevel,
    attempt_in_level: u32,
    consecutive_failures: u32,
    total_attempts: u32,
    error_streak_threshold: u32,
    max_recovery_attempts: u32,
}

impl RecoveryState {
    pub fn new(error_streak_threshold: u32, max_recovery_attempts: u32) -> Self {
        Self {
            level: RecoveryLevel::RetrySame,
            attempt_in_level: 0,
            consecutive_failures: 0,
            total_attempts: 0,
            error_streak_threshold,
            max_recovery_attempts,
        }
    }

    pub fn total_attempts(&self) -> u32 {
        self.total_attempts
    }

    pub fn current_level(&self) -> RecoveryLevel {
        self.level
    }

    /// Resets the streak on a successful dispatch; call before moving on
    /// to the next unit of work.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Records a failure of the given class and decides the next action.
    pub fn record_failure(&mut self, class: ErrorClass) -> RecoveryDecision {
        self.total_attempts += 1;
        self.consecutive_failures += 1;

        if self.consecutive_failures >= self.error_streak_threshold {
            return RecoveryDecision::CircuitBroken;
        }
        if self.total_attempts >= self.max_recovery_attempts {
            return RecoveryDecision::Checkpoint;
        }

        // A fresh failure at or above the class's natural entry level
        // only resets the level if we haven't already escalated past it;
        // once escalated, further failures continue climbing rather than
        // resetting to the class's nominal entry point.
        if class.entry_level() > self.level {
            self.level = class.entry_level();
            self.attempt_in_level = 0;
        }

        self.attempt_in_level += 1;

        if self.level == RecoveryLevel::Escalate {
            return RecoveryDecision::Checkpoint;
        }

        if self.attempt_in_level <= max_attempts_for(self.level) {
            let backoff = backoff_for(self.level, self.attempt_in_level);
            return RecoveryDecision::Retry {
                level: self.level,
                backoff,
            };
        }

        match next_level(self.level) {
            Some(level) => {
                self.level = level;
                self.attempt_in_level = 1;
                if level == RecoveryLevel::Escalate {
                    RecoveryDecision::Checkpoint
                } else {
                    RecoveryDecision::Retry {
                        level,
                        backoff: backoff_for(level, 1),
                    }
                }
            }
            None => RecoveryDecision::Checkpoint,
        }
    }
}

const BASE_BACKOFF_SECONDS: u64 = 2;

fn backoff_for(level: RecoveryLevel, attempt_in_level: u32) -> Duration {
    match level {
        RecoveryLevel::RetrySame => {
            Duration::from_secs(BASE_BACKOFF_SECONDS.saturating_pow(attempt_in_level.max(1)))
        }
        RecoveryLevel::RetryAlternate => Duration::from_secs(BASE_BACKOFF_SECONDS * 2),
        RecoveryLevel::RetryClarify | RecoveryLevel::Escalate => Duration::ZERO,
    }
}

/// A candidate approach considered at `RETRY_ALTERNATE` (`spec.md` §4.5):
/// bounded search over N candidates, selected by highest `prob / cost`.
#[derive(Debug, Clone)]
pub struct Alternative {
    pub description: String,
    pub estimated_probability: f64,
    pub cost_multiplier: f64,
}

/// Selects the alternative with the highest probability-to-cost ratio.
/// Episode-memory retrieval (`spec.md` §4.7) is expected to have already
/// seeded `estimated_probability` priors before this is called.
pub fn select_best_alternative(alternatives: &[Alternative]) -> Option<&Alternative> {
    alternatives.iter().max_by(|a, b| {
        let ratio_a = a.estimated_probability / a.cost_multiplier.max(f64::EPSILON);
        let ratio_b = b.estimated_probability / b.cost_multiplier.max(f64::EPSILON);
        ratio_a
            .partial_cmp(&ratio_b)
            .unwrap_or(std::cmp::Ordering::Equal)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_failures_retry_at_level_one_up_to_three_times() {
        let mut state = RecoveryState::new(10, 20);
        for _ in 0..3 {
            let decision = state.record_failure(ErrorClass::Transient);
            assert!(matches!(
                decision,
                RecoveryDecision::Retry {
                    level: RecoveryLevel::RetrySame,
                    ..
                }
            ));
        }
        let fourth = state.record_failure(ErrorClass::Transient);
        assert!(matches!(
            fourth,
            RecoveryDecision::Retry {
                level: RecoveryLevel::RetryAlternate,
                ..
            }
        ));
    }

    #[test]
    fn exhausting_all_four_levels_requests_a_checkpoint() {
        let mut state = RecoveryState::new(100, 100);
        // level 1 (RETRY_SAME): 3 attempts
        for _ in 0..3 {
            state.record_failure(ErrorClass::Transient);
        }
        // level 2 (RETRY_ALTERNATE): 2 attempts
        for _ in 0..2 {
            let decision = state.record_failure(ErrorClass::Transient);
            assert!(matches!(
                decision,
                RecoveryDecision::Retry {
                    level: RecoveryLevel::RetryAlternate,
                    ..
                }
            ));
        }
        // level 3 (RETRY_CLARIFY): 1 attempt
        let decision = state.record_failure(ErrorClass::Transient);
        assert!(matches!(
            decision,
            RecoveryDecision::Retry {
                level: RecoveryLevel::RetryClarify,
                ..
            }
        ));
        // level 4 (ESCALATE): checkpoint immediately, no further retry
        let decision = state.record_failure(ErrorClass::Transient);
        assert_eq!(decision, RecoveryDecision::Checkpoint);
    }

    #[test]
    fn consecutive_failure_streak_trips_circuit_breaker() {
        let mut state = RecoveryState::new(3, 100);
        state.record_failure(ErrorClass::Transient);
        state.record_failure(ErrorClass::Transient);
        let decision = state.record_failure(ErrorClass::Transient);
        assert_eq!(decision, RecoveryDecision::CircuitBroken);
    }

    #[test]
    fn fatal_classification_enters_directly_at_escalate() {
        let mut state = RecoveryState::new(100, 100);
        let decision = state.record_failure(ErrorClass::Fatal);
        assert_eq!(decision, RecoveryDecision::Checkpoint);
    }

    #[test]
    fn alternative_selection_picks_highest_probability_to_cost_ratio() {
        let alternatives = vec![
            Alternative {
                description: "cheap but unlikely".to_string(),
                estimated_probability: 0.3,
                cost_multiplier: 1.0,
            },
            Alternative {
                description: "expensive but likely".to_string(),
                estimated_probability: 0.9,
                cost_multiplier: 2.0,
            },
            Alternative {
                description: "cheap and likely".to_string(),
                estimated_probability: 0.6,
                cost_multiplier: 1.0,
            },
        ];
        let best = select_best_alternative(&alternatives).unwrap();
        assert_eq!(best.description, "cheap and likely");
    }
}

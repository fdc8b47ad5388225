use serde::{Deserialize, Serialize};

/// Autopilot runner policy (`spec.md` §6 `execution_strategy`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    Sequential,
    ContinueOnBlock,
}

/// Closed set of options the kernel recognizes (`spec.md` §6). Unknown keys
/// encountered while deserializing an external config file are rejected by
/// `serde(deny_unknown_fields)` rather than silently ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KernelConfig {
    pub checkpoint_budget_usd: f64,
    pub checkpoint_daily_budget_usd: f64,
    pub duration_limit_seconds: u64,
    pub error_streak_threshold: u32,
    pub min_execution_budget: f64,
    pub max_recovery_attempts: u32,
    pub spec_critic_score_threshold: f64,
    pub complexity_max_estimated_turns: u32,
    pub execution_strategy: ExecutionStrategy,
    pub check_codex_auth: bool,
    #[serde(default)]
    pub skip_empty_output_validation: bool,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            checkpoint_budget_usd: 5.0,
            checkpoint_daily_budget_usd: 50.0,
            duration_limit_seconds: 4 * 3600,
            error_streak_threshold: 3,
            min_execution_budget: 0.50,
            max_recovery_attempts: 7,
            spec_critic_score_threshold: 0.75,
            complexity_max_estimated_turns: 12,
            execution_strategy: ExecutionStrategy::Sequential,
            check_codex_auth: true,
            skip_empty_output_validation: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_key_is_rejected() {
        let raw = r#"{
            "checkpoint_budget_usd": 5.0,
            "checkpoint_daily_budget_usd": 50.0,
            "duration_limit_seconds": 3600,
            "error_streak_threshold": 3,
            "min_execution_budget": 0.5,
            "max_recovery_attempts": 7,
            "spec_critic_score_threshold": 0.75,
            "complexity_max_estimated_turns": 12,
            "execution_strategy": "sequential",
            "check_codex_auth": true,
            "made_up_option": 1
        }"#;
        assert!(serde_json::from_str::<KernelConfig>(raw).is_err());
    }

    #[test]
    fn default_config_deserializes_round_trip() {
        let config = KernelConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: KernelConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.checkpoint_budget_usd, config.checkpoint_budget_usd);
    }
}

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use waypoint_types::{CheckpointTrigger, SimilarDecision};

const MIN_SIGNALS_FOR_WEIGHT_UPDATE: usize = 10;
const MAX_WEIGHT_DELTA_FRACTION: f64 = 0.20;

#[derive(Debug, Clone)]
pub struct PreferenceSignal {
    pub trigger: CheckpointTrigger,
    pub approved: bool,
    pub timestamp: DateTime<Utc>,
    pub context: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PreferenceError {
    #[error("trigger {trigger:?} has only {have} signals, needs at least {need}")]
    InsufficientSignals {
        trigger: CheckpointTrigger,
        have: usize,
        need: usize,
    },
}

#[derive(Debug, Clone)]
pub struct WeightUpdate {
    pub trigger: CheckpointTrigger,
    pub previous: f64,
    pub applied: f64,
    pub rationale: String,
}

/// Append-only signal stream over checkpoint resolutions, feeding the
/// checkpoint system's recommendation step (`spec.md` §4.8).
#[derive(Debug, Default)]
pub struct PreferenceLearner {
    signals: Vec<PreferenceSignal>,
    weights: BTreeMap<CheckpointTrigger, f64>,
    update_log: Vec<WeightUpdate>,
}

impl PreferenceLearner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, signal: PreferenceSignal) {
        self.signals.push(signal);
    }

    fn signals_for(&self, trigger: CheckpointTrigger) -> Vec<&PreferenceSignal> {
        self.signals.iter().filter(|s| s.trigger == trigger).collect()
    }

    /// Approval rate for a trigger, or `None` if no signals exist yet.
    pub fn approval_rate(&self, trigger: CheckpointTrigger) -> Option<f64> {
        let matching = self.signals_for(trigger);
        if matching.is_empty() {
            return None;
        }
        let approved = matching.iter().filter(|s| s.approved).count();
        Some(approved as f64 / matching.len() as f64)
    }

    pub fn weight(&self, trigger: CheckpointTrigger) -> f64 {
        self.weights.get(&trigger).copied().unwrap_or(1.0)
    }

    /// Proposes a new weight for `trigger`. Rejected outright below
    /// [`MIN_SIGNALS_FOR_WEIGHT_UPDATE`] signals; otherwise the applied
    /// delta is capped at ±20% of the current weight per call, logged
    /// with a rationale (`spec.md` §4.8).
    pub fn update_weight(
        &mut self,
        trigger: CheckpointTrigger,
        proposed: f64,
    ) -> Result<f64, PreferenceError> {
        let have = self.signals_for(trigger).len();
        if have < MIN_SIGNALS_FOR_WEIGHT_UPDATE {
            return Err(PreferenceError::InsufficientSignals {
                trigger,
                have,
                need: MIN_SIGNALS_FOR_WEIGHT_UPDATE,
            });
        }

        let previous = self.weight(trigger);
        let max_delta = previous * MAX_WEIGHT_DELTA_FRACTION;
        let applied = proposed.clamp(previous - max_delta, previous + max_delta);

        self.weights.insert(trigger, applied);
        self.update_log.push(WeightUpdate {
            trigger,
            previous,
            applied,
            rationale: format!(
                "approval rate {:.2} over {have} signals proposed {proposed:.3}, capped to {applied:.3}",
                self.approval_rate(trigger).unwrap_or(0.0)
            ),
        });
        Ok(applied)
    }

    pub fn update_log(&self) -> &[WeightUpdate] {
        &self.update_log
    }

    /// Content-similarity lookup over past signals carrying context text,
    /// by token-overlap (Jaccard) against `query`. Used to populate a
    /// checkpoint's `similar_decisions` (`spec.md` §4.6.3).
    pub fn similar_decisions(&self, query: &str, k: usize) -> Vec<SimilarDecision> {
        let query_tokens = tokenize(query);
        let mut scored: Vec<(f64, &PreferenceSignal)> = self
            .signals
            .iter()
            .filter_map(|s| {
                let context = s.context.as_ref()?;
                let score = jaccard(&query_tokens, &tokenize(context));
                (score > 0.0).then_some((score, s))
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(k)
            .map(|(_, s)| SimilarDecision {
                description: s.context.clone().unwrap_or_default(),
                approved: s.approved,
                at: s.timestamp,
            })
            .collect()
    }
}

fn tokenize(text: &str) -> BTreeSet<String> {
    text.to_ascii_lowercase()
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| !w.is_empty())
        .collect()
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

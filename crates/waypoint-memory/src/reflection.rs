use async_trait::async_trait;
use waypoint_types::{Episode, RecoveryLevel};

/// Input handed to a reflection generator: everything about a finished
/// unit of work except the embedding, which is derived from the
/// reflection text afterward rather than feeding it.
pub struct ReflectionInput<'a> {
    pub goal: &'a str,
    pub actions: &'a [String],
    pub success: bool,
    pub error: Option<&'a str>,
    pub cost_usd: f64,
    pub duration_seconds: f64,
    pub recovery_level_used: RecoveryLevel,
}

/// Opaque boundary to whatever generates reflection text (`spec.md`
/// §4.7: "a short LLM call"). Same opacity pattern as
/// [`crate::embedding_provider::EmbeddingProvider`] — the kernel calls
/// out, it never bundles a model.
#[async_trait]
pub trait ReflectionGenerator: Send + Sync {
    async fn reflect(&self, input: ReflectionInput<'_>) -> anyhow::Result<String>;
}

/// Fills in an episode's `reflection` field from its other fields via a
/// [`ReflectionGenerator`]. The embedding is left to the caller, who
/// typically embeds the reflection text itself since it is the primary
/// retrieval target, not the raw actions.
pub async fn reflect_on_episode(
    generator: &dyn ReflectionGenerator,
    episode: &mut Episode,
) -> anyhow::Result<()> {
    let actions: Vec<String> = episode
        .actions
        .iter()
        .map(|a| a.description.clone())
        .collect();
    let input = ReflectionInput {
        goal: &episode.goal,
        actions: &actions,
        success: episode.outcome.success,
        error: episode.outcome.error.as_deref(),
        cost_usd: episode.cost_usd,
        duration_seconds: episode.duration_seconds,
        recovery_level_used: episode.recovery_level_used,
    };
    episode.reflection = generator.reflect(input).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_types::EpisodeOutcome;

    struct StubGenerator;

    #[async_trait]
    impl ReflectionGenerator for StubGenerator {
        async fn reflect(&self, input: ReflectionInput<'_>) -> anyhow::Result<String> {
            Ok(format!(
                "{} attempts on '{}'",
                input.actions.len(),
                input.goal
            ))
        }
    }

    #[tokio::test]
    async fn reflection_fills_in_episode_text() {
        let mut episode = Episode::new(
            "patch the retry loop",
            EpisodeOutcome {
                success: true,
                error: None,
                artifacts: Vec::new(),
            },
            RecoveryLevel::RetrySame,
        );
        reflect_on_episode(&StubGenerator, &mut episode).await.unwrap();
        assert_eq!(episode.reflection, "0 attempts on 'patch the retry loop'");
    }
}

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use waypoint_types::{Episode, EpisodeSummary};

use crate::embedding_provider::cosine_similarity;
use crate::errors::{MemoryError, MemoryResult};

/// Episode memory backed by a JSONL log parallel to a fixed-record-size
/// binary embeddings file, indexed by position (`spec.md` §9 redesign
/// note, in place of an embedded vector database): episode at line `i`
/// of `episodes.jsonl` owns the embedding at record `i` of
/// `embeddings.bin`.
pub struct EpisodeStore {
    episodes_path: PathBuf,
    embeddings_path: PathBuf,
    summaries_path: PathBuf,
    dimension: usize,
}

impl EpisodeStore {
    pub async fn open(dir: impl Into<PathBuf>, dimension: usize) -> MemoryResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| MemoryError::Write {
                path: dir.clone(),
                source,
            })?;
        Ok(Self {
            episodes_path: dir.join("episodes.jsonl"),
            embeddings_path: dir.join("embeddings.bin"),
            summaries_path: dir.join("summaries.jsonl"),
            dimension,
        })
    }

    fn record_len(&self) -> usize {
        self.dimension * 4
    }

    /// Appends `episode` to the log and its embedding to the parallel
    /// binary file. An episode with no embedding yet is stored behind a
    /// zero vector so retrieval skips it (similarity 0) without the two
    /// files losing index alignment.
    pub async fn append(&self, episode: &Episode) -> MemoryResult<()> {
        let vector = if episode.embedding.is_empty() {
            vec![0.0_f32; self.dimension]
        } else if episode.embedding.len() != self.dimension {
            return Err(MemoryError::DimensionMismatch {
                expected: self.dimension,
                actual: episode.embedding.len(),
            });
        } else {
            episode.embedding.clone()
        };

        let mut line = serde_json::to_string(episode)?;
        line.push('\n');
        let mut episodes_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.episodes_path)
            .await
            .map_err(|source| MemoryError::Write {
                path: self.episodes_path.clone(),
                source,
            })?;
        episodes_file
            .write_all(line.as_bytes())
            .await
            .map_err(|source| MemoryError::Write {
                path: self.episodes_path.clone(),
                source,
            })?;

        let mut embeddings_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.embeddings_path)
            .await
            .map_err(|source| MemoryError::Write {
                path: self.embeddings_path.clone(),
                source,
            })?;
        embeddings_file
            .write_all(&encode_record(&vector))
            .await
            .map_err(|source| MemoryError::Write {
                path: self.embeddings_path.clone(),
                source,
            })?;
        Ok(())
    }

    async fn read_episodes(&self) -> MemoryResult<Vec<Episode>> {
        read_jsonl(&self.episodes_path).await
    }

    async fn read_embeddings(&self) -> MemoryResult<Vec<Vec<f32>>> {
        let raw = match fs::read(&self.embeddings_path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(MemoryError::Read {
                    path: self.embeddings_path.clone(),
                    source,
                })
            }
        };
        let record_len = self.record_len();
        let usable = raw.len() - (raw.len() % record_len.max(1));
        Ok(raw[..usable]
            .chunks_exact(record_len)
            .map(decode_record)
            .collect())
    }

    /// Retrieves the top-`k` episodes by similarity to `query_embedding`,
    /// weighted by a time-decay multiplier (`spec.md` §4.7), optionally
    /// restricted to successful outcomes.
    pub async fn retrieve_similar(
        &self,
        query_embedding: &[f32],
        k: usize,
        success_only: bool,
        half_life_days: f64,
    ) -> MemoryResult<Vec<(Episode, f32)>> {
        let episodes = self.read_episodes().await?;
        let embeddings = self.read_embeddings().await?;
        let pair_count = episodes.len().min(embeddings.len());

        let now = Utc::now();
        let mut scored: Vec<(Episode, f32)> = (0..pair_count)
            .filter(|&i| !success_only || episodes[i].outcome.success)
            .map(|i| {
                let similarity = cosine_similarity(query_embedding, &embeddings[i]);
                let age_days =
                    (now - episodes[i].timestamp).num_seconds().max(0) as f64 / 86_400.0;
                let decay = if half_life_days > 0.0 {
                    0.5_f64.powf(age_days / half_life_days) as f32
                } else {
                    1.0
                };
                (episodes[i].clone(), similarity * decay)
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    /// Replaces episodes older than `older_than_days` with a single
    /// summary (`spec.md` §4.7 periodic compaction), keeping the episode
    /// and embedding files index-aligned after the rewrite.
    pub async fn compact(&self, older_than_days: f64) -> MemoryResult<Option<EpisodeSummary>> {
        let episodes = self.read_episodes().await?;
        let embeddings = self.read_embeddings().await?;
        let pair_count = episodes.len().min(embeddings.len());
        let now = Utc::now();

        let mut kept_episodes = Vec::new();
        let mut kept_embeddings = Vec::new();
        let mut aged_out = Vec::new();

        for i in 0..pair_count {
            let age_days = (now - episodes[i].timestamp).num_seconds().max(0) as f64 / 86_400.0;
            if age_days > older_than_days {
                aged_out.push(episodes[i].clone());
            } else {
                kept_episodes.push(episodes[i].clone());
                kept_embeddings.push(embeddings[i].clone());
            }
        }

        if aged_out.is_empty() {
            return Ok(None);
        }

        let summary = EpisodeSummary {
            summary_id: format!("sum-{}", uuid::Uuid::new_v4()),
            covers_episode_ids: aged_out.iter().map(|e| e.episode_id.clone()).collect(),
            period_start: aged_out
                .iter()
                .map(|e| e.timestamp)
                .min()
                .unwrap_or(now),
            period_end: aged_out
                .iter()
                .map(|e| e.timestamp)
                .max()
                .unwrap_or(now),
            success_count: aged_out.iter().filter(|e| e.outcome.success).count() as u32,
            failure_count: aged_out.iter().filter(|e| !e.outcome.success).count() as u32,
            total_cost_usd: aged_out.iter().map(|e| e.cost_usd).sum(),
            reflection: aged_out
                .iter()
                .map(|e| e.reflection.as_str())
                .filter(|r| !r.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
        };

        rewrite_jsonl(&self.episodes_path, &kept_episodes).await?;
        rewrite_embeddings(&self.embeddings_path, &kept_embeddings, self.dimension).await?;
        append_jsonl(&self.summaries_path, &summary).await?;

        Ok(Some(summary))
    }
}

fn encode_record(vector: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

fn decode_record(chunk: &[u8]) -> Vec<f32> {
    chunk
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

async fn read_jsonl<T: serde::de::DeserializeOwned>(path: &Path) -> MemoryResult<Vec<T>> {
    let file = match fs::File::open(path).await {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(MemoryError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let mut lines = BufReader::new(file).lines();
    let mut out = Vec::new();
    while let Some(line) = lines.next_line().await.map_err(|source| MemoryError::Read {
        path: path.to_path_buf(),
        source,
    })? {
        if let Ok(value) = serde_json::from_str(&line) {
            out.push(value);
        }
    }
    Ok(out)
}

async fn append_jsonl<T: serde::Serialize>(path: &Path, value: &T) -> MemoryResult<()> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|source| MemoryError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    file.write_all(line.as_bytes())
        .await
        .map_err(|source| MemoryError::Write {
            path: path.to_path_buf(),
            source,
        })
}

async fn rewrite_jsonl<T: serde::Serialize>(path: &Path, values: &[T]) -> MemoryResult<()> {
    let mut payload = String::new();
    for value in values {
        payload.push_str(&serde_json::to_string(value)?);
        payload.push('\n');
    }
    fs::write(path, payload)
        .await
        .map_err(|source| MemoryError::Write {
            path: path.to_path_buf(),
            source,
        })
}

async fn rewrite_embeddings(path: &Path, vectors: &[Vec<f32>], dimension: usize) -> MemoryResult<()> {
    let mut payload = Vec::with_capacity(vectors.len() * dimension * 4);
    for vector in vectors {
        payload.extend(encode_record(vector));
    }
    fs::write(path, payload)
        .await
        .map_err(|source| MemoryError::Write {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_types::{EpisodeOutcome, RecoveryLevel};

    fn episode(goal: &str, success: bool, embedding: Vec<f32>) -> Episode {
        let mut episode = Episode::new(
            goal,
            EpisodeOutcome {
                success,
                error: None,
                artifacts: Vec::new(),
            },
            RecoveryLevel::RetrySame,
        );
        episode.embedding = embedding;
        episode
    }

    #[tokio::test]
    async fn append_then_retrieve_finds_closest_match() {
        let dir = tempfile::tempdir().unwrap();
        let store = EpisodeStore::open(dir.path(), 3).await.unwrap();
        store
            .append(&episode("fix auth bug", true, vec![1.0, 0.0, 0.0]))
            .await
            .unwrap();
        store
            .append(&episode("unrelated goal", true, vec![0.0, 1.0, 0.0]))
            .await
            .unwrap();

        let results = store
            .retrieve_similar(&[1.0, 0.0, 0.0], 1, false, 0.0)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.goal, "fix auth bug");
    }

    #[tokio::test]
    async fn success_only_filter_excludes_failures() {
        let dir = tempfile::tempdir().unwrap();
        let store = EpisodeStore::open(dir.path(), 2).await.unwrap();
        store.append(&episode("a", false, vec![1.0, 0.0])).await.unwrap();
        store.append(&episode("b", true, vec![1.0, 0.0])).await.unwrap();

        let results = store
            .retrieve_similar(&[1.0, 0.0], 5, true, 0.0)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.goal, "b");
    }

    #[tokio::test]
    async fn missing_embedding_is_stored_as_zero_vector() {
        let dir = tempfile::tempdir().unwrap();
        let store = EpisodeStore::open(dir.path(), 2).await.unwrap();
        store.append(&episode("no embedding yet", true, vec![])).await.unwrap();
        let results = store
            .retrieve_similar(&[1.0, 0.0], 5, false, 0.0)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].1, 0.0);
    }

    #[tokio::test]
    async fn compaction_summarizes_aged_out_episodes_and_keeps_files_aligned() {
        let dir = tempfile::tempdir().unwrap();
        let store = EpisodeStore::open(dir.path(), 2).await.unwrap();
        let mut old = episode("old goal", true, vec![1.0, 0.0]);
        old.timestamp = Utc::now() - chrono::Duration::days(100);
        store.append(&old).await.unwrap();
        store.append(&episode("recent goal", true, vec![0.0, 1.0])).await.unwrap();

        let summary = store.compact(30.0).await.unwrap().expect("something aged out");
        assert_eq!(summary.covers_episode_ids.len(), 1);

        let remaining = store.read_episodes().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].goal, "recent goal");

        let results = store
            .retrieve_similar(&[0.0, 1.0], 5, false, 0.0)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!((results[0].1 - 1.0).abs() < 1e-6);
    }
}

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::errors::PersistenceError;

/// One line of the diagnostic event log (`spec.md` §4.2). The log is
/// advisory: nothing in the kernel depends on it for correctness, so
/// readers tolerate a truncated trailing line rather than failing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub kind: String,
    pub payload: serde_json::Value,
}

impl EventRecord {
    pub fn new(actor: impl Into<String>, kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            timestamp: Utc::now(),
            actor: actor.into(),
            kind: kind.into(),
            payload,
        }
    }
}

/// Append-only JSONL event log, one file per feature or bug, rotated by
/// size with a single retained generation.
pub struct EventLog {
    dir: PathBuf,
    max_bytes: u64,
}

impl EventLog {
    pub fn new(dir: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            dir: dir.into(),
            max_bytes,
        }
    }

    fn path_for(&self, entity_id: &str) -> PathBuf {
        self.dir.join(format!("{entity_id}.jsonl"))
    }

    pub async fn append(&self, entity_id: &str, record: EventRecord) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| PersistenceError::Write {
                path: self.dir.clone(),
                source,
            })?;
        let path = self.path_for(entity_id);
        self.rotate_if_oversized(&path).await?;

        let mut line = serde_json::to_string(&record).map_err(|source| PersistenceError::Decode {
            path: path.clone(),
            source,
        })?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| PersistenceError::Write {
                path: path.clone(),
                source,
            })?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|source| PersistenceError::Write {
                path: path.clone(),
                source,
            })?;
        Ok(())
    }

    async fn rotate_if_oversized(&self, path: &std::path::Path) -> Result<(), PersistenceError> {
        let size = match fs::metadata(path).await {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(source) => {
                return Err(PersistenceError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        if size < self.max_bytes {
            return Ok(());
        }
        let rotated = path.with_extension("jsonl.1");
        let _ = fs::remove_file(&rotated).await;
        fs::rename(path, &rotated)
            .await
            .map_err(|source| PersistenceError::Write {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Reads every well-formed line; a malformed or truncated trailing
    /// line (e.g. from a crash mid-append) is skipped, not an error.
    pub async fn read_all(&self, entity_id: &str) -> Result<Vec<EventRecord>, PersistenceError> {
        let path = self.path_for(entity_id);
        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(PersistenceError::Read {
                    path: path.clone(),
                    source,
                })
            }
        };
        let mut lines = BufReader::new(file).lines();
        let mut out = Vec::new();
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|source| PersistenceError::Read {
                path: path.clone(),
                source,
            })?
        {
            if let Ok(record) = serde_json::from_str::<EventRecord>(&line) {
                out.push(record);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn appended_records_read_back_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path(), 1_000_000);
        log.append("f1", EventRecord::new("kernel", "phase_advance", json!({"to": "greenlit"})))
            .await
            .unwrap();
        log.append("f1", EventRecord::new("kernel", "phase_advance", json!({"to": "implementing"})))
            .await
            .unwrap();
        let records = log.read_all("f1").await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].payload["to"], "implementing");
    }

    #[tokio::test]
    async fn truncated_trailing_line_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path(), 1_000_000);
        log.append("f1", EventRecord::new("kernel", "phase_advance", json!({"to": "greenlit"})))
            .await
            .unwrap();
        let path = dir.path().join("f1.jsonl");
        let mut file = OpenOptions::new().append(true).open(&path).await.unwrap();
        file.write_all(b"{\"timestamp\":\"2026-01").await.unwrap();

        let records = log.read_all("f1").await.unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn oversized_log_rotates_before_appending() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path(), 10);
        log.append("f1", EventRecord::new("kernel", "a", json!({}))).await.unwrap();
        log.append("f1", EventRecord::new("kernel", "b", json!({}))).await.unwrap();
        assert!(dir.path().join("f1.jsonl.1").exists());
    }
}

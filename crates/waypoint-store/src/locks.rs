use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::atomic::{atomic_write_json, read_json};
use crate::errors::LockHeld;
use waypoint_types::lock_key;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
    hostname: String,
    started_at: DateTime<Utc>,
}

/// Advisory cross-process lock over a (feature, issue) pair
/// (`spec.md` §4.1, §5). Staleness is decided by process liveness when the
/// lock was taken on this host, falling back to a TTL otherwise.
pub struct LockManager {
    locks_dir: PathBuf,
    stale_ttl: Duration,
}

impl LockManager {
    pub fn new(locks_dir: impl Into<PathBuf>, stale_ttl: Duration) -> Self {
        Self {
            locks_dir: locks_dir.into(),
            stale_ttl,
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.locks_dir.join(format!("{key}.lock"))
    }

    /// Attempts to acquire the lock for `(feature_id, issue_number)`. A
    /// stale lock (dead process, or past TTL when liveness can't be
    /// checked) is reclaimed transparently before the attempt proceeds.
    pub async fn acquire(
        &self,
        feature_id: &str,
        issue_number: u32,
    ) -> Result<LockGuard, LockHeld> {
        let key = lock_key(feature_id, issue_number);
        let path = self.path_for(&key);

        if let Some(existing) = read_json::<LockInfo>(&path)
            .await
            .map_err(|source| LockHeld::Io {
                lock_key: key.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, source.to_string()),
            })?
        {
            if self.is_stale(&existing) {
                let _ = fs::remove_file(&path).await;
            } else {
                return Err(LockHeld::Held {
                    lock_key: key,
                    holder_pid: existing.pid,
                    holder_host: existing.hostname,
                    started_at: existing.started_at,
                });
            }
        }

        let info = LockInfo {
            pid: std::process::id(),
            hostname: local_hostname(),
            started_at: Utc::now(),
        };
        atomic_write_json(&path, &info)
            .await
            .map_err(|source| LockHeld::Io {
                lock_key: key.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, source.to_string()),
            })?;

        Ok(LockGuard { path, key })
    }

    fn is_stale(&self, info: &LockInfo) -> bool {
        if info.hostname == local_hostname() && !process_is_alive(info.pid) {
            return true;
        }
        let age = Utc::now().signed_duration_since(info.started_at);
        age.to_std().map(|age| age > self.stale_ttl).unwrap_or(false)
    }

    /// Reclaims any lock file whose holder is stale, without attempting to
    /// acquire it. Used by operator-facing cleanup tooling.
    pub async fn cleanup(&self) -> std::io::Result<u32> {
        let mut reclaimed = 0;
        let mut entries = match fs::read_dir(&self.locks_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("lock") {
                continue;
            }
            if let Ok(Some(info)) = read_json::<LockInfo>(&path).await {
                if self.is_stale(&info) {
                    let _ = fs::remove_file(&path).await;
                    reclaimed += 1;
                }
            }
        }
        Ok(reclaimed)
    }
}

/// Releases its lock file on drop. Best-effort: a failed removal leaves a
/// lock that `cleanup`/staleness detection will reclaim later.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    key: String,
}

impl LockGuard {
    pub fn lock_key(&self) -> &str {
        &self.key
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(unix)]
fn process_is_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

#[cfg(not(unix))]
fn process_is_alive(_pid: u32) -> bool {
    // No portable liveness check; fall back to TTL-only staleness.
    true
}

fn local_hostname() -> String {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_else(|| "unknown-host".to_string())
}

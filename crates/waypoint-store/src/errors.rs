use std::path::PathBuf;

/// Error taxonomy for the state store boundary (`spec.md` §7): these two
/// kinds always surface to the caller rather than being retried locally.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("post-write verification of {path} failed: re-read did not match")]
    VerificationFailed { path: PathBuf },
    #[error("entity not found: {kind}/{id}")]
    NotFound { kind: String, id: String },
}

#[derive(Debug, thiserror::Error)]
pub enum LockHeld {
    #[error("lock for {lock_key} is held by pid {holder_pid} on {holder_host} since {started_at}")]
    Held {
        lock_key: String,
        holder_pid: u32,
        holder_host: String,
        started_at: chrono::DateTime<chrono::Utc>,
    },
    #[error("lock I/O error for {lock_key}: {source}")]
    Io {
        lock_key: String,
        #[source]
        source: std::io::Error,
    },
}

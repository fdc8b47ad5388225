use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::errors::PersistenceError;

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".tmp-{}", uuid::Uuid::new_v4()));
    path.with_file_name(name)
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".bak");
    path.with_file_name(name)
}

/// Writes `value` to `path` as pretty JSON using the three-step atomic
/// protocol: write to a sibling temp file, fsync, rename into place. A
/// one-generation backup of the previous canonical file is kept until the
/// new file is verified by re-read (`spec.md` §4.1).
pub async fn atomic_write_json<T: Serialize>(
    path: &Path,
    value: &T,
) -> Result<(), PersistenceError> {
    let payload = serde_json::to_vec_pretty(value).map_err(|source| PersistenceError::Decode {
        path: path.to_path_buf(),
        source,
    })?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|source| PersistenceError::Write {
                path: path.to_path_buf(),
                source,
            })?;
    }

    let tmp = temp_path(path);
    write_and_sync(&tmp, &payload).await.map_err(|source| PersistenceError::Write {
        path: tmp.clone(),
        source,
    })?;

    let had_previous = fs::metadata(path).await.is_ok();
    let backup = backup_path(path);
    if had_previous {
        fs::copy(path, &backup)
            .await
            .map_err(|source| PersistenceError::Write {
                path: backup.clone(),
                source,
            })?;
    }

    fs::rename(&tmp, path)
        .await
        .map_err(|source| PersistenceError::Write {
            path: path.to_path_buf(),
            source,
        })?;

    let reread = fs::read(path).await.map_err(|source| PersistenceError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if reread != payload {
        return Err(PersistenceError::VerificationFailed {
            path: path.to_path_buf(),
        });
    }

    if had_previous {
        let _ = fs::remove_file(&backup).await;
    }

    Ok(())
}

async fn write_and_sync(path: &Path, payload: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(payload).await?;
    file.sync_all().await?;
    Ok(())
}

/// Reads and decodes `path`, returning `None` when it does not exist.
pub async fn read_json<T: DeserializeOwned>(
    path: &Path,
) -> Result<Option<T>, PersistenceError> {
    let raw = match fs::read(path).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(PersistenceError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_slice(&raw)
        .map(Some)
        .map_err(|source| PersistenceError::Decode {
            path: path.to_path_buf(),
            source,
        })
}

/// Scans `dir` for orphan temp/backup files left by an interrupted write
/// and recovers the newest consistent version (`spec.md` §4.1): a `.bak`
/// with no canonical counterpart is promoted; a dangling `.tmp-*` file is
/// always incomplete and is discarded.
pub async fn recover_orphans(dir: &Path) -> Result<(), PersistenceError> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(source) => {
            return Err(PersistenceError::Read {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|source| PersistenceError::Read {
            path: dir.to_path_buf(),
            source,
        })?
    {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(canonical_name) = name.strip_suffix(".bak") {
            let canonical = path.with_file_name(canonical_name);
            if fs::metadata(&canonical).await.is_err() {
                let _ = fs::rename(&path, &canonical).await;
            } else {
                let _ = fs::remove_file(&path).await;
            }
        } else if name.contains(".tmp-") {
            let _ = fs::remove_file(&path).await;
        }
    }
    Ok(())
}

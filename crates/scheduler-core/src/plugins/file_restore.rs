//! Sample compensator: restores a file's previous contents from a
//! base64-encoded snapshot taken before a handler overwrote it.

use std::path::{Component, Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use thiserror::Error;

use crate::compensator::Compensator;

/// Snapshots larger than this are rejected outright; this compensator is
/// meant for small config/state files, not bulk data.
const MAX_SNAPSHOT_BYTES: usize = 200 * 1024;

#[derive(Debug, Deserialize)]
struct FileRestorePayload {
    root: Option<String>,
    file: String,
    orig_base64: Option<String>,
}

#[derive(Debug, Error)]
enum FileRestoreError {
    #[error("snapshot payload is malformed: {0}")]
    BadPayload(#[from] serde_json::Error),

    #[error("snapshot decode failed: {0}")]
    BadBase64(#[from] base64::DecodeError),

    #[error("snapshot of {0} bytes exceeds the {1}-byte cap")]
    TooLarge(usize, usize),

    #[error("file path escapes root via '..' component")]
    PathTraversal,

    #[error("no root given in payload and no default root configured")]
    MissingRoot,

    #[error("io error restoring file: {0}")]
    Io(#[from] std::io::Error),
}

/// Writes back a file's pre-execution contents from the snapshot embedded
/// in the compensation payload, or deletes the file when the payload omits
/// a snapshot.
pub struct FileRestoreCompensator {
    default_root: Option<String>,
}

impl FileRestoreCompensator {
    /// `default_root` backs payloads that omit their own `root`.
    pub fn new(default_root: Option<String>) -> Self {
        Self { default_root }
    }
}

#[async_trait]
impl Compensator for FileRestoreCompensator {
    async fn compensate(&self, payload: &str) -> Result<bool> {
        restore(payload, self.default_root.as_deref())?;
        Ok(true)
    }
}

fn restore(payload: &str, default_root: Option<&str>) -> Result<(), FileRestoreError> {
    let parsed: FileRestorePayload = serde_json::from_str(payload)?;

    let root = parsed
        .root
        .as_deref()
        .or(default_root)
        .ok_or(FileRestoreError::MissingRoot)?;
    let target = resolve_within_root(root, &parsed.file)?;

    match parsed.orig_base64 {
        Some(encoded) => {
            let bytes = BASE64.decode(&encoded)?;
            if bytes.len() > MAX_SNAPSHOT_BYTES {
                return Err(FileRestoreError::TooLarge(bytes.len(), MAX_SNAPSHOT_BYTES));
            }
            write_atomic(&target, &bytes)?;
        }
        None => {
            if target.exists() {
                std::fs::remove_file(&target)?;
            }
        }
    }

    Ok(())
}

/// Join `file` onto `root`, rejecting any path containing a `..` component
/// so a handler's payload cannot be used to write outside its sandbox.
fn resolve_within_root(root: &str, file: &str) -> Result<PathBuf, FileRestoreError> {
    let file_path = Path::new(file);
    if file_path
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(FileRestoreError::PathTraversal);
    }
    if file_path.is_absolute() {
        return Err(FileRestoreError::PathTraversal);
    }
    Ok(Path::new(root).join(file_path))
}

/// Write `bytes` to `target` via a temp file + rename, falling back to a
/// direct write if the rename fails (e.g. crossing filesystems).
fn write_atomic(target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = target.with_extension("restore-tmp");
    std::fs::write(&tmp, bytes)?;
    match std::fs::rename(&tmp, target) {
        Ok(()) => Ok(()),
        Err(_) => {
            let result = std::fs::write(target, bytes);
            let _ = std::fs::remove_file(&tmp);
            result
        }
    }
}

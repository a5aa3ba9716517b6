//! Sample handler: walks a directory tree and logs a count of files per
//! extension. Read-only, so it logs no compensation entries.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::handler::{ExecutionContext, JobHandler};

/// Directory names this walk never recurses into: VCS metadata and build
/// output directories, which are large, uninteresting, and sometimes
/// contain symlink loops.
const SKIP_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "target",
    "node_modules",
    ".venv",
    "__pycache__",
];

#[derive(Debug, Deserialize)]
struct CodeIndexPayload {
    root: String,
}

/// Counts files by extension under `payload.root`, logging the result.
pub struct CodeIndexHandler;

#[async_trait]
impl JobHandler for CodeIndexHandler {
    async fn execute(&self, payload: &str, ctx: &ExecutionContext) -> Result<()> {
        let parsed: CodeIndexPayload =
            serde_json::from_str(payload).context("invalid sample.code_index payload")?;

        let counts = walk_and_count(Path::new(&parsed.root), ctx)?;

        for (ext, count) in &counts {
            tracing::info!(
                run_id = %ctx.run_id(),
                extension = %ext,
                count = count,
                "code_index: extension count"
            );
        }

        Ok(())
    }
}

fn walk_and_count(root: &Path, ctx: &ExecutionContext) -> Result<BTreeMap<String, u64>> {
    let mut counts = BTreeMap::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        if ctx.is_cancel_requested() {
            break;
        }

        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "code_index: failed to read directory");
                continue;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                let skip = path
                    .file_name()
                    .map(|name| SKIP_DIRS.iter().any(|s| *s == name))
                    .unwrap_or(false);
                if skip {
                    continue;
                }
                stack.push(path);
                continue;
            }

            let ext = path
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_else(|| "(none)".to_owned());
            *counts.entry(ext).or_insert(0) += 1;
        }
    }

    Ok(counts)
}

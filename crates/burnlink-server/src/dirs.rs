use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::ProjectDirs;

/// Resolve the data directory for the redb backend (`burnlink.db`).
///
/// Priority:
/// 1. explicit `dir` (from `BURNLINK_DATA_DIR` or the caller)
/// 2. Platform-specific app data dir (`~/.local/share/burnlink/`, etc.)
pub fn data_dir(dir: Option<&PathBuf>) -> Result<PathBuf> {
    if let Some(path) = dir {
        std::fs::create_dir_all(path).context("create data dir")?;
        return Ok(path.clone());
    }

    let dirs = ProjectDirs::from("", "", "burnlink")
        .context("could not determine platform data directory")?;

    let path = dirs.data_dir().to_owned();
    std::fs::create_dir_all(&path).context("create platform data dir")?;
    Ok(path)
}

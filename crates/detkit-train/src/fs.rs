use anyhow::{Context, Result};
use std::path::Path;
use tracing::debug;

/// Create `path` and its parents if missing. Safe to call repeatedly.
pub fn ensure_dir(path: impl AsRef<Path>) -> Result<()> {
    let p = path.as_ref();
    if p.is_dir() {
        return Ok(());
    }
    anyhow::ensure!(!p.exists(), "not a directory: {}", p.display());
    std::fs::create_dir_all(p).with_context(|| format!("create dir {}", p.display()))?;
    debug!("fs: created {}", p.display());
    Ok(())
}

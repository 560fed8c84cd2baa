//! Content-addressed build cache.
//!
//! Entries are stored as `<root>/<first two hex chars>/<signature>`, one file
//! per built target. The directory may be shared by any number of
//! environments; whether they actually share entries depends on the
//! signature strategy.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::util::fs::{copy_atomic, ensure_dir};

#[derive(Debug, Clone)]
pub struct CacheDir {
    root: PathBuf,
}

impl CacheDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        CacheDir { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the entry for `signature` lives.
    pub fn entry_path(&self, signature: &str) -> PathBuf {
        let shard = signature.get(..2).unwrap_or("00");
        self.root.join(shard).join(signature)
    }

    pub fn contains(&self, signature: &str) -> bool {
        self.entry_path(signature).is_file()
    }

    /// Copy the entry for `signature` to `target`. Returns `false` on a miss.
    pub fn fetch(&self, signature: &str, target: &Path) -> Result<bool> {
        let entry = self.entry_path(signature);
        if !entry.is_file() {
            return Ok(false);
        }

        let mut file = File::open(&entry)
            .with_context(|| format!("failed to open cache entry {}", entry.display()))?;
        copy_atomic(&mut file, target)?;
        tracing::debug!("Retrieved `{}` from cache", target.display());
        Ok(true)
    }

    /// Store `target` under `signature`. An existing entry is kept.
    pub fn push(&self, signature: &str, target: &Path) -> Result<()> {
        let entry = self.entry_path(signature);
        if entry.is_file() {
            return Ok(());
        }
        if let Some(parent) = entry.parent() {
            ensure_dir(parent)?;
        }

        let mut file = File::open(target)
            .with_context(|| format!("built target is missing: {}", target.display()))?;
        copy_atomic(&mut file, &entry)?;
        tracing::debug!("CachePush(\"{}\")", target.display());
        Ok(())
    }
}

//! Package content hashing
//!
//! The digest covers every tracked file's relative path and bytes plus every
//! directory's relative path, folded in sorted walk order. Timestamps play no
//! part, so identical trees hash identically wherever they live.

use crate::{PackageError, Result};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Build-output directories skipped by default
pub const DEFAULT_IGNORE_DIRS: &[&str] = &["bin", "obj"];

/// Entry names excluded from a package hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashIgnore {
    names: BTreeSet<String>,
    /// Skip dot-prefixed entries (`.git`, editor state, ...)
    pub hidden: bool,
}

impl Default for HashIgnore {
    fn default() -> Self {
        Self {
            names: DEFAULT_IGNORE_DIRS.iter().map(|s| s.to_string()).collect(),
            hidden: true,
        }
    }
}

impl HashIgnore {
    /// Default list extended with extra names
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ignore = Self::default();
        ignore.names.extend(extra.into_iter().map(Into::into));
        ignore
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        self.names.contains(name) || (self.hidden && name.starts_with('.'))
    }
}

/// Hash the directory tree rooted at `dir`, returning a hex digest
pub fn hash_dir(dir: &Path, ignore: &HashIgnore) -> Result<String> {
    let mut hasher = Sha256::new();

    let walker = WalkDir::new(dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !ignore.is_ignored(&entry.file_name().to_string_lossy()));

    for entry in walker {
        let entry = entry.map_err(|error| PackageError::WalkError {
            path: dir.to_path_buf(),
            error,
        })?;

        let rel = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        // Separators are normalized so the digest does not depend on the host.
        let rel_name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if entry.file_type().is_dir() {
            hasher.update(b"d:");
            hasher.update(rel_name.as_bytes());
            hasher.update([0u8]);
        } else {
            let contents = fs::read(entry.path()).map_err(|e| PackageError::io(entry.path(), e))?;
            hasher.update(b"f:");
            hasher.update(rel_name.as_bytes());
            hasher.update([0u8]);
            hasher.update((contents.len() as u64).to_le_bytes());
            hasher.update(&contents);
        }
    }

    Ok(format!("{:x}", hasher.finalize()))
}

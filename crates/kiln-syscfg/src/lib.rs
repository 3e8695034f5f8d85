//! Kiln system configuration
//!
//! Merges the `syscfg` settings contributed by every package of a resolved
//! target into one [`Cfg`], keeping the full contribution history of each
//! setting. Also reads and writes the `[syscfg.vals]` file format and renders
//! the human-facing configuration report.

pub mod cfg;
pub mod file;
pub mod report;

pub use cfg::{Cfg, CfgConflict, CfgEntry, CfgMerger, CfgPoint, ConflictKind};
pub use file::{export, import, kv_from_str, kv_to_str, read_file, write_file};
pub use report::cfg_text;

use std::path::PathBuf;

/// Syscfg errors
#[derive(Debug, thiserror::Error)]
pub enum SyscfgError {
    #[error("Failed to parse syscfg values: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("I/O error at {path}: {error}")]
    IoError {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("Invalid value for setting '{name}': {reason}")]
    InvalidValue { name: String, reason: String },

    #[error("Invalid key-value pair '{pair}': expected KEY=VALUE")]
    InvalidKeyValue { pair: String },
}

impl SyscfgError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            error,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyscfgError>;

/// Build system error types
use kiln_package::{PackageError, ResolveFailure};
use std::path::PathBuf;
use thiserror::Error;

pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Target not found: {target}")]
    TargetNotFound { target: String },

    #[error("{0}")]
    Resolve(Box<ResolveFailure>),

    #[error("Package error: {0}")]
    Package(#[from] PackageError),

    #[error("Syscfg error: {0}")]
    Syscfg(#[from] kiln_syscfg::SyscfgError),

    #[error("Configuration error: {0}")]
    Config(#[from] kiln_config::ConfigError),

    #[error("Cannot record configuration of {target}\n{text}")]
    CfgConflicts { target: String, text: String },

    #[error(
        "Init function '{name}' is registered by both '{first}' and '{second}'"
    )]
    DuplicateEntryPoint {
        name: String,
        first: String,
        second: String,
    },

    #[error("I/O error at {path}: {error}")]
    IoError {
        path: PathBuf,
        error: std::io::Error,
    },
}

impl BuildError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            error,
        }
    }

    /// Create a target not found error
    pub fn target_not_found(target: impl Into<String>) -> Self {
        Self::TargetNotFound {
            target: target.into(),
        }
    }
}

impl From<ResolveFailure> for BuildError {
    fn from(failure: ResolveFailure) -> Self {
        Self::Resolve(Box::new(failure))
    }
}

//! Kiln package management
//!
//! Package descriptors (`pkg.toml`), on-disk discovery into an immutable
//! [`PackageStore`], content hashing for incremental builds, and resolution
//! of a build target into the closed set of packages it needs.

pub mod build_order;
pub mod descriptor;
pub mod hash;
pub mod package;
pub mod resolver;
pub mod store;

pub use build_order::BuildOrderComputer;
pub use descriptor::{PACKAGE_FILE_NAME, SYSCFG_FILE_NAME};
pub use package::{Dependency, Package, PackageDesc, PackageType, SettingDef, Variant};
pub use resolver::{
    ResolveFailure, ResolveProblem, Resolution, ResolvedPackage, Resolver,
};
pub use store::PackageStore;

use std::path::PathBuf;

/// Package management errors
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("Failed to parse {file}: {error}")]
    ParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("I/O error at {path}: {error}")]
    IoError {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("Missing required field '{field}' in {file}")]
    MissingField { field: String, file: PathBuf },

    #[error("Unknown field '{field}' in {file}")]
    UnknownField { field: String, file: PathBuf },

    #[error("Invalid field value: {field} - {reason}")]
    InvalidField { field: String, reason: String },

    #[error("Invalid version '{version}': {error}")]
    InvalidVersion {
        version: String,
        error: semver::Error,
    },

    #[error("Duplicate package '{name}' at {first} and {second}")]
    DuplicatePackage {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Failed to walk {path}: {error}")]
    WalkError {
        path: PathBuf,
        error: walkdir::Error,
    },
}

impl PackageError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            error,
        }
    }

    /// Create an invalid field error
    pub fn invalid_field(field: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PackageError>;

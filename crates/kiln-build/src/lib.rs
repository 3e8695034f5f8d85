//! Kiln target building
//!
//! Everything downstream of resolution:
//! - Dependency and reverse-dependency graphs with filtering and rendering
//! - Stage-ordered init code (`sysinit`) generation with idempotent writes
//! - The [`TargetBuilder`] that discovers packages, resolves a target and
//!   runs the later stages only on a valid resolution

pub mod depgraph;
pub mod error;
pub mod sysinit;
pub mod target;

pub use depgraph::{DepGraph, Direction};
pub use error::{BuildError, BuildResult};
pub use sysinit::{ensure_written, generate, sysinit_path, InitFunc, StageMap};
pub use target::{BuildFlags, TargetBuilder};

// Re-export package types for convenience
pub use kiln_package::{Resolution, Variant};

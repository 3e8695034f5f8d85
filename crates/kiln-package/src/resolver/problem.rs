//! Resolution problems and the aggregate failure report

use super::Resolution;
use std::fmt;
use std::fmt::Write as _;
use thiserror::Error;

/// A single reason a resolution is invalid
#[derive(Debug, Clone, Error, PartialEq, Eq, PartialOrd, Ord)]
pub enum ResolveProblem {
    #[error("Package '{requester}' depends on unknown package '{dependency}'")]
    UnknownPackage {
        requester: String,
        dependency: String,
    },

    #[error("Package '{requester}' requires API '{api}', but no package exports it")]
    UnresolvedApi { requester: String, api: String },

    #[error(
        "Package '{requester}' requires API '{api}', which is exported by multiple packages: {}",
        .providers.join(", ")
    )]
    AmbiguousApi {
        requester: String,
        api: String,
        providers: Vec<String>,
    },
}

impl ResolveProblem {
    /// Package whose declaration caused the problem
    pub fn requester(&self) -> &str {
        match self {
            ResolveProblem::UnknownPackage { requester, .. }
            | ResolveProblem::UnresolvedApi { requester, .. }
            | ResolveProblem::AmbiguousApi { requester, .. } => requester,
        }
    }
}

/// Every problem found while resolving a target, reported together.
///
/// The best-effort closure is kept for diagnostics only.
#[derive(Debug, Clone)]
pub struct ResolveFailure {
    pub problems: Vec<ResolveProblem>,
    pub partial: Resolution,
}

impl ResolveFailure {
    /// Multi-line report, one problem per line
    pub fn report(&self) -> String {
        let mut report = format!(
            "Failed to resolve target '{}' ({} problem{}):\n",
            self.partial.target(),
            self.problems.len(),
            if self.problems.len() == 1 { "" } else { "s" }
        );
        for problem in &self.problems {
            let _ = writeln!(report, "    * {}", problem);
        }

        let warnings = self.partial.warning_text();
        if !warnings.is_empty() {
            report.push_str("Warnings:\n");
            for line in warnings.lines() {
                let _ = writeln!(report, "    * {}", line);
            }
        }
        report
    }
}

impl fmt::Display for ResolveFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.report().trim_end())
    }
}

impl std::error::Error for ResolveFailure {}

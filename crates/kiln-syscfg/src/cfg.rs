//! Merged configuration namespace for one resolved target
//!
//! Settings are built in two passes over the resolution. Definitions come
//! first, in package name order, and seed each setting's default. Overrides
//! follow, ordered by package type priority and then name, with caller
//! supplied overrides applied last. Every contribution is appended to the
//! setting's history; the last one is the effective value.

use kiln_package::Resolution;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Priority of the first caller override set; each further set is one higher
const OVERRIDE_PRIORITY: u16 = 0x100;

/// One contribution to a setting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfgPoint {
    /// Package (or override source) that contributed the value
    pub source: String,
    pub value: String,
}

impl CfgPoint {
    pub fn new(source: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            value: value.into(),
        }
    }
}

/// A setting with its full contribution history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfgEntry {
    name: String,
    value: String,
    description: String,
    history: Vec<CfgPoint>,
}

impl CfgEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Effective value
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Contributions in application order; the first is the default
    pub fn history(&self) -> &[CfgPoint] {
        &self.history
    }

    /// The unconditioned default
    pub fn default_point(&self) -> &CfgPoint {
        &self.history[0]
    }

    /// Package that introduced the setting
    pub fn origin(&self) -> &str {
        &self.history[0].source
    }

    pub fn is_overridden(&self) -> bool {
        self.history.len() > 1
    }

    /// Sources of every contribution after the default
    pub fn overriders(&self) -> impl Iterator<Item = &str> {
        self.history[1..].iter().map(|p| p.source.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConflictKind {
    /// More than one package defines the setting
    Redefined,
    /// Packages of the same priority set different values
    Ambiguous,
}

/// An unresolved disagreement about a setting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfgConflict {
    pub setting: String,
    pub kind: ConflictKind,
    /// The clashing contributions, in application order
    pub points: Vec<CfgPoint>,
}

impl fmt::Display for CfgConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ConflictKind::Redefined => {
                let sources: Vec<&str> = self.points.iter().map(|p| p.source.as_str()).collect();
                write!(
                    f,
                    "Setting {} defined by multiple packages: {}",
                    self.setting,
                    sources.join(", ")
                )
            }
            ConflictKind::Ambiguous => {
                let values: Vec<String> = self
                    .points
                    .iter()
                    .map(|p| format!("{}={}", p.source, p.value))
                    .collect();
                write!(
                    f,
                    "Setting {} has ambiguous values: {}",
                    self.setting,
                    values.join(", ")
                )
            }
        }
    }
}

/// Configuration namespace of one resolution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cfg {
    entries: BTreeMap<String, CfgEntry>,
    conflicts: Vec<CfgConflict>,
    warnings: Vec<String>,
}

impl Cfg {
    pub fn get(&self, name: &str) -> Option<&CfgEntry> {
        self.entries.get(name)
    }

    /// Effective value of a setting
    pub fn value(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(CfgEntry::value)
    }

    /// Entries in setting name order
    pub fn entries(&self) -> impl Iterator<Item = &CfgEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Setting name -> effective value
    pub fn values(&self) -> BTreeMap<String, String> {
        self.entries
            .values()
            .map(|e| (e.name.clone(), e.value.clone()))
            .collect()
    }

    pub fn conflicts(&self) -> &[CfgConflict] {
        &self.conflicts
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    /// Every conflict, one per line; empty when there are none
    pub fn error_text(&self) -> String {
        if self.conflicts.is_empty() {
            return String::new();
        }

        let mut text = String::from("Syscfg conflicts:");
        for conflict in &self.conflicts {
            text.push_str("\n    ");
            text.push_str(&conflict.to_string());
        }
        text
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn warning_text(&self) -> String {
        self.warnings.join("\n")
    }

    /// Entries grouped by the package that introduced them.
    ///
    /// Packages and the settings within each group are name sorted.
    pub fn entries_by_package(&self) -> BTreeMap<&str, Vec<&CfgEntry>> {
        let mut groups: BTreeMap<&str, Vec<&CfgEntry>> = BTreeMap::new();
        for entry in self.entries.values() {
            groups.entry(entry.origin()).or_default().push(entry);
        }
        groups
    }
}

/// Builds a [`Cfg`] from a resolution
pub struct CfgMerger<'a> {
    resolution: &'a Resolution,
    overrides: Vec<(String, BTreeMap<String, String>)>,
}

impl<'a> CfgMerger<'a> {
    pub fn new(resolution: &'a Resolution) -> Self {
        Self {
            resolution,
            overrides: Vec::new(),
        }
    }

    /// Apply `values` on top of every package contribution.
    ///
    /// Later override sets take precedence over earlier ones.
    pub fn with_overrides(
        mut self,
        source: impl Into<String>,
        values: BTreeMap<String, String>,
    ) -> Self {
        self.overrides.push((source.into(), values));
        self
    }

    pub fn merge(&self) -> Cfg {
        let mut state = MergeState::default();

        for rpkg in self.resolution.packages() {
            for (name, def) in rpkg.package().syscfg_defs() {
                state.define(name, CfgPoint::new(rpkg.name(), &def.value), &def.description);
            }
        }

        // Stable sort keeps name order within a priority.
        let mut contributors: Vec<_> = self
            .resolution
            .packages()
            .map(|rpkg| rpkg.package())
            .filter(|pkg| !pkg.syscfg_vals().is_empty())
            .collect();
        contributors.sort_by_key(|pkg| pkg.package_type().priority());

        for pkg in contributors {
            let priority = u16::from(pkg.package_type().priority());
            for (name, value) in pkg.syscfg_vals() {
                state.set(name, CfgPoint::new(pkg.name(), value), priority);
            }
        }

        for (offset, (source, values)) in (0u16..).zip(&self.overrides) {
            for (name, value) in values {
                state.set(name, CfgPoint::new(source, value), OVERRIDE_PRIORITY + offset);
            }
        }

        let cfg = state.finish();
        tracing::debug!(
            "Merged syscfg for {}: {} settings, {} conflicts",
            self.resolution.target(),
            cfg.len(),
            cfg.conflicts.len()
        );
        cfg
    }
}

#[derive(Default)]
struct PendingEntry {
    description: String,
    history: Vec<CfgPoint>,
    definers: Vec<CfgPoint>,
    overriders: Vec<(u16, CfgPoint)>,
}

#[derive(Default)]
struct MergeState {
    pending: BTreeMap<String, PendingEntry>,
    warnings: Vec<String>,
}

impl MergeState {
    fn define(&mut self, name: &str, point: CfgPoint, description: &str) {
        let entry = self.pending.entry(name.to_string()).or_default();
        if !description.is_empty() {
            entry.description = description.to_string();
        }
        entry.history.push(point.clone());
        entry.definers.push(point);
    }

    fn set(&mut self, name: &str, point: CfgPoint, priority: u16) {
        let entry = match self.pending.entry(name.to_string()) {
            Entry::Occupied(occupied) => occupied.into_mut(),
            Entry::Vacant(vacant) => {
                self.warnings.push(format!(
                    "Setting {} set by {} is not defined by any package",
                    name, point.source
                ));
                vacant.insert(PendingEntry::default())
            }
        };
        entry.history.push(point.clone());
        entry.overriders.push((priority, point));
    }

    fn finish(self) -> Cfg {
        let mut entries = BTreeMap::new();
        let mut conflicts = Vec::new();

        for (name, pending) in self.pending {
            if pending.definers.len() > 1 {
                conflicts.push(CfgConflict {
                    setting: name.clone(),
                    kind: ConflictKind::Redefined,
                    points: pending.definers,
                });
            }

            if let Some(top) = pending.overriders.iter().map(|(p, _)| *p).max() {
                let points: Vec<CfgPoint> = pending
                    .overriders
                    .into_iter()
                    .filter(|(p, _)| *p == top)
                    .map(|(_, point)| point)
                    .collect();
                let distinct: BTreeSet<&str> = points.iter().map(|p| p.value.as_str()).collect();
                if distinct.len() > 1 {
                    conflicts.push(CfgConflict {
                        setting: name.clone(),
                        kind: ConflictKind::Ambiguous,
                        points,
                    });
                }
            }

            let value = pending
                .history
                .last()
                .map(|p| p.value.clone())
                .unwrap_or_default();
            entries.insert(
                name.clone(),
                CfgEntry {
                    name,
                    value,
                    description: pending.description,
                    history: pending.history,
                },
            );
        }

        Cfg {
            entries,
            conflicts,
            warnings: self.warnings,
        }
    }
}

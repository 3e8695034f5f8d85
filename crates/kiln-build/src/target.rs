//! Build target front end
//!
//! A [`TargetBuilder`] owns one package store snapshot and one target. Each
//! query resolves the target afresh; graph, configuration and code
//! generation only ever see a resolution that succeeded.

use crate::depgraph::DepGraph;
use crate::error::{BuildError, BuildResult};
use crate::sysinit;
use kiln_config::Config;
use kiln_package::hash::HashIgnore;
use kiln_package::{Dependency, Package, PackageStore, Resolution, Resolver, Variant};
use kiln_syscfg::{cfg_text, kv_to_str, Cfg, CfgMerger};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Target variables that name packages the target is built from
const TARGET_APP_VAR: &str = "app";
const TARGET_BSP_VAR: &str = "bsp";
const TARGET_LOADER_VAR: &str = "loader";

/// Flag lists shown by the target report
const SHOWN_FLAGS: &[&str] = &["cflags", "lflags", "aflags"];

/// Build flags gathered from every resolved package
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildFlags {
    flags: BTreeMap<String, Vec<String>>,
}

impl BuildFlags {
    /// Flags of one kind (`cflags`, `lflags`, ...) in dependency order
    pub fn get(&self, key: &str) -> &[String] {
        self.flags.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn cflags(&self) -> &[String] {
        self.get("cflags")
    }

    pub fn lflags(&self) -> &[String] {
        self.get("lflags")
    }

    pub fn aflags(&self) -> &[String] {
        self.get("aflags")
    }

    /// Flag kinds present, name sorted
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.flags.keys().map(String::as_str)
    }

    fn extend(&mut self, key: &str, flags: &[String]) {
        let list = self.flags.entry(key.to_string()).or_default();
        for flag in flags {
            if !list.contains(flag) {
                list.push(flag.clone());
            }
        }
    }
}

/// Resolves one target and runs the stages that depend on it
pub struct TargetBuilder {
    store: PackageStore,
    target: Arc<Package>,
    generated_dir: PathBuf,
    hash_ignore: HashIgnore,
}

impl TargetBuilder {
    /// Builder for `target_name` in `store`.
    ///
    /// The `app`, `bsp` and `loader` target variables become dependencies of
    /// the target. With a loader, the app is only part of the app variant and
    /// the loader only of the loader variant.
    pub fn new(store: PackageStore, target_name: &str) -> BuildResult<Self> {
        let found = store
            .get(target_name)
            .ok_or_else(|| BuildError::target_not_found(target_name))?;
        let target = Arc::new(with_target_deps(found));

        Ok(Self {
            generated_dir: target.base_path().join("bin").join("generated"),
            store,
            target,
            hash_ignore: HashIgnore::default(),
        })
    }

    /// Discover the project's packages and pick `target_name`
    pub fn from_config(config: &Config, target_name: &str) -> BuildResult<Self> {
        let store = PackageStore::discover(&config.search_root_paths())?;
        let builder = Self::new(store, target_name)?
            .with_generated_dir(config.generated_dir_path())
            .with_hash_ignore(HashIgnore::with_extra(config.hash_ignore().iter().cloned()));
        Ok(builder)
    }

    pub fn with_generated_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.generated_dir = dir.into();
        self
    }

    pub fn with_hash_ignore(mut self, ignore: HashIgnore) -> Self {
        self.hash_ignore = ignore;
        self
    }

    pub fn target(&self) -> &Arc<Package> {
        &self.target
    }

    pub fn target_name(&self) -> &str {
        self.target.name()
    }

    pub fn store(&self) -> &PackageStore {
        &self.store
    }

    pub fn generated_dir(&self) -> &Path {
        &self.generated_dir
    }

    /// Resolve the whole target; with a loader this covers both images
    pub fn resolve(&self) -> BuildResult<Resolution> {
        self.resolve_for(None)
    }

    /// Resolve the target for one build variant
    pub fn resolve_for(&self, variant: Option<Variant>) -> BuildResult<Resolution> {
        let mut resolver = Resolver::new(&self.store);
        if let Some(variant) = variant {
            resolver = resolver.with_variant(variant);
        }

        let res = resolver.resolve(&self.target)?;
        for warning in res.warnings() {
            tracing::warn!("{}", warning);
        }
        Ok(res)
    }

    /// Merged configuration of the resolved target
    pub fn cfg(&self) -> BuildResult<Cfg> {
        let res = self.resolve()?;
        let cfg = CfgMerger::new(&res).merge();
        for warning in cfg.warnings() {
            tracing::warn!("{}", warning);
        }
        Ok(cfg)
    }

    /// Configuration report for the target
    pub fn cfg_text(&self) -> BuildResult<String> {
        Ok(cfg_text(self.target_name(), &self.cfg()?))
    }

    /// Pin every effective setting as a value of the target itself and save
    /// the target's `syscfg.toml`. Its own definitions are kept.
    ///
    /// The store snapshot is not updated; a new builder sees the file.
    /// Refused while the merge has conflicts.
    pub fn write_cfg(&self) -> BuildResult<PathBuf> {
        let cfg = self.cfg()?;
        if cfg.has_conflicts() {
            return Err(BuildError::CfgConflicts {
                target: self.target_name().to_string(),
                text: cfg.error_text(),
            });
        }

        let mut target = self
            .store
            .get(self.target_name())
            .map(|pkg| (**pkg).clone())
            .ok_or_else(|| BuildError::target_not_found(self.target_name()))?;
        target.set_syscfg_vals(cfg.values());
        target.save_syscfg()?;

        let path = target.syscfg_path();
        tracing::debug!("Recorded {} settings in {}", cfg.len(), path.display());
        Ok(path)
    }

    /// Dependencies graph, optionally limited to `filter`.
    ///
    /// Returns the graph and the requested names the target does not include.
    pub fn dep_graph<S: AsRef<str>>(&self, filter: &[S]) -> BuildResult<(DepGraph, Vec<String>)> {
        let res = self.resolve()?;
        Ok(self.filtered(DepGraph::reverse(&res), filter))
    }

    /// Dependents graph, optionally limited to `filter`
    pub fn revdep_graph<S: AsRef<str>>(
        &self,
        filter: &[S],
    ) -> BuildResult<(DepGraph, Vec<String>)> {
        let res = self.resolve()?;
        Ok(self.filtered(DepGraph::forward(&res), filter))
    }

    fn filtered<S: AsRef<str>>(&self, graph: DepGraph, filter: &[S]) -> (DepGraph, Vec<String>) {
        if filter.is_empty() {
            return (graph, Vec::new());
        }

        let (graph, missing) = graph.filter(filter);
        for name in &missing {
            tracing::warn!(
                "Package \"{}\" not included in target \"{}\"",
                name,
                self.target_name()
            );
        }
        (graph, missing)
    }

    /// Generate and write the init source for `variant`.
    ///
    /// Returns the file path and whether it was rewritten.
    pub fn write_sysinit(&self, variant: Variant) -> BuildResult<(PathBuf, bool)> {
        let res = self.resolve_for(Some(variant))?;
        let contents = sysinit::generate(&res, variant)?;
        let path = sysinit::sysinit_path(&self.generated_dir, self.target_name(), variant);
        let changed = sysinit::ensure_written(&contents, &path)?;
        Ok((path, changed))
    }

    /// Every package flag list, packages in dependency order, duplicates
    /// dropped
    pub fn build_flags(&self) -> BuildResult<BuildFlags> {
        let res = self.resolve()?;
        let mut flags = BuildFlags::default();
        for rpkg in res.ordered() {
            for (key, list) in rpkg.package().flags() {
                flags.extend(key, list);
            }
        }
        Ok(flags)
    }

    /// Content hashes of every resolved package, keyed by name
    pub fn package_hashes(&self) -> BuildResult<BTreeMap<String, String>> {
        let res = self.resolve()?;
        res.packages()
            .map(|rpkg| -> BuildResult<(String, String)> {
                let hash = rpkg.package().hash_with(&self.hash_ignore)?;
                Ok((rpkg.name().to_string(), hash))
            })
            .collect()
    }

    /// Target summary: the name, then sorted `key=value` lines
    pub fn show_text(&self) -> String {
        show_text(&self.target)
    }
}

/// Summary of a target package without resolving it
pub fn show_text(target: &Package) -> String {
    let mut pairs: BTreeMap<String, String> = target.target_vars().clone();
    pairs.insert("syscfg".to_string(), kv_to_str(target.syscfg_vals()));
    for key in SHOWN_FLAGS {
        let mut flags = target.flag_list(key).to_vec();
        flags.sort();
        pairs.insert(key.to_string(), flags.join(" "));
    }

    let mut out = format!("{}\n", target.name());
    for (key, value) in pairs.iter().filter(|(_, v)| !v.is_empty()) {
        let _ = writeln!(out, "    {}={}", key, value);
    }
    out
}

fn with_target_deps(target: &Package) -> Package {
    let mut root = target.clone();
    let vars = target.target_vars();
    let split = vars.contains_key(TARGET_LOADER_VAR);

    if let Some(bsp) = vars.get(TARGET_BSP_VAR) {
        root.add_dep(Dependency::new(bsp));
    }
    if let Some(app) = vars.get(TARGET_APP_VAR) {
        if split {
            root.add_dep(Dependency::for_variant(app, Variant::App));
        } else {
            root.add_dep(Dependency::new(app));
        }
    }
    if let Some(loader) = vars.get(TARGET_LOADER_VAR) {
        root.add_dep(Dependency::for_variant(loader, Variant::Loader));
    }
    root
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_package::PackageType;
    use pretty_assertions::assert_eq;

    fn target(vars: &[(&str, &str)]) -> Package {
        let mut pkg = Package::new("targets/blinky", "/proj/targets/blinky");
        pkg.set_type(PackageType::Target);
        for (k, v) in vars {
            pkg.set_target_var(*k, *v);
        }
        pkg
    }

    #[test]
    fn test_target_vars_become_deps() {
        let root = with_target_deps(&target(&[("app", "apps/blinky"), ("bsp", "hw/bsp/native")]));
        let deps: Vec<String> = root.deps().iter().map(|d| d.to_string()).collect();
        assert_eq!(deps, vec!["hw/bsp/native", "apps/blinky"]);
    }

    #[test]
    fn test_split_target_deps_are_variant_qualified() {
        let root = with_target_deps(&target(&[
            ("app", "apps/blinky"),
            ("loader", "apps/boot"),
        ]));
        let deps: Vec<String> = root.deps().iter().map(|d| d.to_string()).collect();
        assert_eq!(deps, vec!["apps/blinky:app", "apps/boot:loader"]);
    }

    #[test]
    fn test_show_text() {
        let mut pkg = target(&[("app", "apps/blinky"), ("build_profile", "debug")]);
        pkg.set_flags("cflags", vec!["-DB".to_string(), "-DA".to_string()]);
        pkg.add_syscfg_val("LOG_LEVEL", "2");
        pkg.add_syscfg_val("CONSOLE", "0");

        assert_eq!(
            show_text(&pkg),
            "targets/blinky\n\
             \x20   app=apps/blinky\n\
             \x20   build_profile=debug\n\
             \x20   cflags=-DA -DB\n\
             \x20   syscfg=CONSOLE=0:LOG_LEVEL=2\n"
        );
    }

    #[test]
    fn test_build_flags_dedup_in_order() {
        let mut flags = BuildFlags::default();
        flags.extend("cflags", &["-Os".to_string(), "-g".to_string()]);
        flags.extend("cflags", &["-g".to_string(), "-Wall".to_string()]);
        assert_eq!(flags.cflags(), ["-Os", "-g", "-Wall"]);
        assert!(flags.lflags().is_empty());
        assert_eq!(flags.keys().collect::<Vec<_>>(), vec!["cflags"]);
    }
}

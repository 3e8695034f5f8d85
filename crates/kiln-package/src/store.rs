//! Package discovery and the immutable package store

use crate::descriptor::PACKAGE_FILE_NAME;
use crate::package::Package;
use crate::{PackageError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// Directory names that are package-internal structure, never nested packages
pub const RESERVED_DIR_NAMES: &[&str] = &["src", "include", "bin"];

/// Whether discovery should skip a directory with this name
pub fn is_skipped_dir(name: &str) -> bool {
    name.starts_with('.') || RESERVED_DIR_NAMES.contains(&name)
}

/// Snapshot of every package visible to a build.
///
/// Built once per top-level operation and never mutated afterwards;
/// concurrent resolutions may share one store by reference.
#[derive(Debug, Clone, Default)]
pub struct PackageStore {
    packages: BTreeMap<String, Arc<Package>>,
}

impl PackageStore {
    /// Discover packages under each search root
    pub fn discover<P: AsRef<Path>>(search_roots: &[P]) -> Result<Self> {
        let mut store = Self::default();

        for root in search_roots {
            let root = root.as_ref();
            if !root.is_dir() {
                tracing::debug!("Search root {} does not exist; skipping", root.display());
                continue;
            }

            for dir in find_package_dirs(root)? {
                store.insert(Package::load(&dir)?)?;
            }
        }

        tracing::debug!("Discovered {} packages", store.len());
        Ok(store)
    }

    /// Build a store from packages already in memory
    pub fn from_packages<I: IntoIterator<Item = Package>>(packages: I) -> Result<Self> {
        let mut store = Self::default();
        for pkg in packages {
            store.insert(pkg)?;
        }
        Ok(store)
    }

    fn insert(&mut self, pkg: Package) -> Result<()> {
        if let Some(existing) = self.packages.get(pkg.name()) {
            return Err(PackageError::DuplicatePackage {
                name: pkg.name().to_string(),
                first: existing.base_path().to_path_buf(),
                second: pkg.base_path().to_path_buf(),
            });
        }

        self.packages.insert(pkg.name().to_string(), Arc::new(pkg));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Package>> {
        self.packages.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    /// All packages in name order
    pub fn packages(&self) -> impl Iterator<Item = &Arc<Package>> {
        self.packages.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }

    /// Packages exporting `api`, in name order
    pub fn exporters(&self, api: &str) -> Vec<&Arc<Package>> {
        self.packages
            .values()
            .filter(|pkg| pkg.apis().iter().any(|a| a == api))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

/// Find package directories below `root` in sorted order.
///
/// A directory holding a descriptor is a package boundary: its children are
/// not searched for further packages.
pub fn find_package_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();

    let mut walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.file_type().is_dir() && !is_skipped_dir(&entry.file_name().to_string_lossy())
        });

    while let Some(entry) = walker.next() {
        let entry = entry.map_err(|error| PackageError::WalkError {
            path: root.to_path_buf(),
            error,
        })?;

        if entry.path().join(PACKAGE_FILE_NAME).is_file() {
            dirs.push(entry.path().to_path_buf());
            walker.skip_current_dir();
        }
    }

    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_store_is_shareable() {
        assert_send_sync::<Package>();
        assert_send_sync::<PackageStore>();
        assert_send_sync::<crate::Resolution>();
    }

    fn pkg(name: &str, apis: &[&str]) -> Package {
        let mut pkg = Package::new(name, format!("/proj/{}", name));
        for api in apis {
            pkg.add_api(*api);
        }
        pkg
    }

    #[test]
    fn test_from_packages_name_order() {
        let store = PackageStore::from_packages(vec![pkg("b", &[]), pkg("a", &[])]).unwrap();
        let names: Vec<&str> = store.names().collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut other = pkg("a", &[]);
        other.set_base_path("/elsewhere/a");
        let err = PackageStore::from_packages(vec![pkg("a", &[]), other]).unwrap_err();
        assert!(matches!(err, PackageError::DuplicatePackage { ref name, .. } if name == "a"));
    }

    #[test]
    fn test_exporters() {
        let store = PackageStore::from_packages(vec![
            pkg("log/full", &["log"]),
            pkg("log/stub", &["log"]),
            pkg("os", &["os"]),
        ])
        .unwrap();

        let exporters: Vec<&str> = store.exporters("log").iter().map(|p| p.name()).collect();
        assert_eq!(exporters, vec!["log/full", "log/stub"]);
        assert!(store.exporters("radio").is_empty());
    }

    #[rstest]
    #[case("src", true)]
    #[case("include", true)]
    #[case("bin", true)]
    #[case(".git", true)]
    #[case("drivers", false)]
    fn test_is_skipped_dir(#[case] name: &str, #[case] skipped: bool) {
        assert_eq!(is_skipped_dir(name), skipped);
    }
}

//! Direct dependency adjacency of a resolution
//!
//! Graphs are derived on demand and never persisted. Transitive queries
//! walk the adjacency.

use kiln_package::Resolution;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Package -> packages that depend on it
    Dependents,
    /// Package -> packages it depends on
    Dependencies,
}

impl Direction {
    fn header(self) -> &'static str {
        match self {
            Direction::Dependents => "Reverse dependency graph (dependee <-- [dependers]):",
            Direction::Dependencies => "Dependency graph (depender --> [dependees]):",
        }
    }
}

/// One-hop adjacency keyed by package name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepGraph {
    direction: Direction,
    edges: BTreeMap<String, Vec<String>>,
}

impl DepGraph {
    /// Each resolved package mapped to its direct dependents
    pub fn forward(res: &Resolution) -> Self {
        let mut edges: BTreeMap<String, BTreeSet<String>> = res
            .packages()
            .map(|rpkg| (rpkg.name().to_string(), BTreeSet::new()))
            .collect();

        for rpkg in res.packages() {
            for dep in rpkg.deps() {
                if let Some(dependents) = edges.get_mut(dep) {
                    dependents.insert(rpkg.name().to_string());
                }
            }
        }

        Self::from_sets(Direction::Dependents, edges)
    }

    /// Each resolved package mapped to its direct dependencies
    pub fn reverse(res: &Resolution) -> Self {
        let edges = res
            .packages()
            .map(|rpkg| (rpkg.name().to_string(), rpkg.deps().clone()))
            .collect();

        Self::from_sets(Direction::Dependencies, edges)
    }

    fn from_sets(direction: Direction, edges: BTreeMap<String, BTreeSet<String>>) -> Self {
        Self {
            direction,
            edges: edges
                .into_iter()
                .map(|(name, set)| (name, set.into_iter().collect()))
                .collect(),
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Direct neighbors of `name`, name sorted
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.edges.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.edges.contains_key(name)
    }

    /// Keys with their neighbors, in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.edges
            .iter()
            .map(|(name, neighbors)| (name.as_str(), neighbors.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Every package reachable from `name` by following edges, excluding
    /// `name` itself
    pub fn reachable(&self, name: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<&str> = vec![name];

        while let Some(current) = stack.pop() {
            for next in self.get(current).unwrap_or_default() {
                if next != name && seen.insert(next.clone()) {
                    stack.push(next.as_str());
                }
            }
        }

        seen
    }

    /// Restrict the graph to the named keys.
    ///
    /// Neighbor lists are kept whole. Requested names that are not keys come
    /// back in request order, without duplicates.
    pub fn filter<S: AsRef<str>>(&self, names: &[S]) -> (DepGraph, Vec<String>) {
        let mut edges = BTreeMap::new();
        let mut missing: Vec<String> = Vec::new();

        for name in names {
            let name = name.as_ref();
            match self.edges.get(name) {
                Some(neighbors) => {
                    edges.insert(name.to_string(), neighbors.clone());
                }
                None => {
                    if !missing.iter().any(|m| m == name) {
                        missing.push(name.to_string());
                    }
                }
            }
        }

        let graph = DepGraph {
            direction: self.direction,
            edges,
        };
        (graph, missing)
    }

    /// One line per package after a header naming the direction; empty
    /// graphs render as the empty string
    pub fn render(&self) -> String {
        if self.edges.is_empty() {
            return String::new();
        }

        let mut out = String::from(self.direction.header());
        for (name, neighbors) in &self.edges {
            let _ = write!(out, "\n    {} -> [{}]", name, neighbors.join(", "));
        }
        out.push('\n');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_package::{Dependency, Package, PackageStore, Resolver};
    use pretty_assertions::assert_eq;

    /// t -> app, bsp; app -> os, log; bsp -> os
    fn resolution() -> Resolution {
        let mut packages = Vec::new();
        for (name, deps) in [
            ("t", &["app", "bsp"][..]),
            ("app", &["os", "log"][..]),
            ("bsp", &["os"][..]),
            ("os", &[][..]),
            ("log", &[][..]),
        ] {
            let mut pkg = Package::new(name, format!("/proj/{}", name));
            for dep in deps {
                pkg.add_dep(Dependency::new(*dep));
            }
            packages.push(pkg);
        }
        let store = PackageStore::from_packages(packages).unwrap();
        Resolver::new(&store).resolve(store.get("t").unwrap()).unwrap()
    }

    #[test]
    fn test_reverse_lists_dependencies() {
        let graph = DepGraph::reverse(&resolution());
        assert_eq!(graph.direction(), Direction::Dependencies);
        assert_eq!(graph.get("app").unwrap(), ["log", "os"]);
        assert_eq!(graph.get("t").unwrap(), ["app", "bsp"]);
        assert!(graph.get("os").unwrap().is_empty());
        assert_eq!(graph.len(), 5);
    }

    #[test]
    fn test_forward_lists_dependents() {
        let graph = DepGraph::forward(&resolution());
        assert_eq!(graph.direction(), Direction::Dependents);
        assert_eq!(graph.get("os").unwrap(), ["app", "bsp"]);
        assert_eq!(graph.get("app").unwrap(), ["t"]);
        assert!(graph.get("t").unwrap().is_empty());
    }

    #[test]
    fn test_directions_are_inverse() {
        let res = resolution();
        let forward = DepGraph::forward(&res);
        let reverse = DepGraph::reverse(&res);

        for (name, deps) in reverse.iter() {
            for dep in deps {
                assert!(forward.get(dep).unwrap().iter().any(|d| d == name));
            }
        }
    }

    #[test]
    fn test_reachable() {
        let res = resolution();
        let deps: Vec<String> = DepGraph::reverse(&res).reachable("t").into_iter().collect();
        assert_eq!(deps, vec!["app", "bsp", "log", "os"]);

        let users: Vec<String> = DepGraph::forward(&res).reachable("os").into_iter().collect();
        assert_eq!(users, vec!["app", "bsp", "t"]);
    }

    #[test]
    fn test_filter_reports_missing_in_request_order() {
        let graph = DepGraph::reverse(&resolution());
        let (filtered, missing) = graph.filter(&["zeta", "app", "alpha", "zeta"]);

        assert_eq!(missing, vec!["zeta", "alpha"]);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered.get("app").unwrap(), ["log", "os"]);
        assert!(!filtered.contains("zeta"));
    }

    #[test]
    fn test_render() {
        let graph = DepGraph::reverse(&resolution());
        insta::assert_snapshot!(graph.render(), @r###"
        Dependency graph (depender --> [dependees]):
            app -> [log, os]
            bsp -> [os]
            log -> []
            os -> []
            t -> [app, bsp]
        "###);
    }

    #[test]
    fn test_render_empty() {
        let (empty, _) = DepGraph::forward(&resolution()).filter::<&str>(&[]);
        assert_eq!(empty.render(), "");
    }
}

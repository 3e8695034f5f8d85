//! Deterministic dependency-first ordering of resolved packages

use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum BuildOrderError {
    #[error("Circular dependency detected between: {0}")]
    CircularDependency(String),
}

pub type BuildOrderResult<T> = Result<T, BuildOrderError>;

/// Topological sort with a lexicographic tie-break.
///
/// Among packages whose dependencies are all placed, the smallest name goes
/// next, so equal inputs always yield the same order.
pub struct BuildOrderComputer {
    /// Dependency graph: package -> dependencies
    graph: BTreeMap<String, BTreeSet<String>>,
}

impl BuildOrderComputer {
    /// Create from a raw dependency graph.
    ///
    /// Edges to packages outside the graph are ignored.
    pub fn from_graph(graph: BTreeMap<String, BTreeSet<String>>) -> Self {
        let known: BTreeSet<String> = graph.keys().cloned().collect();
        let graph = graph
            .into_iter()
            .map(|(name, deps)| {
                let deps = deps
                    .into_iter()
                    .filter(|d| known.contains(d) && *d != name)
                    .collect();
                (name, deps)
            })
            .collect();
        Self { graph }
    }

    /// Dependencies-first order; errors on a cycle
    pub fn compute_build_order(&self) -> BuildOrderResult<Vec<String>> {
        let (order, cyclic) = self.compute_build_order_lenient();
        if cyclic.is_empty() {
            Ok(order)
        } else {
            Err(BuildOrderError::CircularDependency(cyclic.join(", ")))
        }
    }

    /// Dependencies-first order that never fails.
    ///
    /// Packages caught in (or behind) a cycle are appended in name order and
    /// also returned separately so the caller can report them.
    pub fn compute_build_order_lenient(&self) -> (Vec<String>, Vec<String>) {
        let mut remaining: BTreeMap<&str, usize> = self
            .graph
            .iter()
            .map(|(name, deps)| (name.as_str(), deps.len()))
            .collect();
        let dependents = self.dependents();

        let mut ready: BTreeSet<&str> = remaining
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut order = Vec::with_capacity(self.graph.len());

        while let Some(next) = ready.pop_first() {
            remaining.remove(next);
            order.push(next.to_string());

            for dependent in dependents.get(next).into_iter().flatten() {
                if let Some(degree) = remaining.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(*dependent);
                    }
                }
            }
        }

        let cyclic: Vec<String> = remaining.keys().map(|s| s.to_string()).collect();
        order.extend(cyclic.iter().cloned());
        (order, cyclic)
    }

    fn dependents(&self) -> BTreeMap<&str, Vec<&str>> {
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (name, deps) in &self.graph {
            for dep in deps {
                dependents.entry(dep.as_str()).or_default().push(name.as_str());
            }
        }
        dependents
    }

    /// Get the dependency graph
    pub fn graph(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.graph
    }

    /// Count of packages in graph
    pub fn package_count(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn computer(packages: &[(&str, &[&str])]) -> BuildOrderComputer {
        BuildOrderComputer::from_graph(
            packages
                .iter()
                .map(|(name, deps)| {
                    (
                        name.to_string(),
                        deps.iter().map(|d| d.to_string()).collect(),
                    )
                })
                .collect(),
        )
    }

    #[test]
    fn test_empty_graph() {
        let computer = computer(&[]);
        assert!(computer.is_empty());
        assert!(computer.compute_build_order().unwrap().is_empty());
    }

    #[test]
    fn test_linear() {
        // pkg1 -> pkg2 -> pkg3
        let computer = computer(&[("pkg1", &["pkg2"]), ("pkg2", &["pkg3"]), ("pkg3", &[])]);
        assert_eq!(
            computer.compute_build_order().unwrap(),
            vec!["pkg3", "pkg2", "pkg1"]
        );
    }

    #[test]
    fn test_diamond_is_deterministic() {
        // root -> left -> bottom
        //      -> right -> bottom
        let computer = computer(&[
            ("root", &["left", "right"]),
            ("left", &["bottom"]),
            ("right", &["bottom"]),
            ("bottom", &[]),
        ]);
        assert_eq!(
            computer.compute_build_order().unwrap(),
            vec!["bottom", "left", "right", "root"]
        );
    }

    #[test]
    fn test_name_tiebreak_prefers_smallest_ready() {
        // "a" depends on "z"; "m" is independent and placed before "z"
        let computer = computer(&[("a", &["z"]), ("m", &[]), ("z", &[])]);
        assert_eq!(computer.compute_build_order().unwrap(), vec!["m", "z", "a"]);
    }

    #[test]
    fn test_outside_edges_ignored() {
        let computer = computer(&[("a", &["not-here", "a"])]);
        assert_eq!(computer.compute_build_order().unwrap(), vec!["a"]);
    }

    #[test]
    fn test_cycle_detected() {
        let computer = computer(&[("a", &["b"]), ("b", &["a"]), ("c", &[])]);
        assert_eq!(
            computer.compute_build_order(),
            Err(BuildOrderError::CircularDependency("a, b".to_string()))
        );

        let (order, cyclic) = computer.compute_build_order_lenient();
        assert_eq!(order, vec!["c", "a", "b"]);
        assert_eq!(cyclic, vec!["a", "b"]);
    }
}

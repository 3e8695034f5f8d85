//! Dependency and capability resolution
//!
//! Starting from a build target, the resolver computes the closed set of
//! packages the target needs: every declared dependency, plus the exporter of
//! every required API. Problems are accumulated over the whole closure and
//! reported together.

use crate::build_order::BuildOrderComputer;
use crate::package::{Package, Variant};
use crate::store::PackageStore;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

mod problem;

pub use problem::{ResolveFailure, ResolveProblem};

/// A package inside a resolution, with the context that pulled it in
#[derive(Debug, Clone)]
pub struct ResolvedPackage {
    package: Arc<Package>,
    parent: Option<String>,
    deps: BTreeSet<String>,
    api_bindings: BTreeMap<String, String>,
}

impl ResolvedPackage {
    fn new(package: Arc<Package>, parent: Option<String>) -> Self {
        Self {
            package,
            parent,
            deps: BTreeSet::new(),
            api_bindings: BTreeMap::new(),
        }
    }

    pub fn package(&self) -> &Arc<Package> {
        &self.package
    }

    pub fn name(&self) -> &str {
        self.package.name()
    }

    /// Package that first pulled this one in; `None` for the target
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Direct dependencies inside the resolution, including API providers
    pub fn deps(&self) -> &BTreeSet<String> {
        &self.deps
    }

    /// Required API -> package whose export satisfies it
    pub fn api_bindings(&self) -> &BTreeMap<String, String> {
        &self.api_bindings
    }
}

/// The closed, validated package set for one build target
#[derive(Debug, Clone)]
pub struct Resolution {
    target: String,
    variant: Option<Variant>,
    packages: BTreeMap<String, ResolvedPackage>,
    order: Vec<String>,
    warnings: Vec<String>,
}

impl Resolution {
    /// Name of the build target this resolution was computed for
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn target_package(&self) -> Option<&Arc<Package>> {
        self.packages.get(&self.target).map(ResolvedPackage::package)
    }

    pub fn variant(&self) -> Option<Variant> {
        self.variant
    }

    pub fn get(&self, name: &str) -> Option<&ResolvedPackage> {
        self.packages.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    /// Resolved packages in name order
    pub fn packages(&self) -> impl Iterator<Item = &ResolvedPackage> {
        self.packages.values()
    }

    /// Resolved packages with dependencies before dependents, ties broken
    /// by name
    pub fn ordered(&self) -> impl Iterator<Item = &ResolvedPackage> {
        self.order.iter().filter_map(|name| self.packages.get(name))
    }

    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Advisory text, one warning per line
    pub fn warning_text(&self) -> String {
        self.warnings.join("\n")
    }
}

/// Resolves build targets against a package store
pub struct Resolver<'a> {
    store: &'a PackageStore,
    variant: Option<Variant>,
}

impl<'a> Resolver<'a> {
    pub fn new(store: &'a PackageStore) -> Self {
        Self {
            store,
            variant: None,
        }
    }

    /// Follow dependencies qualified for this build variant
    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variant = Some(variant);
        self
    }

    /// Resolve `target` into its closed package set.
    ///
    /// On failure every problem found is returned together with the
    /// best-effort closure.
    pub fn resolve(&self, target: &Arc<Package>) -> Result<Resolution, ResolveFailure> {
        let mut state = ResolveState::new(self.variant);
        state.include(Arc::clone(target), None);

        loop {
            state.expand_deps(self.store);
            if !state.pull_api_providers(self.store) {
                break;
            }
        }

        state.bind_apis(self.store);
        let ResolveOutcome {
            resolution,
            mut problems,
        } = state.finish(target.name());
        if problems.is_empty() {
            tracing::debug!(
                "Resolved target {}: {} packages",
                resolution.target(),
                resolution.len()
            );
            Ok(resolution)
        } else {
            problems.sort();
            problems.dedup();
            Err(ResolveFailure {
                problems,
                partial: resolution,
            })
        }
    }
}

struct ResolveOutcome {
    resolution: Resolution,
    problems: Vec<ResolveProblem>,
}

struct ResolveState {
    variant: Option<Variant>,
    included: BTreeMap<String, ResolvedPackage>,
    queue: VecDeque<Arc<Package>>,
    problems: Vec<ResolveProblem>,
}

impl ResolveState {
    fn new(variant: Option<Variant>) -> Self {
        Self {
            variant,
            included: BTreeMap::new(),
            queue: VecDeque::new(),
            problems: Vec::new(),
        }
    }

    fn include(&mut self, package: Arc<Package>, parent: Option<String>) {
        if self.included.contains_key(package.name()) {
            return;
        }

        tracing::debug!(
            "Including package {} (pulled in by {})",
            package.name(),
            parent.as_deref().unwrap_or("<root>")
        );
        self.included.insert(
            package.name().to_string(),
            ResolvedPackage::new(Arc::clone(&package), parent),
        );
        self.queue.push_back(package);
    }

    fn add_edge(&mut self, from: &str, to: &str) {
        if from == to {
            return;
        }
        if let Some(rpkg) = self.included.get_mut(from) {
            rpkg.deps.insert(to.to_string());
        }
    }

    /// Work through the queue, following every applicable dependency
    fn expand_deps(&mut self, store: &PackageStore) {
        while let Some(pkg) = self.queue.pop_front() {
            for dep in pkg.deps() {
                if !dep.applies_to(self.variant) {
                    continue;
                }

                if !self.included.contains_key(&dep.name) {
                    match store.get(&dep.name) {
                        Some(found) => self.include(Arc::clone(found), Some(pkg.name().to_string())),
                        None => {
                            self.problems.push(ResolveProblem::UnknownPackage {
                                requester: pkg.name().to_string(),
                                dependency: dep.name.clone(),
                            });
                            continue;
                        }
                    }
                }

                self.add_edge(pkg.name(), &dep.name);
            }
        }
    }

    fn exporters_in_set(&self, api: &str) -> Vec<String> {
        self.included
            .values()
            .filter(|rpkg| rpkg.package.apis().iter().any(|a| a == api))
            .map(|rpkg| rpkg.name().to_string())
            .collect()
    }

    fn requirements(&self) -> Vec<(String, String)> {
        self.included
            .values()
            .flat_map(|rpkg| {
                rpkg.package
                    .req_apis()
                    .iter()
                    .map(move |api| (rpkg.name().to_string(), api.clone()))
            })
            .collect()
    }

    /// Pull in the sole store exporter of each requirement nothing in the
    /// set satisfies yet. Returns whether anything new was included.
    fn pull_api_providers(&mut self, store: &PackageStore) -> bool {
        let mut pulled = false;

        for (requester, api) in self.requirements() {
            if !self.exporters_in_set(&api).is_empty() {
                continue;
            }

            let exporters = store.exporters(&api);
            if let [only] = exporters.as_slice() {
                tracing::debug!("API {} required by {} pulls in {}", api, requester, only.name());
                self.include(Arc::clone(only), Some(requester));
                pulled = true;
            }
        }

        pulled
    }

    /// Bind every requirement to exactly one exporter in the final set
    fn bind_apis(&mut self, store: &PackageStore) {
        for (requester, api) in self.requirements() {
            let providers = self.exporters_in_set(&api);

            match providers.len() {
                1 => {
                    let provider = providers[0].clone();
                    if let Some(rpkg) = self.included.get_mut(&requester) {
                        rpkg.api_bindings.insert(api.clone(), provider.clone());
                    }
                    self.add_edge(&requester, &provider);
                }
                0 => {
                    let candidates: Vec<String> = store
                        .exporters(&api)
                        .iter()
                        .map(|p| p.name().to_string())
                        .collect();
                    if candidates.len() > 1 {
                        self.problems.push(ResolveProblem::AmbiguousApi {
                            requester,
                            api,
                            providers: candidates,
                        });
                    } else {
                        self.problems
                            .push(ResolveProblem::UnresolvedApi { requester, api });
                    }
                }
                _ => {
                    self.problems.push(ResolveProblem::AmbiguousApi {
                        requester,
                        api,
                        providers,
                    });
                }
            }
        }
    }

    fn warnings(&self, cyclic: &[String]) -> Vec<String> {
        let required: BTreeSet<&str> = self
            .included
            .values()
            .flat_map(|rpkg| rpkg.package.req_apis().iter().map(String::as_str))
            .collect();

        let mut warnings = Vec::new();
        for rpkg in self.included.values() {
            for api in rpkg.package.apis() {
                if !required.contains(api.as_str()) {
                    warnings.push(format!(
                        "API '{}' exported by '{}' is not required by any package",
                        api,
                        rpkg.name()
                    ));
                }
            }
        }

        if !cyclic.is_empty() {
            warnings.push(format!(
                "Dependency cycle among packages: {}",
                cyclic.join(", ")
            ));
        }

        warnings
    }

    fn finish(self, target: &str) -> ResolveOutcome {
        let graph = self
            .included
            .iter()
            .map(|(name, rpkg)| (name.clone(), rpkg.deps.clone()))
            .collect();
        let (order, cyclic) = BuildOrderComputer::from_graph(graph).compute_build_order_lenient();
        let warnings = self.warnings(&cyclic);

        ResolveOutcome {
            resolution: Resolution {
                target: target.to_string(),
                variant: self.variant,
                packages: self.included,
                order,
                warnings,
            },
            problems: self.problems,
        }
    }
}

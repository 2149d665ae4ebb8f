//! Module dependency graph using petgraph::StableDiGraph
//!
//! Edges point from a dependency to the module that depends on it, so
//! incoming neighbours are a module's dependencies and outgoing neighbours its
//! dependents.

use std::collections::{HashMap, VecDeque};

use arbor_model::{DependencyScope, Generation, ModuleData, ModuleId, OrderEntryKind, ProjectState};
use indexmap::IndexSet;
use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use tracing::{debug, trace};

/// One resolved `Module` order entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    /// Module that holds the order entry.
    pub from: ModuleId,
    /// Module the entry resolves to.
    pub to: ModuleId,
    pub scope: DependencyScope,
    pub exported: bool,
    /// Handler answer of the target: may enumerations continue past it.
    pub recursive: bool,
    pub production_on_test: bool,
    /// Position of the entry in `from`'s order entries.
    pub position: usize,
}

/// Dependency graph of one structural generation.
pub struct ModuleGraph {
    inner: StableDiGraph<ModuleId, DependencyEdge>,
    nodes: HashMap<ModuleId, NodeIndex>,
    include_tests: bool,
    generation: Generation,
}

impl std::fmt::Debug for ModuleGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleGraph")
            .field("generation", &self.generation)
            .field("include_tests", &self.include_tests)
            .field("node_count", &self.inner.node_count())
            .field("edge_count", &self.inner.edge_count())
            .finish()
    }
}

impl ModuleGraph {
    /// Build from `Module` entries only. Test-scope edges are dropped unless
    /// `include_tests`; unresolved targets and self-dependencies are skipped.
    /// `recurse_into` is asked once per dependency target.
    pub fn build<F>(state: &ProjectState, include_tests: bool, mut recurse_into: F) -> Self
    where
        F: FnMut(&ModuleData) -> bool,
    {
        let mut inner = StableDiGraph::with_capacity(state.module_count(), 0);
        let mut nodes = HashMap::with_capacity(state.module_count());
        for module in state.modules() {
            nodes.insert(module.id, inner.add_node(module.id));
        }

        let mut recursion: HashMap<ModuleId, bool> = HashMap::new();
        for module in state.modules() {
            for (position, entry) in module.order_entries().iter().enumerate() {
                let OrderEntryKind::Module {
                    name,
                    production_on_test,
                } = &entry.kind
                else {
                    continue;
                };
                if !include_tests && entry.scope == DependencyScope::Test {
                    continue;
                }
                let Some(dependency) = state.find_module(name) else {
                    trace!("Skipping unresolved module entry '{}' of {:?}", name, module.id);
                    continue;
                };
                if dependency.id == module.id {
                    trace!("Skipping self-dependency of {:?}", module.id);
                    continue;
                }
                let (Some(&source), Some(&target)) = (nodes.get(&dependency.id), nodes.get(&module.id)) else {
                    continue;
                };
                let recursive = *recursion
                    .entry(dependency.id)
                    .or_insert_with(|| recurse_into(dependency));
                inner.add_edge(
                    source,
                    target,
                    DependencyEdge {
                        from: module.id,
                        to: dependency.id,
                        scope: entry.scope,
                        exported: entry.exported,
                        recursive,
                        production_on_test: *production_on_test,
                        position,
                    },
                );
            }
        }

        debug!(
            "Built module graph for {} ({} modules, {} edges, tests: {})",
            state.structure_generation(),
            inner.node_count(),
            inner.edge_count(),
            include_tests
        );

        ModuleGraph {
            inner,
            nodes,
            include_tests,
            generation: state.structure_generation(),
        }
    }

    pub fn include_tests(&self) -> bool {
        self.include_tests
    }

    /// Structural generation this graph was built from.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    pub fn contains(&self, module: ModuleId) -> bool {
        self.nodes.contains_key(&module)
    }

    /// Modules in insertion order.
    pub fn modules(&self) -> impl Iterator<Item = ModuleId> + '_ {
        self.inner
            .node_indices()
            .filter_map(move |idx| self.inner.node_weight(idx).copied())
    }

    /// Insertion rank used for deterministic tie-breaks.
    pub(crate) fn rank(&self, idx: NodeIndex) -> usize {
        idx.index()
    }

    pub(crate) fn inner(&self) -> &StableDiGraph<ModuleId, DependencyEdge> {
        &self.inner
    }

    fn edges(&self, module: ModuleId, direction: Direction) -> Vec<&DependencyEdge> {
        let Some(&idx) = self.nodes.get(&module) else {
            return Vec::new();
        };
        let mut edges: Vec<&DependencyEdge> = self.inner.edges_directed(idx, direction).map(|e| e.weight()).collect();
        edges.sort_by_key(|edge| (self.nodes.get(&edge.from).map(|idx| idx.index()), edge.position));
        edges
    }

    /// Edges for the order entries of `module`, in entry order.
    pub fn edges_in(&self, module: ModuleId) -> Vec<&DependencyEdge> {
        self.edges(module, Direction::Incoming)
    }

    /// Edges from modules that depend on `module`.
    pub fn edges_out(&self, module: ModuleId) -> Vec<&DependencyEdge> {
        self.edges(module, Direction::Outgoing)
    }

    /// Direct dependencies of `module`.
    pub fn get_in(&self, module: ModuleId) -> Vec<ModuleId> {
        let targets: IndexSet<ModuleId> = self.edges_in(module).into_iter().map(|e| e.to).collect();
        targets.into_iter().collect()
    }

    /// Direct dependents of `module`.
    pub fn get_out(&self, module: ModuleId) -> Vec<ModuleId> {
        let sources: IndexSet<ModuleId> = self.edges_out(module).into_iter().map(|e| e.from).collect();
        sources.into_iter().collect()
    }

    fn reachable(&self, start: ModuleId, direction: Direction) -> IndexSet<ModuleId> {
        let mut seen = IndexSet::new();
        let Some(&start_idx) = self.nodes.get(&start) else {
            return seen;
        };
        let mut queue = VecDeque::from([start_idx]);
        while let Some(idx) = queue.pop_front() {
            for next in self.inner.neighbors_directed(idx, direction) {
                if let Some(&id) = self.inner.node_weight(next) {
                    if id != start && seen.insert(id) {
                        queue.push_back(next);
                    }
                }
            }
        }
        seen
    }

    /// Everything `module` depends on, directly or not, breadth-first.
    pub fn transitive_dependencies(&self, module: ModuleId) -> IndexSet<ModuleId> {
        self.reachable(module, Direction::Incoming)
    }

    pub fn transitive_dependents(&self, module: ModuleId) -> IndexSet<ModuleId> {
        self.reachable(module, Direction::Outgoing)
    }

    /// Whether `a` depends on `b`, directly or transitively.
    pub fn depends_on(&self, a: ModuleId, b: ModuleId) -> bool {
        self.transitive_dependencies(a).contains(&b)
    }

    /// Strongly connected groups of more than one module, each in insertion
    /// order, ordered by their first module.
    pub fn cycles(&self) -> Vec<Vec<ModuleId>> {
        let mut cycles: Vec<Vec<NodeIndex>> = tarjan_scc(&self.inner)
            .into_iter()
            .filter(|component| component.len() > 1)
            .collect();
        for component in &mut cycles {
            component.sort_by_key(|idx| self.rank(*idx));
        }
        cycles.sort_by_key(|component| component.first().map(|idx| self.rank(*idx)));
        cycles
            .into_iter()
            .map(|component| {
                component
                    .into_iter()
                    .filter_map(|idx| self.inner.node_weight(idx).copied())
                    .collect()
            })
            .collect()
    }
}

//! Dependency-first module ordering
//!
//! Cycles are legal configuration, so ordering never fails. Strongly connected
//! components are condensed first; the condensed DAG is then sorted with
//! Kahn's algorithm, always taking the ready component whose earliest module
//! was inserted first. Modules inside one component keep insertion order.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};

use arbor_model::ModuleId;
use petgraph::algo::tarjan_scc;
use petgraph::stable_graph::NodeIndex;
use petgraph::visit::{EdgeRef, IntoEdgeReferences};

use crate::graph::ModuleGraph;

/// Modules ordered so that each appears after everything it depends on,
/// as far as cycles allow.
pub fn sorted_modules(graph: &ModuleGraph) -> Vec<ModuleId> {
    let inner = graph.inner();
    let mut components: Vec<Vec<NodeIndex>> = tarjan_scc(inner);
    for component in &mut components {
        component.sort_by_key(|idx| graph.rank(*idx));
    }

    let mut component_of: HashMap<NodeIndex, usize> = HashMap::new();
    for (c, component) in components.iter().enumerate() {
        for idx in component {
            component_of.insert(*idx, c);
        }
    }

    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); components.len()];
    let mut indegree = vec![0usize; components.len()];
    let mut seen_edges = HashSet::new();
    for edge in inner.edge_references() {
        let (Some(&from), Some(&to)) = (component_of.get(&edge.source()), component_of.get(&edge.target())) else {
            continue;
        };
        if from != to && seen_edges.insert((from, to)) {
            successors[from].push(to);
            indegree[to] += 1;
        }
    }

    let first_rank = |c: usize| components[c].first().map_or(usize::MAX, |idx| graph.rank(*idx));
    let mut ready: BinaryHeap<Reverse<(usize, usize)>> = indegree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(c, _)| Reverse((first_rank(c), c)))
        .collect();

    let mut order = Vec::with_capacity(graph.node_count());
    while let Some(Reverse((_, c))) = ready.pop() {
        order.extend(components[c].iter().filter_map(|idx| inner.node_weight(*idx).copied()));
        for &next in &successors[c] {
            indegree[next] -= 1;
            if indegree[next] == 0 {
                ready.push(Reverse((first_rank(next), next)));
            }
        }
    }
    order
}

/// Orders modules by their position in a dependency-first sort: a module
/// compares greater than the modules it depends on.
#[derive(Debug, Clone)]
pub struct ModuleDependencyComparator {
    positions: HashMap<ModuleId, usize>,
}

impl ModuleDependencyComparator {
    pub fn new(sorted: &[ModuleId]) -> Self {
        ModuleDependencyComparator {
            positions: sorted.iter().enumerate().map(|(i, id)| (*id, i)).collect(),
        }
    }

    pub fn position(&self, module: ModuleId) -> Option<usize> {
        self.positions.get(&module).copied()
    }

    /// Unknown modules sort last, by id.
    pub fn compare(&self, a: ModuleId, b: ModuleId) -> Ordering {
        let key = |m: ModuleId| (self.position(m).unwrap_or(usize::MAX), m);
        key(a).cmp(&key(b))
    }

    pub fn sort(&self, modules: &mut [ModuleId]) {
        modules.sort_by(|a, b| self.compare(*a, *b));
    }
}

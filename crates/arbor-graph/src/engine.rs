//! Cached dependency queries over the committed registry
//!
//! The engine only ever reads committed generations. Module graphs and the
//! sorted order are cached per structural generation, root lists per
//! generation, so a query can never return data derived from an older state
//! than the one it reads. A registry listener drops stale entries eagerly.

use std::sync::{Arc, Weak};

use arbor_model::{
    CommitBatch, Generation, ListenerId, ModelListener, ModuleData, ModuleId, OrderRootType, ProjectState, Registry,
};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::enumerator::{EnumerationFlags, OrderEnumerator};
use crate::error::{GraphError, Result};
use crate::graph::ModuleGraph;
use crate::handler::{HandlerRegistry, ModulePolicy, OrderEnumerationHandlerFactory};
use crate::order::{ModuleDependencyComparator, sorted_modules};

/// Lifecycle of the cached graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Uninitialized,
    /// Cached graph matches this structural generation.
    Built(Generation),
    /// A structural commit landed since the last build.
    Stale,
    Disposed,
}

#[derive(Default)]
struct GraphCache {
    generation: Option<Generation>,
    with_tests: Option<Arc<ModuleGraph>>,
    production: Option<Arc<ModuleGraph>>,
    sorted: Option<Arc<Vec<ModuleId>>>,
}

impl GraphCache {
    fn graph(&self, key: Generation, include_tests: bool) -> Option<Arc<ModuleGraph>> {
        if self.generation != Some(key) {
            return None;
        }
        if include_tests {
            self.with_tests.clone()
        } else {
            self.production.clone()
        }
    }

    fn sorted(&self, key: Generation) -> Option<Arc<Vec<ModuleId>>> {
        if self.generation != Some(key) {
            return None;
        }
        self.sorted.clone()
    }

    /// Move the cache to `key`. Never goes back to an older generation.
    fn advance(&mut self, key: Generation) -> bool {
        match self.generation {
            Some(current) if current > key => false,
            Some(current) if current == key => true,
            _ => {
                *self = GraphCache {
                    generation: Some(key),
                    ..GraphCache::default()
                };
                true
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RootsKey {
    generation: Generation,
    module: ModuleId,
    flags: EnumerationFlags,
    root_type: OrderRootType,
}

struct EngineInner {
    registry: Registry,
    status: RwLock<EngineStatus>,
    graphs: RwLock<GraphCache>,
    roots: DashMap<RootsKey, Arc<Vec<String>>>,
    handlers: HandlerRegistry,
    listener: Mutex<Option<ListenerId>>,
}

impl EngineInner {
    fn invalidate(&self, batch: &CommitBatch) {
        self.roots.retain(|key, _| key.generation >= batch.generation);
        if !batch.is_structural() {
            return;
        }
        {
            let mut status = self.status.write();
            if matches!(*status, EngineStatus::Built(_)) {
                *status = EngineStatus::Stale;
            }
        }
        let mut graphs = self.graphs.write();
        if graphs.generation.is_some_and(|built| built < batch.generation) {
            *graphs = GraphCache::default();
        }
        debug!("Module graph stale after {}", batch.generation);
    }

    fn clear(&self) {
        *self.graphs.write() = GraphCache::default();
        self.roots.clear();
    }
}

/// Drops stale cache entries when the registry commits. Holds the engine
/// weakly so the registry never keeps it alive.
struct Invalidator {
    engine: Weak<EngineInner>,
}

impl ModelListener for Invalidator {
    fn committed(&self, batch: &CommitBatch) {
        if let Some(engine) = self.engine.upgrade() {
            engine.invalidate(batch);
        }
    }
}

/// Dependency graph engine over one registry.
pub struct DependencyEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for DependencyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyEngine")
            .field("status", &self.status())
            .field("cached_roots", &self.inner.roots.len())
            .field("handler_factories", &self.inner.handlers.len())
            .finish()
    }
}

impl DependencyEngine {
    pub fn new(registry: Registry) -> Self {
        let inner = Arc::new(EngineInner {
            registry: registry.clone(),
            status: RwLock::new(EngineStatus::Uninitialized),
            graphs: RwLock::new(GraphCache::default()),
            roots: DashMap::new(),
            handlers: HandlerRegistry::default(),
            listener: Mutex::new(None),
        });
        let listener = registry.add_listener(Arc::new(Invalidator {
            engine: Arc::downgrade(&inner),
        }));
        *inner.listener.lock() = Some(listener);
        DependencyEngine { inner }
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn status(&self) -> EngineStatus {
        *self.inner.status.read()
    }

    fn ensure_live(&self) -> Result<()> {
        if self.status() == EngineStatus::Disposed {
            return Err(GraphError::Disposed);
        }
        Ok(())
    }

    /// Register a per-module policy. Cached results are dropped since they
    /// may depend on the old policy.
    pub fn register_handler_factory(&self, factory: Arc<dyn OrderEnumerationHandlerFactory>) -> Result<()> {
        self.ensure_live()?;
        self.inner.handlers.register(factory);
        self.clear_caches();
        debug!("Registered enumeration handler factory ({} total)", self.inner.handlers.len());
        Ok(())
    }

    pub fn clear_caches(&self) {
        self.inner.clear();
        let mut status = self.inner.status.write();
        if matches!(*status, EngineStatus::Built(_)) {
            *status = EngineStatus::Stale;
        }
    }

    pub(crate) fn policy(&self, module: &ModuleData) -> ModulePolicy {
        self.inner.handlers.policy(module)
    }

    /// Record a build from structural generation `key`. A build from a state
    /// older than the current structure leaves the status alone. The check
    /// runs under the status lock, which the invalidator also takes.
    fn mark_built(&self, key: Generation) {
        let mut status = self.inner.status.write();
        if *status == EngineStatus::Disposed {
            return;
        }
        if self.inner.registry.current().structure_generation() == key {
            *status = EngineStatus::Built(key);
        }
    }

    pub(crate) fn graph_for(&self, state: &ProjectState, include_tests: bool) -> Arc<ModuleGraph> {
        let key = state.structure_generation();
        if let Some(graph) = self.inner.graphs.read().graph(key, include_tests) {
            return graph;
        }

        let graph = Arc::new(ModuleGraph::build(state, include_tests, |module| self.policy(module).recurse));
        {
            let mut graphs = self.inner.graphs.write();
            if graphs.advance(key) {
                if include_tests {
                    graphs.with_tests = Some(Arc::clone(&graph));
                } else {
                    graphs.production = Some(Arc::clone(&graph));
                }
            }
        }
        self.mark_built(key);
        graph
    }

    /// Dependency graph of the current generation. Without tests, `Test`
    /// scope edges are left out.
    pub fn module_graph(&self, include_tests: bool) -> Result<Arc<ModuleGraph>> {
        self.ensure_live()?;
        let state = self.inner.registry.current();
        Ok(self.graph_for(&state, include_tests))
    }

    /// All modules, dependencies first. Cycles are broken deterministically.
    pub fn sorted_modules(&self) -> Result<Arc<Vec<ModuleId>>> {
        self.ensure_live()?;
        let state = self.inner.registry.current();
        let key = state.structure_generation();
        if let Some(sorted) = self.inner.graphs.read().sorted(key) {
            return Ok(sorted);
        }

        let graph = self.graph_for(&state, true);
        let sorted = Arc::new(sorted_modules(&graph));
        {
            let mut graphs = self.inner.graphs.write();
            if graphs.advance(key) {
                graphs.sorted = Some(Arc::clone(&sorted));
            }
        }
        Ok(sorted)
    }

    pub fn module_dependency_comparator(&self) -> Result<ModuleDependencyComparator> {
        Ok(ModuleDependencyComparator::new(&self.sorted_modules()?))
    }

    /// Start an enumeration over `module`'s order entries, pinned to the
    /// current generation.
    pub fn order_entries(&self, module: ModuleId) -> Result<OrderEnumerator<'_>> {
        self.ensure_live()?;
        let state = self.inner.registry.current();
        if state.module(module).is_none() {
            return Err(GraphError::UnknownModule(module));
        }
        Ok(OrderEnumerator::new(self, state, module))
    }

    pub(crate) fn cached_roots<F>(
        &self,
        generation: Generation,
        module: ModuleId,
        flags: EnumerationFlags,
        root_type: &OrderRootType,
        compute: F,
    ) -> Arc<Vec<String>>
    where
        F: FnOnce() -> Vec<String>,
    {
        let key = RootsKey {
            generation,
            module,
            flags,
            root_type: root_type.clone(),
        };
        if let Some(roots) = self.inner.roots.get(&key) {
            return Arc::clone(roots.value());
        }
        let roots = Arc::new(compute());
        if generation == self.inner.registry.generation() {
            self.inner.roots.insert(key, Arc::clone(&roots));
        }
        roots
    }

    pub fn is_disposed(&self) -> bool {
        self.status() == EngineStatus::Disposed
    }

    /// Unregister from the registry and drop all caches. Further queries
    /// fail with [`GraphError::Disposed`].
    pub fn dispose(&self) {
        {
            let mut status = self.inner.status.write();
            if *status == EngineStatus::Disposed {
                return;
            }
            *status = EngineStatus::Disposed;
        }
        if let Some(listener) = self.inner.listener.lock().take() {
            self.inner.registry.remove_listener(listener);
        }
        self.inner.clear();
        debug!("Dependency engine disposed");
    }
}

impl Drop for DependencyEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}

//! Order entry enumeration
//!
//! An [`OrderEnumerator`] walks a module's order entries, optionally following
//! module dependencies transitively, and reduces them to modules, libraries,
//! SDKs or root URLs. It reads one pinned generation for its whole lifetime.

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::Arc;

use arbor_model::{
    DependencyScope, EntityLookup, LibraryData, LibraryId, ModuleData, ModuleId, OrderEntry, OrderEntryKind,
    OrderRootType, ProjectState, Resolution, SdkData, SdkId,
};
use indexmap::IndexSet;
use tracing::trace;

use crate::engine::DependencyEngine;

/// Builder flags. Part of the roots cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EnumerationFlags {
    pub recursively: bool,
    pub exported_only: bool,
    pub production_only: bool,
    pub compile_only: bool,
    pub runtime_only: bool,
    pub without_sdk: bool,
    pub without_libraries: bool,
    pub without_module_source: bool,
    pub without_dep_modules: bool,
}

impl EnumerationFlags {
    fn accepts_scope(&self, scope: DependencyScope) -> bool {
        match (self.production_only, self.compile_only, self.runtime_only) {
            (true, true, _) => scope.is_for_production_compile(),
            (true, false, true) => scope.is_for_production_runtime(),
            (true, false, false) => scope.is_for_production_compile() || scope.is_for_production_runtime(),
            (false, true, _) => scope.is_for_test_compile(),
            (false, false, _) => scope.is_for_test_runtime(),
        }
    }
}

/// What an enumerated entry resolved to.
#[derive(Debug, Clone, Copy)]
pub enum EnumeratedTarget<'s> {
    /// Sources and output of a module: the root module's own, or those of a
    /// dependency reached transitively.
    ModuleSource(&'s ModuleData),
    /// A module dependency that was not expanded.
    Module(&'s ModuleData),
    Library(&'s LibraryData),
    Sdk(&'s SdkData),
}

#[derive(Debug, Clone, Copy)]
pub struct EnumeratedEntry<'s> {
    /// Module whose order entry produced this item.
    pub owner: &'s ModuleData,
    pub entry: &'s OrderEntry,
    pub target: EnumeratedTarget<'s>,
    /// Whether the target module's test roots belong in the result.
    pub include_tests: bool,
}

pub struct OrderEnumerator<'e> {
    engine: &'e DependencyEngine,
    state: Arc<ProjectState>,
    module: ModuleId,
    flags: EnumerationFlags,
}

impl<'e> OrderEnumerator<'e> {
    pub(crate) fn new(engine: &'e DependencyEngine, state: Arc<ProjectState>, module: ModuleId) -> Self {
        OrderEnumerator {
            engine,
            state,
            module,
            flags: EnumerationFlags::default(),
        }
    }

    pub fn recursively(mut self) -> Self {
        self.flags.recursively = true;
        self
    }

    /// Beyond the root module, follow only exported entries.
    pub fn exported_only(mut self) -> Self {
        self.flags.exported_only = true;
        self
    }

    pub fn production_only(mut self) -> Self {
        self.flags.production_only = true;
        self
    }

    pub fn compile_only(mut self) -> Self {
        self.flags.compile_only = true;
        self
    }

    pub fn runtime_only(mut self) -> Self {
        self.flags.runtime_only = true;
        self
    }

    pub fn without_sdk(mut self) -> Self {
        self.flags.without_sdk = true;
        self
    }

    pub fn without_libraries(mut self) -> Self {
        self.flags.without_libraries = true;
        self
    }

    pub fn without_module_source(mut self) -> Self {
        self.flags.without_module_source = true;
        self
    }

    pub fn without_dep_modules(mut self) -> Self {
        self.flags.without_dep_modules = true;
        self
    }

    pub fn flags(&self) -> EnumerationFlags {
        self.flags
    }

    /// The generation this enumerator reads.
    pub fn state(&self) -> &Arc<ProjectState> {
        &self.state
    }

    fn accepts(&self, entry: &OrderEntry, first_level: bool) -> bool {
        if !entry.is_exportable() {
            return true;
        }
        if !first_level && !entry.exported && (self.flags.exported_only || self.flags.compile_only) {
            return false;
        }
        self.flags.accepts_scope(entry.scope)
    }

    /// Visit entries in order until `visit` breaks.
    pub fn for_each<'s, F>(&'s self, mut visit: F)
    where
        F: FnMut(EnumeratedEntry<'s>) -> ControlFlow<()>,
    {
        let Some(root) = self.state.module(self.module) else {
            return;
        };
        let mut visited = HashSet::new();
        let _ = self.process(root, true, !self.flags.production_only, &mut visited, &mut visit);
    }

    fn process<'s>(
        &'s self,
        module: &'s ModuleData,
        first_level: bool,
        include_tests: bool,
        visited: &mut HashSet<ModuleId>,
        visit: &mut dyn FnMut(EnumeratedEntry<'s>) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        if !visited.insert(module.id) {
            return ControlFlow::Continue(());
        }

        for entry in module.order_entries() {
            if !self.accepts(entry, first_level) {
                continue;
            }
            let item = |target| EnumeratedEntry {
                owner: module,
                entry,
                target,
                include_tests: false,
            };

            match &entry.kind {
                OrderEntryKind::ModuleSource => {
                    if !self.flags.without_module_source {
                        visit(EnumeratedEntry {
                            include_tests,
                            ..item(EnumeratedTarget::ModuleSource(module))
                        })?;
                    }
                }
                OrderEntryKind::Module {
                    name,
                    production_on_test,
                } => {
                    if self.flags.without_dep_modules {
                        continue;
                    }
                    let Some(dependency) = self.state.find_module(name) else {
                        trace!("Unresolved module entry '{}' in {:?}", name, module.id);
                        continue;
                    };
                    if dependency.id == module.id {
                        continue;
                    }

                    let policy = self.engine.policy(dependency);
                    let dependency_tests = (!self.flags.production_only && policy.include_tests) || *production_on_test;

                    if !self.flags.recursively {
                        visit(EnumeratedEntry {
                            include_tests: dependency_tests,
                            ..item(EnumeratedTarget::Module(dependency))
                        })?;
                    } else if policy.recurse {
                        self.process(dependency, false, dependency_tests, visited, visit)?;
                    } else if visited.insert(dependency.id) && !self.flags.without_module_source {
                        // the handler stops recursion: keep the module's own
                        // roots but none of its dependencies
                        visit(EnumeratedEntry {
                            include_tests: dependency_tests,
                            ..item(EnumeratedTarget::ModuleSource(dependency))
                        })?;
                    }
                }
                OrderEntryKind::Library { .. } | OrderEntryKind::ModuleLibrary { .. } => {
                    if self.flags.without_libraries {
                        continue;
                    }
                    if let Resolution::Library(id) = self.state.resolve(entry) {
                        if let Some(library) = self.state.library(id) {
                            visit(item(EnumeratedTarget::Library(library)))?;
                        }
                    }
                }
                OrderEntryKind::Sdk { .. } | OrderEntryKind::InheritedSdk => {
                    if self.flags.without_sdk || !first_level {
                        continue;
                    }
                    if let Resolution::Sdk(id) = self.state.resolve(entry) {
                        if let Some(sdk) = self.state.sdk(id) {
                            visit(item(EnumeratedTarget::Sdk(sdk)))?;
                        }
                    }
                }
            }
        }

        ControlFlow::Continue(())
    }

    // ── Terminal operations ─────────────────────────────

    pub fn entries(&self) -> Vec<EnumeratedEntry<'_>> {
        let mut entries = Vec::new();
        self.for_each(|item| {
            entries.push(item);
            ControlFlow::Continue(())
        });
        entries
    }

    /// Modules contributing sources or appearing as dependencies, first-seen order.
    pub fn modules(&self) -> Vec<ModuleId> {
        let mut modules = IndexSet::new();
        self.for_each(|item| {
            if let EnumeratedTarget::ModuleSource(module) | EnumeratedTarget::Module(module) = item.target {
                modules.insert(module.id);
            }
            ControlFlow::Continue(())
        });
        modules.into_iter().collect()
    }

    pub fn libraries(&self) -> Vec<LibraryId> {
        let mut libraries = IndexSet::new();
        self.for_each(|item| {
            if let EnumeratedTarget::Library(library) = item.target {
                libraries.insert(library.id);
            }
            ControlFlow::Continue(())
        });
        libraries.into_iter().collect()
    }

    pub fn sdks(&self) -> Vec<SdkId> {
        let mut sdks = IndexSet::new();
        self.for_each(|item| {
            if let EnumeratedTarget::Sdk(sdk) = item.target {
                sdks.insert(sdk.id);
            }
            ControlFlow::Continue(())
        });
        sdks.into_iter().collect()
    }

    /// Root URLs of one type, de-duplicated, first-seen order. Cached per
    /// generation, module and flags.
    pub fn roots(&self, root_type: &OrderRootType) -> Vec<String> {
        let roots = self
            .engine
            .cached_roots(self.state.generation(), self.module, self.flags, root_type, || {
                self.collect_roots(root_type)
            });
        (*roots).clone()
    }

    pub fn class_roots(&self) -> Vec<String> {
        self.roots(&OrderRootType::CLASSES)
    }

    pub fn source_roots(&self) -> Vec<String> {
        self.roots(&OrderRootType::SOURCES)
    }

    fn collect_roots(&self, root_type: &OrderRootType) -> Vec<String> {
        let mut urls = IndexSet::new();
        let mut libraries = HashSet::new();
        let mut sdks = HashSet::new();
        self.for_each(|item| {
            match item.target {
                EnumeratedTarget::ModuleSource(module) | EnumeratedTarget::Module(module) => {
                    module_roots(module, root_type, item.include_tests, &mut urls);
                }
                EnumeratedTarget::Library(library) => {
                    if libraries.insert(library.id) {
                        urls.extend(library.urls(root_type).iter().cloned());
                    }
                }
                EnumeratedTarget::Sdk(sdk) => {
                    if sdks.insert(sdk.id) {
                        urls.extend(sdk.urls(root_type).iter().cloned());
                    }
                }
            }
            ControlFlow::Continue(())
        });
        urls.into_iter().collect()
    }
}

fn module_roots(module: &ModuleData, root_type: &OrderRootType, include_tests: bool, urls: &mut IndexSet<String>) {
    let root_model = &module.root_model;
    if *root_type == OrderRootType::CLASSES {
        urls.extend(root_model.output_url.iter().cloned());
        if include_tests {
            urls.extend(root_model.test_output_url.iter().cloned());
        }
    } else if *root_type == OrderRootType::SOURCES {
        urls.extend(root_model.source_folder_urls(include_tests).into_iter().map(str::to_string));
    }
}

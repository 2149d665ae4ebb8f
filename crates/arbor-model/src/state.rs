//! Committed registry state and name resolution
//!
//! A [`ProjectState`] is one immutable generation of the registry. Entities are
//! shared between generations through `Arc`, so pinning an old state costs
//! nothing and readers never observe partial writes.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::ids::{Generation, LibraryId, ModuleId, SdkId};
use crate::model::*;

/// What an order entry points at under a given view of the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    ModuleSource,
    Module(ModuleId),
    Library(LibraryId),
    Sdk(SdkId),
    Unresolved,
}

/// An order entry together with its derived flags.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderEntryInfo {
    pub index: usize,
    pub entry: OrderEntry,
    pub resolution: Resolution,
    /// False when the target cannot currently be resolved by name.
    pub valid: bool,
    /// True for placeholders the user cannot reorder or remove directly.
    pub synthetic: bool,
}

/// An order entry whose target does not resolve. Not an error: the entry stays
/// until a user removes it.
#[derive(Debug, Clone, PartialEq)]
pub struct DanglingReference {
    pub module: ModuleId,
    pub index: usize,
    pub entry: OrderEntry,
}

/// Read access shared by committed states and open snapshots.
pub trait EntityLookup {
    fn lookup_module(&self, id: ModuleId) -> Option<&ModuleData>;
    fn module_by_name(&self, name: &str) -> Option<&ModuleData>;
    fn lookup_library(&self, id: LibraryId) -> Option<&LibraryData>;
    /// First library with this name in the table, in insertion order.
    fn library_by_name(&self, table: &LibraryTableId, name: &str) -> Option<&LibraryData>;
    fn lookup_sdk(&self, id: SdkId) -> Option<&SdkData>;
    fn sdk_by_name(&self, name: &str) -> Option<&SdkData>;
    fn project_sdk_name(&self) -> Option<&str>;

    fn resolve(&self, entry: &OrderEntry) -> Resolution {
        match &entry.kind {
            OrderEntryKind::ModuleSource => Resolution::ModuleSource,
            OrderEntryKind::Module { name, .. } => self
                .module_by_name(name)
                .map_or(Resolution::Unresolved, |m| Resolution::Module(m.id)),
            OrderEntryKind::Library { table, name } => self
                .library_by_name(table, name)
                .map_or(Resolution::Unresolved, |l| Resolution::Library(l.id)),
            OrderEntryKind::ModuleLibrary { library } => self
                .lookup_library(*library)
                .map_or(Resolution::Unresolved, |l| Resolution::Library(l.id)),
            OrderEntryKind::Sdk { name } => self
                .sdk_by_name(name)
                .map_or(Resolution::Unresolved, |s| Resolution::Sdk(s.id)),
            OrderEntryKind::InheritedSdk => self
                .project_sdk_name()
                .and_then(|name| self.sdk_by_name(name))
                .map_or(Resolution::Unresolved, |s| Resolution::Sdk(s.id)),
        }
    }

    fn is_synthetic(&self, entry: &OrderEntry) -> bool {
        match &entry.kind {
            OrderEntryKind::ModuleLibrary { library } => self
                .lookup_library(*library)
                .is_some_and(|l| l.name.is_none() && !l.has_roots()),
            _ => false,
        }
    }

    fn inspect(&self, index: usize, entry: &OrderEntry) -> OrderEntryInfo {
        let resolution = self.resolve(entry);
        OrderEntryInfo {
            index,
            entry: entry.clone(),
            resolution,
            valid: resolution != Resolution::Unresolved,
            synthetic: self.is_synthetic(entry),
        }
    }

    /// Order entries of a module with validity flags; empty for unknown modules.
    fn order_entry_infos(&self, module: ModuleId) -> Vec<OrderEntryInfo> {
        self.lookup_module(module)
            .map(|m| {
                m.order_entries()
                    .iter()
                    .enumerate()
                    .map(|(index, entry)| self.inspect(index, entry))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// One committed generation of the registry.
#[derive(Debug, Clone)]
pub struct ProjectState {
    pub(crate) generation: Generation,
    pub(crate) structure_generation: Generation,
    pub(crate) project_name: String,
    pub(crate) project_sdk: Option<String>,
    pub(crate) modules: IndexMap<ModuleId, Arc<ModuleData>>,
    pub(crate) libraries: IndexMap<LibraryId, Arc<LibraryData>>,
    pub(crate) sdks: IndexMap<SdkId, Arc<SdkData>>,
    // name indexes, rebuilt once per generation
    module_names: HashMap<String, ModuleId>,
    library_names: HashMap<(LibraryTableId, String), LibraryId>,
    sdk_names: HashMap<String, SdkId>,
}

/// Mutable tables a commit merges snapshots into before freezing them.
#[derive(Debug, Clone)]
pub(crate) struct WorkingState {
    pub(crate) project_sdk: Option<String>,
    pub(crate) modules: IndexMap<ModuleId, Arc<ModuleData>>,
    pub(crate) libraries: IndexMap<LibraryId, Arc<LibraryData>>,
    pub(crate) sdks: IndexMap<SdkId, Arc<SdkData>>,
}

impl WorkingState {
    /// Drop module-level libraries their owner no longer lists. A commit that
    /// replaces an order entry list wholesale can leave them behind. Returns
    /// how many were dropped.
    pub(crate) fn sweep_unlisted_module_libraries(&mut self) -> usize {
        let modules = &self.modules;
        let before = self.libraries.len();
        self.libraries.retain(|id, library| match library.owner {
            LibraryOwner::Table(_) => true,
            LibraryOwner::Module(owner) => modules.get(&owner).is_some_and(|module| {
                module.order_entries().iter().any(|entry| {
                    matches!(entry.kind, OrderEntryKind::ModuleLibrary { library: listed } if listed == *id)
                })
            }),
        });
        before - self.libraries.len()
    }
}

impl ProjectState {
    pub(crate) fn empty(project_name: impl Into<String>) -> Self {
        ProjectState {
            generation: Generation::INITIAL,
            structure_generation: Generation::INITIAL,
            project_name: project_name.into(),
            project_sdk: None,
            modules: IndexMap::new(),
            libraries: IndexMap::new(),
            sdks: IndexMap::new(),
            module_names: HashMap::new(),
            library_names: HashMap::new(),
            sdk_names: HashMap::new(),
        }
    }

    pub(crate) fn working(&self) -> WorkingState {
        WorkingState {
            project_sdk: self.project_sdk.clone(),
            modules: self.modules.clone(),
            libraries: self.libraries.clone(),
            sdks: self.sdks.clone(),
        }
    }

    /// Freeze merged tables into the next generation.
    pub(crate) fn freeze(&self, working: WorkingState, generation: Generation) -> ProjectState {
        let module_names = working
            .modules
            .values()
            .map(|m| (m.name.clone(), m.id))
            .collect();

        let mut library_names = HashMap::new();
        for library in working.libraries.values() {
            if let (Some(table), Some(name)) = (library.table(), library.name.as_ref()) {
                library_names
                    .entry((table.clone(), name.clone()))
                    .or_insert(library.id);
            }
        }

        let mut sdk_names = HashMap::new();
        for sdk in working.sdks.values() {
            sdk_names.entry(sdk.name.clone()).or_insert(sdk.id);
        }

        ProjectState {
            generation,
            structure_generation: self.structure_generation,
            project_name: self.project_name.clone(),
            project_sdk: working.project_sdk,
            modules: working.modules,
            libraries: working.libraries,
            sdks: working.sdks,
            module_names,
            library_names,
            sdk_names,
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Generation of the last commit that added, removed or renamed a module or
    /// changed any module's order entries.
    pub fn structure_generation(&self) -> Generation {
        self.structure_generation
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    // ── Modules ─────────────────────────────────────────

    pub fn module(&self, id: ModuleId) -> Option<&ModuleData> {
        self.modules.get(&id).map(|m| m.as_ref())
    }

    /// Modules in insertion order.
    pub fn modules(&self) -> impl Iterator<Item = &ModuleData> {
        self.modules.values().map(|m| m.as_ref())
    }

    pub fn module_ids(&self) -> impl Iterator<Item = ModuleId> + '_ {
        self.modules.keys().copied()
    }

    pub fn find_module(&self, name: &str) -> Option<&ModuleData> {
        self.module_names.get(name).and_then(|id| self.module(*id))
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Insertion rank of a module, used for deterministic tie-breaks.
    pub fn module_rank(&self, id: ModuleId) -> Option<usize> {
        self.modules.get_index_of(&id)
    }

    // ── Libraries ───────────────────────────────────────

    pub fn library(&self, id: LibraryId) -> Option<&LibraryData> {
        self.libraries.get(&id).map(|l| l.as_ref())
    }

    pub fn library_arc(&self, id: LibraryId) -> Option<Arc<LibraryData>> {
        self.libraries.get(&id).cloned()
    }

    pub fn libraries(&self) -> impl Iterator<Item = &LibraryData> {
        self.libraries.values().map(|l| l.as_ref())
    }

    /// Libraries of one shared table, in insertion order.
    pub fn libraries_in<'a>(&'a self, table: &'a LibraryTableId) -> impl Iterator<Item = &'a Arc<LibraryData>> + 'a {
        self.libraries
            .values()
            .filter(move |l| l.table() == Some(table))
    }

    pub fn find_library(&self, table: &LibraryTableId, name: &str) -> Option<&LibraryData> {
        self.library_names
            .get(&(table.clone(), name.to_string()))
            .and_then(|id| self.library(*id))
    }

    /// Module-level libraries of a module, in order-entry order.
    pub fn module_libraries(&self, module: ModuleId) -> Vec<&LibraryData> {
        module_libraries_of(self, module)
    }

    // ── SDKs ────────────────────────────────────────────

    pub fn sdk(&self, id: SdkId) -> Option<&SdkData> {
        self.sdks.get(&id).map(|s| s.as_ref())
    }

    pub fn sdks(&self) -> impl Iterator<Item = &SdkData> {
        self.sdks.values().map(|s| s.as_ref())
    }

    pub fn find_sdk(&self, name: &str) -> Option<&SdkData> {
        self.sdk_names.get(name).and_then(|id| self.sdk(*id))
    }

    pub fn project_sdk(&self) -> Option<&SdkData> {
        self.project_sdk.as_deref().and_then(|name| self.find_sdk(name))
    }

    // ── Diagnostics ─────────────────────────────────────

    pub fn dangling_references(&self) -> Vec<DanglingReference> {
        let mut dangling = Vec::new();
        for module in self.modules() {
            for (index, entry) in module.order_entries().iter().enumerate() {
                if self.resolve(entry) == Resolution::Unresolved {
                    dangling.push(DanglingReference {
                        module: module.id,
                        index,
                        entry: entry.clone(),
                    });
                }
            }
        }
        dangling
    }
}

pub(crate) fn module_libraries_of<L: EntityLookup + ?Sized>(lookup: &L, module: ModuleId) -> Vec<&LibraryData> {
    let Some(data) = lookup.lookup_module(module) else {
        return Vec::new();
    };
    data.order_entries()
        .iter()
        .filter_map(|entry| match &entry.kind {
            OrderEntryKind::ModuleLibrary { library } => lookup.lookup_library(*library),
            _ => None,
        })
        .collect()
}

impl EntityLookup for ProjectState {
    fn lookup_module(&self, id: ModuleId) -> Option<&ModuleData> {
        self.module(id)
    }

    fn module_by_name(&self, name: &str) -> Option<&ModuleData> {
        self.find_module(name)
    }

    fn lookup_library(&self, id: LibraryId) -> Option<&LibraryData> {
        self.library(id)
    }

    fn library_by_name(&self, table: &LibraryTableId, name: &str) -> Option<&LibraryData> {
        self.find_library(table, name)
    }

    fn lookup_sdk(&self, id: SdkId) -> Option<&SdkData> {
        self.sdk(id)
    }

    fn sdk_by_name(&self, name: &str) -> Option<&SdkData> {
        self.find_sdk(name)
    }

    fn project_sdk_name(&self) -> Option<&str> {
        self.project_sdk.as_deref()
    }
}

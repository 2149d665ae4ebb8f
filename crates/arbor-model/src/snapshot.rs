//! Copy-on-write editing sessions over the registry
//!
//! A [`ProjectSnapshot`] records a delta against the generation it was opened
//! on: created entities, removed ids and per-entity field patches. Reads go
//! through the delta first (read-your-own-writes); nothing is visible to other
//! readers until the snapshot is committed.

use std::sync::Arc;

use indexmap::map::Entry;
use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::error::{ModelError, Result};
use crate::ids::{EntityId, Generation, LibraryId, ModuleId, SdkId};
use crate::library_table::LibraryEditor;
use crate::model::*;
use crate::registry::Registry;
use crate::root_model::ModifiableRootModel;
use crate::state::{EntityLookup, ProjectState, WorkingState};

/// Which field groups of a module a snapshot has written. Untouched groups
/// keep whatever a concurrent commit left there.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ModuleFields {
    pub(crate) name: bool,
    pub(crate) order_entries: bool,
    pub(crate) content: bool,
}

impl ModuleFields {
    fn any(self) -> bool {
        self.name || self.order_entries || self.content
    }
}

#[derive(Debug, Clone)]
struct ModuleDelta {
    data: ModuleData,
    fields: ModuleFields,
}

impl ModuleDelta {
    fn new(data: ModuleData) -> Self {
        ModuleDelta {
            data,
            fields: ModuleFields::default(),
        }
    }

    fn apply(&self, target: &mut ModuleData) {
        if self.fields.name {
            target.name = self.data.name.clone();
        }
        if self.fields.order_entries {
            target.root_model.order_entries = Arc::clone(&self.data.root_model.order_entries);
        }
        if self.fields.content {
            target.root_model.content_roots = Arc::clone(&self.data.root_model.content_roots);
            target.root_model.output_url = self.data.root_model.output_url.clone();
            target.root_model.test_output_url = self.data.root_model.test_output_url.clone();
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct LibraryFields {
    pub(crate) name: bool,
    pub(crate) roots: bool,
    pub(crate) kind: bool,
}

impl LibraryFields {
    fn any(self) -> bool {
        self.name || self.roots || self.kind
    }
}

#[derive(Debug, Clone)]
struct LibraryDelta {
    data: LibraryData,
    fields: LibraryFields,
}

impl LibraryDelta {
    fn new(data: LibraryData) -> Self {
        LibraryDelta {
            data,
            fields: LibraryFields::default(),
        }
    }

    fn apply(&self, target: &mut LibraryData) {
        if self.fields.name {
            target.name = self.data.name.clone();
        }
        if self.fields.roots {
            target.roots = self.data.roots.clone();
        }
        if self.fields.kind {
            target.kind = self.data.kind.clone();
        }
    }
}

/// An isolated editing session. Commit it through
/// [`Registry::commit`](crate::Registry::commit) or [`ProjectSnapshot::commit`];
/// dropping it without committing disposes everything it created.
pub struct ProjectSnapshot {
    registry: Registry,
    base: Arc<ProjectState>,
    modules: IndexMap<ModuleId, ModuleDelta>,
    libraries: IndexMap<LibraryId, LibraryDelta>,
    /// SDKs are replaced whole.
    sdks: IndexMap<SdkId, SdkData>,
    created: IndexSet<EntityId>,
    removed: IndexSet<EntityId>,
    /// Creations this snapshot discarded again.
    disposed: IndexSet<EntityId>,
    project_sdk: Option<Option<String>>,
    finished: bool,
}

impl std::fmt::Debug for ProjectSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectSnapshot")
            .field("base", &self.base.generation())
            .field("touched_modules", &self.modules.len())
            .field("touched_libraries", &self.libraries.len())
            .field("created", &self.created.len())
            .field("removed", &self.removed.len())
            .finish()
    }
}

impl ProjectSnapshot {
    pub(crate) fn new(registry: Registry, base: Arc<ProjectState>) -> Self {
        debug!("Opened snapshot on {}", base.generation());
        ProjectSnapshot {
            registry,
            base,
            modules: IndexMap::new(),
            libraries: IndexMap::new(),
            sdks: IndexMap::new(),
            created: IndexSet::new(),
            removed: IndexSet::new(),
            disposed: IndexSet::new(),
            project_sdk: None,
            finished: false,
        }
    }

    pub fn base_generation(&self) -> Generation {
        self.base.generation()
    }

    /// The committed state this snapshot was opened on.
    pub fn base(&self) -> &Arc<ProjectState> {
        &self.base
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn is_modified(&self) -> bool {
        !self.modules.is_empty()
            || !self.libraries.is_empty()
            || !self.sdks.is_empty()
            || !self.removed.is_empty()
            || self.project_sdk.is_some()
    }

    /// Removals committed by others after the base are not checked here; the
    /// commit reports them as `StaleBase`.
    fn ensure_live(&self, id: EntityId) -> Result<()> {
        if self.removed.contains(&id) || self.disposed.contains(&id) {
            return Err(ModelError::Disposed(id));
        }
        Ok(())
    }

    // ── Modules ─────────────────────────────────────────

    pub fn module(&self, id: ModuleId) -> Option<&ModuleData> {
        if self.removed.contains(&EntityId::Module(id)) {
            return None;
        }
        match self.modules.get(&id) {
            Some(delta) => Some(&delta.data),
            None => self.base.module(id),
        }
    }

    /// Visible modules: base order first, then creations in creation order.
    pub fn modules(&self) -> Vec<&ModuleData> {
        let mut modules: Vec<&ModuleData> = self.base.module_ids().filter_map(|id| self.module(id)).collect();
        modules.extend(
            self.modules
                .iter()
                .filter(|(id, _)| self.base.module(**id).is_none())
                .map(|(_, delta)| &delta.data),
        );
        modules
    }

    pub fn find_module(&self, name: &str) -> Option<&ModuleData> {
        self.modules().into_iter().find(|m| m.name == name)
    }

    /// Create a module. It becomes visible to other readers on commit.
    pub fn create_module(&mut self, name: &str) -> Result<ModuleId> {
        if self.find_module(name).is_some() {
            return Err(ModelError::DuplicateModuleName(name.to_string()));
        }
        let id = self.registry.ids().module();
        self.modules.insert(id, ModuleDelta::new(ModuleData::new(id, name)));
        self.created.insert(id.into());
        debug!("Created module '{}' as {:?}", name, id);
        Ok(id)
    }

    pub fn rename_module(&mut self, id: ModuleId, new_name: &str) -> Result<()> {
        if self.find_module(new_name).is_some_and(|m| m.id != id) {
            return Err(ModelError::DuplicateModuleName(new_name.to_string()));
        }
        let data = self.module_mut(id, |fields| fields.name = true)?;
        data.name = new_name.to_string();
        Ok(())
    }

    /// Dispose a module. Modules created by this snapshot are disposed right
    /// away; committed modules are disposed when the snapshot commits.
    pub fn dispose_module(&mut self, id: ModuleId) -> Result<()> {
        let key = EntityId::Module(id);
        self.ensure_live(key)?;
        if self.module(id).is_none() {
            return Err(ModelError::UnknownEntity(key));
        }

        let owned: Vec<LibraryId> = self
            .libraries()
            .into_iter()
            .filter(|library| library.owner == LibraryOwner::Module(id))
            .map(|library| library.id)
            .collect();
        for library in owned {
            self.drop_library(library);
        }

        self.modules.shift_remove(&id);
        if self.created.shift_remove(&key) {
            self.discard(key);
            debug!("Disposed uncommitted module {:?}", id);
        } else {
            self.removed.insert(key);
        }
        Ok(())
    }

    /// Editing view over one module's root model.
    pub fn root_model(&mut self, id: ModuleId) -> Result<ModifiableRootModel<'_>> {
        let key = EntityId::Module(id);
        self.ensure_live(key)?;
        if self.module(id).is_none() {
            return Err(ModelError::UnknownEntity(key));
        }
        Ok(ModifiableRootModel::new(self, id))
    }

    /// Copy a module into the delta on first write and mark the touched fields.
    pub(crate) fn module_mut(
        &mut self,
        id: ModuleId,
        touch: impl FnOnce(&mut ModuleFields),
    ) -> Result<&mut ModuleData> {
        let key = EntityId::Module(id);
        self.ensure_live(key)?;
        let delta = match self.modules.entry(id) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let base = self.base.module(id).ok_or(ModelError::UnknownEntity(key))?;
                entry.insert(ModuleDelta::new(base.clone()))
            }
        };
        touch(&mut delta.fields);
        Ok(&mut delta.data)
    }

    // ── Libraries ───────────────────────────────────────

    pub fn library(&self, id: LibraryId) -> Option<&LibraryData> {
        if self.removed.contains(&EntityId::Library(id)) {
            return None;
        }
        match self.libraries.get(&id) {
            Some(delta) => Some(&delta.data),
            None => self.base.library(id),
        }
    }

    pub fn libraries(&self) -> Vec<&LibraryData> {
        let mut libraries: Vec<&LibraryData> = self.base.libraries().filter_map(|l| self.library(l.id)).collect();
        libraries.extend(
            self.libraries
                .iter()
                .filter(|(id, _)| self.base.library(**id).is_none())
                .map(|(_, delta)| &delta.data),
        );
        libraries
    }

    pub fn libraries_in(&self, table: &LibraryTableId) -> Vec<&LibraryData> {
        self.libraries()
            .into_iter()
            .filter(|library| library.table() == Some(table))
            .collect()
    }

    /// First library with this name in the table.
    pub fn find_library(&self, table: &LibraryTableId, name: &str) -> Option<&LibraryData> {
        self.libraries_in(table)
            .into_iter()
            .find(|library| library.name.as_deref() == Some(name))
    }

    /// Create a library owned by a table or by one module. Prefer
    /// [`ModuleLibraryTable::create_library`](crate::ModuleLibraryTable::create_library)
    /// for module-level libraries, which also adds the order entry. A
    /// module-level library its module does not list is dropped on commit.
    pub fn create_library(&mut self, owner: LibraryOwner, name: Option<&str>) -> Result<LibraryId> {
        if let LibraryOwner::Module(module) = owner {
            self.ensure_live(module.into())?;
            if self.module(module).is_none() {
                return Err(ModelError::UnknownEntity(module.into()));
            }
        }
        let id = self.registry.ids().library();
        self.libraries
            .insert(id, LibraryDelta::new(LibraryData::new(id, name.map(str::to_string), owner)));
        self.created.insert(id.into());
        debug!("Created library {:?} ({:?})", id, name);
        Ok(id)
    }

    /// Remove a library. Entries referring to it by name become invalid; they
    /// are not removed.
    pub fn remove_library(&mut self, id: LibraryId) -> Result<()> {
        let key = EntityId::Library(id);
        self.ensure_live(key)?;
        if self.library(id).is_none() {
            return Err(ModelError::UnknownEntity(key));
        }
        self.drop_library(id);
        Ok(())
    }

    pub(crate) fn drop_library(&mut self, id: LibraryId) {
        let key = EntityId::Library(id);
        self.libraries.shift_remove(&id);
        if self.created.shift_remove(&key) {
            self.discard(key);
        } else if self.base.library(id).is_some() {
            self.removed.insert(key);
        }
    }

    pub fn library_editor(&mut self, id: LibraryId) -> Result<LibraryEditor<'_>> {
        let key = EntityId::Library(id);
        self.ensure_live(key)?;
        if self.library(id).is_none() {
            return Err(ModelError::UnknownEntity(key));
        }
        Ok(LibraryEditor::new(self, id))
    }

    pub(crate) fn library_mut(
        &mut self,
        id: LibraryId,
        touch: impl FnOnce(&mut LibraryFields),
    ) -> Result<&mut LibraryData> {
        let key = EntityId::Library(id);
        self.ensure_live(key)?;
        let delta = match self.libraries.entry(id) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let base = self.base.library(id).ok_or(ModelError::UnknownEntity(key))?;
                entry.insert(LibraryDelta::new(base.clone()))
            }
        };
        touch(&mut delta.fields);
        Ok(&mut delta.data)
    }

    // ── SDKs ────────────────────────────────────────────

    pub fn sdk(&self, id: SdkId) -> Option<&SdkData> {
        if self.removed.contains(&EntityId::Sdk(id)) {
            return None;
        }
        self.sdks.get(&id).or_else(|| self.base.sdk(id))
    }

    pub fn sdks(&self) -> Vec<&SdkData> {
        let mut sdks: Vec<&SdkData> = self.base.sdks().filter_map(|s| self.sdk(s.id)).collect();
        sdks.extend(self.sdks.values().filter(|s| self.base.sdk(s.id).is_none()));
        sdks
    }

    pub fn find_sdk(&self, name: &str) -> Option<&SdkData> {
        self.sdks().into_iter().find(|s| s.name == name)
    }

    pub fn create_sdk(&mut self, name: &str, sdk_type: &str) -> SdkId {
        let id = self.registry.ids().sdk();
        self.sdks.insert(id, SdkData::new(id, name, sdk_type));
        self.created.insert(id.into());
        id
    }

    pub fn sdk_mut(&mut self, id: SdkId) -> Result<&mut SdkData> {
        let key = EntityId::Sdk(id);
        self.ensure_live(key)?;
        match self.sdks.entry(id) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let base = self.base.sdk(id).ok_or(ModelError::UnknownEntity(key))?;
                Ok(entry.insert(base.clone()))
            }
        }
    }

    pub fn remove_sdk(&mut self, id: SdkId) -> Result<()> {
        let key = EntityId::Sdk(id);
        self.ensure_live(key)?;
        if self.sdk(id).is_none() {
            return Err(ModelError::UnknownEntity(key));
        }
        self.sdks.shift_remove(&id);
        if self.created.shift_remove(&key) {
            self.discard(key);
        } else {
            self.removed.insert(key);
        }
        Ok(())
    }

    pub fn set_project_sdk(&mut self, name: Option<&str>) {
        self.project_sdk = Some(name.map(str::to_string));
    }

    // ── Lifecycle ───────────────────────────────────────

    pub fn commit(self) -> Result<Generation> {
        let registry = self.registry.clone();
        registry.commit(self)
    }

    /// Discard the delta. Entities this snapshot created are disposed;
    /// entities it only referenced are untouched.
    pub fn dispose(mut self) {
        self.release();
    }

    fn discard(&mut self, id: EntityId) {
        self.disposed.insert(id);
        self.registry.mark_disposed(id);
    }

    fn release(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let created = self.created.len();
        for id in self.created.drain(..) {
            self.registry.mark_disposed(id);
        }
        self.modules.clear();
        self.libraries.clear();
        self.sdks.clear();
        self.removed.clear();
        debug!("Disposed snapshot on {} ({} created entities)", self.base.generation(), created);
    }

    pub(crate) fn mark_committed(&mut self) {
        self.finished = true;
    }

    pub(crate) fn is_from(&self, registry: &Registry) -> bool {
        self.registry.same_registry(registry)
    }

    /// Merge this delta onto `working`. Fails if the delta touches an entity
    /// that existed in the base but is gone from `working`.
    pub(crate) fn apply_to(&self, working: &mut WorkingState, current: Generation) -> Result<()> {
        let stale = |entity: EntityId| ModelError::StaleBase {
            entity,
            base: self.base.generation(),
            current,
        };

        // Library and SDK removals first; a module removal below sweeps
        // whatever module-level libraries it still owns.
        for id in &self.removed {
            let present = match *id {
                EntityId::Library(library) => working.libraries.shift_remove(&library).is_some(),
                EntityId::Sdk(sdk) => working.sdks.shift_remove(&sdk).is_some(),
                EntityId::Module(_) => continue,
            };
            if !present {
                return Err(stale(*id));
            }
        }
        for id in &self.removed {
            if let EntityId::Module(module) = *id {
                if working.modules.shift_remove(&module).is_none() {
                    return Err(stale(*id));
                }
                working
                    .libraries
                    .retain(|_, library| library.owner != LibraryOwner::Module(module));
            }
        }

        for (id, delta) in &self.modules {
            if self.created.contains(&EntityId::Module(*id)) {
                working.modules.insert(*id, Arc::new(delta.data.clone()));
                continue;
            }
            if !delta.fields.any() {
                continue;
            }
            let Some(existing) = working.modules.get_mut(id) else {
                return Err(stale(EntityId::Module(*id)));
            };
            let mut merged = (**existing).clone();
            delta.apply(&mut merged);
            *existing = Arc::new(merged);
        }

        for (id, delta) in &self.libraries {
            if self.created.contains(&EntityId::Library(*id)) {
                if let LibraryOwner::Module(owner) = delta.data.owner {
                    if !working.modules.contains_key(&owner) {
                        return Err(stale(owner.into()));
                    }
                }
                working.libraries.insert(*id, Arc::new(delta.data.clone()));
                continue;
            }
            if !delta.fields.any() {
                continue;
            }
            let Some(existing) = working.libraries.get_mut(id) else {
                return Err(stale(EntityId::Library(*id)));
            };
            let mut merged = (**existing).clone();
            delta.apply(&mut merged);
            *existing = Arc::new(merged);
        }

        for (id, sdk) in &self.sdks {
            if self.created.contains(&EntityId::Sdk(*id)) {
                working.sdks.insert(*id, Arc::new(sdk.clone()));
                continue;
            }
            let Some(existing) = working.sdks.get_mut(id) else {
                return Err(stale(EntityId::Sdk(*id)));
            };
            *existing = Arc::new(sdk.clone());
        }

        if let Some(project_sdk) = &self.project_sdk {
            working.project_sdk = project_sdk.clone();
        }

        Ok(())
    }
}

impl Drop for ProjectSnapshot {
    fn drop(&mut self) {
        self.release();
    }
}

impl EntityLookup for ProjectSnapshot {
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
        match &self.project_sdk {
            Some(name) => name.as_deref(),
            None => self.base.project_sdk_name(),
        }
    }
}

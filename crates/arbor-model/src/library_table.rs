//! Library tables and library editing
//!
//! Shared tables (application, project, custom levels) hold named libraries
//! referenced from order entries by name. Module-level libraries are owned by
//! exactly one module and referenced by id.

use std::sync::Arc;

use crate::error::{ModelError, Result};
use crate::events::{LibraryTableListener, ListenerId};
use crate::ids::{Generation, LibraryId, ModuleId};
use crate::model::*;
use crate::registry::Registry;
use crate::snapshot::ProjectSnapshot;
use crate::state::module_libraries_of;

fn check_owner(library: &LibraryData, expected: &LibraryOwner) -> Result<()> {
    if &library.owner != expected {
        return Err(ModelError::WrongOwner {
            library: library.id,
            expected: expected.clone(),
            actual: library.owner.clone(),
        });
    }
    Ok(())
}

fn owned_library<'s>(snapshot: &'s ProjectSnapshot, id: LibraryId, owner: &LibraryOwner) -> Result<&'s LibraryData> {
    let library = snapshot
        .library(id)
        .ok_or(ModelError::UnknownEntity(id.into()))?;
    check_owner(library, owner)?;
    Ok(library)
}

// ── Committed view ──────────────────────────────────────

/// Read-only view of one shared table at the current generation.
#[derive(Debug, Clone)]
pub struct LibraryTable {
    registry: Registry,
    table: LibraryTableId,
}

impl LibraryTable {
    pub(crate) fn new(registry: Registry, table: LibraryTableId) -> Self {
        LibraryTable { registry, table }
    }

    pub fn id(&self) -> &LibraryTableId {
        &self.table
    }

    pub fn libraries(&self) -> Vec<Arc<LibraryData>> {
        self.registry.current().libraries_in(&self.table).cloned().collect()
    }

    pub fn library_by_name(&self, name: &str) -> Option<Arc<LibraryData>> {
        let state = self.registry.current();
        let id = state.find_library(&self.table, name)?.id;
        state.library_arc(id)
    }

    /// Open an editing model on this table.
    pub fn modifiable_model(&self) -> LibraryTableModel {
        LibraryTableModel::new(self.registry.open(), self.table.clone())
    }

    pub fn add_listener(&self, listener: Arc<dyn LibraryTableListener>) -> ListenerId {
        self.registry.add_library_table_listener(self.table.clone(), listener)
    }
}

// ── Table editing ───────────────────────────────────────

/// Editing session scoped to one shared table. Owns its snapshot, so the
/// edits commit (or are discarded) as one unit.
#[derive(Debug)]
pub struct LibraryTableModel {
    snapshot: ProjectSnapshot,
    table: LibraryTableId,
}

impl LibraryTableModel {
    pub fn new(snapshot: ProjectSnapshot, table: LibraryTableId) -> Self {
        LibraryTableModel { snapshot, table }
    }

    fn owner(&self) -> LibraryOwner {
        LibraryOwner::Table(self.table.clone())
    }

    pub fn table(&self) -> &LibraryTableId {
        &self.table
    }

    pub fn create_library(&mut self, name: &str) -> Result<LibraryId> {
        let owner = self.owner();
        self.snapshot.create_library(owner, Some(name))
    }

    /// Remove a library of this table. Fails with `WrongOwner` for libraries
    /// that live anywhere else.
    pub fn remove_library(&mut self, id: LibraryId) -> Result<()> {
        owned_library(&self.snapshot, id, &self.owner())?;
        self.snapshot.remove_library(id)
    }

    pub fn libraries(&self) -> Vec<&LibraryData> {
        self.snapshot.libraries_in(&self.table)
    }

    pub fn library_by_name(&self, name: &str) -> Option<&LibraryData> {
        self.snapshot.find_library(&self.table, name)
    }

    pub fn library_editor(&mut self, id: LibraryId) -> Result<LibraryEditor<'_>> {
        owned_library(&self.snapshot, id, &self.owner())?;
        self.snapshot.library_editor(id)
    }

    pub fn is_changed(&self) -> bool {
        self.snapshot.is_modified()
    }

    pub fn snapshot(&self) -> &ProjectSnapshot {
        &self.snapshot
    }

    pub fn snapshot_mut(&mut self) -> &mut ProjectSnapshot {
        &mut self.snapshot
    }

    pub fn into_snapshot(self) -> ProjectSnapshot {
        self.snapshot
    }

    pub fn commit(self) -> Result<Generation> {
        self.snapshot.commit()
    }

    pub fn dispose(self) {
        self.snapshot.dispose();
    }
}

// ── Module-level libraries ──────────────────────────────

/// The module-level libraries of one module inside a snapshot. Creating a
/// library here also appends its order entry; removing one drops the entry.
pub struct ModuleLibraryTable<'a> {
    snapshot: &'a mut ProjectSnapshot,
    module: ModuleId,
}

impl<'a> ModuleLibraryTable<'a> {
    pub(crate) fn new(snapshot: &'a mut ProjectSnapshot, module: ModuleId) -> Self {
        ModuleLibraryTable { snapshot, module }
    }

    pub fn module_id(&self) -> ModuleId {
        self.module
    }

    pub fn create_library(&mut self, name: Option<&str>) -> Result<LibraryId> {
        let id = self.snapshot.create_library(LibraryOwner::Module(self.module), name)?;
        let data = self
            .snapshot
            .module_mut(self.module, |fields| fields.order_entries = true)?;
        Arc::make_mut(&mut data.root_model.order_entries).push(OrderEntry::module_library(id));
        Ok(id)
    }

    pub fn remove_library(&mut self, id: LibraryId) -> Result<()> {
        owned_library(self.snapshot, id, &LibraryOwner::Module(self.module))?;
        let data = self
            .snapshot
            .module_mut(self.module, |fields| fields.order_entries = true)?;
        Arc::make_mut(&mut data.root_model.order_entries)
            .retain(|entry| entry.kind != OrderEntryKind::ModuleLibrary { library: id });
        self.snapshot.drop_library(id);
        Ok(())
    }

    /// Libraries in order-entry order.
    pub fn libraries(&self) -> Vec<&LibraryData> {
        module_libraries_of(&*self.snapshot, self.module)
    }

    pub fn library_by_name(&self, name: &str) -> Option<&LibraryData> {
        self.libraries()
            .into_iter()
            .find(|library| library.name.as_deref() == Some(name))
    }

    pub fn library_editor(&mut self, id: LibraryId) -> Result<LibraryEditor<'_>> {
        owned_library(self.snapshot, id, &LibraryOwner::Module(self.module))?;
        self.snapshot.library_editor(id)
    }
}

// ── Library editing ─────────────────────────────────────

/// Edits one library inside a snapshot.
pub struct LibraryEditor<'a> {
    snapshot: &'a mut ProjectSnapshot,
    library: LibraryId,
}

impl<'a> LibraryEditor<'a> {
    pub(crate) fn new(snapshot: &'a mut ProjectSnapshot, library: LibraryId) -> Self {
        LibraryEditor { snapshot, library }
    }

    pub fn id(&self) -> LibraryId {
        self.library
    }

    fn data(&self) -> Option<&LibraryData> {
        self.snapshot.library(self.library)
    }

    pub fn name(&self) -> Option<&str> {
        self.data().and_then(|library| library.name.as_deref())
    }

    pub fn urls(&self, root_type: &OrderRootType) -> &[String] {
        self.data().map_or(&[][..], |library| library.urls(root_type))
    }

    pub fn set_name(&mut self, name: Option<&str>) -> Result<()> {
        if self.name() == name {
            return Ok(());
        }
        let library = self.snapshot.library_mut(self.library, |fields| fields.name = true)?;
        library.name = name.map(str::to_string);
        Ok(())
    }

    pub fn set_kind(&mut self, kind: Option<&str>) -> Result<()> {
        let library = self.snapshot.library_mut(self.library, |fields| fields.kind = true)?;
        library.kind = kind.map(str::to_string);
        Ok(())
    }

    /// Append a root url. Duplicate urls of the same type are ignored.
    pub fn add_root(&mut self, url: &str, root_type: OrderRootType) -> Result<()> {
        if self.urls(&root_type).iter().any(|existing| existing == url) {
            return Ok(());
        }
        let library = self.snapshot.library_mut(self.library, |fields| fields.roots = true)?;
        library.roots.entry(root_type).or_default().push(url.to_string());
        Ok(())
    }

    pub fn remove_root(&mut self, url: &str, root_type: &OrderRootType) -> Result<bool> {
        if !self.urls(root_type).iter().any(|existing| existing == url) {
            return Ok(false);
        }
        let library = self.snapshot.library_mut(self.library, |fields| fields.roots = true)?;
        if let Some(urls) = library.roots.get_mut(root_type) {
            urls.retain(|existing| existing != url);
            if urls.is_empty() {
                library.roots.remove(root_type);
            }
        }
        Ok(true)
    }
}

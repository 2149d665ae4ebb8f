//! Editing view over one module's root model

use std::sync::Arc;

use tracing::trace;

use crate::error::{ModelError, Result};
use crate::ids::ModuleId;
use crate::library_table::ModuleLibraryTable;
use crate::model::*;
use crate::snapshot::ProjectSnapshot;
use crate::state::{EntityLookup, OrderEntryInfo};

/// Mutable root model of one module, borrowed from a snapshot. Every write
/// goes into the snapshot's delta.
pub struct ModifiableRootModel<'a> {
    snapshot: &'a mut ProjectSnapshot,
    module: ModuleId,
}

impl<'a> ModifiableRootModel<'a> {
    pub(crate) fn new(snapshot: &'a mut ProjectSnapshot, module: ModuleId) -> Self {
        ModifiableRootModel { snapshot, module }
    }

    pub fn module_id(&self) -> ModuleId {
        self.module
    }

    fn data(&self) -> Option<&ModuleData> {
        self.snapshot.module(self.module)
    }

    pub fn module_name(&self) -> &str {
        self.data().map_or("", |m| m.name.as_str())
    }

    pub fn order_entries(&self) -> &[OrderEntry] {
        self.data().map_or(&[][..], |m| m.order_entries())
    }

    /// Order entries with validity resolved against this snapshot.
    pub fn order_entry_infos(&self) -> Vec<OrderEntryInfo> {
        self.snapshot.order_entry_infos(self.module)
    }

    fn entries_mut(&mut self) -> Result<&mut Vec<OrderEntry>> {
        let data = self.snapshot.module_mut(self.module, |fields| fields.order_entries = true)?;
        Ok(Arc::make_mut(&mut data.root_model.order_entries))
    }

    fn root_mut(&mut self) -> Result<&mut RootModel> {
        let data = self.snapshot.module_mut(self.module, |fields| fields.content = true)?;
        Ok(&mut data.root_model)
    }

    fn check_index(&self, index: usize) -> Result<&OrderEntry> {
        let entries = self.order_entries();
        entries.get(index).ok_or(ModelError::IndexOutOfBounds {
            index,
            len: entries.len(),
        })
    }

    // ── Order entries ───────────────────────────────────

    /// Append a module or shared-library dependency and return its index.
    /// The target need not exist yet; unresolved entries stay invalid until it does.
    pub fn add_order_entry(
        &mut self,
        target: DependencyTarget,
        scope: DependencyScope,
        exported: bool,
    ) -> Result<usize> {
        let entry = match target {
            DependencyTarget::Module {
                name,
                production_on_test,
            } => OrderEntry {
                kind: OrderEntryKind::Module {
                    name,
                    production_on_test,
                },
                scope,
                exported,
            },
            DependencyTarget::Library { table, name } => OrderEntry::library(table, name, scope, exported),
        };
        trace!("Adding '{}' to {:?}", entry.presentable_name(), self.module);
        let entries = self.entries_mut()?;
        entries.push(entry);
        Ok(entries.len() - 1)
    }

    pub fn add_module_dependency(&mut self, name: &str, scope: DependencyScope) -> Result<usize> {
        self.add_order_entry(DependencyTarget::module(name), scope, false)
    }

    pub fn add_library_dependency(
        &mut self,
        table: LibraryTableId,
        name: &str,
        scope: DependencyScope,
    ) -> Result<usize> {
        self.add_order_entry(DependencyTarget::library(table, name), scope, false)
    }

    /// Remove the entry at `index`. Removing a module-library entry also
    /// disposes the library it owns.
    pub fn remove_order_entry(&mut self, index: usize) -> Result<OrderEntry> {
        if self.check_index(index)?.is_module_source() {
            return Err(ModelError::ModuleSourceEntry);
        }
        let removed = self.entries_mut()?.remove(index);
        if let OrderEntryKind::ModuleLibrary { library } = removed.kind {
            self.snapshot.drop_library(library);
        }
        Ok(removed)
    }

    /// Reorder entries: `new_order[i]` is the current index of the entry that
    /// ends up at position `i`. The module source entry stays first.
    pub fn rearrange_order_entries(&mut self, new_order: &[usize]) -> Result<()> {
        let len = self.order_entries().len();
        if new_order.len() != len {
            return Err(ModelError::InvalidPermutation {
                reason: format!("expected {} indices, got {}", len, new_order.len()),
            });
        }
        let mut seen = vec![false; len];
        for &index in new_order {
            if index >= len {
                return Err(ModelError::InvalidPermutation {
                    reason: format!("index {} out of range", index),
                });
            }
            if std::mem::replace(&mut seen[index], true) {
                return Err(ModelError::InvalidPermutation {
                    reason: format!("index {} appears twice", index),
                });
            }
        }
        if let Some(source) = self.order_entries().iter().position(OrderEntry::is_module_source) {
            if new_order[source] != source {
                return Err(ModelError::InvalidPermutation {
                    reason: "the module source entry must stay in place".to_string(),
                });
            }
        }
        if new_order.iter().enumerate().all(|(i, &index)| i == index) {
            return Ok(());
        }

        let entries = self.entries_mut()?;
        let rearranged: Vec<OrderEntry> = new_order.iter().map(|&index| entries[index].clone()).collect();
        *entries = rearranged;
        Ok(())
    }

    pub fn find_order_entry(&self, target: &OrderEntryTarget) -> Option<(usize, &OrderEntry)> {
        self.order_entries()
            .iter()
            .enumerate()
            .find(|(_, entry)| entry.matches(target))
    }

    pub fn set_scope(&mut self, index: usize, scope: DependencyScope) -> Result<()> {
        let entry = self.check_index(index)?;
        if !entry.is_exportable() {
            return Err(ModelError::NotExportable { index });
        }
        if entry.scope == scope {
            return Ok(());
        }
        self.entries_mut()?[index].scope = scope;
        Ok(())
    }

    pub fn set_exported(&mut self, index: usize, exported: bool) -> Result<()> {
        let entry = self.check_index(index)?;
        if !entry.is_exportable() {
            return Err(ModelError::NotExportable { index });
        }
        if entry.exported == exported {
            return Ok(());
        }
        self.entries_mut()?[index].exported = exported;
        Ok(())
    }

    // ── SDK ─────────────────────────────────────────────

    pub fn sdk(&self) -> Option<SdkRef> {
        self.data().and_then(|m| m.root_model.sdk())
    }

    /// Replace the SDK entry in place, or drop it with `None`. A new SDK
    /// entry goes right after the module source.
    pub fn set_sdk(&mut self, sdk: Option<SdkRef>) -> Result<()> {
        if self.sdk() == sdk {
            return Ok(());
        }
        let entries = self.entries_mut()?;
        let existing = entries.iter().position(OrderEntry::is_sdk);
        match (existing, sdk) {
            (Some(index), Some(sdk)) => entries[index] = sdk.into_entry(),
            (Some(index), None) => {
                entries.remove(index);
            }
            (None, Some(sdk)) => {
                let at = entries
                    .iter()
                    .position(OrderEntry::is_module_source)
                    .map_or(0, |source| source + 1);
                entries.insert(at, sdk.into_entry());
            }
            (None, None) => {}
        }
        Ok(())
    }

    // ── Content roots and output ────────────────────────

    pub fn content_roots(&self) -> &[ContentRoot] {
        self.data().map_or(&[][..], |m| m.root_model.content_roots.as_slice())
    }

    pub fn output_url(&self) -> Option<&str> {
        self.data().and_then(|m| m.root_model.output_url.as_deref())
    }

    pub fn test_output_url(&self) -> Option<&str> {
        self.data().and_then(|m| m.root_model.test_output_url.as_deref())
    }

    /// Add a content root, or return the index of the existing one.
    pub fn add_content_root(&mut self, url: &str) -> Result<usize> {
        if let Some(index) = self.content_roots().iter().position(|root| root.url == url) {
            return Ok(index);
        }
        let roots = Arc::make_mut(&mut self.root_mut()?.content_roots);
        roots.push(ContentRoot::new(url));
        Ok(roots.len() - 1)
    }

    pub fn remove_content_root(&mut self, url: &str) -> Result<bool> {
        let Some(index) = self.content_roots().iter().position(|root| root.url == url) else {
            return Ok(false);
        };
        Arc::make_mut(&mut self.root_mut()?.content_roots).remove(index);
        Ok(true)
    }

    fn content_root_mut(&mut self, content_url: &str) -> Result<&mut ContentRoot> {
        let Some(index) = self.content_roots().iter().position(|root| root.url == content_url) else {
            return Err(ModelError::UnknownContentRoot(content_url.to_string()));
        };
        Ok(&mut Arc::make_mut(&mut self.root_mut()?.content_roots)[index])
    }

    pub fn add_source_folder(
        &mut self,
        content_url: &str,
        folder_url: &str,
        root_type: SourceRootType,
        properties: serde_json::Value,
    ) -> Result<()> {
        let root = self.content_root_mut(content_url)?;
        root.source_folders.retain(|folder| folder.url != folder_url);
        root.source_folders.push(SourceFolder {
            url: folder_url.to_string(),
            root_type,
            properties,
        });
        Ok(())
    }

    pub fn remove_source_folder(&mut self, folder_url: &str) -> Result<bool> {
        let Some(content_url) = self
            .content_roots()
            .iter()
            .find(|root| root.source_folders.iter().any(|folder| folder.url == folder_url))
            .map(|root| root.url.clone())
        else {
            return Ok(false);
        };
        let root = self.content_root_mut(&content_url)?;
        root.source_folders.retain(|folder| folder.url != folder_url);
        Ok(true)
    }

    pub fn add_excluded_folder(&mut self, content_url: &str, url: &str) -> Result<()> {
        let root = self.content_root_mut(content_url)?;
        if !root.excluded_urls.iter().any(|existing| existing == url) {
            root.excluded_urls.push(url.to_string());
        }
        Ok(())
    }

    pub fn set_output_url(&mut self, url: Option<&str>) -> Result<()> {
        if self.output_url() == url {
            return Ok(());
        }
        self.root_mut()?.output_url = url.map(str::to_string);
        Ok(())
    }

    pub fn set_test_output_url(&mut self, url: Option<&str>) -> Result<()> {
        if self.test_output_url() == url {
            return Ok(());
        }
        self.root_mut()?.test_output_url = url.map(str::to_string);
        Ok(())
    }

    // ── Module-level libraries ──────────────────────────

    pub fn module_library_table(&mut self) -> ModuleLibraryTable<'_> {
        ModuleLibraryTable::new(self.snapshot, self.module)
    }
}

//! Test utilities for the project model

use std::sync::Arc;

use parking_lot::Mutex;

use crate::*;

/// A registry holding one committed module per name, in the given order.
pub fn registry_with_modules(names: &[&str]) -> (Registry, Vec<ModuleId>) {
    let registry = Registry::default();
    let mut snapshot = registry.open();
    let ids = names
        .iter()
        .map(|name| snapshot.create_module(name).unwrap())
        .collect();
    snapshot.commit().unwrap();
    (registry, ids)
}

/// Commit one module dependency edge.
pub fn add_dependency(registry: &Registry, from: ModuleId, to: &str, scope: DependencyScope) {
    let mut snapshot = registry.open();
    snapshot
        .root_model(from)
        .unwrap()
        .add_module_dependency(to, scope)
        .unwrap();
    snapshot.commit().unwrap();
}

/// Commit named libraries into the project table.
pub fn add_project_libraries(registry: &Registry, names: &[&str]) -> Vec<LibraryId> {
    let mut model = registry.library_table(LibraryTableId::Project).modifiable_model();
    let ids = names
        .iter()
        .map(|name| model.create_library(name).unwrap())
        .collect();
    model.commit().unwrap();
    ids
}

pub fn library_names(table: &LibraryTable) -> Vec<String> {
    table
        .libraries()
        .iter()
        .map(|library| library.name.clone().unwrap_or_default())
        .collect()
}

pub fn entry_names(entries: &[OrderEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| entry.presentable_name().into_owned())
        .collect()
}

/// Records every notification as a short line.
#[derive(Default)]
pub struct RecordingListener {
    pub events: Mutex<Vec<String>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.events.lock())
    }

    fn push(&self, event: String) {
        self.events.lock().push(event);
    }
}

fn label(library: &LibraryData) -> String {
    library.name.clone().unwrap_or_else(|| "<unnamed>".to_string())
}

impl LibraryTableListener for RecordingListener {
    fn after_library_added(&self, library: &LibraryData) {
        self.push(format!("added {}", label(library)));
    }

    fn after_library_renamed(&self, library: &LibraryData, old_name: Option<&str>) {
        self.push(format!("renamed {} -> {}", old_name.unwrap_or("<unnamed>"), label(library)));
    }

    fn before_library_removed(&self, library: &LibraryData) {
        self.push(format!("before-remove {}", label(library)));
    }

    fn after_library_removed(&self, library: &LibraryData) {
        self.push(format!("removed {}", label(library)));
    }
}

impl ModelListener for RecordingListener {
    fn committed(&self, batch: &CommitBatch) {
        self.push(format!("commit {} ({} changes)", batch.generation, batch.changes.len()));
    }
}

//! Change computation between two generations

use serde::{Deserialize, Serialize};

use crate::ids::{LibraryId, ModuleId, SdkId};
use crate::model::LibraryOwner;
use crate::state::ProjectState;

/// One observable change produced by a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelChange {
    // ── Modules ─────────────────────────────────────────────
    ModuleAdded { module: ModuleId, name: String },
    ModuleRenamed { module: ModuleId, old_name: String, new_name: String },
    /// Order entries changed.
    ModuleDependenciesChanged { module: ModuleId },
    /// Content roots or compiler output changed.
    ModuleContentChanged { module: ModuleId },
    ModuleRemoved { module: ModuleId, name: String },

    // ── Libraries ───────────────────────────────────────────
    LibraryAdded { library: LibraryId, owner: LibraryOwner },
    LibraryRenamed { library: LibraryId, old_name: Option<String> },
    LibraryRootsChanged { library: LibraryId },
    LibraryRemoved { library: LibraryId, owner: LibraryOwner },

    // ── SDKs ────────────────────────────────────────────────
    SdkAdded { sdk: SdkId },
    SdkChanged { sdk: SdkId },
    SdkRemoved { sdk: SdkId },
    ProjectSdkChanged { old: Option<String>, new: Option<String> },
}

impl ModelChange {
    /// Changes that can alter module-to-module dependency edges.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ModelChange::ModuleAdded { .. }
                | ModelChange::ModuleRenamed { .. }
                | ModelChange::ModuleDependenciesChanged { .. }
                | ModelChange::ModuleRemoved { .. }
        )
    }
}

/// Compute the difference between two registry states.
pub fn compute_changes(old: &ProjectState, new: &ProjectState) -> Vec<ModelChange> {
    let mut changes = Vec::new();

    // Modules added or modified
    for module in new.modules() {
        match old.module(module.id) {
            None => changes.push(ModelChange::ModuleAdded {
                module: module.id,
                name: module.name.clone(),
            }),
            Some(previous) => {
                if previous.name != module.name {
                    changes.push(ModelChange::ModuleRenamed {
                        module: module.id,
                        old_name: previous.name.clone(),
                        new_name: module.name.clone(),
                    });
                }
                if previous.root_model.dependencies_differ(&module.root_model) {
                    changes.push(ModelChange::ModuleDependenciesChanged { module: module.id });
                }
                if previous.root_model.content_differs(&module.root_model) {
                    changes.push(ModelChange::ModuleContentChanged { module: module.id });
                }
            }
        }
    }

    // Modules removed
    for module in old.modules() {
        if new.module(module.id).is_none() {
            changes.push(ModelChange::ModuleRemoved {
                module: module.id,
                name: module.name.clone(),
            });
        }
    }

    for library in new.libraries() {
        match old.library(library.id) {
            None => changes.push(ModelChange::LibraryAdded {
                library: library.id,
                owner: library.owner.clone(),
            }),
            Some(previous) => {
                if previous.name != library.name {
                    changes.push(ModelChange::LibraryRenamed {
                        library: library.id,
                        old_name: previous.name.clone(),
                    });
                }
                if previous.roots != library.roots || previous.kind != library.kind {
                    changes.push(ModelChange::LibraryRootsChanged { library: library.id });
                }
            }
        }
    }

    for library in old.libraries() {
        if new.library(library.id).is_none() {
            changes.push(ModelChange::LibraryRemoved {
                library: library.id,
                owner: library.owner.clone(),
            });
        }
    }

    for sdk in new.sdks() {
        match old.sdk(sdk.id) {
            None => changes.push(ModelChange::SdkAdded { sdk: sdk.id }),
            Some(previous) if previous != sdk => changes.push(ModelChange::SdkChanged { sdk: sdk.id }),
            Some(_) => {}
        }
    }

    for sdk in old.sdks() {
        if new.sdk(sdk.id).is_none() {
            changes.push(ModelChange::SdkRemoved { sdk: sdk.id });
        }
    }

    if old.project_sdk != new.project_sdk {
        changes.push(ModelChange::ProjectSdkChanged {
            old: old.project_sdk.clone(),
            new: new.project_sdk.clone(),
        });
    }

    changes
}

//! Arbor Model: versioned project model of modules, libraries, SDKs and snapshots

pub mod config;
pub mod diff;
pub mod error;
pub mod events;
pub mod ids;
pub mod library_table;
pub mod model;
pub mod registry;
pub mod root_model;
pub mod snapshot;
pub mod state;


#[cfg(test)]
pub mod test_utils;

pub use config::RegistryConfig;
pub use diff::{ModelChange, compute_changes};
pub use error::{ModelError, Result};
pub use events::{CommitBatch, CommitRecord, LibraryTableListener, ListenerId, ModelListener};
pub use ids::{EntityId, Generation, LibraryId, ModuleId, SdkId};
pub use library_table::{LibraryEditor, LibraryTable, LibraryTableModel, ModuleLibraryTable};
pub use model::{
    ContentRoot, DependencyScope, DependencyTarget, LibraryData, LibraryOwner, LibraryTableId, ModuleData, OrderEntry,
    OrderEntryKind, OrderEntryTarget, OrderRootType, RootModel, SdkData, SdkRef, SourceFolder, SourceRootType,
};
pub use registry::Registry;
pub use root_model::ModifiableRootModel;
pub use snapshot::ProjectSnapshot;
pub use state::{DanglingReference, EntityLookup, OrderEntryInfo, ProjectState, Resolution};

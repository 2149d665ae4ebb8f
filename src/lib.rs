//! Arbor: versioned project model with a cached module dependency graph
//!
//! The model crate holds modules, libraries and SDKs behind snapshot/commit
//! transactions; the graph crate answers dependency and classpath queries
//! against committed generations. [`Project`] bundles the two.

pub mod logging;
pub mod project;

pub use arbor_graph as graph;
pub use arbor_model as model;

pub use arbor_graph::{DependencyEngine, GraphError, ModuleGraph, OrderEnumerator};
pub use arbor_model::{
    DependencyScope, Generation, LibraryTableId, ModelError, ModuleId, OrderRootType, ProjectSnapshot,
    ProjectState, Registry, RegistryConfig,
};
pub use project::Project;

//! Arbor Graph: module dependency graph, ordering and classpath enumeration

pub mod engine;
pub mod enumerator;
pub mod error;
pub mod graph;
pub mod handler;
pub mod order;


pub use engine::{DependencyEngine, EngineStatus};
pub use enumerator::{EnumeratedEntry, EnumeratedTarget, EnumerationFlags, OrderEnumerator};
pub use error::{GraphError, Result};
pub use graph::{DependencyEdge, ModuleGraph};
pub use handler::{ModulePolicy, OrderEnumerationHandler, OrderEnumerationHandlerFactory};
pub use order::{ModuleDependencyComparator, sorted_modules};

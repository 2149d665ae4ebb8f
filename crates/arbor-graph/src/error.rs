//! Errors surfaced by dependency graph queries

use arbor_model::{ModelError, ModuleId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("the dependency engine has been disposed")]
    Disposed,
    #[error("{0:?} is not part of the current generation")]
    UnknownModule(ModuleId),
    #[error(transparent)]
    Model(#[from] ModelError),
}

pub type Result<T, E = GraphError> = std::result::Result<T, E>;

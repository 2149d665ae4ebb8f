//! Errors surfaced by snapshot editing and commit

use thiserror::Error;

use crate::ids::{EntityId, Generation, LibraryId};
use crate::model::LibraryOwner;

#[derive(Debug, Error)]
pub enum ModelError {
    /// A concurrently committed snapshot removed an entity this one touches.
    /// Re-open a snapshot and re-apply the edit.
    #[error("stale base {base}: {entity} was removed by a concurrent commit (current {current})")]
    StaleBase {
        entity: EntityId,
        base: Generation,
        current: Generation,
    },
    /// The snapshot was opened on a different registry; its ids mean
    /// nothing here.
    #[error("snapshot opened on {base} of another registry")]
    ForeignSnapshot { base: Generation },
    #[error("invalid order entry permutation: {reason}")]
    InvalidPermutation { reason: String },
    #[error("{0} is disposed")]
    Disposed(EntityId),
    #[error("{0} does not exist")]
    UnknownEntity(EntityId),
    #[error("a module named '{0}' already exists")]
    DuplicateModuleName(String),
    #[error("order entry index {index} out of bounds (len {len})")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error("the module source entry cannot be removed")]
    ModuleSourceEntry,
    #[error("order entry {index} has no scope or exported flag")]
    NotExportable { index: usize },
    #[error("content root '{0}' not found")]
    UnknownContentRoot(String),
    #[error("{library:?} is owned by {actual:?}, not {expected:?}")]
    WrongOwner {
        library: LibraryId,
        expected: LibraryOwner,
        actual: LibraryOwner,
    },
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ModelError {
    /// Whether re-opening a snapshot and retrying can succeed.
    pub fn is_stale_base(&self) -> bool {
        matches!(self, ModelError::StaleBase { .. })
    }
}

pub type Result<T, E = ModelError> = std::result::Result<T, E>;

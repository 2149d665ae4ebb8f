//! Stable entity identifiers and generation stamps

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique, stable identifier for a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleId(pub u64);

/// Unique, stable identifier for a library (table-level or module-level).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LibraryId(pub u64);

/// Unique, stable identifier for an SDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SdkId(pub u64);

/// Any entity the registry stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityId {
    Module(ModuleId),
    Library(LibraryId),
    Sdk(SdkId),
}

impl From<ModuleId> for EntityId {
    fn from(id: ModuleId) -> Self {
        EntityId::Module(id)
    }
}

impl From<LibraryId> for EntityId {
    fn from(id: LibraryId) -> Self {
        EntityId::Library(id)
    }
}

impl From<SdkId> for EntityId {
    fn from(id: SdkId) -> Self {
        EntityId::Sdk(id)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Module(id) => write!(f, "module#{}", id.0),
            EntityId::Library(id) => write!(f, "library#{}", id.0),
            EntityId::Sdk(id) => write!(f, "sdk#{}", id.0),
        }
    }
}

/// Version stamp of a committed registry state. Strictly increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Generation(pub u64);

impl Generation {
    /// The empty registry every process starts from.
    pub const INITIAL: Generation = Generation(0);

    #[inline]
    pub fn next(self) -> Generation {
        Generation(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen#{}", self.0)
    }
}

/// Hands out ids for every entity kind from one counter, so an id is never
/// reused across kinds or across snapshots.
#[derive(Debug)]
pub(crate) struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    pub(crate) fn new() -> Self {
        IdAllocator {
            next: AtomicU64::new(1),
        }
    }

    fn next_raw(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn module(&self) -> ModuleId {
        ModuleId(self.next_raw())
    }

    pub(crate) fn library(&self) -> LibraryId {
        LibraryId(self.next_raw())
    }

    pub(crate) fn sdk(&self) -> SdkId {
        SdkId(self.next_raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocator_never_repeats_across_kinds() {
        let ids = IdAllocator::new();
        let m = ids.module();
        let l = ids.library();
        let s = ids.sdk();

        assert_ne!(m.0, l.0);
        assert_ne!(l.0, s.0);
        assert!(s.0 > m.0);
    }

    #[test]
    fn test_entity_id_display() {
        assert_eq!(EntityId::from(ModuleId(3)).to_string(), "module#3");
        assert_eq!(EntityId::from(LibraryId(4)).to_string(), "library#4");
        assert_eq!(Generation(7).to_string(), "gen#7");
    }
}

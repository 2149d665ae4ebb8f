//! The entity registry and commit coordinator
//!
//! Readers load the current [`ProjectState`] lock-free. Writers open a
//! [`ProjectSnapshot`], edit it in isolation and commit; commits are
//! serialized and each one publishes a new generation atomically.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::{Mutex, ReentrantMutex};
use tracing::{debug, info, warn};

use crate::config::RegistryConfig;
use crate::diff::{ModelChange, compute_changes};
use crate::error::{ModelError, Result};
use crate::events::{CommitBatch, CommitRecord, LibraryTableListener, ListenerId, ListenerSet, ModelListener};
use crate::ids::{EntityId, Generation, IdAllocator};
use crate::library_table::LibraryTable;
use crate::model::LibraryTableId;
use crate::snapshot::ProjectSnapshot;
use crate::state::ProjectState;

/// Shared handle to one project's entity registry. Cloning is cheap.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    config: RegistryConfig,
    current: ArcSwap<ProjectState>,
    /// Reentrant so a listener may commit from inside a notification.
    commit_lock: ReentrantMutex<()>,
    ids: IdAllocator,
    disposed: DashMap<EntityId, Generation>,
    listeners: ListenerSet,
    history: Mutex<VecDeque<CommitRecord>>,
}

impl Registry {
    pub fn new(config: RegistryConfig) -> Self {
        let state = ProjectState::empty(config.project_name.clone());
        Registry {
            inner: Arc::new(RegistryInner {
                current: ArcSwap::from_pointee(state),
                commit_lock: ReentrantMutex::new(()),
                ids: IdAllocator::new(),
                disposed: DashMap::new(),
                listeners: ListenerSet::default(),
                history: Mutex::new(VecDeque::new()),
                config,
            }),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// Pin the current generation. The returned state never changes.
    pub fn current(&self) -> Arc<ProjectState> {
        self.inner.current.load_full()
    }

    pub fn generation(&self) -> Generation {
        self.inner.current.load().generation()
    }

    /// Open a snapshot on the current generation.
    pub fn open(&self) -> ProjectSnapshot {
        ProjectSnapshot::new(self.clone(), self.current())
    }

    pub fn commit(&self, snapshot: ProjectSnapshot) -> Result<Generation> {
        self.commit_all(vec![snapshot])
    }

    /// Merge several snapshots into one generation. Either all of them land
    /// or none does; on failure the snapshots are disposed.
    pub fn commit_all(&self, mut snapshots: Vec<ProjectSnapshot>) -> Result<Generation> {
        let _guard = self.inner.commit_lock.lock();
        let current = self.inner.current.load_full();

        let mut working = current.working();
        if let Some(foreign) = snapshots.iter().find(|snapshot| !snapshot.is_from(self)) {
            let err = ModelError::ForeignSnapshot {
                base: foreign.base_generation(),
            };
            warn!("Commit rejected: {}", err);
            return Err(err);
        }

        for snapshot in &snapshots {
            if let Err(err) = snapshot.apply_to(&mut working, current.generation()) {
                warn!("Commit rejected: {}", err);
                return Err(err);
            }
        }

        let swept = working.sweep_unlisted_module_libraries();
        if swept > 0 {
            debug!("Dropped {} module libraries no longer listed by their module", swept);
        }

        let mut names = HashSet::new();
        for module in working.modules.values() {
            if !names.insert(module.name.as_str()) {
                let err = ModelError::DuplicateModuleName(module.name.clone());
                warn!("Commit rejected: {}", err);
                return Err(err);
            }
        }
        drop(names);

        let generation = current.generation().next();
        let mut next = current.freeze(working, generation);
        let changes = compute_changes(&current, &next);
        for snapshot in &mut snapshots {
            snapshot.mark_committed();
        }

        if changes.is_empty() {
            debug!("Commit produced no changes, staying at {}", current.generation());
            return Ok(current.generation());
        }
        if changes.iter().any(ModelChange::is_structural) {
            next.structure_generation = generation;
        }

        let next = Arc::new(next);
        self.inner.current.store(Arc::clone(&next));

        for change in &changes {
            match change {
                ModelChange::ModuleRemoved { module, .. } => self.mark_disposed((*module).into()),
                ModelChange::LibraryRemoved { library, .. } => self.mark_disposed((*library).into()),
                ModelChange::SdkRemoved { sdk } => self.mark_disposed((*sdk).into()),
                _ => {}
            }
        }

        let committed_at = Utc::now();
        self.record(CommitRecord {
            generation,
            committed_at,
            snapshots: snapshots.len(),
            changes: changes.len(),
        });

        info!(
            "Committed {} ({} changes from {} snapshot(s))",
            generation,
            changes.len(),
            snapshots.len()
        );

        if self.inner.config.report_dangling_references {
            for dangling in next.dangling_references() {
                warn!(
                    "Dangling order entry {} in {}: '{}' does not resolve",
                    dangling.index,
                    EntityId::from(dangling.module),
                    dangling.entry.presentable_name()
                );
            }
        }

        let batch = CommitBatch {
            generation,
            previous: current.generation(),
            committed_at,
            changes,
            old_state: current,
            new_state: next,
        };
        self.inner.listeners.dispatch(&batch);

        Ok(generation)
    }

    fn record(&self, record: CommitRecord) {
        let limit = self.inner.config.history_limit;
        if limit == 0 {
            return;
        }
        let mut history = self.inner.history.lock();
        while history.len() >= limit {
            history.pop_front();
        }
        history.push_back(record);
    }

    /// Recent commits, oldest first.
    pub fn history(&self) -> Vec<CommitRecord> {
        self.inner.history.lock().iter().cloned().collect()
    }

    /// View of one shared library table.
    pub fn library_table(&self, table: LibraryTableId) -> LibraryTable {
        LibraryTable::new(self.clone(), table)
    }

    /// Whether an entity was removed by a commit or discarded with its snapshot.
    pub fn is_disposed(&self, id: impl Into<EntityId>) -> bool {
        self.inner.disposed.contains_key(&id.into())
    }

    pub(crate) fn mark_disposed(&self, id: EntityId) {
        let generation = self.generation();
        self.inner.disposed.entry(id).or_insert(generation);
    }

    pub(crate) fn ids(&self) -> &IdAllocator {
        &self.inner.ids
    }

    pub(crate) fn same_registry(&self, other: &Registry) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn add_listener(&self, listener: Arc<dyn ModelListener>) -> ListenerId {
        self.inner.listeners.add_model(listener)
    }

    pub fn add_library_table_listener(
        &self,
        table: LibraryTableId,
        listener: Arc<dyn LibraryTableListener>,
    ) -> ListenerId {
        self.inner.listeners.add_table(table, listener)
    }

    /// Unregister a listener of either kind. Returns false if it was unknown.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.current.load();
        f.debug_struct("Registry")
            .field("project", &state.project_name())
            .field("generation", &state.generation())
            .field("modules", &state.module_count())
            .finish()
    }
}

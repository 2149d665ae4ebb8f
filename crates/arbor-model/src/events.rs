//! Commit batches and listener dispatch
//!
//! A commit produces one [`CommitBatch`]. After the new generation is
//! published, library table listeners are replayed phase by phase
//! (added, renamed, before-remove, after-remove) and then every model listener
//! receives the batch exactly once.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::diff::ModelChange;
use crate::ids::Generation;
use crate::model::{LibraryData, LibraryOwner, LibraryTableId};
use crate::state::ProjectState;

/// Handle returned when registering a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Everything one commit changed, with both pinned states.
#[derive(Debug, Clone)]
pub struct CommitBatch {
    pub generation: Generation,
    pub previous: Generation,
    pub committed_at: DateTime<Utc>,
    pub changes: Vec<ModelChange>,
    pub old_state: Arc<ProjectState>,
    pub new_state: Arc<ProjectState>,
}

impl CommitBatch {
    /// Whether module dependency edges may have changed.
    pub fn is_structural(&self) -> bool {
        self.changes.iter().any(ModelChange::is_structural)
    }
}

/// Summary kept in the registry's bounded commit history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitRecord {
    pub generation: Generation,
    pub committed_at: DateTime<Utc>,
    pub snapshots: usize,
    pub changes: usize,
}

/// Receives one call per committed batch.
pub trait ModelListener: Send + Sync {
    fn committed(&self, batch: &CommitBatch);
}

/// Structural notifications for one library table.
pub trait LibraryTableListener: Send + Sync {
    fn after_library_added(&self, _library: &LibraryData) {}
    fn after_library_renamed(&self, _library: &LibraryData, _old_name: Option<&str>) {}
    fn before_library_removed(&self, _library: &LibraryData) {}
    fn after_library_removed(&self, _library: &LibraryData) {}
}

type TableListeners = Vec<(ListenerId, LibraryTableId, Arc<dyn LibraryTableListener>)>;

#[derive(Default)]
pub(crate) struct ListenerSet {
    next_id: AtomicU64,
    model: RwLock<Vec<(ListenerId, Arc<dyn ModelListener>)>>,
    tables: RwLock<TableListeners>,
}

impl ListenerSet {
    fn allocate(&self) -> ListenerId {
        ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn add_model(&self, listener: Arc<dyn ModelListener>) -> ListenerId {
        let id = self.allocate();
        self.model.write().push((id, listener));
        id
    }

    pub(crate) fn add_table(&self, table: LibraryTableId, listener: Arc<dyn LibraryTableListener>) -> ListenerId {
        let id = self.allocate();
        self.tables.write().push((id, table, listener));
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut model = self.model.write();
        let before = model.len();
        model.retain(|(existing, _)| *existing != id);
        if model.len() != before {
            return true;
        }
        drop(model);

        let mut tables = self.tables.write();
        let before = tables.len();
        tables.retain(|(existing, _, _)| *existing != id);
        tables.len() != before
    }

    /// Replay a batch to subscribers. Lists are cloned first so listeners may
    /// register or remove listeners while being notified.
    pub(crate) fn dispatch(&self, batch: &CommitBatch) {
        let tables: TableListeners = self.tables.read().clone();
        if !tables.is_empty() {
            dispatch_library_events(&tables, batch);
        }

        let model: Vec<Arc<dyn ModelListener>> = self.model.read().iter().map(|(_, l)| Arc::clone(l)).collect();
        for listener in model {
            listener.committed(batch);
        }
    }
}

fn table_of(owner: &LibraryOwner) -> Option<&LibraryTableId> {
    match owner {
        LibraryOwner::Table(table) => Some(table),
        LibraryOwner::Module(_) => None,
    }
}

fn notify_table<F>(tables: &TableListeners, table: &LibraryTableId, mut call: F)
where
    F: FnMut(&dyn LibraryTableListener),
{
    for (_, listened, listener) in tables {
        if listened == table {
            call(listener.as_ref());
        }
    }
}

fn dispatch_library_events(tables: &TableListeners, batch: &CommitBatch) {
    // Phase 1: added
    for change in &batch.changes {
        if let ModelChange::LibraryAdded { library, owner } = change {
            if let (Some(table), Some(data)) = (table_of(owner), batch.new_state.library(*library)) {
                notify_table(tables, table, |l| l.after_library_added(data));
            }
        }
    }

    // Phase 2: renamed
    for change in &batch.changes {
        if let ModelChange::LibraryRenamed { library, old_name } = change {
            if let Some(data) = batch.new_state.library(*library) {
                if let Some(table) = data.table() {
                    notify_table(tables, table, |l| l.after_library_renamed(data, old_name.as_deref()));
                }
            }
        }
    }

    // Phase 3 and 4: removal, all "before" calls precede all "after" calls
    let removed: Vec<(&LibraryTableId, &LibraryData)> = batch
        .changes
        .iter()
        .filter_map(|change| match change {
            ModelChange::LibraryRemoved { library, owner } => {
                Some((table_of(owner)?, batch.old_state.library(*library)?))
            }
            _ => None,
        })
        .collect();

    for (table, data) in &removed {
        notify_table(tables, table, |l| l.before_library_removed(data));
    }
    for (table, data) in &removed {
        notify_table(tables, table, |l| l.after_library_removed(data));
    }
}

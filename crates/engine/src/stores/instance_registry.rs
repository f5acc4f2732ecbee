//! Registry of live instances.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::Mutex;

use mapshard_domain::{Instance, InstanceId};

/// An instance behind its own lock. State, occupants and queued arrivals
/// change together under this lock.
pub type InstanceCell = Arc<Mutex<Instance>>;

/// Authoritative map of instance id to instance.
///
/// Never hold a reference returned by the underlying map across an await;
/// every accessor hands out a cloned [`InstanceCell`].
#[derive(Default)]
pub struct InstanceRegistry {
    instances: DashMap<InstanceId, InstanceCell>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &InstanceId) -> Option<InstanceCell> {
        self.instances.get(id).map(|cell| cell.clone())
    }

    /// Return the instance registered under `id`, registering `make()` first
    /// if there is none. The flag is true when a new instance was registered.
    pub fn get_or_insert_with(
        &self,
        id: InstanceId,
        make: impl FnOnce() -> Instance,
    ) -> (InstanceCell, bool) {
        match self.instances.entry(id) {
            Entry::Occupied(existing) => (existing.get().clone(), false),
            Entry::Vacant(slot) => {
                let cell = Arc::new(Mutex::new(make()));
                slot.insert(cell.clone());
                (cell, true)
            }
        }
    }

    /// Register `instance` unless its id is taken.
    pub fn try_insert(&self, instance: Instance) -> Option<InstanceCell> {
        match self.instances.entry(instance.id().clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let cell = Arc::new(Mutex::new(instance));
                slot.insert(cell.clone());
                Some(cell)
            }
        }
    }

    /// Remove `id` only if it still maps to `cell`, so a stale teardown can
    /// never remove a newer instance registered under the same id.
    pub fn remove_if_same(&self, id: &InstanceId, cell: &InstanceCell) -> bool {
        self.instances
            .remove_if(id, |_, current| Arc::ptr_eq(current, cell))
            .is_some()
    }

    /// Snapshot of every registered instance.
    pub fn entries(&self) -> Vec<(InstanceId, InstanceCell)> {
        self.instances
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn count(&self) -> usize {
        self.instances.len()
    }
}

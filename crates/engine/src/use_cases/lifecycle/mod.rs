//! Instance lifecycle use cases.
//!
//! The orchestrator owns the instance registry and the player index and
//! drives every instance through its lifecycle:
//! - `create_*` registers an instance and spawns its provisioning pipeline
//! - `join` / `leave` mutate occupancy under the instance's lock
//! - empty instances are torn down by timers that re-check their epoch
//!
//! Locking rules: at most one instance lock is held at a time, registry and
//! index references are never held across an await, and collaborators are
//! only called after the instance lock has been released.

mod admission;
mod provisioning;
mod teardown;


use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};

use crate::infrastructure::config::LifecycleConfig;
use crate::infrastructure::event_bus::InstanceEventBus;
use crate::infrastructure::ports::{
    AccessPolicy, ClockPort, ContentLoader, EnvironmentProvider, PlayerTransport, RandomPort,
};
use crate::stores::{InstanceRegistry, PendingReleases, PlayerIndex};
use mapshard_domain::{
    Coordinate, GroupKey, Instance, InstanceEvent, InstanceId, InstanceState, JoinRejection,
    MapName, PlayerId, Visibility,
};

/// Length of the random code in private and group instance ids.
pub const INSTANCE_CODE_LENGTH: usize = 8;

/// Fresh codes tried before giving up on a unique private/group id.
const MAX_ID_ATTEMPTS: usize = 16;

/// Result of a join request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JoinOutcome {
    /// The player is an occupant and has been sent to the entry point.
    Joined { entry: Coordinate },
    /// The instance is still provisioning; the player is admitted (or
    /// rejected) once it is ready.
    Queued,
    Rejected(JoinRejection),
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Could not allocate a unique instance id for map {map} after {attempts} attempts")]
    IdSpaceExhausted { map: String, attempts: usize },
}

/// Read-only view of an instance at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceSnapshot {
    pub id: InstanceId,
    pub map_name: MapName,
    pub visibility: Visibility,
    pub state: InstanceState,
    pub created_at: DateTime<Utc>,
    pub environment_id: Option<String>,
    pub entry_point: Option<Coordinate>,
    pub occupants: Vec<PlayerId>,
    pub queued_arrivals: Vec<PlayerId>,
    pub failure: Option<String>,
}

impl From<&Instance> for InstanceSnapshot {
    fn from(instance: &Instance) -> Self {
        Self {
            id: instance.id().clone(),
            map_name: instance.map_name().clone(),
            visibility: instance.visibility(),
            state: instance.state(),
            created_at: instance.created_at(),
            environment_id: instance.environment().map(|e| e.id().to_string()),
            entry_point: instance.entry_point(),
            occupants: instance.occupants().iter().copied().collect(),
            queued_arrivals: instance.queued_arrivals().to_vec(),
            failure: instance.failure().map(str::to_string),
        }
    }
}

/// Creates, admits to and tears down map instances.
///
/// Cheap to clone; clones share the same registry, index and collaborators.
#[derive(Clone)]
pub struct InstanceOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    registry: InstanceRegistry,
    index: PlayerIndex,
    releases: PendingReleases,
    environments: Arc<dyn EnvironmentProvider>,
    content: Arc<dyn ContentLoader>,
    access: Arc<dyn AccessPolicy>,
    transport: Arc<dyn PlayerTransport>,
    clock: Arc<dyn ClockPort>,
    random: Arc<dyn RandomPort>,
    events: InstanceEventBus,
    config: LifecycleConfig,
    /// Single-permit lane for environment acquisition
    acquire_lane: Mutex<()>,
}

impl InstanceOrchestrator {
    pub fn new(
        environments: Arc<dyn EnvironmentProvider>,
        content: Arc<dyn ContentLoader>,
        access: Arc<dyn AccessPolicy>,
        transport: Arc<dyn PlayerTransport>,
        clock: Arc<dyn ClockPort>,
        random: Arc<dyn RandomPort>,
        events: InstanceEventBus,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: InstanceRegistry::new(),
                index: PlayerIndex::new(),
                releases: PendingReleases::new(),
                environments,
                content,
                access,
                transport,
                clock,
                random,
                events,
                config,
                acquire_lane: Mutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.inner.config
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Return the live public instance for `map`, creating it if there is none.
    ///
    /// Concurrent calls for the same map share one instance and one
    /// provisioning pipeline.
    pub fn create_public(&self, map: &MapName) -> InstanceId {
        let id = InstanceId::public(map);
        let (cell, created) = self.inner.registry.get_or_insert_with(id.clone(), || {
            Instance::new(id.clone(), map.clone(), Visibility::Public, self.inner.clock.now())
        });
        if created {
            self.start_provisioning(cell, id.clone(), map.clone(), Visibility::Public);
        } else {
            tracing::debug!(instance_id = %id, "Reusing live public instance");
        }
        id
    }

    /// Create a fresh code-gated instance of `map`.
    pub fn create_private(&self, map: &MapName) -> Result<InstanceId, LifecycleError> {
        self.create_unique(map, Visibility::Private, |code| InstanceId::private(map, code))
    }

    /// Create a fresh instance of `map` scoped to `group`.
    pub fn create_group(&self, map: &MapName, group: &GroupKey) -> Result<InstanceId, LifecycleError> {
        self.create_unique(map, Visibility::Group, |code| InstanceId::group(map, group, code))
    }

    fn create_unique(
        &self,
        map: &MapName,
        visibility: Visibility,
        make_id: impl Fn(&str) -> InstanceId,
    ) -> Result<InstanceId, LifecycleError> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = make_id(&self.inner.random.gen_code(INSTANCE_CODE_LENGTH));
            let instance = Instance::new(id.clone(), map.clone(), visibility, self.inner.clock.now());
            match self.inner.registry.try_insert(instance) {
                Some(cell) => {
                    self.start_provisioning(cell, id.clone(), map.clone(), visibility);
                    return Ok(id);
                }
                None => tracing::warn!(instance_id = %id, "Instance id collision, regenerating code"),
            }
        }
        Err(LifecycleError::IdSpaceExhausted {
            map: map.to_string(),
            attempts: MAX_ID_ATTEMPTS,
        })
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn get_instance(&self, id: &InstanceId) -> Option<InstanceSnapshot> {
        let cell = self.inner.registry.get(id)?;
        let instance = cell.lock().await;
        Some(InstanceSnapshot::from(&*instance))
    }

    /// Snapshots of every registered instance, ordered by id.
    pub async fn list_instances(&self) -> Vec<InstanceSnapshot> {
        let mut snapshots = Vec::new();
        for (_, cell) in self.inner.registry.entries() {
            let instance = cell.lock().await;
            snapshots.push(InstanceSnapshot::from(&*instance));
        }
        snapshots.sort_by(|a, b| a.id.cmp(&b.id));
        snapshots
    }

    /// The instance the player occupies or is queued for.
    pub fn player_instance(&self, player: PlayerId) -> Option<InstanceId> {
        self.inner.index.get(player)
    }

    pub fn instance_count(&self) -> usize {
        self.inner.registry.count()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InstanceEvent> {
        self.inner.events.subscribe()
    }

    fn publish(&self, event: InstanceEvent) {
        self.inner.events.publish(event);
    }
}

//! Instance aggregate - One ephemeral play session for a map
//!
//! # State Machine
//!
//! ```text
//! Creating ──► Waiting ──► Running ◄──► Ending
//!    │            │           │           │
//!    ▼            ▼           ▼           ▼
//!  Error ──────► Destroying ◄─────────────┘
//! ```
//!
//! - `Creating`: environment being provisioned; joiners are queued
//! - `Waiting`: ready, nobody admitted yet (no-join timeout armed)
//! - `Running`: at least one occupant
//! - `Ending`: empty, teardown scheduled after a grace period
//! - `Error`: provisioning failed; terminal until administrative removal
//! - `Destroying`: transient guard, the instance is being torn down
//!
//! # Rustic DDD Design
//!
//! - **Private fields**: all mutation goes through transition methods
//! - **Valid by construction**: illegal transitions return
//!   `DomainError::InvalidStateTransition` and leave the aggregate untouched
//!
//! The aggregate itself is not synchronized; the engine keeps each instance
//! behind its own lock so state, occupants and queued arrivals change as one
//! unit.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::{InstanceId, PlayerId};
use crate::value_objects::{Coordinate, EnvironmentHandle, MapName};

/// Who may discover and join an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Shared, one per map, addressed by a deterministic id
    Public,
    /// Code-gated, addressed by a random id
    Private,
    /// Scoped to a party/group key
    Group,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Public => write!(f, "public"),
            Visibility::Private => write!(f, "private"),
            Visibility::Group => write!(f, "group"),
        }
    }
}

/// Lifecycle state of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Creating,
    Waiting,
    Running,
    Ending,
    Error,
    Destroying,
}

impl InstanceState {
    /// Whether `self -> next` is an edge of the lifecycle graph.
    pub fn can_transition_to(self, next: InstanceState) -> bool {
        use InstanceState::*;
        matches!(
            (self, next),
            (Creating, Waiting)
                | (Creating, Error)
                | (Creating, Destroying)
                | (Waiting, Running)
                | (Waiting, Destroying)
                | (Running, Ending)
                | (Running, Destroying)
                | (Ending, Running)
                | (Ending, Destroying)
                | (Error, Destroying)
        )
    }

    /// Ready for direct admission (as opposed to queueing or refusal).
    pub fn accepts_players(self) -> bool {
        matches!(
            self,
            InstanceState::Waiting | InstanceState::Running | InstanceState::Ending
        )
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstanceState::Creating => "creating",
            InstanceState::Waiting => "waiting",
            InstanceState::Running => "running",
            InstanceState::Ending => "ending",
            InstanceState::Error => "error",
            InstanceState::Destroying => "destroying",
        };
        f.write_str(s)
    }
}

/// Why a join request (or a queued arrival during drain) was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum JoinRejection {
    #[error("Instance does not exist")]
    UnknownInstance,
    #[error("Player is already in this instance")]
    AlreadyPresent,
    #[error("Instance is not available")]
    Unavailable,
    #[error("Player is not allowed to join this map")]
    Denied,
    #[error("Instance is full")]
    Full,
}

/// Result of the admission gate for a player that passed identity checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Instance is still provisioning; the player goes to the arrival queue
    Queue,
    /// Instance is ready; policy and capacity checks decide
    Admit,
}

/// Everything the instance held at the moment it was marked for destruction.
#[derive(Debug, Clone, Default)]
pub struct Evicted {
    pub occupants: Vec<PlayerId>,
    pub queued: Vec<PlayerId>,
    pub environment: Option<EnvironmentHandle>,
}

impl Evicted {
    /// Every player that was attached to the instance, occupants first.
    pub fn players(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.occupants.iter().chain(self.queued.iter()).copied()
    }
}

/// A map instance
///
/// # Invariants
///
/// - `occupants` and `queued_arrivals` are disjoint
/// - `queued_arrivals` is only non-empty while `Creating`
/// - `entry_point` is set once the instance has left `Creating` successfully
/// - `teardown_epoch` increases on every entry to and exit from `Ending`
#[derive(Debug, Clone)]
pub struct Instance {
    // Identity
    id: InstanceId,
    map_name: MapName,
    visibility: Visibility,
    created_at: DateTime<Utc>,

    // Lifecycle
    state: InstanceState,
    environment: Option<EnvironmentHandle>,
    entry_point: Option<Coordinate>,
    failure: Option<String>,
    /// Identifies the currently valid scheduled teardown
    teardown_epoch: u64,

    // Occupancy
    occupants: HashSet<PlayerId>,
    /// Arrival order matters: drain admits in this order
    queued_arrivals: Vec<PlayerId>,
}

impl Instance {
    // =========================================================================
    // Constructor
    // =========================================================================

    /// Create a new instance in `Creating` state.
    pub fn new(
        id: InstanceId,
        map_name: MapName,
        visibility: Visibility,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            map_name,
            visibility,
            created_at,
            state: InstanceState::Creating,
            environment: None,
            entry_point: None,
            failure: None,
            teardown_epoch: 0,
            occupants: HashSet::new(),
            queued_arrivals: Vec::new(),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn id(&self) -> &InstanceId {
        &self.id
    }

    pub fn map_name(&self) -> &MapName {
        &self.map_name
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    pub fn environment(&self) -> Option<&EnvironmentHandle> {
        self.environment.as_ref()
    }

    pub fn entry_point(&self) -> Option<Coordinate> {
        self.entry_point
    }

    /// Reason recorded when provisioning failed.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn teardown_epoch(&self) -> u64 {
        self.teardown_epoch
    }

    pub fn occupants(&self) -> &HashSet<PlayerId> {
        &self.occupants
    }

    pub fn queued_arrivals(&self) -> &[PlayerId] {
        &self.queued_arrivals
    }

    pub fn occupant_count(&self) -> usize {
        self.occupants.len()
    }

    /// No occupants and nobody queued.
    pub fn is_empty(&self) -> bool {
        self.occupants.is_empty() && self.queued_arrivals.is_empty()
    }

    /// Whether the player is an occupant or a queued arrival.
    pub fn contains(&self, player: PlayerId) -> bool {
        self.occupants.contains(&player) || self.queued_arrivals.contains(&player)
    }

    pub fn is_destroying(&self) -> bool {
        self.state == InstanceState::Destroying
    }

    // =========================================================================
    // Fire-time checks
    // =========================================================================

    /// A grace-period teardown scheduled under `epoch` may proceed.
    pub fn is_teardown_due(&self, epoch: u64) -> bool {
        self.state == InstanceState::Ending && self.teardown_epoch == epoch && self.is_empty()
    }

    /// Ready but nobody ever joined.
    pub fn is_abandoned(&self) -> bool {
        self.state == InstanceState::Waiting && self.is_empty()
    }

    // =========================================================================
    // Admission
    // =========================================================================

    /// First stage of admission: identity and lifecycle checks.
    ///
    /// Policy and capacity are checked separately (see [`Self::check_capacity`])
    /// because they are skipped for queued arrivals until the drain.
    pub fn admission(&self, player: PlayerId) -> Result<Admission, JoinRejection> {
        if self.contains(player) {
            return Err(JoinRejection::AlreadyPresent);
        }
        match self.state {
            InstanceState::Creating => Ok(Admission::Queue),
            s if s.accepts_players() => Ok(Admission::Admit),
            _ => Err(JoinRejection::Unavailable),
        }
    }

    pub fn check_capacity(&self, max_occupants: usize) -> Result<(), JoinRejection> {
        if self.occupants.len() >= max_occupants {
            Err(JoinRejection::Full)
        } else {
            Ok(())
        }
    }

    /// Record a player who asked to join while provisioning.
    pub fn queue_arrival(&mut self, player: PlayerId) -> Result<(), DomainError> {
        if self.state != InstanceState::Creating {
            return Err(DomainError::invalid_state_transition(format!(
                "cannot queue arrivals on {} instance {}",
                self.state, self.id
            )));
        }
        if !self.contains(player) {
            self.queued_arrivals.push(player);
        }
        Ok(())
    }

    /// Add an occupant. Promotes `Waiting`/`Ending` to `Running`.
    ///
    /// Returns the state the instance was in before admission.
    pub fn admit(&mut self, player: PlayerId) -> Result<InstanceState, DomainError> {
        let previous = self.state;
        if !previous.accepts_players() {
            return Err(DomainError::invalid_state_transition(format!(
                "cannot admit players to {} instance {}",
                previous, self.id
            )));
        }
        self.queued_arrivals.retain(|p| *p != player);
        self.occupants.insert(player);
        if previous != InstanceState::Running {
            self.transition(InstanceState::Running)?;
        }
        Ok(previous)
    }

    /// Remove a player from occupants and the arrival queue.
    ///
    /// Returns false if the player was not attached to this instance.
    pub fn remove_player(&mut self, player: PlayerId) -> bool {
        let was_occupant = self.occupants.remove(&player);
        let queued_before = self.queued_arrivals.len();
        self.queued_arrivals.retain(|p| *p != player);
        was_occupant || self.queued_arrivals.len() != queued_before
    }

    /// Hand the arrival queue to the drain step, leaving it empty.
    pub fn take_queued(&mut self) -> Vec<PlayerId> {
        std::mem::take(&mut self.queued_arrivals)
    }

    // =========================================================================
    // Provisioning transitions
    // =========================================================================

    /// Record the environment acquired for this instance.
    pub fn attach_environment(&mut self, environment: EnvironmentHandle) -> Result<(), DomainError> {
        if self.state != InstanceState::Creating {
            return Err(DomainError::invalid_state_transition(format!(
                "cannot attach an environment to {} instance {}",
                self.state, self.id
            )));
        }
        self.environment = Some(environment);
        Ok(())
    }

    /// `Creating -> Waiting` with the resolved entry point.
    pub fn mark_ready(&mut self, entry_point: Coordinate) -> Result<(), DomainError> {
        self.transition(InstanceState::Waiting)?;
        self.entry_point = Some(entry_point);
        Ok(())
    }

    /// `Creating -> Error`. Returns the queued arrivals, which can never be
    /// admitted now.
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> Result<Vec<PlayerId>, DomainError> {
        self.transition(InstanceState::Error)?;
        self.failure = Some(reason.into());
        Ok(self.take_queued())
    }

    // =========================================================================
    // Teardown transitions
    // =========================================================================

    /// `Running -> Ending` for an empty instance. Returns the epoch the
    /// scheduled teardown must present at fire time.
    pub fn begin_ending(&mut self) -> Result<u64, DomainError> {
        if !self.is_empty() {
            return Err(DomainError::invalid_state_transition(format!(
                "instance {} is not empty",
                self.id
            )));
        }
        self.transition(InstanceState::Ending)?;
        Ok(self.teardown_epoch)
    }

    /// `Ending -> Running` when a teardown fires on a non-empty instance.
    pub fn resume_running(&mut self) -> Result<(), DomainError> {
        self.transition(InstanceState::Running)
    }

    /// Enter `Destroying` from any other state, handing back everything the
    /// instance held. The environment is moved out so it is released once.
    pub fn mark_destroying(&mut self) -> Result<Evicted, DomainError> {
        self.transition(InstanceState::Destroying)?;
        Ok(Evicted {
            occupants: self.occupants.drain().collect(),
            queued: self.take_queued(),
            environment: self.environment.take(),
        })
    }

    fn transition(&mut self, next: InstanceState) -> Result<(), DomainError> {
        if !self.state.can_transition_to(next) {
            return Err(DomainError::invalid_state_transition(format!(
                "{} -> {} for instance {}",
                self.state, next, self.id
            )));
        }
        if self.state == InstanceState::Ending || next == InstanceState::Ending {
            self.teardown_epoch += 1;
        }
        self.state = next;
        Ok(())
    }
}

//! Domain Events
//!
//! Coarse-grained events representing significant changes in an instance's
//! lifecycle. The engine publishes them on its event bus; add-ons and
//! front-ends subscribe to react to joins, leaves and teardown.

use serde::{Deserialize, Serialize};

use crate::aggregates::{JoinRejection, Visibility};
use crate::ids::{InstanceId, PlayerId};
use crate::value_objects::{Coordinate, MapName};

/// What triggered the destruction of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeardownCause {
    /// Instance stayed empty for the whole grace period
    GracePeriodExpired,
    /// Instance became ready but nobody joined in time
    NoPlayersJoined,
    /// Bulk cleanup of private and group instances
    Cleanup,
    /// Explicit administrative removal
    Administrative,
}

/// Domain event for instance lifecycle changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InstanceEvent {
    Created {
        instance_id: InstanceId,
        map_name: MapName,
        visibility: Visibility,
    },
    Ready {
        instance_id: InstanceId,
        entry_point: Coordinate,
        reused_environment: bool,
    },
    Failed {
        instance_id: InstanceId,
        reason: String,
    },
    PlayerQueued {
        instance_id: InstanceId,
        player_id: PlayerId,
    },
    PlayerJoined {
        instance_id: InstanceId,
        player_id: PlayerId,
    },
    PlayerLeft {
        instance_id: InstanceId,
        player_id: PlayerId,
    },
    /// A queued arrival failed re-validation during the drain
    ArrivalRejected {
        instance_id: InstanceId,
        player_id: PlayerId,
        reason: JoinRejection,
    },
    TeardownScheduled {
        instance_id: InstanceId,
        delay_ms: u64,
    },
    /// A scheduled teardown fired on an instance that was no longer empty
    TeardownAborted {
        instance_id: InstanceId,
    },
    Destroyed {
        instance_id: InstanceId,
        cause: TeardownCause,
    },
}

impl InstanceEvent {
    /// The instance this event concerns.
    pub fn instance_id(&self) -> &InstanceId {
        match self {
            InstanceEvent::Created { instance_id, .. }
            | InstanceEvent::Ready { instance_id, .. }
            | InstanceEvent::Failed { instance_id, .. }
            | InstanceEvent::PlayerQueued { instance_id, .. }
            | InstanceEvent::PlayerJoined { instance_id, .. }
            | InstanceEvent::PlayerLeft { instance_id, .. }
            | InstanceEvent::ArrivalRejected { instance_id, .. }
            | InstanceEvent::TeardownScheduled { instance_id, .. }
            | InstanceEvent::TeardownAborted { instance_id }
            | InstanceEvent::Destroyed { instance_id, .. } => instance_id,
        }
    }
}

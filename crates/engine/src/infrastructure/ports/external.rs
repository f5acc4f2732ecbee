//! External collaborator port traits (environments, content, access, transport).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use mapshard_domain::{Coordinate, EnvironmentHandle, InstanceId, JoinRejection, MapName, PlayerId};

use super::error::{ContentError, EnvironmentError, TransportError};

// =============================================================================
// Environment Provider
// =============================================================================

/// Result of a successful environment acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredEnvironment {
    pub handle: EnvironmentHandle,
    /// The environment already existed (persisted from an earlier run);
    /// its content is in place and population is skipped.
    pub reused: bool,
}

/// Creates and destroys isolated environments ("worlds").
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EnvironmentProvider: Send + Sync {
    /// Load or create the environment `env_id`.
    ///
    /// `Ok(None)` means the provider declined without a specific error.
    async fn acquire(&self, env_id: &str) -> Result<Option<AcquiredEnvironment>, EnvironmentError>;

    /// Unload the environment. Returns false if it was not loaded.
    async fn release(&self, environment: &EnvironmentHandle) -> bool;

    /// Delete any persisted storage for `env_id`. Returns false if nothing
    /// was stored.
    async fn purge(&self, env_id: &str) -> bool;
}

// =============================================================================
// Content Loader
// =============================================================================

/// Where to look for the entry marker after a paste.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerHint {
    pub map_name: MapName,
    pub origin: Coordinate,
}

/// Populates environments from structured content packages.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentLoader: Send + Sync {
    /// Paste the package registered for `map` into `environment` at `origin`.
    ///
    /// Returns the entry coordinate when the package declares one.
    async fn populate(
        &self,
        map: &MapName,
        environment: &EnvironmentHandle,
        origin: Coordinate,
    ) -> Result<Option<Coordinate>, ContentError>;

    /// Scan the volume of the map's package pasted at `hint.origin` for the
    /// entry marker.
    async fn locate_marker(
        &self,
        environment: &EnvironmentHandle,
        hint: &MarkerHint,
    ) -> Result<Option<Coordinate>, ContentError>;

    /// Package registered for a map, if any.
    fn package_for(&self, map: &MapName) -> Option<String>;

    /// Maps with a registered package.
    fn available_maps(&self) -> Vec<MapName>;

    /// Copy a raw package from the import area under a new name.
    async fn import_package(&self, source: &str, target: &str) -> Result<(), ContentError>;

    /// Delete a raw package. Returns false if it did not exist.
    async fn remove_package(&self, name: &str) -> Result<bool, ContentError>;

    /// Re-read the map catalog. Returns the number of registered maps.
    async fn reload_catalog(&self) -> Result<usize, ContentError>;
}

// =============================================================================
// Access Policy
// =============================================================================

/// Admission rules consulted on every direct join and every drained arrival.
#[cfg_attr(test, mockall::automock)]
pub trait AccessPolicy: Send + Sync {
    fn can_join(&self, player: PlayerId, map: &MapName) -> bool;
    fn max_occupants(&self) -> usize;
}

// =============================================================================
// Player Transport
// =============================================================================

/// Message delivered to a player outside of the join call itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerNotice {
    /// The instance is still being prepared; the player will be moved in later.
    Queued { instance_id: InstanceId },
    /// A queued arrival was refused once the instance became ready.
    Rejected {
        instance_id: InstanceId,
        reason: JoinRejection,
    },
    /// The instance the player was in has been closed.
    InstanceClosed { instance_id: InstanceId },
}

/// Moves players between instances. Connection handling is external.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlayerTransport: Send + Sync {
    async fn send_to_entry(
        &self,
        player: PlayerId,
        instance: &InstanceId,
        entry: Coordinate,
    ) -> Result<(), TransportError>;

    async fn return_to_lobby(&self, player: PlayerId) -> Result<(), TransportError>;

    async fn notify(&self, player: PlayerId, notice: PlayerNotice) -> Result<(), TransportError>;
}

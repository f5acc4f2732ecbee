//! Provisioning pipeline: acquire, populate, locate entry, drain arrivals.

use std::time::Duration;

use mapshard_domain::{
    Coordinate, DomainError, EnvironmentHandle, Instance, InstanceEvent, InstanceId,
    JoinRejection, MapName, PlayerId, Visibility,
};

use super::InstanceOrchestrator;
use crate::infrastructure::ports::{
    AcquiredEnvironment, ContentError, EnvironmentError, MarkerHint, PlayerNotice,
};
use crate::stores::InstanceCell;

/// Acquire attempts while the environment is still held by a predecessor.
const ACQUIRE_IN_USE_ATTEMPTS: u32 = 5;

const ACQUIRE_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Why a pipeline stopped before the instance became ready.
#[derive(Debug, thiserror::Error)]
enum ProvisioningError {
    #[error(transparent)]
    Environment(#[from] EnvironmentError),

    #[error("Environment provider returned no environment")]
    Declined,

    #[error(transparent)]
    Content(#[from] ContentError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The instance was destroyed while the pipeline was running.
    #[error("Instance destroyed during provisioning")]
    Cancelled,
}

/// What the drain decided for the queued arrivals.
#[derive(Default)]
struct Drained {
    admitted: Vec<PlayerId>,
    rejected: Vec<(PlayerId, JoinRejection)>,
}

impl InstanceOrchestrator {
    pub(super) fn start_provisioning(
        &self,
        cell: InstanceCell,
        id: InstanceId,
        map: MapName,
        visibility: Visibility,
    ) {
        tracing::info!(instance_id = %id, map = %map, visibility = %visibility, "Instance created");
        self.publish(InstanceEvent::Created {
            instance_id: id.clone(),
            map_name: map.clone(),
            visibility,
        });

        let this = self.clone();
        tokio::spawn(async move {
            match this.provision(&cell, &id, &map).await {
                Ok(()) => {}
                Err(ProvisioningError::Cancelled) => {
                    tracing::debug!(instance_id = %id, "Provisioning stopped, instance destroyed");
                }
                Err(e) => this.fail(&cell, &id, e.to_string()).await,
            }
        });
    }

    async fn provision(
        &self,
        cell: &InstanceCell,
        id: &InstanceId,
        map: &MapName,
    ) -> Result<(), ProvisioningError> {
        let config = &self.inner.config;

        // 1. Environment
        let acquired = self.acquire_environment(id).await?;
        let handle = acquired.handle.clone();
        {
            let mut instance = cell.lock().await;
            if instance.is_destroying() {
                drop(instance);
                self.discard_environment(id, &acquired).await;
                return Err(ProvisioningError::Cancelled);
            }
            instance.attach_environment(handle.clone())?;
        }

        // 2. Content
        let reported = if acquired.reused {
            tracing::info!(instance_id = %id, "Reusing existing environment, skipping population");
            None
        } else {
            self.inner
                .content
                .populate(map, &handle, config.paste_origin)
                .await?
        };

        // 3. Entry point
        let entry = match reported {
            Some(entry) => entry,
            None => self.locate_entry(id, map, &handle).await,
        };

        // 4-6. Ready, drain, promote or arm the no-join timeout
        let (drained, occupied) = {
            let mut instance = cell.lock().await;
            if instance.is_destroying() {
                return Err(ProvisioningError::Cancelled);
            }
            instance.mark_ready(entry)?;
            let drained = self.drain_arrivals(&mut instance, id, map)?;
            (drained, instance.occupant_count() > 0)
        };

        tracing::info!(
            instance_id = %id,
            entry = %entry,
            admitted = drained.admitted.len(),
            rejected = drained.rejected.len(),
            "Instance ready"
        );
        self.publish(InstanceEvent::Ready {
            instance_id: id.clone(),
            entry_point: entry,
            reused_environment: acquired.reused,
        });

        if !occupied {
            self.schedule_no_join_teardown(cell.clone(), id.clone());
        }

        for player in drained.admitted {
            self.send_to_entry(player, id, entry).await;
            self.publish(InstanceEvent::PlayerJoined {
                instance_id: id.clone(),
                player_id: player,
            });
        }
        for (player, reason) in drained.rejected {
            tracing::info!(instance_id = %id, player_id = %player, reason = %reason, "Queued arrival rejected");
            self.notify(
                player,
                PlayerNotice::Rejected {
                    instance_id: id.clone(),
                    reason,
                },
            )
            .await;
            self.publish(InstanceEvent::ArrivalRejected {
                instance_id: id.clone(),
                player_id: player,
                reason,
            });
        }
        Ok(())
    }

    /// Acquire the environment once any teardown of a previous instance with
    /// the same id has released it. `InUse` is retried a bounded number of
    /// times for a predecessor pipeline that is still discarding its copy.
    async fn acquire_environment(
        &self,
        id: &InstanceId,
    ) -> Result<AcquiredEnvironment, ProvisioningError> {
        self.inner.releases.wait(id).await;

        let mut attempt = 1;
        loop {
            let result = {
                let _lane = if self.inner.config.serialize_environment_acquire {
                    Some(self.inner.acquire_lane.lock().await)
                } else {
                    None
                };
                self.inner.environments.acquire(id.as_str()).await
            };
            match result {
                Ok(acquired) => return acquired.ok_or(ProvisioningError::Declined),
                Err(EnvironmentError::InUse(_)) if attempt < ACQUIRE_IN_USE_ATTEMPTS => {
                    tracing::debug!(instance_id = %id, attempt, "Environment still in use, retrying");
                    attempt += 1;
                    tokio::time::sleep(ACQUIRE_RETRY_DELAY).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Release an environment the instance never took ownership of.
    async fn discard_environment(&self, id: &InstanceId, acquired: &AcquiredEnvironment) {
        self.inner.environments.release(&acquired.handle).await;
        self.inner.environments.purge(id.as_str()).await;
    }

    /// Marker scan, then the configured fallback next to the paste origin.
    async fn locate_entry(
        &self,
        id: &InstanceId,
        map: &MapName,
        handle: &EnvironmentHandle,
    ) -> Coordinate {
        let config = &self.inner.config;
        let hint = MarkerHint {
            map_name: map.clone(),
            origin: config.paste_origin,
        };
        match self.inner.content.locate_marker(handle, &hint).await {
            Ok(Some(entry)) => return entry,
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(instance_id = %id, error = %e, "Marker scan failed");
            }
        }
        let fallback = config.paste_origin.offset(config.entry_fallback_offset);
        tracing::warn!(instance_id = %id, entry = %fallback, "No entry marker found, using fallback entry point");
        fallback
    }

    /// Re-run policy and capacity for every queued arrival in queue order.
    /// The queue is always left empty.
    fn drain_arrivals(
        &self,
        instance: &mut Instance,
        id: &InstanceId,
        map: &MapName,
    ) -> Result<Drained, DomainError> {
        let max = self.inner.access.max_occupants();
        let mut drained = Drained::default();
        for player in instance.take_queued() {
            // Moved on to another instance since queueing
            if self.inner.index.get(player).as_ref() != Some(id) {
                continue;
            }
            let verdict = if self.inner.access.can_join(player, map) {
                instance.check_capacity(max)
            } else {
                Err(JoinRejection::Denied)
            };
            match verdict {
                Ok(()) => {
                    instance.admit(player)?;
                    drained.admitted.push(player);
                }
                Err(reason) => {
                    self.inner.index.remove_if_points_to(player, id);
                    drained.rejected.push((player, reason));
                }
            }
        }
        Ok(drained)
    }

    /// `Creating -> Error`; queued arrivals are withdrawn and told the map is
    /// unavailable. The environment, if any, stays attached until the
    /// instance is destroyed.
    async fn fail(&self, cell: &InstanceCell, id: &InstanceId, reason: String) {
        let withdrawn = {
            let mut instance = cell.lock().await;
            if instance.is_destroying() {
                tracing::debug!(instance_id = %id, "Provisioning failed after destroy, ignoring");
                return;
            }
            match instance.mark_failed(reason.clone()) {
                Ok(withdrawn) => {
                    for player in &withdrawn {
                        self.inner.index.remove_if_points_to(*player, id);
                    }
                    withdrawn
                }
                Err(e) => {
                    tracing::warn!(instance_id = %id, error = %e, "Could not record provisioning failure");
                    return;
                }
            }
        };

        tracing::error!(instance_id = %id, reason = %reason, withdrawn = withdrawn.len(), "Provisioning failed");
        for player in withdrawn {
            self.notify(
                player,
                PlayerNotice::Rejected {
                    instance_id: id.clone(),
                    reason: JoinRejection::Unavailable,
                },
            )
            .await;
        }
        self.publish(InstanceEvent::Failed {
            instance_id: id.clone(),
            reason,
        });
    }
}

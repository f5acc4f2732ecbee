//! Teardown: grace and no-join timers, administrative destroy, bulk cleanup.
//!
//! Timers are never cancelled. When one fires it re-checks the instance
//! under its lock and does nothing if the instance moved on.

use futures_util::future::join_all;

use mapshard_domain::{Evicted, Instance, InstanceEvent, InstanceId, InstanceState, TeardownCause};

use super::InstanceOrchestrator;
use crate::infrastructure::ports::PlayerNotice;
use crate::stores::{InstanceCell, ReleaseTicket};

/// An instance that left the registry and still has to be released.
struct Teardown {
    evicted: Evicted,
    ticket: ReleaseTicket,
}

impl InstanceOrchestrator {
    /// Destroy the instance after the grace period unless teardown epoch
    /// `epoch` has been superseded by then.
    pub(super) fn schedule_grace_teardown(&self, cell: InstanceCell, id: InstanceId, epoch: u64) {
        let delay = self.inner.config.cleanup_delay;
        tracing::info!(instance_id = %id, delay_secs = delay.as_secs(), "Instance empty, teardown scheduled");
        self.publish(InstanceEvent::TeardownScheduled {
            instance_id: id.clone(),
            delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        });

        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.grace_period_expired(&cell, &id, epoch).await;
        });
    }

    /// Destroy a ready instance nobody joined within the no-join window.
    pub(super) fn schedule_no_join_teardown(&self, cell: InstanceCell, id: InstanceId) {
        let delay = self.inner.config.no_join_cleanup_delay;
        tracing::debug!(instance_id = %id, delay_secs = delay.as_secs(), "No-join timeout armed");

        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let teardown = {
                let mut instance = cell.lock().await;
                if !instance.is_abandoned() {
                    tracing::debug!(instance_id = %id, state = %instance.state(), "No-join timeout fired on active instance, ignoring");
                    return;
                }
                this.begin_destroy(&mut instance, &cell, &id)
            };
            if let Some(teardown) = teardown {
                this.finish_destroy(&id, teardown, TeardownCause::NoPlayersJoined).await;
            }
        });
    }

    async fn grace_period_expired(&self, cell: &InstanceCell, id: &InstanceId, epoch: u64) {
        let teardown = {
            let mut instance = cell.lock().await;
            if !instance.is_teardown_due(epoch) {
                let superseded = instance.teardown_epoch() != epoch;
                match instance.state() {
                    InstanceState::Ending if !superseded => {
                        // Still this epoch's Ending but occupied again
                        if let Err(e) = instance.resume_running() {
                            tracing::warn!(instance_id = %id, error = %e, "Could not resume instance");
                        }
                    }
                    InstanceState::Destroying => {
                        tracing::debug!(instance_id = %id, "Teardown fired on destroyed instance, ignoring");
                        return;
                    }
                    _ => {}
                }
                drop(instance);
                tracing::debug!(instance_id = %id, epoch, superseded, "Scheduled teardown aborted");
                self.publish(InstanceEvent::TeardownAborted {
                    instance_id: id.clone(),
                });
                return;
            }
            self.begin_destroy(&mut instance, cell, id)
        };
        if let Some(teardown) = teardown {
            self.finish_destroy(id, teardown, TeardownCause::GracePeriodExpired)
                .await;
        }
    }

    /// Administrative removal of one instance in any state.
    ///
    /// Returns false if the id is unknown or the instance is already being
    /// destroyed.
    pub async fn destroy(&self, id: &InstanceId) -> bool {
        let Some(cell) = self.inner.registry.get(id) else {
            return false;
        };
        let teardown = {
            let mut instance = cell.lock().await;
            self.begin_destroy(&mut instance, &cell, id)
        };
        match teardown {
            Some(teardown) => {
                self.finish_destroy(id, teardown, TeardownCause::Administrative)
                    .await;
                true
            }
            None => false,
        }
    }

    /// Destroy every private and group instance. Public instances are left
    /// alone. Returns the number of instances destroyed.
    pub async fn cleanup_all(&self) -> usize {
        let mut doomed = Vec::new();
        for (id, cell) in self.inner.registry.entries() {
            let mut instance = cell.lock().await;
            if instance.is_public() {
                continue;
            }
            if let Some(teardown) = self.begin_destroy(&mut instance, &cell, &id) {
                doomed.push((id, teardown));
            }
        }

        let count = doomed.len();
        join_all(
            doomed
                .into_iter()
                .map(|(id, teardown)| async move {
                    self.finish_destroy(&id, teardown, TeardownCause::Cleanup)
                        .await
                }),
        )
        .await;
        tracing::info!(destroyed = count, "Cleaned up private and group instances");
        count
    }

    /// Under the instance lock: enter `Destroying`, hold the id's release
    /// gate, then unregister the instance and its players. `None` if it is
    /// already being destroyed.
    fn begin_destroy(
        &self,
        instance: &mut Instance,
        cell: &InstanceCell,
        id: &InstanceId,
    ) -> Option<Teardown> {
        let evicted = match instance.mark_destroying() {
            Ok(evicted) => evicted,
            Err(e) => {
                tracing::debug!(instance_id = %id, error = %e, "Instance already being destroyed");
                return None;
            }
        };
        let ticket = self.inner.releases.begin(id);
        self.inner.registry.remove_if_same(id, cell);
        for player in evicted.players() {
            self.inner.index.remove_if_points_to(player, id);
        }
        Some(Teardown { evicted, ticket })
    }

    /// After the lock is released: release and purge the environment, open
    /// the id's release gate, then move players out. The registry entry is
    /// already gone at this point.
    async fn finish_destroy(&self, id: &InstanceId, teardown: Teardown, cause: TeardownCause) {
        let Teardown { evicted, ticket } = teardown;

        let environments = &self.inner.environments;
        if let Some(environment) = &evicted.environment {
            if !environments.release(environment).await {
                tracing::debug!(instance_id = %id, "Environment was not loaded at release");
            }
        }
        environments.purge(id.as_str()).await;
        self.inner.releases.finish(ticket);

        for player in &evicted.occupants {
            self.return_to_lobby(*player).await;
        }
        for player in evicted.players() {
            self.notify(
                player,
                PlayerNotice::InstanceClosed {
                    instance_id: id.clone(),
                },
            )
            .await;
        }

        tracing::info!(
            instance_id = %id,
            cause = ?cause,
            players = evicted.occupants.len() + evicted.queued.len(),
            "Instance destroyed"
        );
        self.publish(InstanceEvent::Destroyed {
            instance_id: id.clone(),
            cause,
        });
    }
}

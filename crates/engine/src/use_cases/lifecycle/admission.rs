//! Join and leave.

use mapshard_domain::{
    Admission, Coordinate, Instance, InstanceEvent, InstanceId, InstanceState, JoinRejection,
    PlayerId,
};

use super::{InstanceOrchestrator, JoinOutcome};
use crate::infrastructure::ports::PlayerNotice;

impl InstanceOrchestrator {
    /// Ask for `player` to be placed in instance `id`.
    ///
    /// Joining moves the player out of whatever instance they were in or
    /// queued for, so a player is only ever attached to one instance.
    pub async fn join(&self, player: PlayerId, id: &InstanceId) -> JoinOutcome {
        let Some(cell) = self.inner.registry.get(id) else {
            return JoinOutcome::Rejected(JoinRejection::UnknownInstance);
        };

        let mut instance = cell.lock().await;
        let admission = match instance.admission(player) {
            Ok(admission) => admission,
            Err(reason) => {
                tracing::debug!(instance_id = %id, player_id = %player, reason = %reason, "Join rejected");
                return JoinOutcome::Rejected(reason);
            }
        };

        match admission {
            Admission::Queue => {
                if let Err(e) = instance.queue_arrival(player) {
                    tracing::warn!(instance_id = %id, player_id = %player, error = %e, "Could not queue arrival");
                    return JoinOutcome::Rejected(JoinRejection::Unavailable);
                }
                let previous = self.inner.index.insert(player, id.clone());
                drop(instance);

                self.detach_previous(player, previous, id).await;
                tracing::info!(instance_id = %id, player_id = %player, "Player queued while instance is created");
                self.notify(
                    player,
                    PlayerNotice::Queued {
                        instance_id: id.clone(),
                    },
                )
                .await;
                self.publish(InstanceEvent::PlayerQueued {
                    instance_id: id.clone(),
                    player_id: player,
                });
                JoinOutcome::Queued
            }
            Admission::Admit => {
                if !self.inner.access.can_join(player, instance.map_name()) {
                    tracing::debug!(instance_id = %id, player_id = %player, "Join denied by access policy");
                    return JoinOutcome::Rejected(JoinRejection::Denied);
                }
                if let Err(reason) = instance.check_capacity(self.inner.access.max_occupants()) {
                    tracing::debug!(instance_id = %id, player_id = %player, "Join rejected, instance full");
                    return JoinOutcome::Rejected(reason);
                }
                let previous_state = match instance.admit(player) {
                    Ok(state) => state,
                    Err(e) => {
                        tracing::warn!(instance_id = %id, player_id = %player, error = %e, "Could not admit player");
                        return JoinOutcome::Rejected(JoinRejection::Unavailable);
                    }
                };
                let entry = self.entry_point_of(&instance);
                let previous = self.inner.index.insert(player, id.clone());
                drop(instance);

                if previous_state == InstanceState::Ending {
                    tracing::info!(instance_id = %id, player_id = %player, "Rejoin during grace period, teardown cancelled");
                }
                self.detach_previous(player, previous, id).await;
                tracing::info!(instance_id = %id, player_id = %player, "Player joined instance");
                self.send_to_entry(player, id, entry).await;
                self.publish(InstanceEvent::PlayerJoined {
                    instance_id: id.clone(),
                    player_id: player,
                });
                JoinOutcome::Joined { entry }
            }
        }
    }

    /// Remove `player` from the instance they occupy or are queued for and
    /// return them to the lobby. Returns false if they were in no instance.
    pub async fn leave(&self, player: PlayerId) -> bool {
        let Some(id) = self.inner.index.get(player) else {
            return false;
        };
        let Some(cell) = self.inner.registry.get(&id) else {
            self.inner.index.remove_if_points_to(player, &id);
            return false;
        };

        let (was_occupant, epoch) = {
            let mut instance = cell.lock().await;
            let was_occupant = instance.occupants().contains(&player);
            if !instance.remove_player(player) {
                return false;
            }
            self.inner.index.remove_if_points_to(player, &id);
            (was_occupant, self.begin_ending_if_empty(&mut instance))
        };

        tracing::info!(instance_id = %id, player_id = %player, "Player left instance");
        if was_occupant {
            self.return_to_lobby(player).await;
        }
        self.publish(InstanceEvent::PlayerLeft {
            instance_id: id.clone(),
            player_id: player,
        });
        if let Some(epoch) = epoch {
            self.schedule_grace_teardown(cell, id, epoch);
        }
        true
    }

    /// Take `player` out of the instance they were attached to before
    /// joining `current`. The previous instance may start its grace period.
    async fn detach_previous(
        &self,
        player: PlayerId,
        previous: Option<InstanceId>,
        current: &InstanceId,
    ) {
        let Some(previous) = previous.filter(|p| p != current) else {
            return;
        };
        let Some(cell) = self.inner.registry.get(&previous) else {
            return;
        };

        let epoch = {
            let mut instance = cell.lock().await;
            if !instance.remove_player(player) {
                return;
            }
            self.begin_ending_if_empty(&mut instance)
        };

        tracing::info!(instance_id = %previous, player_id = %player, moved_to = %current, "Player moved to another instance");
        self.publish(InstanceEvent::PlayerLeft {
            instance_id: previous.clone(),
            player_id: player,
        });
        if let Some(epoch) = epoch {
            self.schedule_grace_teardown(cell, previous, epoch);
        }
    }

    /// `Running -> Ending` once the last player is gone. Returns the epoch
    /// the grace-period teardown must present.
    fn begin_ending_if_empty(&self, instance: &mut Instance) -> Option<u64> {
        if instance.state() != InstanceState::Running || !instance.is_empty() {
            return None;
        }
        match instance.begin_ending() {
            Ok(epoch) => Some(epoch),
            Err(e) => {
                tracing::warn!(instance_id = %instance.id(), error = %e, "Could not begin ending");
                None
            }
        }
    }

    fn entry_point_of(&self, instance: &Instance) -> Coordinate {
        let config = &self.inner.config;
        instance
            .entry_point()
            .unwrap_or_else(|| config.paste_origin.offset(config.entry_fallback_offset))
    }

    // =========================================================================
    // Transport
    // =========================================================================

    pub(super) async fn send_to_entry(&self, player: PlayerId, id: &InstanceId, entry: Coordinate) {
        if let Err(e) = self.inner.transport.send_to_entry(player, id, entry).await {
            tracing::warn!(instance_id = %id, player_id = %player, error = %e, "Failed to send player to entry");
        }
    }

    pub(super) async fn return_to_lobby(&self, player: PlayerId) {
        if let Err(e) = self.inner.transport.return_to_lobby(player).await {
            tracing::warn!(player_id = %player, error = %e, "Failed to return player to lobby");
        }
    }

    pub(super) async fn notify(&self, player: PlayerId, notice: PlayerNotice) {
        if let Err(e) = self.inner.transport.notify(player, notice).await {
            tracing::warn!(player_id = %player, error = %e, "Failed to notify player");
        }
    }
}

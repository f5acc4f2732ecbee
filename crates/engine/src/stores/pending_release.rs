//! Environments whose teardown has unregistered the instance but not yet
//! released the environment.

use dashmap::DashMap;
use tokio::sync::watch;

use mapshard_domain::InstanceId;

/// Held by a teardown until its environment is released. Dropping it wakes
/// every pipeline waiting on the same id.
pub struct ReleaseTicket {
    id: InstanceId,
    gate: watch::Receiver<()>,
    _sender: watch::Sender<()>,
}

/// Per-id release gates, so a re-created instance does not try to acquire
/// an environment its predecessor still holds.
pub struct PendingReleases {
    gates: DashMap<InstanceId, watch::Receiver<()>>,
}

impl PendingReleases {
    pub fn new() -> Self {
        Self {
            gates: DashMap::new(),
        }
    }

    /// Open a gate for `id`. Must be called before the instance leaves the
    /// registry.
    pub fn begin(&self, id: &InstanceId) -> ReleaseTicket {
        let (sender, receiver) = watch::channel(());
        self.gates.insert(id.clone(), receiver.clone());
        ReleaseTicket {
            id: id.clone(),
            gate: receiver,
            _sender: sender,
        }
    }

    /// Close the ticket's gate. A newer gate for the same id is left alone.
    pub fn finish(&self, ticket: ReleaseTicket) {
        self.gates
            .remove_if(&ticket.id, |_, gate| gate.same_channel(&ticket.gate));
    }

    /// Wait until no teardown holds the environment for `id`.
    pub async fn wait(&self, id: &InstanceId) {
        // Clone out of the map; no shard lock across the await
        let Some(mut receiver) = self.gates.get(id).map(|gate| gate.clone()) else {
            return;
        };
        // Only ever resolves by the sender being dropped
        while receiver.changed().await.is_ok() {}
    }

    #[cfg(test)]
    pub fn is_pending(&self, id: &InstanceId) -> bool {
        self.gates.contains_key(id)
    }
}

impl Default for PendingReleases {
    fn default() -> Self {
        Self::new()
    }
}

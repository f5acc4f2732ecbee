//! Player transport used when no connection layer is attached.
//!
//! Hand-offs are only logged; the binary uses this until a real front-end
//! plugs its own [`PlayerTransport`] in.

use async_trait::async_trait;

use crate::infrastructure::ports::{PlayerNotice, PlayerTransport, TransportError};
use mapshard_domain::{Coordinate, InstanceId, PlayerId};

#[derive(Debug, Default)]
pub struct LoggingTransport;

impl LoggingTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PlayerTransport for LoggingTransport {
    async fn send_to_entry(
        &self,
        player: PlayerId,
        instance: &InstanceId,
        entry: Coordinate,
    ) -> Result<(), TransportError> {
        tracing::info!(player_id = %player, instance_id = %instance, entry = %entry, "Send player to entry");
        Ok(())
    }

    async fn return_to_lobby(&self, player: PlayerId) -> Result<(), TransportError> {
        tracing::info!(player_id = %player, "Return player to lobby");
        Ok(())
    }

    async fn notify(&self, player: PlayerId, notice: PlayerNotice) -> Result<(), TransportError> {
        tracing::info!(player_id = %player, notice = ?notice, "Player notice");
        Ok(())
    }
}

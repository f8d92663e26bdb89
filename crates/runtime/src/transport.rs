use async_trait::async_trait;

use shared::{domain::PeerId, protocol::Message};

/// External collaborator owning peer handles and socket I/O. The core
/// only lists known peers and hands messages over; framing, reconnects,
/// and retry policy live behind this seam.
#[async_trait]
pub trait PeerRegistry: Send + Sync {
    fn list_peers(&self) -> Vec<PeerId>;

    /// Deliver one message to one peer. Fire-and-forget from the core's
    /// point of view; errors are reported per target, never retried here.
    async fn send(&self, peer: &PeerId, message: &Message) -> anyhow::Result<()>;
}

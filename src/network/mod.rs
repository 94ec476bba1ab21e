//! Peer-facing seams of the synchronization engine
//!
//! Transport, handshake and framing are provided by the embedding node. The
//! sync protocols only see a connected [`Channel`] that can send and receive
//! typed [`SyncMessage`]s, obtained from a [`Connector`].

pub mod chain_access;
pub mod protocol;

pub use chain_access::ChainAccess;
pub use protocol::{
    GetDataMessage, GetHeadersMessage, HeadersMessage, InventoryItem, SyncMessage,
};

use crate::error::SyncError;
use std::net::SocketAddr;

/// A connected, handshaken peer
///
/// `recv` must be cancel-safe: the protocols poll it inside `tokio::select!`
/// alongside their timers and drop the future when a timer fires.
#[async_trait::async_trait]
pub trait Channel: Send {
    /// Remote address, for logging
    fn peer_addr(&self) -> SocketAddr;

    /// Protocol version agreed during the handshake
    fn version(&self) -> u32;

    async fn send(&mut self, message: SyncMessage) -> Result<(), SyncError>;

    /// Next inbound message; transport inactivity surfaces as `ChannelTimeout`
    async fn recv(&mut self) -> Result<SyncMessage, SyncError>;

    /// Drop the connection
    async fn close(&mut self) -> Result<(), SyncError> {
        Ok(())
    }
}

/// Source of new outbound peer connections
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Channel>, SyncError>;
}

//! Sync protocol messages
//!
//! Typed payloads exchanged with peers during catch-up. Framing and binary
//! encoding belong to the transport that implements [`super::Channel`].

use crate::primitives::{Block, BlockHeader, Hash};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Maximum headers a peer returns for one `getheaders`
pub const MAX_HEADERS_RESULTS: usize = 2000;

/// Maximum inventory entries in one `getdata`
pub const MAX_GET_DATA: usize = 50_000;

/// Inventory type for blocks
pub const MSG_BLOCK: u32 = 2;

/// `headers` message support
pub const HEADERS_VERSION: u32 = 31800;

/// Get headers message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetHeadersMessage {
    pub version: u32,
    pub block_locator_hashes: Vec<Hash>,
    pub hash_stop: Hash,
}

/// Headers message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadersMessage {
    pub headers: Vec<BlockHeader>,
}

/// Get data message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetDataMessage {
    pub inventory: Vec<InventoryItem>,
}

impl GetDataMessage {
    pub fn is_empty(&self) -> bool {
        self.inventory.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inventory.len()
    }
}

/// Inventory item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub inv_type: u32,
    pub hash: Hash,
}

impl InventoryItem {
    pub fn block(hash: Hash) -> Self {
        Self {
            inv_type: MSG_BLOCK,
            hash,
        }
    }
}

/// Messages the sync protocols send or react to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMessage {
    GetHeaders(GetHeadersMessage),
    Headers(HeadersMessage),
    GetData(GetDataMessage),
    Block(Arc<Block>),
    /// Anything else the channel delivers; ignored by the sync protocols
    Other(String),
}

impl SyncMessage {
    pub fn command(&self) -> &str {
        match self {
            SyncMessage::GetHeaders(_) => "getheaders",
            SyncMessage::Headers(_) => "headers",
            SyncMessage::GetData(_) => "getdata",
            SyncMessage::Block(_) => "block",
            SyncMessage::Other(command) => command,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_names() {
        assert_eq!(
            SyncMessage::Headers(HeadersMessage::default()).command(),
            "headers"
        );
        assert_eq!(SyncMessage::Other("ping".into()).command(), "ping");
    }

    #[test]
    fn test_inventory_block_item() {
        let item = InventoryItem::block([7u8; 32]);
        assert_eq!(item.inv_type, MSG_BLOCK);
        let request = GetDataMessage {
            inventory: vec![item],
        };
        assert_eq!(request.len(), 1);
        assert!(!request.is_empty());
    }
}

//! Block storage access for the synchronization engine
//!
//! The chain is owned by the embedding node. Sync only needs to hand it blocks
//! at known heights and ask how far it has got.

use crate::primitives::Block;
use anyhow::Result;
use std::sync::Arc;

/// Storage collaborator used by header and block sync
pub trait ChainAccess: Send + Sync {
    /// Store a block at `height`; an error means the chain rejected it
    fn insert(&self, block: Arc<Block>, height: u64) -> Result<()>;

    /// Height of the highest stored block
    fn last_height(&self) -> Result<u64>;
}

//! Block header and block types
//!
//! Only the context-free parts of header validation live here: the header must
//! carry a well-formed compact target that its own hash satisfies, and its
//! timestamp must not be too far in the future. Everything that needs chain
//! context (difficulty retargeting, median time past) belongs to the chain.

use super::hashing::double_sha256;
use super::Hash;
use crate::utils::current_timestamp;
use serde::{Deserialize, Serialize};

/// Maximum number of seconds a header timestamp may run ahead of local time
pub const MAX_FUTURE_BLOCK_TIME: u64 = 2 * 60 * 60;

/// Serialized header length
pub const HEADER_SIZE: usize = 80;

/// Bitcoin block header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_block_hash: Hash,
    pub merkle_root: Hash,
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    /// Serialize into the 80-byte wire layout used for hashing
    pub fn serialize(&self) -> [u8; HEADER_SIZE] {
        let mut data = [0u8; HEADER_SIZE];
        data[0..4].copy_from_slice(&self.version.to_le_bytes());
        data[4..36].copy_from_slice(&self.prev_block_hash);
        data[36..68].copy_from_slice(&self.merkle_root);
        data[68..72].copy_from_slice(&self.timestamp.to_le_bytes());
        data[72..76].copy_from_slice(&self.bits.to_le_bytes());
        data[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        data
    }

    /// Block hash (double SHA256 of the serialized header)
    pub fn hash(&self) -> Hash {
        double_sha256(&self.serialize())
    }

    /// Context-free validity check
    pub fn check(&self) -> bool {
        self.is_valid_proof_of_work() && self.is_valid_timestamp()
    }

    /// The hash, read as a little-endian 256-bit number, must not exceed the
    /// target encoded in `bits`
    pub fn is_valid_proof_of_work(&self) -> bool {
        let target = match compact_to_target(self.bits) {
            Some(target) if target != [0u8; 32] => target,
            _ => return false,
        };

        let mut value = self.hash();
        value.reverse();
        value <= target
    }

    fn is_valid_timestamp(&self) -> bool {
        u64::from(self.timestamp) <= current_timestamp() + MAX_FUTURE_BLOCK_TIME
    }
}

/// Expand a compact target into a big-endian 256-bit value
///
/// Returns `None` for negative or overflowing encodings.
pub fn compact_to_target(bits: u32) -> Option<[u8; 32]> {
    let exponent = (bits >> 24) as i32;
    let mantissa = bits & 0x007f_ffff;

    if bits & 0x0080_0000 != 0 && mantissa != 0 {
        return None;
    }

    let mut target = [0u8; 32];
    let bytes = [(mantissa >> 16) as u8, (mantissa >> 8) as u8, mantissa as u8];
    for (index, byte) in bytes.iter().enumerate() {
        // Byte `index` of the mantissa carries weight 256^(exponent - 1 - index)
        let power = exponent - 1 - index as i32;
        if power < 0 {
            continue;
        }
        if power >= 32 {
            if *byte != 0 {
                return None;
            }
            continue;
        }
        target[31 - power as usize] = *byte;
    }
    Some(target)
}

/// A block as delivered by a peer
///
/// Transactions are carried as raw serialized bytes; this crate never looks
/// inside them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Vec<u8>>,
}

impl Block {
    pub fn new(header: BlockHeader, transactions: Vec<Vec<u8>>) -> Self {
        Self {
            header,
            transactions,
        }
    }

    pub fn hash(&self) -> Hash {
        self.header.hash()
    }
}

//! Chain primitives used by the synchronization engine

pub mod checkpoint;
pub mod hashing;
pub mod header;

pub use checkpoint::Checkpoint;
pub use hashing::{decode_hash, double_sha256, encode_hash};
pub use header::{compact_to_target, Block, BlockHeader};

/// 32-byte digest in internal byte order
pub type Hash = [u8; 32];

#[cfg(test)]
pub(crate) mod test_support {
    use super::{Block, BlockHeader, Hash};

    /// Easiest valid compact target (regtest)
    pub const REGTEST_BITS: u32 = 0x207f_ffff;

    /// Mine `count` linked headers on top of `previous`, numbering from `base_height`
    pub fn mine_headers(previous: Hash, base_height: u64, count: usize) -> Vec<BlockHeader> {
        let mut headers = Vec::with_capacity(count);
        let mut previous = previous;
        for offset in 0..count as u64 {
            let height = base_height + offset;
            let mut header = BlockHeader {
                version: 1,
                prev_block_hash: previous,
                merkle_root: [height as u8; 32],
                timestamp: 1_296_688_602 + height as u32,
                bits: REGTEST_BITS,
                nonce: 0,
            };
            while !header.check() {
                header.nonce += 1;
            }
            previous = header.hash();
            headers.push(header);
        }
        headers
    }

    pub fn blocks_for(headers: &[BlockHeader]) -> Vec<Block> {
        headers
            .iter()
            .map(|header| Block::new(*header, vec![header.merkle_root.to_vec()]))
            .collect()
    }
}

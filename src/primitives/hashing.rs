//! Bitcoin-compatible hashing functions
//!
//! Block identity is the double SHA256 of the 80-byte serialized header.

use sha2::{Digest, Sha256};

/// Calculate Bitcoin double SHA256 hash
///
/// # Arguments
/// * `data` - The data to hash
///
/// # Returns
/// 32-byte hash as array, in internal (little-endian) byte order
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    let first_hash = Sha256::digest(data);
    let second_hash = Sha256::digest(first_hash);
    let mut result = [0u8; 32];
    result.copy_from_slice(&second_hash);
    result
}

/// Render a hash in display byte order (reversed, as block explorers show it)
pub fn encode_hash(hash: &[u8; 32]) -> String {
    let mut reversed = *hash;
    reversed.reverse();
    hex::encode(reversed)
}

/// Parse a display-order hex hash back into internal byte order
pub fn decode_hash(encoded: &str) -> anyhow::Result<[u8; 32]> {
    let bytes = hex::decode(encoded.trim())
        .map_err(|e| anyhow::anyhow!("Invalid hash hex '{}': {}", encoded, e))?;
    if bytes.len() != 32 {
        return Err(anyhow::anyhow!(
            "Invalid hash length: expected 32 bytes, got {}",
            bytes.len()
        ));
    }
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&bytes);
    hash.reverse();
    Ok(hash)
}

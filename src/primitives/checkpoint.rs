//! Trusted (height, hash) boundary markers

use super::hashing::{decode_hash, encode_hash};
use super::Hash;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A trusted block identity at a known height
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub hash: Hash,
    pub height: u64,
}

impl Checkpoint {
    pub fn new(hash: Hash, height: u64) -> Self {
        Self { hash, height }
    }

    /// Sort by ascending height and drop exact duplicates
    pub fn sort(checkpoints: &mut Vec<Checkpoint>) {
        checkpoints.sort_by_key(|checkpoint| checkpoint.height);
        checkpoints.dedup();
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", encode_hash(&self.hash), self.height)
    }
}

impl FromStr for Checkpoint {
    type Err = anyhow::Error;

    /// Parse `<hash>:<height>`, hash in display byte order
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (hash, height) = value
            .split_once(':')
            .ok_or_else(|| {
                anyhow::anyhow!("Checkpoint '{}' is not of the form hash:height", value)
            })?;
        let hash = decode_hash(hash)?;
        let height = height
            .trim()
            .parse::<u64>()
            .map_err(|e| anyhow::anyhow!("Invalid checkpoint height in '{}': {}", value, e))?;
        Ok(Self { hash, height })
    }
}

//! Configuration management for blvm-sync
//!
//! Handles configuration loading (TOML or JSON) and validation.

use crate::primitives::Checkpoint;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Synchronization tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Target number of concurrent block download connections
    #[serde(default = "default_sync_peers")]
    pub sync_peers: usize,

    /// Channel timeout basis; the rate window is three times this
    #[serde(default = "default_sync_timeout_seconds")]
    pub sync_timeout_seconds: u32,

    /// Minimum negotiated protocol version for block download peers
    #[serde(default = "default_protocol_minimum")]
    pub protocol_minimum: u32,

    /// Protocol version advertised in header requests
    #[serde(default = "default_protocol_maximum")]
    pub protocol_maximum: u32,

    /// Starting floor for header download rate (headers/second)
    #[serde(default = "default_minimum_header_rate")]
    pub minimum_header_rate: u32,

    /// Factor applied to the header rate floor after each failed attempt
    #[serde(default = "default_header_rate_back_off")]
    pub header_rate_back_off: f32,

    /// Protocol timer period for rate and expiry checks
    #[serde(default = "default_expiry_interval_seconds")]
    pub expiry_interval_seconds: u64,

    /// Block sync progress report period
    #[serde(default = "default_regulator_interval_seconds")]
    pub regulator_interval_seconds: u64,

    /// Maximum hashes one reservation pulls from the queue at a time
    #[serde(default = "default_max_request")]
    pub max_request: usize,

    /// Pause before retrying a failed connection attempt
    #[serde(default = "default_reconnect_delay_millis")]
    pub reconnect_delay_millis: u64,
}

fn default_sync_peers() -> usize {
    8
}

fn default_sync_timeout_seconds() -> u32 {
    5
}

fn default_protocol_minimum() -> u32 {
    31402
}

fn default_protocol_maximum() -> u32 {
    70015
}

fn default_minimum_header_rate() -> u32 {
    10_000
}

fn default_header_rate_back_off() -> f32 {
    0.75
}

fn default_expiry_interval_seconds() -> u64 {
    5
}

fn default_regulator_interval_seconds() -> u64 {
    5
}

fn default_max_request() -> usize {
    crate::network::protocol::MAX_GET_DATA
}

fn default_reconnect_delay_millis() -> u64 {
    500
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_peers: default_sync_peers(),
            sync_timeout_seconds: default_sync_timeout_seconds(),
            protocol_minimum: default_protocol_minimum(),
            protocol_maximum: default_protocol_maximum(),
            minimum_header_rate: default_minimum_header_rate(),
            header_rate_back_off: default_header_rate_back_off(),
            expiry_interval_seconds: default_expiry_interval_seconds(),
            regulator_interval_seconds: default_regulator_interval_seconds(),
            max_request: default_max_request(),
            reconnect_delay_millis: default_reconnect_delay_millis(),
        }
    }
}

impl SyncConfig {
    /// Sliding window over which a reservation's import rate is measured
    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(3 * u64::from(self.sync_timeout_seconds))
    }

    pub fn expiry_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_interval_seconds)
    }

    pub fn regulator_interval(&self) -> Duration {
        Duration::from_secs(self.regulator_interval_seconds)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_millis)
    }

    /// Validate sync configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sync_peers == 0 {
            return Err(anyhow::anyhow!("sync_peers must be greater than 0"));
        }
        if self.sync_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("sync_timeout_seconds must be greater than 0"));
        }
        if self.expiry_interval_seconds == 0 {
            return Err(anyhow::anyhow!("expiry_interval_seconds must be greater than 0"));
        }
        if self.regulator_interval_seconds == 0 {
            return Err(anyhow::anyhow!(
                "regulator_interval_seconds must be greater than 0"
            ));
        }
        if self.max_request == 0 {
            return Err(anyhow::anyhow!("max_request must be greater than 0"));
        }
        if !(self.header_rate_back_off > 0.0 && self.header_rate_back_off < 1.0) {
            return Err(anyhow::anyhow!(
                "header_rate_back_off must be between 0 and 1 (exclusive), got {}",
                self.header_rate_back_off
            ));
        }
        if self.protocol_minimum > self.protocol_maximum {
            return Err(anyhow::anyhow!(
                "protocol_minimum ({}) exceeds protocol_maximum ({})",
                self.protocol_minimum,
                self.protocol_maximum
            ));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "blvm_sync=debug")
    /// If not set, uses RUST_LOG environment variable or defaults to "info"
    #[serde(default)]
    pub filter: Option<String>,

    /// Enable JSON logging format (for log aggregation systems)
    #[serde(default)]
    pub json_format: bool,
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub sync: SyncConfig,

    /// Trusted `hash:height` pairs bounding the header ranges to sync
    #[serde(default)]
    pub checkpoints: Vec<String>,

    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

impl NodeConfig {
    /// Load configuration from file (supports JSON and TOML)
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;

        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            let config: NodeConfig = toml::from_str(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse TOML config: {}", e))?;
            Ok(config)
        } else {
            // Default to JSON
            let config: NodeConfig = serde_json::from_str(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse JSON config: {}", e))?;
            Ok(config)
        }
    }

    /// Load configuration from TOML file
    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: NodeConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML config: {}", e))?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_toml_file(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize TOML config: {}", e))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Parsed checkpoints, sorted by height
    pub fn checkpoints(&self) -> anyhow::Result<Vec<Checkpoint>> {
        let mut checkpoints = self
            .checkpoints
            .iter()
            .map(|entry| entry.parse::<Checkpoint>())
            .collect::<anyhow::Result<Vec<_>>>()?;
        Checkpoint::sort(&mut checkpoints);
        Ok(checkpoints)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.sync.validate()?;

        let checkpoints = self.checkpoints()?;
        for pair in checkpoints.windows(2) {
            if pair[0].height == pair[1].height {
                return Err(anyhow::anyhow!(
                    "Conflicting checkpoints at height {}",
                    pair[0].height
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENESIS: &str = "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f";
    const BLOCK_11111: &str = "0000000069e244f73d78e8fd29ba2fd2ed618bd6fa2ee92559f542fdb26e7c1d";

    #[test]
    fn test_sync_config_default() {
        let config = SyncConfig::default();
        assert_eq!(config.sync_peers, 8);
        assert_eq!(config.sync_timeout_seconds, 5);
        assert_eq!(config.minimum_header_rate, 10_000);
        assert_eq!(config.max_request, 50_000);
        assert_eq!(config.rate_window(), Duration::from_secs(15));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_back_off() {
        let mut config = SyncConfig::default();
        config.header_rate_back_off = 1.0;
        assert!(config.validate().is_err());
        config.header_rate_back_off = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_protocol_range() {
        let config = SyncConfig {
            protocol_minimum: 70016,
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_checkpoints_sorted() {
        let config = NodeConfig {
            checkpoints: vec![format!("{}:11111", BLOCK_11111), format!("{}:0", GENESIS)],
            ..NodeConfig::default()
        };
        let checkpoints = config.checkpoints().unwrap();
        assert_eq!(checkpoints[0].height, 0);
        assert_eq!(checkpoints[1].height, 11111);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_conflicting_checkpoints() {
        let config = NodeConfig {
            checkpoints: vec![format!("{}:5", BLOCK_11111), format!("{}:5", GENESIS)],
            ..NodeConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_partial_uses_defaults() {
        let config: NodeConfig = toml::from_str(
            r#"
            [sync]
            sync_peers = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.sync.sync_peers, 3);
        assert_eq!(config.sync.sync_timeout_seconds, 5);
        assert!(config.checkpoints.is_empty());
        assert!(config.logging.is_none());
    }
}

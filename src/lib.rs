//! blvm-sync - catch-up synchronization engine for blvm nodes
//!
//! Drives header-first synchronization between trusted checkpoints and then
//! downloads the corresponding blocks in parallel from many peers. Work is
//! partitioned into reservations, one per connection, which are rebalanced
//! whenever a connection runs dry and restarted whenever a peer is measurably
//! slower than its siblings.
//!
//! ## Layout
//!
//! - [`sync::CheckpointQueue`]: height to hash work pool shared by both phases
//! - [`sync::HeaderChain`]: link-validating header accumulator for one checkpoint range
//! - [`sync::DownloadReservation`] / [`sync::ReservationTable`]: block work partitions
//! - [`sync::HeaderSyncSession`] / [`sync::BlockSyncSession`]: per-slot orchestration
//! - [`node::SyncNode`]: runs header sync followed by block sync
//!
//! The peer transport and block storage are collaborators supplied by the
//! embedding node through [`network::Connector`] and [`network::ChainAccess`].

#![allow(clippy::module_inception)]

pub mod config;
pub mod error;
pub mod network;
pub mod node;
pub mod primitives;
pub mod sync;
pub mod utils;

pub use config::{LoggingConfig, NodeConfig, SyncConfig};
pub use error::SyncError;
pub use primitives::{Block, BlockHeader, Checkpoint, Hash};

//! Catch-up synchronization: header-first, then parallel block download

pub mod block_sync;
pub mod checkpoint_queue;
pub mod header_chain;
pub mod header_sync;
pub mod performance;
pub mod reservation;
pub mod reservation_table;

pub use block_sync::{BlockSyncProtocol, BlockSyncSession};
pub use checkpoint_queue::CheckpointQueue;
pub use header_chain::HeaderChain;
pub use header_sync::{HeaderSyncProtocol, HeaderSyncSession};
pub use performance::{PerformanceEstimate, RateStatistics};
pub use reservation::DownloadReservation;
pub use reservation_table::ReservationTable;

//! Shared helpers: lock access, timestamps, and logging setup

pub mod lock;
pub mod logging;
pub mod time;

pub use lock::{read_lock, write_lock};
pub use time::{current_timestamp, current_timestamp_duration};

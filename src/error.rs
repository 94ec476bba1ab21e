//! Synchronization error types
//!
//! Every variant describes why a single channel attempt ended. Sessions react
//! to them locally (reconnect, back off, or finish); none of them aborts the
//! node.

/// Why a sync channel or session stopped
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// Peer too slow (rate floor or expiry test) or transport inactivity
    #[error("channel timed out")]
    ChannelTimeout,

    /// Work changed under the channel and it must restart
    #[error("channel stopped")]
    ChannelStopped,

    /// Peer went away
    #[error("channel closed")]
    ChannelClosed,

    /// The owning session is stopping
    #[error("service stopped")]
    ServiceStopped,

    #[error("connect failed: {0}")]
    ConnectFailed(String),

    #[error("peer version {negotiated} below required {minimum}")]
    VersionTooLow { negotiated: u32, minimum: u32 },

    /// A header batch failed link, check or accept
    #[error("invalid previous block")]
    InvalidPreviousBlock,

    /// Peer cannot make further progress, or a precondition does not hold
    #[error("operation failed: {0}")]
    OperationFailed(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Whether the error reflects a session shutdown rather than a peer problem
    pub fn is_shutdown(&self) -> bool {
        matches!(self, SyncError::ServiceStopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(SyncError::ChannelTimeout.to_string(), "channel timed out");
        assert_eq!(
            SyncError::VersionTooLow {
                negotiated: 31402,
                minimum: 31800
            }
            .to_string(),
            "peer version 31402 below required 31800"
        );
    }

    #[test]
    fn test_is_shutdown() {
        assert!(SyncError::ServiceStopped.is_shutdown());
        assert!(!SyncError::ChannelStopped.is_shutdown());
    }
}

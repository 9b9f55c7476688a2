//! Error types for the upper MAC.

use thiserror::Error;

use crate::{
    config::ConfigError,
    types::{AccessCategory, FrameId, MacAddress, Tid},
};

/// Result type for upper MAC operations.
pub type Result<T> = std::result::Result<T, MacError>;

/// Errors that can occur in upper MAC operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MacError {
    /// A retry decision was requested for a frame that never failed
    #[error("retry counter entry doesn't exist for frame {0}")]
    RetryCounterMissing(FrameId),

    /// BlockAck variant this MAC cannot process
    #[error("unsupported BlockAck: {0}")]
    UnsupportedBlockAck(String),

    /// Frame body could not be decoded
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// No Block Ack session for the given peer and TID
    #[error("no Block Ack session for {peer}, tid {tid}")]
    NoSession {
        /// Peer station
        peer: MacAddress,
        /// Traffic identifier
        tid: Tid,
    },

    /// Transmission queue of the access category is full
    #[error("transmission queue of {0} is full")]
    QueueFull(AccessCategory),

    /// The transmit interface refused the frame
    #[error("transmission failed: {0}")]
    TransmitFailed(String),

    /// The worker owning the upper MAC is gone
    #[error("upper MAC worker stopped")]
    WorkerStopped,

    /// Invalid input parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

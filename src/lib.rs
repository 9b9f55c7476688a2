//! Upper MAC of an IEEE 802.11e EDCA station.
//!
//! The crate drives frame exchanges (DATA/ACK, RTS/CTS/DATA/ACK and
//! unacknowledged group-addressed DATA), keeps the per access category retry
//! counters and contention window, and manages Block Ack agreements. Channel
//! contention, the PHY and the timer substrate are reached through
//! [`device::MacDevice`].

#![allow(clippy::module_name_repetitions)]

/// Block Ack session management
pub mod block_ack;
/// Parameters provider and TOML loading
pub mod config;
/// Protocol constants
pub mod constants;
/// Collaborator interfaces
pub mod device;
/// Error types
pub mod error;
/// Frame exchange engine
pub mod exchange;
/// 802.11 frames and wire fields
pub mod frame;
/// Retry and contention window control
pub mod retry;
/// Worker thread plumbing
pub mod spawner;
/// Common identifiers
pub mod types;
/// Upper MAC coordinator
pub mod upper_mac;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::{ConfigLoader, MacParameters};
pub use device::{FrameIo, MacDevice};
pub use error::{MacError, Result};
pub use frame::{DataFrame, Frame, SeqNum};
pub use types::{AccessCategory, MacAddress, Tid};
pub use upper_mac::{MacEvent, UpperMac};

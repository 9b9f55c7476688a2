//! Block Ack agreements, 802.11-2012 9.21.

/// Receive side reorder buffers
mod recv;
/// Transmit side agreements
mod send;

pub use recv::{Admission, BlockAckReceiveSessions, ReceiveSession};
pub use send::{BlockAckSendSessions, SendSession};

use crate::types::{MacAddress, Tid};

/// Agreements are keyed by the peer address and TID.
pub type SessionKey = (MacAddress, Tid);

//! Block Ack action frame bodies (802.11-2012 8.5.5).

use super::SeqNum;
use crate::types::Tid;

/// Status code of a successful ADDBA response.
pub const STATUS_SUCCESS: u16 = 0;
/// Status code used when the recipient declines the agreement.
pub const STATUS_REQUEST_DECLINED: u16 = 37;
/// DELBA reason: the peer does not want to use the mechanism.
pub const REASON_END_BA: u16 = 37;
/// DELBA reason: the agreement timed out.
pub const REASON_TIMEOUT: u16 = 39;

// category, action, dialog token, parameter set, timeout, starting sequence control
const ADDBA_REQUEST_LEN: usize = 9;
// category, action, dialog token, status, parameter set, timeout
const ADDBA_RESPONSE_LEN: usize = 9;
// category, action, parameter set, reason code
const DELBA_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockAckPolicy {
    #[default]
    Immediate,
    Delayed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddbaRequest {
    pub dialog_token: u8,
    pub tid: Tid,
    pub policy: BlockAckPolicy,
    /// The originator might send A-MSDUs under this agreement
    pub a_msdu_supported: bool,
    /// Zero lets the recipient choose
    pub buffer_size: u16,
    /// Block Ack timeout in TUs, zero disables it
    pub timeout: u16,
    pub starting_seq: SeqNum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddbaResponse {
    pub dialog_token: u8,
    pub status: u16,
    pub tid: Tid,
    pub policy: BlockAckPolicy,
    /// The recipient is capable of receiving A-MSDUs under this agreement
    pub a_msdu_supported: bool,
    pub buffer_size: u16,
    pub timeout: u16,
}

impl AddbaResponse {
    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delba {
    pub tid: Tid,
    /// Sent by the originator of the agreement
    pub initiator: bool,
    pub reason: u16,
}

/// Body of a management action frame handled by the upper MAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionBody {
    AddbaRequest(AddbaRequest),
    AddbaResponse(AddbaResponse),
    Delba(Delba),
}

impl ActionBody {
    /// Length of the frame body in bytes.
    pub fn body_len(&self) -> usize {
        match *self {
            ActionBody::AddbaRequest(_) => ADDBA_REQUEST_LEN,
            ActionBody::AddbaResponse(_) => ADDBA_RESPONSE_LEN,
            ActionBody::Delba(_) => DELBA_LEN,
        }
    }

    pub fn tid(&self) -> Tid {
        match *self {
            ActionBody::AddbaRequest(ref r) => r.tid,
            ActionBody::AddbaResponse(ref r) => r.tid,
            ActionBody::Delba(ref d) => d.tid,
        }
    }
}

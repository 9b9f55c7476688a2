/// Block Ack action frame bodies
pub mod action;
/// BlockAck frame body
pub mod block_ack;
/// Bit-field wire fields
pub mod fields;
/// Sequence numbers
mod seq;

pub use action::{ActionBody, AddbaRequest, AddbaResponse, BlockAckPolicy, Delba};
pub use block_ack::{BitmapPosition, BlockAck, BlockAckVariant};
pub use fields::SequenceControl;
pub use seq::SeqNum;

use std::time::Duration;

use crate::{
    config::MacParameters,
    types::{FrameId, MacAddress, Tid},
};

const DATA_HEADER_LEN: usize = 24;
const QOS_CONTROL_LEN: usize = 2;
const FCS_LEN: usize = 4;
const RTS_LEN: usize = 20;
const CTS_LEN: usize = 14;
const ACK_LEN: usize = 14;
const BLOCK_ACK_HEADER_LEN: usize = 16;

/// Payload carried by a data or management MPDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameBody {
    Msdu(Vec<u8>),
    Action(ActionBody),
}

/// Type of a data or management MPDU, for retry accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    Data,
    QosData,
    Management,
}

/// The frame an attempt was made with, as seen by the retry controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxFrameKind {
    Rts,
    Data,
}

/// A data or management MPDU. Owned by the queue, then by the frame exchange
/// that transmits it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    pub id: FrameId,
    pub receiver: MacAddress,
    pub transmitter: MacAddress,
    /// Present for QoS data
    pub tid: Option<Tid>,
    pub seq: SeqNum,
    pub fragment: u8,
    pub retry: bool,
    pub byte_len: usize,
    /// Duration/ID field, protects the rest of the exchange
    pub duration: Duration,
    pub body: FrameBody,
}

impl DataFrame {
    /// Non-QoS data frame.
    pub fn data(receiver: MacAddress, transmitter: MacAddress, payload: Vec<u8>) -> Self {
        let byte_len = DATA_HEADER_LEN + payload.len() + FCS_LEN;
        Self::build(receiver, transmitter, None, byte_len, FrameBody::Msdu(payload))
    }

    /// QoS data frame of the given traffic identifier.
    pub fn qos_data(
        receiver: MacAddress,
        transmitter: MacAddress,
        tid: Tid,
        payload: Vec<u8>,
    ) -> Self {
        let byte_len = DATA_HEADER_LEN + QOS_CONTROL_LEN + payload.len() + FCS_LEN;
        Self::build(receiver, transmitter, Some(tid), byte_len, FrameBody::Msdu(payload))
    }

    /// Management action frame.
    pub fn action(receiver: MacAddress, transmitter: MacAddress, body: ActionBody) -> Self {
        let byte_len = DATA_HEADER_LEN + body.body_len() + FCS_LEN;
        Self::build(receiver, transmitter, None, byte_len, FrameBody::Action(body))
    }

    fn build(
        receiver: MacAddress,
        transmitter: MacAddress,
        tid: Option<Tid>,
        byte_len: usize,
        body: FrameBody,
    ) -> Self {
        Self {
            id: FrameId::default(),
            receiver,
            transmitter,
            tid,
            seq: SeqNum::default(),
            fragment: 0,
            retry: false,
            byte_len,
            duration: Duration::ZERO,
            body,
        }
    }

    #[must_use]
    pub fn with_byte_len(mut self, byte_len: usize) -> Self {
        self.byte_len = byte_len;
        self
    }

    pub fn kind(&self) -> DataKind {
        match (&self.body, self.tid) {
            (&FrameBody::Action(_), _) => DataKind::Management,
            (&FrameBody::Msdu(_), Some(_)) => DataKind::QosData,
            (&FrameBody::Msdu(_), None) => DataKind::Data,
        }
    }

    pub fn is_group_addressed(&self) -> bool {
        self.receiver.is_group()
    }

    pub fn sequence_control(&self) -> SequenceControl {
        SequenceControl::from_parts(self.seq, self.fragment)
    }

    pub fn action_body(&self) -> Option<&ActionBody> {
        match self.body {
            FrameBody::Action(ref body) => Some(body),
            FrameBody::Msdu(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rts {
    pub receiver: MacAddress,
    pub transmitter: MacAddress,
    pub duration: Duration,
}

impl Rts {
    /// RTS protecting `data`: the NAV covers CTS, DATA and ACK plus three SIFS.
    pub fn protecting(data: &DataFrame, params: &MacParameters) -> Self {
        Self {
            receiver: data.receiver,
            transmitter: data.transmitter,
            duration: params.sifs() * 3
                + params.cts_duration()
                + params.data_duration(data.byte_len)
                + params.ack_duration(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cts {
    pub receiver: MacAddress,
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub receiver: MacAddress,
    pub duration: Duration,
}

/// Any frame the upper MAC sends or is handed by the receive interface.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Data(DataFrame),
    Rts(Rts),
    Cts(Cts),
    Ack(Ack),
    BlockAck(BlockAck),
}

impl Frame {
    pub fn receiver(&self) -> MacAddress {
        match *self {
            Frame::Data(ref f) => f.receiver,
            Frame::Rts(ref f) => f.receiver,
            Frame::Cts(ref f) => f.receiver,
            Frame::Ack(ref f) => f.receiver,
            Frame::BlockAck(ref f) => f.receiver,
        }
    }

    pub fn byte_len(&self) -> usize {
        match *self {
            Frame::Data(ref f) => f.byte_len,
            Frame::Rts(_) => RTS_LEN,
            Frame::Cts(_) => CTS_LEN,
            Frame::Ack(_) => ACK_LEN,
            Frame::BlockAck(ref f) => BLOCK_ACK_HEADER_LEN + f.encode_body().len() + FCS_LEN,
        }
    }

    /// Returns `true` if this is an ACK addressed to `addr`.
    pub fn is_ack_for(&self, addr: MacAddress) -> bool {
        matches!(*self, Frame::Ack(ref ack) if ack.receiver == addr)
    }

    /// Returns `true` if this is a CTS addressed to `addr`.
    pub fn is_cts_for(&self, addr: MacAddress) -> bool {
        matches!(*self, Frame::Cts(ref cts) if cts.receiver == addr)
    }

    pub fn kind_name(&self) -> &'static str {
        match *self {
            Frame::Data(ref f) => match f.kind() {
                DataKind::Data => "DATA",
                DataKind::QosData => "QoS-DATA",
                DataKind::Management => "ACTION",
            },
            Frame::Rts(_) => "RTS",
            Frame::Cts(_) => "CTS",
            Frame::Ack(_) => "ACK",
            Frame::BlockAck(_) => "BlockAck",
        }
    }
}

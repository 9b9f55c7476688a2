#![allow(clippy::missing_docs_in_private_items)]

use bilge::prelude::*;

use super::SeqNum;
use crate::types::Tid;

// NOTE: The `#[bitsize]` macro errors shown by rust-analyzer is a false-positive

/// Sequence Control field, also used as Starting Sequence Control.
#[bitsize(16)]
#[derive(Clone, Copy, PartialEq, DebugBits, FromBits)]
pub struct SequenceControl {
    pub fragment: u4,
    pub sequence: u12,
}

impl SequenceControl {
    pub fn from_parts(seq: SeqNum, fragment: u8) -> Self {
        Self::new(u4::new(fragment & 0xf), u12::new(seq.into_inner()))
    }

    pub fn seq(&self) -> SeqNum {
        SeqNum::new(self.sequence().value())
    }

    pub fn fragment_number(&self) -> u8 {
        self.fragment().value()
    }
}

/// BA Control field of a BlockAck frame.
///
/// | multi-TID | compressed | variant    |
/// |-----------|------------|------------|
/// | 0         | 0          | basic      |
/// | 0         | 1          | compressed |
/// | 1         | 0          | reserved   |
/// | 1         | 1          | multi-TID  |
#[bitsize(16)]
#[derive(Clone, Copy, PartialEq, DebugBits, FromBits)]
pub struct BlockAckControl {
    pub ack_policy: bool,
    pub multi_tid: bool,
    pub compressed_bitmap: bool,
    // B3..B11, reserved
    pub unused: u9,
    pub tid_info: u4,
}

impl BlockAckControl {
    pub fn build(multi_tid: bool, compressed: bool, tid_info: u8) -> Self {
        Self::new(false, multi_tid, compressed, u9::new(0), u4::new(tid_info & 0xf))
    }

    pub fn tid(&self) -> Tid {
        Tid::from_bits(self.tid_info().value())
    }
}

/// Per TID Info field of a multi-TID BlockAck.
#[bitsize(16)]
#[derive(Clone, Copy, PartialEq, DebugBits, FromBits)]
pub struct PerTidInfo {
    pub unused: u12,
    pub tid: u4,
}

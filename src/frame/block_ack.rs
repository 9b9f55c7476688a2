//! BlockAck frame body and bitmap decoding.

use bitvec::{array::BitArray, order::Lsb0};

use super::{
    fields::{BlockAckControl, PerTidInfo, SequenceControl},
    SeqNum,
};
use crate::{
    constants::{
        BASIC_BITMAP_FRAGMENTS, BASIC_BITMAP_LEN, COMPRESSED_BITMAP_LEN, MAX_BLOCK_ACK_WINDOW,
    },
    error::{MacError, Result},
    types::{MacAddress, Tid},
};

/// Per fragment bitmap covering 64 MSDUs of 16 fragments each.
pub type BasicBitmap = BitArray<[u8; BASIC_BITMAP_LEN], Lsb0>;
/// Per MSDU bitmap covering 64 MSDUs.
pub type CompressedBitmap = BitArray<[u8; COMPRESSED_BITMAP_LEN], Lsb0>;

const BA_CONTROL_LEN: usize = 2;
const SSC_LEN: usize = 2;
const PER_TID_INFO_LEN: usize = 2;

/// Where a (sequence, fragment) pair falls relative to a BlockAck bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitmapPosition {
    /// Precedes the starting sequence number, implicitly acknowledged
    Before,
    Acked,
    Missing,
    /// Past the end of the bitmap, not reported on
    Beyond,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PerTidRecord {
    pub tid: Tid,
    pub starting_seq: SeqNum,
    pub bitmap: CompressedBitmap,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockAckVariant {
    Basic {
        tid: Tid,
        starting_seq: SeqNum,
        bitmap: BasicBitmap,
    },
    Compressed {
        tid: Tid,
        starting_seq: SeqNum,
        bitmap: CompressedBitmap,
    },
    MultiTid(Vec<PerTidRecord>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockAck {
    pub receiver: MacAddress,
    pub transmitter: MacAddress,
    pub variant: BlockAckVariant,
}

impl BlockAck {
    /// Builds a basic BlockAck acknowledging the given (sequence, fragment) pairs.
    pub fn basic(
        receiver: MacAddress,
        transmitter: MacAddress,
        tid: Tid,
        starting_seq: SeqNum,
        acked: &[(SeqNum, u8)],
    ) -> Self {
        let mut bitmap = BasicBitmap::ZERO;
        for &(seq, fragment) in acked {
            if let Some(idx) = window_offset(starting_seq, seq)
                .and_then(|x| fragment_index(x, fragment))
                .filter(|idx| *idx < bitmap.len())
            {
                bitmap.set(idx, true);
            }
        }
        Self {
            receiver,
            transmitter,
            variant: BlockAckVariant::Basic {
                tid,
                starting_seq,
                bitmap,
            },
        }
    }

    /// Builds a compressed BlockAck acknowledging the given sequence numbers.
    pub fn compressed(
        receiver: MacAddress,
        transmitter: MacAddress,
        tid: Tid,
        starting_seq: SeqNum,
        acked: &[SeqNum],
    ) -> Self {
        let mut bitmap = CompressedBitmap::ZERO;
        for &seq in acked {
            if let Some(idx) = window_offset(starting_seq, seq) {
                bitmap.set(idx, true);
            }
        }
        Self {
            receiver,
            transmitter,
            variant: BlockAckVariant::Compressed {
                tid,
                starting_seq,
                bitmap,
            },
        }
    }

    /// Decodes the frame body that follows the RA and TA fields.
    pub fn parse(receiver: MacAddress, transmitter: MacAddress, body: &[u8]) -> Result<Self> {
        let control = BlockAckControl::from(read_u16(body, 0)?);
        let variant = match (control.multi_tid(), control.compressed_bitmap()) {
            (false, false) => {
                let starting_seq = SequenceControl::from(read_u16(body, BA_CONTROL_LEN)?).seq();
                let start = BA_CONTROL_LEN + SSC_LEN;
                let mut raw = [0u8; BASIC_BITMAP_LEN];
                raw.copy_from_slice(slice(body, start, BASIC_BITMAP_LEN)?);
                BlockAckVariant::Basic {
                    tid: control.tid(),
                    starting_seq,
                    bitmap: BitArray::new(raw),
                }
            }
            (false, true) => {
                let starting_seq = SequenceControl::from(read_u16(body, BA_CONTROL_LEN)?).seq();
                let start = BA_CONTROL_LEN + SSC_LEN;
                BlockAckVariant::Compressed {
                    tid: control.tid(),
                    starting_seq,
                    bitmap: read_compressed(body, start)?,
                }
            }
            (true, true) => {
                let num_tids = usize::from(control.tid_info().value()) + 1;
                let record_len = PER_TID_INFO_LEN + SSC_LEN + COMPRESSED_BITMAP_LEN;
                let records = (0..num_tids)
                    .map(|i| {
                        let pos = BA_CONTROL_LEN + i * record_len;
                        let info = PerTidInfo::from(read_u16(body, pos)?);
                        let ssc = SequenceControl::from(read_u16(body, pos + PER_TID_INFO_LEN)?);
                        Ok(PerTidRecord {
                            tid: Tid::from_bits(info.tid().value()),
                            starting_seq: ssc.seq(),
                            bitmap: read_compressed(body, pos + PER_TID_INFO_LEN + SSC_LEN)?,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                BlockAckVariant::MultiTid(records)
            }
            (true, false) => {
                return Err(MacError::UnsupportedBlockAck(
                    "reserved BA control encoding (multi-TID without compressed bitmap)".into(),
                ))
            }
        };
        Ok(Self {
            receiver,
            transmitter,
            variant,
        })
    }

    /// Encodes the frame body that follows the RA and TA fields.
    #[allow(clippy::as_conversions, clippy::cast_possible_truncation)] // at most 16 TIDs
    pub fn encode_body(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self.variant {
            BlockAckVariant::Basic {
                tid,
                starting_seq,
                ref bitmap,
            } => {
                put_u16(&mut out, BlockAckControl::build(false, false, tid.value()).into());
                put_u16(&mut out, SequenceControl::from_parts(starting_seq, 0).into());
                out.extend_from_slice(bitmap.as_raw_slice());
            }
            BlockAckVariant::Compressed {
                tid,
                starting_seq,
                ref bitmap,
            } => {
                put_u16(&mut out, BlockAckControl::build(false, true, tid.value()).into());
                put_u16(&mut out, SequenceControl::from_parts(starting_seq, 0).into());
                out.extend_from_slice(bitmap.as_raw_slice());
            }
            BlockAckVariant::MultiTid(ref records) => {
                let tid_info = records.len().saturating_sub(1) as u8;
                put_u16(&mut out, BlockAckControl::build(true, true, tid_info).into());
                for record in records {
                    let info = (u16::from(record.tid.value()) & 0xf) << 12;
                    put_u16(&mut out, info);
                    put_u16(&mut out, SequenceControl::from_parts(record.starting_seq, 0).into());
                    out.extend_from_slice(record.bitmap.as_raw_slice());
                }
            }
        }
        out
    }

    /// TID the BlockAck reports on; `None` for the multi-TID variant.
    pub fn tid(&self) -> Option<Tid> {
        match self.variant {
            BlockAckVariant::Basic { tid, .. } | BlockAckVariant::Compressed { tid, .. } => {
                Some(tid)
            }
            BlockAckVariant::MultiTid(_) => None,
        }
    }
}

impl BlockAckVariant {
    pub fn starting_seq(&self) -> Option<SeqNum> {
        match *self {
            BlockAckVariant::Basic { starting_seq, .. }
            | BlockAckVariant::Compressed { starting_seq, .. } => Some(starting_seq),
            BlockAckVariant::MultiTid(_) => None,
        }
    }

    /// Looks up a (sequence, fragment) pair. The compressed bitmap ignores
    /// the fragment number.
    pub fn position(&self, seq: SeqNum, fragment: u8) -> Result<BitmapPosition> {
        match *self {
            BlockAckVariant::Basic {
                starting_seq,
                ref bitmap,
                ..
            } => {
                let offset = seq.distance_from(starting_seq);
                let Some(msdu) = window_offset(starting_seq, seq) else {
                    return Ok(outside(offset));
                };
                Ok(fragment_index(msdu, fragment)
                    .and_then(|idx| bitmap.get(idx))
                    .map_or(BitmapPosition::Beyond, |bit| acked_or_missing(*bit)))
            }
            BlockAckVariant::Compressed {
                starting_seq,
                ref bitmap,
                ..
            } => {
                let offset = seq.distance_from(starting_seq);
                let Some(msdu) = window_offset(starting_seq, seq) else {
                    return Ok(outside(offset));
                };
                Ok(bitmap
                    .get(msdu)
                    .map_or(BitmapPosition::Beyond, |bit| acked_or_missing(*bit)))
            }
            BlockAckVariant::MultiTid(_) => Err(MacError::UnsupportedBlockAck(
                "multi-TID BlockAck".into(),
            )),
        }
    }
}

fn acked_or_missing(bit: bool) -> BitmapPosition {
    if bit {
        BitmapPosition::Acked
    } else {
        BitmapPosition::Missing
    }
}

fn outside(offset: i32) -> BitmapPosition {
    if offset < 0 {
        BitmapPosition::Before
    } else {
        BitmapPosition::Beyond
    }
}

/// MSDU index of `seq` inside the 64 entry window starting at `start`.
fn window_offset(start: SeqNum, seq: SeqNum) -> Option<usize> {
    usize::try_from(seq.distance_from(start))
        .ok()
        .filter(|x| *x < usize::from(MAX_BLOCK_ACK_WINDOW))
}

/// Bit of `fragment` of the MSDU at `msdu` in a basic bitmap. Only
/// fragments 0 to 15 have a bit.
fn fragment_index(msdu: usize, fragment: u8) -> Option<usize> {
    let fragment = usize::from(fragment);
    (fragment < BASIC_BITMAP_FRAGMENTS).then_some(msdu * BASIC_BITMAP_FRAGMENTS + fragment)
}

fn slice(body: &[u8], start: usize, len: usize) -> Result<&[u8]> {
    body.get(start..start + len).ok_or_else(|| {
        MacError::MalformedFrame(format!(
            "BlockAck body too short: need {} bytes, got {}",
            start + len,
            body.len()
        ))
    })
}

fn read_u16(body: &[u8], start: usize) -> Result<u16> {
    let bytes = slice(body, start, 2)?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn read_compressed(body: &[u8], start: usize) -> Result<CompressedBitmap> {
    let mut raw = [0u8; COMPRESSED_BITMAP_LEN];
    raw.copy_from_slice(slice(body, start, COMPRESSED_BITMAP_LEN)?);
    Ok(BitArray::new(raw))
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(x: u8) -> MacAddress {
        MacAddress([2, 0, 0, 0, 0, x])
    }

    fn tid(x: u8) -> Tid {
        Tid::new(x).unwrap()
    }

    #[test]
    fn basic_bitmap_positions() {
        let ba = BlockAck::basic(
            addr(1),
            addr(2),
            tid(0),
            SeqNum::new(100),
            &[(SeqNum::new(100), 0), (SeqNum::new(101), 1)],
        );
        let v = &ba.variant;
        assert_eq!(v.position(SeqNum::new(100), 0).unwrap(), BitmapPosition::Acked);
        assert_eq!(v.position(SeqNum::new(100), 1).unwrap(), BitmapPosition::Missing);
        assert_eq!(v.position(SeqNum::new(101), 0).unwrap(), BitmapPosition::Missing);
        assert_eq!(v.position(SeqNum::new(101), 1).unwrap(), BitmapPosition::Acked);
        assert_eq!(v.position(SeqNum::new(99), 0).unwrap(), BitmapPosition::Before);
        assert_eq!(v.position(SeqNum::new(164), 0).unwrap(), BitmapPosition::Beyond);
        assert_eq!(v.position(SeqNum::new(163), 0).unwrap(), BitmapPosition::Missing);
    }

    #[test]
    fn basic_bitmap_has_no_bit_past_fragment_15() {
        let ba = BlockAck::basic(
            addr(1),
            addr(2),
            tid(0),
            SeqNum::new(0),
            &[(SeqNum::new(1), 0), (SeqNum::new(0), 16)],
        );
        let v = &ba.variant;
        assert_eq!(v.position(SeqNum::new(1), 0).unwrap(), BitmapPosition::Acked);
        // would alias MSDU 1 fragment 0
        assert_eq!(v.position(SeqNum::new(0), 16).unwrap(), BitmapPosition::Beyond);
        assert_eq!(v.position(SeqNum::new(0), 15).unwrap(), BitmapPosition::Missing);
        let BlockAckVariant::Basic { bitmap, .. } = &ba.variant else {
            panic!("expected a basic BlockAck");
        };
        assert_eq!(bitmap.count_ones(), 1);
    }

    #[test]
    fn compressed_bitmap_ignores_fragment() {
        let ba = BlockAck::compressed(
            addr(1),
            addr(2),
            tid(3),
            SeqNum::new(4090),
            &[SeqNum::new(4090), SeqNum::new(2)],
        );
        let v = &ba.variant;
        assert_eq!(v.position(SeqNum::new(4090), 7).unwrap(), BitmapPosition::Acked);
        assert_eq!(v.position(SeqNum::new(2), 0).unwrap(), BitmapPosition::Acked);
        assert_eq!(v.position(SeqNum::new(1), 0).unwrap(), BitmapPosition::Missing);
    }

    #[test]
    fn basic_wire_layout() {
        let ba = BlockAck::basic(
            addr(1),
            addr(2),
            tid(5),
            SeqNum::new(0x123),
            &[(SeqNum::new(0x123), 0), (SeqNum::new(0x124), 2)],
        );
        let body = ba.encode_body();
        assert_eq!(body.len(), BA_CONTROL_LEN + SSC_LEN + BASIC_BITMAP_LEN);
        assert_eq!(&body[..4], &[0x00, 0x50, 0x30, 0x12]);
        // MSDU 0 fragment 0, MSDU 1 fragment 2
        assert_eq!(body[4], 0x01);
        assert_eq!(body[6], 0x04);
        assert_eq!(BlockAck::parse(addr(1), addr(2), &body).unwrap(), ba);
    }

    #[test]
    fn compressed_wire_layout() {
        let ba = BlockAck::compressed(
            addr(1),
            addr(2),
            tid(2),
            SeqNum::new(10),
            &[SeqNum::new(10), SeqNum::new(18)],
        );
        let body = ba.encode_body();
        assert_eq!(body.len(), BA_CONTROL_LEN + SSC_LEN + COMPRESSED_BITMAP_LEN);
        assert_eq!(&body[..2], &[0x04, 0x20]);
        assert_eq!(body[4], 0x01);
        assert_eq!(body[5], 0x01);
    }

    #[test]
    fn multi_tid_parses_but_cannot_be_decoded() {
        let ba = BlockAck {
            receiver: addr(1),
            transmitter: addr(2),
            variant: BlockAckVariant::MultiTid(vec![
                PerTidRecord {
                    tid: tid(1),
                    starting_seq: SeqNum::new(7),
                    bitmap: CompressedBitmap::ZERO,
                },
                PerTidRecord {
                    tid: tid(6),
                    starting_seq: SeqNum::new(9),
                    bitmap: CompressedBitmap::ZERO,
                },
            ]),
        };
        let parsed = BlockAck::parse(addr(1), addr(2), &ba.encode_body()).unwrap();
        assert_eq!(parsed, ba);
        assert!(parsed.tid().is_none());
        assert!(matches!(
            parsed.variant.position(SeqNum::new(7), 0),
            Err(MacError::UnsupportedBlockAck(_))
        ));
    }

    #[test]
    fn reserved_encoding_is_rejected() {
        let body = [0x02, 0x00, 0x00, 0x00];
        assert!(matches!(
            BlockAck::parse(addr(1), addr(2), &body),
            Err(MacError::UnsupportedBlockAck(_))
        ));
    }

    #[test]
    fn truncated_body_is_malformed() {
        let body = [0x04, 0x00, 0x10, 0x00, 0xff];
        assert!(matches!(
            BlockAck::parse(addr(1), addr(2), &body),
            Err(MacError::MalformedFrame(_))
        ));
    }
}

use std::time::Duration;

/// Number of bits of the 802.11 sequence number.
pub const SEQ_NUM_BITS: usize = 12;
/// Size of the sequence number space.
pub const SEQ_NUM_MODULO: u16 = 1 << SEQ_NUM_BITS;
/// Bit mask used to extract the sequence number from a 16-bit value.
pub const SEQ_MASK: u16 = SEQ_NUM_MODULO - 1;
/// Half of the sequence space. Two sequence numbers further apart than this
/// are compared the other way around.
pub const SEQ_HALF_WINDOW: u16 = SEQ_NUM_MODULO >> 1;

/// Largest Block Ack transmit or reorder window (802.11-2012 10.5.2).
pub const MAX_BLOCK_ACK_WINDOW: u16 = 64;
/// How long an ADDBA request may wait for its response before the
/// negotiation is given up.
pub const ADDBA_RESPONSE_TIMEOUT: Duration = Duration::from_secs(1);
/// Fragments covered per MSDU by a basic BlockAck bitmap.
pub const BASIC_BITMAP_FRAGMENTS: usize = 16;
/// Byte length of the basic BlockAck bitmap.
pub const BASIC_BITMAP_LEN: usize = 128;
/// Byte length of the compressed BlockAck bitmap.
pub const COMPRESSED_BITMAP_LEN: usize = 8;

/// Number of EDCA access categories.
pub const NUM_ACCESS_CATEGORIES: usize = 4;
/// Number of traffic identifiers usable for QoS data.
pub const NUM_TIDS: u8 = 16;

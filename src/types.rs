use std::fmt;

use crate::constants::{NUM_ACCESS_CATEGORIES, NUM_TIDS};

/// EDCA access category. All retry and contention state is scoped per AC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AccessCategory {
    /// `AC_BK`
    Background,
    /// `AC_BE`
    BestEffort,
    /// `AC_VI`
    Video,
    /// `AC_VO`
    Voice,
}

impl AccessCategory {
    /// All access categories, lowest priority first.
    pub const ALL: [AccessCategory; NUM_ACCESS_CATEGORIES] = [
        AccessCategory::Background,
        AccessCategory::BestEffort,
        AccessCategory::Video,
        AccessCategory::Voice,
    ];

    /// Index into per-AC tables.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            AccessCategory::Background => 0,
            AccessCategory::BestEffort => 1,
            AccessCategory::Video => 2,
            AccessCategory::Voice => 3,
        }
    }

    /// Maps a TID (user priority) to its access category, 802.11-2012 Table 9-1.
    #[must_use]
    pub fn from_tid(tid: Tid) -> Self {
        match tid.value() & 0x7 {
            1 | 2 => AccessCategory::Background,
            4 | 5 => AccessCategory::Video,
            6 | 7 => AccessCategory::Voice,
            _ => AccessCategory::BestEffort,
        }
    }
}

impl fmt::Display for AccessCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            AccessCategory::Background => "AC_BK",
            AccessCategory::BestEffort => "AC_BE",
            AccessCategory::Video => "AC_VI",
            AccessCategory::Voice => "AC_VO",
        };
        f.write_str(name)
    }
}

/// Traffic identifier of a QoS data frame.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tid(u8);

impl Tid {
    /// Creates a TID, returns `None` if the value does not fit in 4 bits.
    #[must_use]
    pub fn new(value: u8) -> Option<Self> {
        (value < NUM_TIDS).then_some(Self(value))
    }

    /// Creates a TID from the low four bits of `value`.
    #[must_use]
    pub fn from_bits(value: u8) -> Self {
        Self(value & (NUM_TIDS - 1))
    }

    /// Returns the raw value.
    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// MAC address represented as 6 bytes
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// The broadcast address `ff:ff:ff:ff:ff:ff`.
    pub const BROADCAST: MacAddress = MacAddress([0xff; 6]);

    /// Returns `true` for broadcast and multicast addresses.
    #[must_use]
    pub fn is_group(&self) -> bool {
        self.0[0] & 0x01 != 0
    }
}

impl fmt::Display for MacAddress {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

/// Stable identity of a frame for as long as it stays inside the MAC.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u64);

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle of an armed timer, issued by the timer facility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

/// Who asked for a transmission. Completion events carry it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxOrigin {
    /// The frame exchange running on this access category
    Exchange(AccessCategory),
    /// An ACK or CTS sent in response to a received frame
    Response,
}

use std::{
    cmp::Ordering,
    fmt::Display,
    ops::{Add, AddAssign, Sub},
};

use crate::constants::{SEQ_HALF_WINDOW, SEQ_MASK};

/// 12-bit modular 802.11 sequence number.
///
/// Ordering is defined relative to half of the sequence space, so a number
/// up to 2047 ahead of another compares greater even across the wrap.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeqNum(u16);

impl SeqNum {
    /// Creates a sequence number, discarding bits above the 12-bit space.
    #[must_use]
    pub fn new(value: u16) -> Self {
        Self(value & SEQ_MASK)
    }

    #[must_use]
    pub fn into_inner(self) -> u16 {
        self.0
    }

    /// Signed distance from `base` to `self`, in `[-2048, 2047]`.
    #[must_use]
    pub fn distance_from(self, base: SeqNum) -> i32 {
        let x = self.0.wrapping_sub(base.0) & SEQ_MASK;
        if x >= SEQ_HALF_WINDOW {
            i32::from(x) - i32::from(SEQ_MASK) - 1
        } else {
            i32::from(x)
        }
    }
}

impl From<u16> for SeqNum {
    fn from(value: u16) -> Self {
        Self::new(value)
    }
}

impl PartialOrd for SeqNum {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SeqNum {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance_from(*other).cmp(&0)
    }
}

impl Add<u16> for SeqNum {
    type Output = SeqNum;

    fn add(self, rhs: u16) -> Self::Output {
        SeqNum(self.0.wrapping_add(rhs) & SEQ_MASK)
    }
}

impl AddAssign<u16> for SeqNum {
    fn add_assign(&mut self, rhs: u16) {
        self.0 = self.0.wrapping_add(rhs) & SEQ_MASK;
    }
}

impl Sub<u16> for SeqNum {
    type Output = SeqNum;

    fn sub(self, rhs: u16) -> Self::Output {
        SeqNum(self.0.wrapping_sub(rhs) & SEQ_MASK)
    }
}

impl Display for SeqNum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

use std::collections::HashMap;

use crate::{
    frame::SeqNum,
    types::{MacAddress, Tid},
};

/// Sequence number spaces of one station, 802.11-2012 9.3.2.10.
///
/// QoS data uses one space per (receiver, TID); everything else shares one
/// space per receiver.
#[derive(Debug, Default)]
pub(crate) struct SequenceManager {
    per_receiver: HashMap<MacAddress, SeqNum>,
    per_tid: HashMap<(MacAddress, Tid), SeqNum>,
}

impl SequenceManager {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the number to assign and advances the space.
    pub(crate) fn next(&mut self, receiver: MacAddress, tid: Option<Tid>) -> SeqNum {
        let slot = match tid {
            Some(tid) => self.per_tid.entry((receiver, tid)).or_default(),
            None => self.per_receiver.entry(receiver).or_default(),
        };
        let seq = *slot;
        *slot += 1;
        seq
    }

    /// Number the next QoS data frame to `receiver` on `tid` will get.
    pub(crate) fn peek(&self, receiver: MacAddress, tid: Tid) -> SeqNum {
        self.per_tid
            .get(&(receiver, tid))
            .copied()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::addr;

    #[test]
    fn spaces_are_independent() {
        let mut seq = SequenceManager::new();
        let tid = Tid::new(5).unwrap();
        assert_eq!(seq.next(addr(1), Some(tid)), SeqNum::new(0));
        assert_eq!(seq.next(addr(1), Some(tid)), SeqNum::new(1));
        assert_eq!(seq.next(addr(1), None), SeqNum::new(0));
        assert_eq!(seq.next(addr(2), Some(tid)), SeqNum::new(0));
        assert_eq!(seq.peek(addr(1), tid), SeqNum::new(2));
        assert_eq!(seq.peek(addr(3), tid), SeqNum::new(0));
    }

    #[test]
    fn wraps_at_4096() {
        let mut seq = SequenceManager::new();
        for _ in 0..4095 {
            let _ = seq.next(addr(1), None);
        }
        assert_eq!(seq.next(addr(1), None), SeqNum::new(4095));
        assert_eq!(seq.next(addr(1), None), SeqNum::new(0));
    }
}

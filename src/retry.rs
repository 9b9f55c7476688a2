//! Retry counters and contention window of one access category.
//!
//! References: 9.19.2.6 Retransmit procedures, 9.3.3 Random backoff time
//! (IEEE 802.11-2012).

use std::collections::HashMap;

use log::{debug, trace};

use crate::{
    config::MacParameters,
    error::{MacError, Result},
    frame::{DataFrame, TxFrameKind},
    types::{AccessCategory, FrameId},
};

/// Which pair of counters an attempt is accounted against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryClass {
    Short,
    Long,
}

#[derive(Debug, Clone)]
pub struct TxRetryHandler {
    ac: AccessCategory,
    cw_min: u32,
    cw_max: u32,
    short_retry_limit: u32,
    long_retry_limit: u32,
    rts_threshold: usize,
    /// Frame id to retry counter, present only after a failed attempt
    short_retry_counter: HashMap<FrameId, u32>,
    long_retry_counter: HashMap<FrameId, u32>,
    station_short_retry_counter: u32,
    station_long_retry_counter: u32,
    cw: u32,
}

impl TxRetryHandler {
    /// The contention window starts at `CWmin`.
    pub fn new(params: &MacParameters, ac: AccessCategory) -> Self {
        Self {
            ac,
            cw_min: params.cw_min(ac),
            cw_max: params.cw_max(ac),
            short_retry_limit: params.short_retry_limit,
            long_retry_limit: params.long_retry_limit,
            rts_threshold: params.rts_threshold,
            short_retry_counter: HashMap::new(),
            long_retry_counter: HashMap::new(),
            station_short_retry_counter: 0,
            station_long_retry_counter: 0,
            cw: params.cw_min(ac),
        }
    }

    /// Current contention window.
    pub fn cw(&self) -> u32 {
        self.cw
    }

    pub fn station_short_retry_count(&self) -> u32 {
        self.station_short_retry_counter
    }

    pub fn station_long_retry_count(&self) -> u32 {
        self.station_long_retry_counter
    }

    pub fn short_retry_count(&self, id: FrameId) -> Option<u32> {
        self.short_retry_counter.get(&id).copied()
    }

    pub fn long_retry_count(&self, id: FrameId) -> Option<u32> {
        self.long_retry_counter.get(&id).copied()
    }

    /// Number of frames with retry state.
    pub fn tracked_frames(&self) -> usize {
        let long_only = self
            .long_retry_counter
            .keys()
            .filter(|id| !self.short_retry_counter.contains_key(id))
            .count();
        self.short_retry_counter.len() + long_only
    }

    /// Accounts for a successful attempt.
    ///
    /// A CTS in response to an RTS resets the SSRC only. An ACK for a DATA or
    /// management frame resets the SSRC if the frame is shorter than the RTS
    /// threshold, the SLRC otherwise, and always resets the contention
    /// window. The per-frame counters of that frame are dropped as it leaves
    /// the MAC.
    ///
    /// 9.19.2.6 words the SSRC reset as applying to frames *longer* than the
    /// threshold. The split used here is kept pending protocol-conformance
    /// review.
    pub fn frame_transmission_succeeded(&mut self, data: &DataFrame, succeeded: TxFrameKind) {
        match succeeded {
            TxFrameKind::Rts => self.reset_station_src(),
            TxFrameKind::Data => {
                match self.class_of_length(data.byte_len) {
                    RetryClass::Long => self.reset_station_lrc(),
                    RetryClass::Short => self.reset_station_src(),
                }
                self.reset_contention_window();
                self.forget(data.id);
            }
        }
        trace!(
            "{} tx succeeded, ssrc: {}, slrc: {}, cw: {}",
            self.ac,
            self.station_short_retry_counter,
            self.station_long_retry_counter,
            self.cw
        );
    }

    /// Accounts for a failed attempt of `failed` on behalf of `data`.
    ///
    /// A failed RTS, or DATA shorter than the RTS threshold, increments the
    /// short counters; longer DATA increments the long counters.
    pub fn frame_transmission_failed(&mut self, data: &DataFrame, failed: TxFrameKind) {
        match self.class_of(data, failed) {
            RetryClass::Short => {
                self.increment_station_src();
                increment_counter(&mut self.short_retry_counter, data.id);
            }
            RetryClass::Long => {
                self.increment_station_lrc();
                increment_counter(&mut self.long_retry_counter, data.id);
            }
        }
        debug!(
            "{} tx of {:?} for frame {} failed, ssrc: {}, slrc: {}, cw: {}",
            self.ac,
            failed,
            data.id,
            self.station_short_retry_counter,
            self.station_long_retry_counter,
            self.cw
        );
    }

    /// Returns `true` while the relevant per-frame counter is below its limit.
    ///
    /// # Errors
    ///
    /// Returns [`MacError::RetryCounterMissing`] if the frame has no failed
    /// attempt on record.
    pub fn is_retry_allowed(&self, data: &DataFrame, failed: TxFrameKind) -> Result<bool> {
        let (counters, limit) = match self.class_of(data, failed) {
            RetryClass::Short => (&self.short_retry_counter, self.short_retry_limit),
            RetryClass::Long => (&self.long_retry_counter, self.long_retry_limit),
        };
        let count = counters
            .get(&data.id)
            .ok_or(MacError::RetryCounterMissing(data.id))?;
        Ok(*count < limit)
    }

    /// Group addressed frames are never retried.
    pub fn multicast_frame_transmitted(&mut self) {
        self.reset_station_lrc();
        self.reset_station_src();
    }

    /// Drops the per-frame counters of a frame that leaves the MAC without an
    /// acknowledgement: discarded, or sent unacknowledged.
    pub fn frame_discarded(&mut self, id: FrameId) {
        self.forget(id);
    }

    fn forget(&mut self, id: FrameId) {
        let _ignore = self.short_retry_counter.remove(&id);
        let _ignore = self.long_retry_counter.remove(&id);
    }

    fn class_of(&self, data: &DataFrame, failed: TxFrameKind) -> RetryClass {
        match failed {
            TxFrameKind::Rts => RetryClass::Short,
            TxFrameKind::Data => self.class_of_length(data.byte_len),
        }
    }

    fn class_of_length(&self, byte_len: usize) -> RetryClass {
        if byte_len >= self.rts_threshold {
            RetryClass::Long
        } else {
            RetryClass::Short
        }
    }

    // The CW takes the next value in the series every time either station
    // counter increments, and is reset once a counter reaches its limit.
    fn increment_station_src(&mut self) {
        self.station_short_retry_counter += 1;
        if self.station_short_retry_counter == self.short_retry_limit {
            self.reset_contention_window();
        } else {
            self.cw = self.double_cw();
        }
    }

    fn increment_station_lrc(&mut self) {
        self.station_long_retry_counter += 1;
        if self.station_long_retry_counter == self.long_retry_limit {
            self.reset_contention_window();
        } else {
            self.cw = self.double_cw();
        }
    }

    fn reset_station_src(&mut self) {
        self.station_short_retry_counter = 0;
    }

    fn reset_station_lrc(&mut self) {
        self.station_long_retry_counter = 0;
    }

    fn reset_contention_window(&mut self) {
        self.cw = self.cw_min;
    }

    fn double_cw(&self) -> u32 {
        self.cw.saturating_mul(2).saturating_add(1).min(self.cw_max)
    }
}

fn increment_counter(counters: &mut HashMap<FrameId, u32>, id: FrameId) {
    *counters.entry(id).or_insert(0) += 1;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::addr;

    fn params() -> MacParameters {
        MacParameters {
            rts_threshold: 1000,
            ..MacParameters::default()
        }
    }

    fn frame(id: u64, byte_len: usize) -> DataFrame {
        let mut f = DataFrame::data(addr(1), addr(2), vec![]).with_byte_len(byte_len);
        f.id = FrameId(id);
        f
    }

    #[test]
    fn cw_starts_at_cw_min() {
        let handler = TxRetryHandler::new(&params(), AccessCategory::Video);
        assert_eq!(handler.cw(), 7);
        assert_eq!(handler.station_short_retry_count(), 0);
        assert_eq!(handler.station_long_retry_count(), 0);
    }

    #[test]
    fn cw_doubles_below_limit_and_resets_at_limit() {
        let params = params();
        for ac in AccessCategory::ALL {
            let mut handler = TxRetryHandler::new(&params, ac);
            let data = frame(1, 100);
            let cw_min = params.cw_min(ac);
            let cw_max = params.cw_max(ac);
            for n in 1..params.short_retry_limit {
                handler.frame_transmission_failed(&data, TxFrameKind::Data);
                let expected = ((cw_min + 1) << n).saturating_sub(1).min(cw_max);
                assert_eq!(handler.cw(), expected, "{ac} after {n} failures");
            }
            handler.frame_transmission_failed(&data, TxFrameKind::Data);
            assert_eq!(handler.cw(), cw_min, "{ac} at the limit");
        }
    }

    #[test]
    fn long_frames_use_long_counters() {
        let params = params();
        let mut handler = TxRetryHandler::new(&params, AccessCategory::BestEffort);
        let data = frame(1, 1500);
        handler.frame_transmission_failed(&data, TxFrameKind::Data);
        assert_eq!(handler.station_long_retry_count(), 1);
        assert_eq!(handler.station_short_retry_count(), 0);
        assert_eq!(handler.long_retry_count(data.id), Some(1));
        assert_eq!(handler.short_retry_count(data.id), None);
        assert_eq!(handler.cw(), 31);

        // RTS failures of a long frame are short retries
        handler.frame_transmission_failed(&data, TxFrameKind::Rts);
        assert_eq!(handler.station_short_retry_count(), 1);
        assert_eq!(handler.short_retry_count(data.id), Some(1));
        assert_eq!(handler.cw(), 63);
    }

    #[test]
    fn retry_allowed_until_limit() {
        let params = params();
        let mut handler = TxRetryHandler::new(&params, AccessCategory::BestEffort);
        let data = frame(7, 1500);
        for _ in 1..params.long_retry_limit {
            handler.frame_transmission_failed(&data, TxFrameKind::Data);
            assert!(handler.is_retry_allowed(&data, TxFrameKind::Data).unwrap());
        }
        handler.frame_transmission_failed(&data, TxFrameKind::Data);
        assert!(!handler.is_retry_allowed(&data, TxFrameKind::Data).unwrap());

        let short = frame(8, 100);
        for _ in 1..params.short_retry_limit {
            handler.frame_transmission_failed(&short, TxFrameKind::Data);
            assert!(handler.is_retry_allowed(&short, TxFrameKind::Data).unwrap());
        }
        handler.frame_transmission_failed(&short, TxFrameKind::Data);
        assert!(!handler.is_retry_allowed(&short, TxFrameKind::Data).unwrap());
    }

    #[test]
    fn missing_counter_is_an_error() {
        let handler = TxRetryHandler::new(&params(), AccessCategory::BestEffort);
        let data = frame(3, 100);
        assert!(matches!(
            handler.is_retry_allowed(&data, TxFrameKind::Data),
            Err(MacError::RetryCounterMissing(FrameId(3)))
        ));
    }

    #[test]
    fn success_resets_counters_and_forgets_frame() {
        let params = params();
        let mut handler = TxRetryHandler::new(&params, AccessCategory::BestEffort);
        let short = frame(1, 100);
        handler.frame_transmission_failed(&short, TxFrameKind::Data);
        handler.frame_transmission_failed(&short, TxFrameKind::Data);
        assert_eq!(handler.cw(), 63);
        assert_eq!(handler.tracked_frames(), 1);

        handler.frame_transmission_succeeded(&short, TxFrameKind::Data);
        assert_eq!(handler.station_short_retry_count(), 0);
        assert_eq!(handler.cw(), 15);
        assert_eq!(handler.tracked_frames(), 0);
    }

    #[test]
    fn rts_success_resets_only_short_counter() {
        let params = params();
        let mut handler = TxRetryHandler::new(&params, AccessCategory::BestEffort);
        let long = frame(1, 1500);
        handler.frame_transmission_failed(&long, TxFrameKind::Rts);
        handler.frame_transmission_failed(&long, TxFrameKind::Data);
        assert_eq!(handler.cw(), 63);

        handler.frame_transmission_succeeded(&long, TxFrameKind::Rts);
        assert_eq!(handler.station_short_retry_count(), 0);
        assert_eq!(handler.station_long_retry_count(), 1);
        assert_eq!(handler.cw(), 63);
        assert_eq!(handler.tracked_frames(), 1);

        handler.frame_transmission_succeeded(&long, TxFrameKind::Data);
        assert_eq!(handler.station_long_retry_count(), 0);
        assert_eq!(handler.cw(), 15);
        assert_eq!(handler.tracked_frames(), 0);
    }

    #[test]
    fn multicast_resets_station_counters() {
        let params = params();
        let mut handler = TxRetryHandler::new(&params, AccessCategory::BestEffort);
        handler.frame_transmission_failed(&frame(1, 100), TxFrameKind::Data);
        handler.frame_transmission_failed(&frame(2, 1500), TxFrameKind::Data);
        handler.multicast_frame_transmitted();
        assert_eq!(handler.station_short_retry_count(), 0);
        assert_eq!(handler.station_long_retry_count(), 0);
    }

    #[test]
    fn discard_drops_frame_state() {
        let mut handler = TxRetryHandler::new(&params(), AccessCategory::BestEffort);
        let data = frame(1, 100);
        handler.frame_transmission_failed(&data, TxFrameKind::Data);
        handler.frame_discarded(data.id);
        assert_eq!(handler.tracked_frames(), 0);
        assert!(handler.is_retry_allowed(&data, TxFrameKind::Data).is_err());
    }
}

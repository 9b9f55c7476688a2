use std::{
    collections::{HashMap, VecDeque},
    time::{Duration, Instant},
};

use log::{debug, trace};

use super::SessionKey;
use crate::{
    constants::MAX_BLOCK_ACK_WINDOW,
    frame::{action::STATUS_SUCCESS, AddbaRequest, AddbaResponse, BlockAck, DataFrame, SeqNum},
    types::{MacAddress, Tid},
};

/// Outcome of offering a frame to a reorder buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum Admission {
    /// Stored at its slot
    Buffered,
    /// Behind the window, already delivered or given up on
    Stale,
    /// The slot already holds a frame with this sequence number
    Duplicate,
    /// The frame was past the window. The window slid forward and the
    /// returned frames were forced out before the frame was stored.
    AdvancedWindow(Vec<DataFrame>),
}

/// An agreement under which we are the recipient.
#[derive(Debug)]
pub struct ReceiveSession {
    /// Sequence number of the buffer head
    begin_seq: SeqNum,
    window_size: u16,
    a_msdu_supported: bool,
    /// Slot `i` holds sequence number `begin_seq + i`
    buffer: VecDeque<Option<DataFrame>>,
    last_use: Instant,
}

impl ReceiveSession {
    pub fn new(begin_seq: SeqNum, window_size: u16, a_msdu_supported: bool, now: Instant) -> Self {
        let window_size = window_size.clamp(1, MAX_BLOCK_ACK_WINDOW);
        Self {
            begin_seq,
            window_size,
            a_msdu_supported,
            buffer: std::iter::repeat_with(|| None)
                .take(usize::from(window_size))
                .collect(),
            last_use: now,
        }
    }

    pub fn begin_seq(&self) -> SeqNum {
        self.begin_seq
    }

    pub fn window_size(&self) -> u16 {
        self.window_size
    }

    pub fn a_msdu_supported(&self) -> bool {
        self.a_msdu_supported
    }

    pub fn last_use(&self) -> Instant {
        self.last_use
    }

    /// Number of frames waiting in the buffer.
    pub fn buffered(&self) -> usize {
        self.buffer.iter().filter(|slot| slot.is_some()).count()
    }

    /// Inserts a frame at the slot implied by its sequence number.
    pub fn add_received_frame(&mut self, frame: DataFrame, now: Instant) -> Admission {
        self.last_use = now;
        let offset = frame.seq.distance_from(self.begin_seq);
        if offset < 0 {
            trace!("stale seq {}, window begins at {}", frame.seq, self.begin_seq);
            return Admission::Stale;
        }
        let window = i32::from(self.window_size);
        let (flushed, offset) = if offset >= window {
            let new_begin = frame.seq - (self.window_size - 1);
            let flushed = self.extract_and_flush_until(new_begin);
            (Some(flushed), window - 1)
        } else {
            (None, offset)
        };
        let Some(slot) = usize::try_from(offset)
            .ok()
            .and_then(|idx| self.buffer.get_mut(idx))
        else {
            return Admission::Stale;
        };
        if slot.is_some() {
            return Admission::Duplicate;
        }
        *slot = Some(frame);
        match flushed {
            Some(frames) => Admission::AdvancedWindow(frames),
            None => Admission::Buffered,
        }
    }

    /// Returns the frame at the buffer head, or `None` while the head is a
    /// hole.
    pub fn extract_next(&mut self) -> Option<DataFrame> {
        if self.buffer.front().is_some_and(Option::is_none) {
            return None;
        }
        let frame = self.buffer.pop_front().flatten();
        self.buffer.push_back(None);
        self.begin_seq += 1;
        frame
    }

    /// Moves the window to begin at `seq`, returning every buffered frame
    /// before it in sequence order, past any holes.
    pub fn extract_and_flush_until(&mut self, seq: SeqNum) -> Vec<DataFrame> {
        let distance = seq.distance_from(self.begin_seq);
        let Ok(distance) = usize::try_from(distance) else {
            return Vec::new();
        };
        let shift = distance.min(self.buffer.len());
        let mut flushed = Vec::new();
        for _ in 0..shift {
            if let Some(frame) = self.buffer.pop_front().flatten() {
                flushed.push(frame);
            }
            self.buffer.push_back(None);
        }
        self.begin_seq = seq;
        flushed
    }

    /// Removes everything from the buffer in sequence order.
    fn drain(&mut self) -> Vec<DataFrame> {
        self.buffer.iter_mut().filter_map(Option::take).collect()
    }

    /// Compressed BlockAck reporting the frames currently held.
    pub fn block_ack(&self, receiver: MacAddress, transmitter: MacAddress, tid: Tid) -> BlockAck {
        let held: Vec<SeqNum> = self
            .buffer
            .iter()
            .flatten()
            .map(|f| f.seq)
            .collect();
        BlockAck::compressed(receiver, transmitter, tid, self.begin_seq, &held)
    }
}

/// Receive side agreements of one station.
#[derive(Debug, Default)]
pub struct BlockAckReceiveSessions {
    sessions: HashMap<SessionKey, ReceiveSession>,
}

impl BlockAckReceiveSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts an ADDBA request from `originator` and returns the response to
    /// send. The buffer size is the requested one, or 64 if the originator
    /// left it to us, capped by `local_buffer_size`.
    ///
    /// An agreement already in place for the same key is replaced; the frames
    /// its reorder buffer still held are returned in sequence order.
    pub fn accept(
        &mut self,
        originator: MacAddress,
        request: &AddbaRequest,
        local_buffer_size: u16,
        local_a_msdu: bool,
        now: Instant,
    ) -> (AddbaResponse, Vec<DataFrame>) {
        let flushed = self
            .delete_session(originator, request.tid)
            .unwrap_or_default();
        let requested = match request.buffer_size {
            0 => MAX_BLOCK_ACK_WINDOW,
            n => n,
        };
        let buffer_size = requested.min(local_buffer_size).clamp(1, MAX_BLOCK_ACK_WINDOW);
        let a_msdu_supported = request.a_msdu_supported && local_a_msdu;
        let session = ReceiveSession::new(request.starting_seq, buffer_size, a_msdu_supported, now);
        debug!(
            "BlockAck receive session established, originator: {originator}, tid: {}, \
             window: {buffer_size}, ssn: {}",
            request.tid, request.starting_seq
        );
        let _ignore = self.sessions.insert((originator, request.tid), session);
        let response = AddbaResponse {
            dialog_token: request.dialog_token,
            status: STATUS_SUCCESS,
            tid: request.tid,
            policy: request.policy,
            a_msdu_supported,
            buffer_size,
            timeout: request.timeout,
        };
        (response, flushed)
    }

    pub fn session(&self, originator: MacAddress, tid: Tid) -> Option<&ReceiveSession> {
        self.sessions.get(&(originator, tid))
    }

    pub fn session_mut(&mut self, originator: MacAddress, tid: Tid) -> Option<&mut ReceiveSession> {
        self.sessions.get_mut(&(originator, tid))
    }

    pub fn has_session(&self, originator: MacAddress, tid: Tid) -> bool {
        self.sessions.contains_key(&(originator, tid))
    }

    /// Tears down an agreement, returning the frames still buffered in
    /// sequence order, or `None` if there was no agreement.
    pub fn delete_session(&mut self, originator: MacAddress, tid: Tid) -> Option<Vec<DataFrame>> {
        let mut session = self.sessions.remove(&(originator, tid))?;
        let frames = session.drain();
        debug!(
            "BlockAck receive session torn down, originator: {originator}, tid: {tid}, flushed: {}",
            frames.len()
        );
        Some(frames)
    }

    /// Tears down every session idle for at least `timeout`. Returns the
    /// removed keys with the frames they still held.
    pub fn expire_inactive(
        &mut self,
        now: Instant,
        timeout: Duration,
    ) -> Vec<(SessionKey, Vec<DataFrame>)> {
        let expired: Vec<SessionKey> = self
            .sessions
            .iter()
            .filter(|(_, s)| now.saturating_duration_since(s.last_use) >= timeout)
            .map(|(key, _)| *key)
            .collect();
        expired
            .into_iter()
            .filter_map(|(originator, tid)| {
                self.delete_session(originator, tid)
                    .map(|frames| ((originator, tid), frames))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{BitmapPosition, BlockAckPolicy};

    fn addr(x: u8) -> MacAddress {
        MacAddress([2, 0, 0, 0, 0, x])
    }

    fn tid(x: u8) -> Tid {
        Tid::new(x).unwrap()
    }

    fn data(seq: u16) -> DataFrame {
        let mut f = DataFrame::qos_data(addr(9), addr(1), tid(0), vec![0; 10]);
        f.seq = SeqNum::new(seq);
        f
    }

    fn seqs(frames: &[DataFrame]) -> Vec<u16> {
        frames.iter().map(|f| f.seq.into_inner()).collect()
    }

    fn request(buffer_size: u16, a_msdu: bool) -> AddbaRequest {
        AddbaRequest {
            dialog_token: 5,
            tid: tid(0),
            policy: BlockAckPolicy::Immediate,
            a_msdu_supported: a_msdu,
            buffer_size,
            timeout: 0,
            starting_seq: SeqNum::new(100),
        }
    }

    #[test]
    fn holds_frames_behind_a_hole() {
        let now = Instant::now();
        let mut session = ReceiveSession::new(SeqNum::new(0), 8, false, now);
        assert_eq!(session.add_received_frame(data(1), now), Admission::Buffered);
        assert_eq!(session.add_received_frame(data(2), now), Admission::Buffered);
        assert!(session.extract_next().is_none());
        assert_eq!(session.begin_seq(), SeqNum::new(0));

        assert_eq!(session.add_received_frame(data(0), now), Admission::Buffered);
        let mut delivered = Vec::new();
        while let Some(frame) = session.extract_next() {
            delivered.push(frame);
        }
        assert_eq!(seqs(&delivered), vec![0, 1, 2]);
        assert_eq!(session.begin_seq(), SeqNum::new(3));
        assert_eq!(session.buffered(), 0);
    }

    #[test]
    fn flush_skips_holes() {
        let now = Instant::now();
        let mut session = ReceiveSession::new(SeqNum::new(4094), 8, false, now);
        for seq in [4095, 1, 3] {
            assert_eq!(session.add_received_frame(data(seq), now), Admission::Buffered);
        }
        let flushed = session.extract_and_flush_until(SeqNum::new(2));
        assert_eq!(seqs(&flushed), vec![4095, 1]);
        assert_eq!(session.begin_seq(), SeqNum::new(2));
        assert!(session.extract_next().is_none());
        assert_eq!(session.add_received_frame(data(2), now), Admission::Buffered);
        assert_eq!(session.extract_next().map(|f| f.seq), Some(SeqNum::new(2)));
        assert_eq!(session.extract_next().map(|f| f.seq), Some(SeqNum::new(3)));
        assert!(session.extract_next().is_none());
    }

    #[test]
    fn stale_and_duplicate_frames_are_dropped() {
        let now = Instant::now();
        let mut session = ReceiveSession::new(SeqNum::new(10), 8, false, now);
        assert_eq!(session.add_received_frame(data(9), now), Admission::Stale);
        assert_eq!(session.add_received_frame(data(11), now), Admission::Buffered);
        assert_eq!(session.add_received_frame(data(11), now), Admission::Duplicate);
        assert_eq!(session.buffered(), 1);
    }

    #[test]
    fn frame_past_window_slides_it() {
        let now = Instant::now();
        let mut session = ReceiveSession::new(SeqNum::new(0), 4, false, now);
        assert_eq!(session.add_received_frame(data(1), now), Admission::Buffered);
        assert_eq!(session.add_received_frame(data(3), now), Admission::Buffered);
        match session.add_received_frame(data(5), now) {
            Admission::AdvancedWindow(frames) => assert_eq!(seqs(&frames), vec![1]),
            other => panic!("unexpected admission {other:?}"),
        }
        assert_eq!(session.begin_seq(), SeqNum::new(2));
        let flushed = session.extract_and_flush_until(SeqNum::new(6));
        assert_eq!(seqs(&flushed), vec![3, 5]);
    }

    #[test]
    fn block_ack_reports_held_frames() {
        let now = Instant::now();
        let mut session = ReceiveSession::new(SeqNum::new(20), 8, false, now);
        let _ = session.add_received_frame(data(21), now);
        let ba = session.block_ack(addr(9), addr(1), tid(0));
        assert_eq!(ba.variant.starting_seq(), Some(SeqNum::new(20)));
        assert_eq!(ba.variant.position(SeqNum::new(20), 0).unwrap(), BitmapPosition::Missing);
        assert_eq!(ba.variant.position(SeqNum::new(21), 0).unwrap(), BitmapPosition::Acked);
        assert_eq!(ba.variant.position(SeqNum::new(19), 0).unwrap(), BitmapPosition::Before);
    }

    #[test]
    fn accept_builds_response() {
        let now = Instant::now();
        let mut sessions = BlockAckReceiveSessions::new();
        let (response, flushed) = sessions.accept(addr(1), &request(0, true), 32, false, now);
        assert!(flushed.is_empty());
        assert!(response.is_success());
        assert_eq!(response.dialog_token, 5);
        assert_eq!(response.buffer_size, 32);
        assert!(!response.a_msdu_supported);
        let session = sessions.session(addr(1), tid(0)).unwrap();
        assert_eq!(session.window_size(), 32);
        assert_eq!(session.begin_seq(), SeqNum::new(100));

        let (response, _) = sessions.accept(addr(2), &request(16, true), 64, true, now);
        assert_eq!(response.buffer_size, 16);
        assert!(response.a_msdu_supported);
        assert_eq!(sessions.len(), 2);
    }

    #[test]
    fn renewed_agreement_flushes_old_buffer() {
        let now = Instant::now();
        let mut sessions = BlockAckReceiveSessions::new();
        let _ = sessions.accept(addr(1), &request(8, false), 64, false, now);
        let admission = sessions
            .session_mut(addr(1), tid(0))
            .unwrap()
            .add_received_frame(data(101), now);
        assert_eq!(admission, Admission::Buffered);

        let (response, flushed) = sessions.accept(addr(1), &request(16, false), 64, false, now);
        assert!(response.is_success());
        assert_eq!(seqs(&flushed), vec![101]);
        let session = sessions.session(addr(1), tid(0)).unwrap();
        assert_eq!(session.buffered(), 0);
        assert_eq!(session.window_size(), 16);
        assert_eq!(sessions.len(), 1);
    }

    #[test]
    fn delete_and_expire_flush_buffers() {
        let start = Instant::now();
        let mut sessions = BlockAckReceiveSessions::new();
        let _ = sessions.accept(addr(1), &request(8, false), 64, false, start);
        let _ = sessions.accept(addr(2), &request(8, false), 64, false, start);
        let later = start + Duration::from_millis(50);
        let admission = sessions
            .session_mut(addr(2), tid(0))
            .unwrap()
            .add_received_frame(data(102), later);
        assert_eq!(admission, Admission::Buffered);

        let expired = sessions.expire_inactive(later, Duration::from_millis(20));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].0, (addr(1), tid(0)));
        assert!(sessions.has_session(addr(2), tid(0)));

        let flushed = sessions.delete_session(addr(2), tid(0)).unwrap();
        assert_eq!(seqs(&flushed), vec![102]);
        assert!(sessions.is_empty());
        assert!(sessions.delete_session(addr(2), tid(0)).is_none());
    }
}

use std::collections::HashMap;

use log::{debug, error, trace, warn};

use super::SessionKey;
use crate::{
    constants::MAX_BLOCK_ACK_WINDOW,
    error::{MacError, Result},
    frame::{
        AddbaRequest, AddbaResponse, BitmapPosition, BlockAck, BlockAckPolicy, DataFrame, SeqNum,
    },
    types::{FrameId, MacAddress, Tid},
};

/// An agreement under which we are the originator.
#[derive(Debug, Clone)]
pub struct SendSession {
    starting_seq: SeqNum,
    window_size: u16,
    a_msdu_supported: bool,
    policy: BlockAckPolicy,
    /// Transmitted and not yet confirmed, in transmission order
    outstanding: Vec<DataFrame>,
    /// Frames the most recent BlockAck selected for retransmission
    last_retransmit: Vec<FrameId>,
}

impl SendSession {
    fn new(request: &AddbaRequest, response: &AddbaResponse) -> Self {
        let window_size = match response.buffer_size {
            0 => MAX_BLOCK_ACK_WINDOW,
            n => n.min(MAX_BLOCK_ACK_WINDOW),
        };
        Self {
            starting_seq: request.starting_seq,
            window_size,
            a_msdu_supported: request.a_msdu_supported && response.a_msdu_supported,
            policy: request.policy,
            outstanding: Vec::new(),
            last_retransmit: Vec::new(),
        }
    }

    pub fn starting_seq(&self) -> SeqNum {
        self.starting_seq
    }

    pub fn window_size(&self) -> u16 {
        self.window_size
    }

    pub fn a_msdu_supported(&self) -> bool {
        self.a_msdu_supported
    }

    pub fn policy(&self) -> BlockAckPolicy {
        self.policy
    }

    pub fn outstanding(&self) -> &[DataFrame] {
        &self.outstanding
    }

    pub fn last_retransmit(&self) -> &[FrameId] {
        &self.last_retransmit
    }

    /// Returns `true` if `seq` lies inside the transmit window.
    pub fn is_within_window(&self, seq: SeqNum) -> bool {
        let offset = seq.distance_from(self.starting_seq);
        offset >= 0 && offset < i32::from(self.window_size)
    }

    /// Splits the outstanding frames against a BlockAck bitmap.
    ///
    /// Frames before the starting sequence number or with their bit set are
    /// confirmed, frames with a clear bit are returned for retransmission with
    /// the retry flag set, and frames past the bitmap stay outstanding.
    fn apply_block_ack(&mut self, ba: &BlockAck) -> Result<Vec<DataFrame>> {
        let variant = &ba.variant;
        let ba_start = variant
            .starting_seq()
            .ok_or_else(|| MacError::UnsupportedBlockAck("multi-TID BlockAck".into()))?;

        // Classify everything before touching the list so an unsupported
        // variant leaves the session unchanged.
        let positions = self
            .outstanding
            .iter()
            .map(|f| variant.position(f.seq, f.fragment))
            .collect::<Result<Vec<_>>>()?;

        let mut retransmit = Vec::new();
        let mut kept = Vec::new();
        let mut next_start = ba_start;
        for (mut frame, position) in self.outstanding.drain(..).zip(positions) {
            match position {
                BitmapPosition::Before | BitmapPosition::Acked => {
                    trace!("seq {} confirmed by BlockAck", frame.seq);
                    if frame.seq.distance_from(next_start) >= 0 {
                        next_start = frame.seq + 1;
                    }
                }
                BitmapPosition::Missing => {
                    frame.retry = true;
                    retransmit.push(frame);
                }
                BitmapPosition::Beyond => kept.push(frame),
            }
        }

        let earliest_pending = retransmit
            .iter()
            .chain(kept.iter())
            .map(|f| f.seq)
            .min_by_key(|seq| seq.distance_from(self.starting_seq));
        let new_start = earliest_pending.unwrap_or(next_start);
        if new_start.distance_from(self.starting_seq) > 0 {
            self.starting_seq = new_start;
        }
        self.outstanding = kept;
        self.last_retransmit = retransmit.iter().map(|f| f.id).collect();
        Ok(retransmit)
    }
}

/// Transmit side agreements of one station.
#[derive(Debug, Default)]
pub struct BlockAckSendSessions {
    sessions: HashMap<SessionKey, SendSession>,
}

impl BlockAckSendSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an agreement from our ADDBA request and the peer's response.
    ///
    /// Returns `false` without creating a session when the response declines
    /// the request, answers a different TID or dialog token, or clears the
    /// A-MSDU capability we declared. The caller keeps using normal
    /// acknowledgment in that case.
    pub fn negotiate(
        &mut self,
        peer: MacAddress,
        request: &AddbaRequest,
        response: &AddbaResponse,
    ) -> bool {
        if !response.is_success() {
            warn!(
                "ADDBA declined by {peer}, tid: {}, status: {}",
                request.tid, response.status
            );
            return false;
        }
        if response.tid != request.tid || response.dialog_token != request.dialog_token {
            warn!(
                "ADDBA response from {peer} does not match request, tid: {}/{}, token: {}/{}",
                response.tid, request.tid, response.dialog_token, request.dialog_token
            );
            return false;
        }
        let a_msdu_supported = request.a_msdu_supported && response.a_msdu_supported;
        if a_msdu_supported != request.a_msdu_supported {
            warn!("ADDBA response from {peer} rejects A-MSDU, tid: {}", request.tid);
            return false;
        }
        let session = SendSession::new(request, response);
        debug!(
            "BlockAck send session established, peer: {peer}, tid: {}, window: {}, ssn: {}",
            request.tid, session.window_size, session.starting_seq
        );
        let _ignore = self.sessions.insert((peer, request.tid), session);
        true
    }

    pub fn session(&self, peer: MacAddress, tid: Tid) -> Option<&SendSession> {
        self.sessions.get(&(peer, tid))
    }

    pub fn has_session(&self, peer: MacAddress, tid: Tid) -> bool {
        self.sessions.contains_key(&(peer, tid))
    }

    /// Returns `true` if a session exists and `seq` lies in its window.
    pub fn is_within_window(&self, peer: MacAddress, tid: Tid, seq: SeqNum) -> bool {
        self.session(peer, tid)
            .is_some_and(|s| s.is_within_window(seq))
    }

    /// Adds a frame sent under the agreement to the outstanding list.
    ///
    /// # Errors
    ///
    /// Returns [`MacError::InvalidInput`] for a frame without a TID and
    /// [`MacError::NoSession`] if no agreement covers it.
    pub fn record_transmitted(&mut self, frame: DataFrame) -> Result<()> {
        let tid = frame
            .tid
            .ok_or_else(|| MacError::InvalidInput("BlockAck frame without TID".into()))?;
        let peer = frame.receiver;
        let session = self
            .sessions
            .get_mut(&(peer, tid))
            .ok_or(MacError::NoSession { peer, tid })?;
        trace!("seq {} outstanding under BlockAck, peer: {peer}, tid: {tid}", frame.seq);
        session.outstanding.push(frame);
        Ok(())
    }

    /// Processes a BlockAck sent by the recipient and returns the frames to
    /// retransmit, in their original order.
    ///
    /// # Errors
    ///
    /// Returns [`MacError::UnsupportedBlockAck`] for the multi-TID variant and
    /// [`MacError::NoSession`] if there is no agreement with the sender.
    pub fn on_block_ack(&mut self, ba: &BlockAck) -> Result<Vec<DataFrame>> {
        let Some(tid) = ba.tid() else {
            error!("multi-TID BlockAck from {}", ba.transmitter);
            return Err(MacError::UnsupportedBlockAck("multi-TID BlockAck".into()));
        };
        let peer = ba.transmitter;
        let session = self
            .sessions
            .get_mut(&(peer, tid))
            .ok_or(MacError::NoSession { peer, tid })?;
        let retransmit = session.apply_block_ack(ba)?;
        debug!(
            "BlockAck from {peer}, tid: {tid}, retransmit: {:?}, ssn: {}",
            retransmit.iter().map(|f| f.seq.into_inner()).collect::<Vec<_>>(),
            session.starting_seq
        );
        Ok(retransmit)
    }

    /// Tears down an agreement. Returns the frames that were still
    /// unconfirmed, retry flag set, or `None` if there was no agreement.
    pub fn on_delba(&mut self, peer: MacAddress, tid: Tid) -> Option<Vec<DataFrame>> {
        let session = self.sessions.remove(&(peer, tid))?;
        debug!(
            "BlockAck send session torn down, peer: {peer}, tid: {tid}, outstanding: {}",
            session.outstanding.len()
        );
        Some(
            session
                .outstanding
                .into_iter()
                .map(|mut f| {
                    f.retry = true;
                    f
                })
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

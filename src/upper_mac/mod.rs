//! EDCA upper MAC coordinator.
//!
//! Owns one transmit queue, retry handler and at most one active frame
//! exchange per access category, the Block Ack session tables, and the
//! responder duties of the station. Everything is driven by the methods below,
//! one event at a time.

/// Events and worker integration
mod event;
/// Sequence number assignment
mod sequence;


pub use event::MacEvent;

use std::{
    collections::{HashMap, VecDeque},
    time::Instant,
};

use log::{debug, error, trace, warn};

use self::sequence::SequenceManager;
use crate::{
    block_ack::{Admission, BlockAckReceiveSessions, BlockAckSendSessions, SessionKey},
    config::MacParameters,
    constants::ADDBA_RESPONSE_TIMEOUT,
    device::MacDevice,
    error::{MacError, Result},
    exchange::{
        build_exchange, ExchangeCtx, ExchangeKind, ExchangeNotice, FrameExchange,
        FrameProcessingResult,
    },
    frame::{
        action::{REASON_END_BA, REASON_TIMEOUT},
        Ack, ActionBody, AddbaRequest, AddbaResponse, BlockAck, BlockAckPolicy, Cts, DataFrame,
        Delba, Frame, FrameBody, Rts,
    },
    retry::TxRetryHandler,
    types::{AccessCategory, FrameId, MacAddress, Tid, TimerId, TxOrigin},
};

/// Per access category transmit state.
#[derive(Debug)]
struct AcState {
    queue: VecDeque<DataFrame>,
    exchange: Option<Box<dyn FrameExchange>>,
    retry: TxRetryHandler,
    /// Contention has been requested and not yet resolved
    contending: bool,
}

impl AcState {
    fn new(params: &MacParameters, ac: AccessCategory) -> Self {
        Self {
            queue: VecDeque::new(),
            exchange: None,
            retry: TxRetryHandler::new(params, ac),
            contending: false,
        }
    }
}

pub struct UpperMac<D> {
    address: MacAddress,
    params: MacParameters,
    device: D,
    acs: [AcState; 4],
    sequence: SequenceManager,
    next_frame_id: u64,
    ba_send: BlockAckSendSessions,
    ba_recv: BlockAckReceiveSessions,
    /// ADDBA requests waiting for a response, with the time they were queued
    pending_addba: HashMap<SessionKey, (AddbaRequest, Instant)>,
    next_dialog_token: u8,
}

impl<D: MacDevice> UpperMac<D> {
    /// Creates the upper MAC of the station at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`MacError::Config`] if `params` fail validation.
    pub fn new(address: MacAddress, params: MacParameters, device: D) -> Result<Self> {
        params.validate()?;
        let acs = AccessCategory::ALL.map(|ac| AcState::new(&params, ac));
        Ok(Self {
            address,
            params,
            device,
            acs,
            sequence: SequenceManager::new(),
            next_frame_id: 0,
            ba_send: BlockAckSendSessions::new(),
            ba_recv: BlockAckReceiveSessions::new(),
            pending_addba: HashMap::new(),
            next_dialog_token: 0,
        })
    }

    pub fn address(&self) -> MacAddress {
        self.address
    }

    pub fn params(&self) -> &MacParameters {
        &self.params
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn queue_len(&self, ac: AccessCategory) -> usize {
        self.ac(ac).queue.len()
    }

    pub fn queued_frames(&self, ac: AccessCategory) -> impl Iterator<Item = &DataFrame> {
        self.ac(ac).queue.iter()
    }

    pub fn retry_handler(&self, ac: AccessCategory) -> &TxRetryHandler {
        &self.ac(ac).retry
    }

    /// Frame carried by the exchange running on `ac`.
    pub fn active_frame(&self, ac: AccessCategory) -> Option<&DataFrame> {
        self.ac(ac).exchange.as_ref().map(|ex| ex.data_frame())
    }

    pub fn send_sessions(&self) -> &BlockAckSendSessions {
        &self.ba_send
    }

    pub fn receive_sessions(&self) -> &BlockAckReceiveSessions {
        &self.ba_recv
    }

    /// Queues a frame from the layer above. The transmitter address, frame
    /// id and sequence number are assigned here.
    ///
    /// # Errors
    ///
    /// Returns [`MacError::QueueFull`] if the access category queue is full.
    pub fn upper_frame_received(&mut self, mut frame: DataFrame) -> Result<FrameId> {
        let ac = classify(&frame);
        if self.ac(ac).queue.len() >= self.params.max_queue_size {
            warn!("{ac} queue full, dropping frame to {}", frame.receiver);
            return Err(MacError::QueueFull(ac));
        }
        self.next_frame_id += 1;
        frame.id = FrameId(self.next_frame_id);
        frame.transmitter = self.address;
        frame.seq = self.sequence.next(frame.receiver, frame.tid);
        trace!(
            "{ac} queued {} to {}, seq: {}",
            frame.id,
            frame.receiver,
            frame.seq
        );
        let id = frame.id;
        self.ac_mut(ac).queue.push_back(frame);
        self.start_contention_if_needed(ac);
        Ok(id)
    }

    /// Channel access was won for `ac`.
    pub fn channel_access_granted(&mut self, ac: AccessCategory) {
        self.ac_mut(ac).contending = false;
        if self.ac(ac).exchange.is_some() {
            let _ignore = self.run_exchange(ac, |ex, ctx| ex.continue_exchange(ctx));
            return;
        }
        if !self.install_next_exchange(ac) {
            trace!("{ac} channel granted with nothing to send");
            return;
        }
        let _ignore = self.run_exchange(ac, |ex, ctx| ex.start(ctx));
    }

    /// Two access categories of this station won the channel at the same
    /// time and `ac` lost. Counts as a failed attempt of the first frame the
    /// exchange would send.
    pub fn internal_collision(&mut self, ac: AccessCategory) {
        self.ac_mut(ac).contending = false;
        if self.ac(ac).exchange.is_none() && !self.install_next_exchange(ac) {
            warn!("{ac} internal collision with nothing queued");
            return;
        }
        let Some(kind) = self.ac(ac).exchange.as_ref().map(|ex| ex.first_frame_kind()) else {
            return;
        };
        debug!("{ac} internal collision");
        self.process_notices(ac, vec![ExchangeNotice::TransmissionFailed(kind)]);
    }

    /// A frame was received intact.
    ///
    /// # Errors
    ///
    /// Returns [`MacError::UnsupportedBlockAck`] or [`MacError::NoSession`]
    /// for a BlockAck that cannot be applied to a send session.
    pub fn lower_frame_received(&mut self, frame: Frame) -> Result<()> {
        let receiver = frame.receiver();
        if receiver != self.address && !receiver.is_group() {
            trace!("{} for {receiver} is not for us", frame.kind_name());
            self.corrupted_frame_received();
            return Ok(());
        }

        for ac in AccessCategory::ALL.into_iter().rev() {
            match self.run_exchange(ac, |ex, ctx| ex.lower_frame_received(&frame, ctx)) {
                Some(FrameProcessingResult::ProcessedDiscard) => return Ok(()),
                Some(FrameProcessingResult::ProcessedContinue) => break,
                Some(FrameProcessingResult::Ignored) | None => {}
            }
        }

        match frame {
            Frame::Data(data) => {
                self.receive_data(data);
                Ok(())
            }
            Frame::Rts(rts) => {
                if rts.receiver == self.address {
                    self.respond_to_rts(&rts);
                }
                Ok(())
            }
            Frame::BlockAck(ba) => self.receive_block_ack(&ba),
            Frame::Cts(_) | Frame::Ack(_) => {
                trace!("unsolicited {} dropped", frame.kind_name());
                Ok(())
            }
        }
    }

    /// A reception ended with a corrupted frame, or a frame addressed to
    /// another station.
    pub fn corrupted_frame_received(&mut self) {
        for ac in AccessCategory::ALL.into_iter().rev() {
            if self.run_exchange(ac, |ex, ctx| ex.corrupted_or_not_for_us_frame_received(ctx))
                == Some(true)
            {
                return;
            }
        }
    }

    /// The transmit interface finished a frame handed over by `origin`.
    pub fn transmission_complete(&mut self, origin: TxOrigin) {
        match origin {
            TxOrigin::Exchange(ac) => {
                if self
                    .run_exchange(ac, |ex, ctx| ex.transmission_complete(ctx))
                    .is_none()
                {
                    warn!("{ac} transmission complete without an exchange");
                }
            }
            TxOrigin::Response => trace!("response transmitted"),
        }
    }

    pub fn timer_fired(&mut self, id: TimerId) {
        for ac in AccessCategory::ALL {
            if self.run_exchange(ac, |ex, ctx| ex.handle_timeout(id, ctx)) == Some(true) {
                return;
            }
        }
        trace!("stale timer {id:?}");
    }

    /// Aborts the exchange running on `ac`. Its frame goes back to the head
    /// of the queue with its retry state untouched.
    pub fn abort_exchange(&mut self, ac: AccessCategory) {
        let Some(mut exchange) = self.ac_mut(ac).exchange.take() else {
            return;
        };
        let mut notices = Vec::new();
        {
            let mut ctx = ExchangeCtx {
                io: &mut self.device,
                params: &self.params,
                notices: &mut notices,
            };
            exchange.abort(&mut ctx);
        }
        let frame = exchange.into_frame();
        debug!("{ac} exchange of {} aborted, frame requeued", frame.id);
        self.ac_mut(ac).queue.push_front(frame);
        self.start_contention_if_needed(ac);
    }

    /// Starts negotiating a Block Ack agreement with `peer` for `tid` by
    /// queueing an ADDBA request.
    ///
    /// # Errors
    ///
    /// Returns [`MacError::InvalidInput`] for a group address and
    /// [`MacError::QueueFull`] if the request cannot be queued.
    pub fn establish_block_ack(&mut self, peer: MacAddress, tid: Tid) -> Result<()> {
        if peer.is_group() {
            return Err(MacError::InvalidInput(format!(
                "Block Ack agreement with group address {peer}"
            )));
        }
        if self.ba_send.has_session(peer, tid) || self.pending_addba.contains_key(&(peer, tid)) {
            debug!("Block Ack agreement with {peer}, tid {tid} exists or is pending");
            return Ok(());
        }
        self.next_dialog_token = self.next_dialog_token.wrapping_add(1);
        let request = AddbaRequest {
            dialog_token: self.next_dialog_token,
            tid,
            policy: BlockAckPolicy::Immediate,
            a_msdu_supported: self.params.a_msdu_supported,
            buffer_size: self.params.block_ack_buffer_size,
            timeout: 0,
            starting_seq: self.sequence.peek(peer, tid),
        };
        let _id = self.upper_frame_received(DataFrame::action(
            peer,
            self.address,
            ActionBody::AddbaRequest(request),
        ))?;
        let _ignore = self
            .pending_addba
            .insert((peer, tid), (request, Instant::now()));
        debug!("ADDBA request queued for {peer}, tid {tid}, ssn {}", request.starting_seq);
        Ok(())
    }

    /// Sends a compressed BlockAck reporting the reorder buffer of the
    /// agreement with `originator`.
    ///
    /// # Errors
    ///
    /// Returns [`MacError::NoSession`] without an agreement, or the transmit
    /// interface's error.
    pub fn send_block_ack(&mut self, originator: MacAddress, tid: Tid) -> Result<()> {
        let session = self
            .ba_recv
            .session(originator, tid)
            .ok_or(MacError::NoSession {
                peer: originator,
                tid,
            })?;
        let ba = session.block_ack(originator, self.address, tid);
        let sifs = self.params.sifs();
        self.device
            .transmit(Frame::BlockAck(ba), sifs, TxOrigin::Response)
    }

    /// Periodic housekeeping: gives up ADDBA requests left unanswered and
    /// tears down receive agreements idle for longer than the configured
    /// inactivity timeout.
    pub fn maintenance(&mut self, now: Instant) {
        self.pending_addba.retain(|(peer, tid), (_, queued)| {
            let waiting = now.saturating_duration_since(*queued) < ADDBA_RESPONSE_TIMEOUT;
            if !waiting {
                debug!("ADDBA request to {peer}, tid {tid} got no response");
            }
            waiting
        });
        let Some(timeout) = self.params.block_ack_inactivity_timeout() else {
            return;
        };
        for ((originator, tid), frames) in self.ba_recv.expire_inactive(now, timeout) {
            debug!("Block Ack agreement with {originator}, tid {tid} timed out");
            for frame in frames {
                self.device.deliver(frame);
            }
            let delba = Delba {
                tid,
                initiator: false,
                reason: REASON_TIMEOUT,
            };
            self.queue_action(originator, ActionBody::Delba(delba));
        }
    }

    fn ac(&self, ac: AccessCategory) -> &AcState {
        &self.acs[ac.index()]
    }

    fn ac_mut(&mut self, ac: AccessCategory) -> &mut AcState {
        &mut self.acs[ac.index()]
    }

    fn start_contention_if_needed(&mut self, ac: AccessCategory) {
        let state = self.ac(ac);
        if state.exchange.is_none() && !state.queue.is_empty() && !state.contending {
            self.request_contention(ac);
        }
    }

    fn request_contention(&mut self, ac: AccessCategory) {
        let state = self.ac_mut(ac);
        state.contending = true;
        let cw = state.retry.cw();
        trace!("{ac} contending, cw: {cw}");
        self.device.start_contention(ac, cw);
    }

    /// Moves the queue head into a new exchange. Returns `false` if the
    /// queue is empty.
    fn install_next_exchange(&mut self, ac: AccessCategory) -> bool {
        let Some(frame) = self.ac_mut(ac).queue.pop_front() else {
            return false;
        };
        let under_agreement = frame
            .tid
            .is_some_and(|tid| self.ba_send.is_within_window(frame.receiver, tid, frame.seq));
        let exchange = build_exchange(frame, ac, under_agreement, &self.params);
        trace!("{ac} {:?} exchange for {}", exchange.kind(), exchange.data_frame().id);
        self.ac_mut(ac).exchange = Some(exchange);
        true
    }

    /// Runs `f` on the exchange of `ac` and handles what it reports.
    /// Returns `None` if no exchange is running.
    fn run_exchange<R>(
        &mut self,
        ac: AccessCategory,
        f: impl FnOnce(&mut dyn FrameExchange, &mut ExchangeCtx<'_>) -> R,
    ) -> Option<R> {
        let (result, notices) = self.invoke_exchange(ac, f)?;
        self.process_notices(ac, notices);
        Some(result)
    }

    fn invoke_exchange<R>(
        &mut self,
        ac: AccessCategory,
        f: impl FnOnce(&mut dyn FrameExchange, &mut ExchangeCtx<'_>) -> R,
    ) -> Option<(R, Vec<ExchangeNotice>)> {
        let slot = ac.index();
        let mut exchange = self.acs[slot].exchange.take()?;
        let mut notices = Vec::new();
        let result = {
            let mut ctx = ExchangeCtx {
                io: &mut self.device,
                params: &self.params,
                notices: &mut notices,
            };
            f(exchange.as_mut(), &mut ctx)
        };
        self.acs[slot].exchange = Some(exchange);
        Some((result, notices))
    }

    fn process_notices(&mut self, ac: AccessCategory, notices: Vec<ExchangeNotice>) {
        let mut pending = VecDeque::from(notices);
        while let Some(notice) = pending.pop_front() {
            match notice {
                ExchangeNotice::TransmissionSucceeded(kind) => {
                    let state = self.ac_mut(ac);
                    if let Some(exchange) = state.exchange.as_ref() {
                        state
                            .retry
                            .frame_transmission_succeeded(exchange.data_frame(), kind);
                    }
                }
                ExchangeNotice::TransmissionFailed(kind) => {
                    let state = self.ac_mut(ac);
                    let Some(exchange) = state.exchange.as_ref() else {
                        continue;
                    };
                    let data = exchange.data_frame();
                    state.retry.frame_transmission_failed(data, kind);
                    let id = data.id;
                    match state.retry.is_retry_allowed(data, kind) {
                        Ok(true) => {
                            debug!("{ac} retrying {id} after failed {kind:?}");
                            self.request_contention(ac);
                        }
                        Ok(false) => {
                            warn!("{ac} retry limit reached for {id}");
                            pending.extend(self.abort_active(ac));
                        }
                        Err(err) => {
                            error!("{ac} {err}");
                            pending.extend(self.abort_active(ac));
                        }
                    }
                }
                ExchangeNotice::Finished(success) => self.exchange_finished(ac, success),
            }
        }
    }

    fn abort_active(&mut self, ac: AccessCategory) -> Vec<ExchangeNotice> {
        self.invoke_exchange(ac, |ex, ctx| ex.abort(ctx))
            .map(|((), notices)| notices)
            .unwrap_or_default()
    }

    fn exchange_finished(&mut self, ac: AccessCategory, success: bool) {
        let Some(exchange) = self.ac_mut(ac).exchange.take() else {
            return;
        };
        let kind = exchange.kind();
        let frame = exchange.into_frame();
        if success {
            trace!("{ac} {kind:?} exchange of {} succeeded", frame.id);
            if kind == ExchangeKind::Unacked {
                // counters left by an internal collision
                self.ac_mut(ac).retry.frame_discarded(frame.id);
                self.unacked_frame_sent(ac, frame);
            }
        } else {
            warn!("{ac} dropping {} to {}", frame.id, frame.receiver);
            self.ac_mut(ac).retry.frame_discarded(frame.id);
            if let Some(&ActionBody::AddbaRequest(request)) = frame.action_body() {
                self.addba_request_dropped(frame.receiver, &request);
            }
            self.device.discard(frame);
        }
        self.start_contention_if_needed(ac);
    }

    /// Forgets the pending negotiation a dropped ADDBA request belonged to.
    fn addba_request_dropped(&mut self, peer: MacAddress, request: &AddbaRequest) {
        let key = (peer, request.tid);
        if self
            .pending_addba
            .get(&key)
            .is_some_and(|(pending, _)| pending.dialog_token == request.dialog_token)
        {
            let _ignore = self.pending_addba.remove(&key);
            debug!("ADDBA request to {peer}, tid {} dropped", request.tid);
        }
    }

    fn unacked_frame_sent(&mut self, ac: AccessCategory, frame: DataFrame) {
        if frame.is_group_addressed() {
            self.ac_mut(ac).retry.multicast_frame_transmitted();
            return;
        }
        if let Err(err) = self.ba_send.record_transmitted(frame) {
            warn!("{ac} frame sent under a lost Block Ack agreement: {err}");
        }
    }

    fn queue_action(&mut self, peer: MacAddress, body: ActionBody) {
        let frame = DataFrame::action(peer, self.address, body);
        if let Err(err) = self.upper_frame_received(frame) {
            warn!("failed to queue action frame for {peer}: {err}");
        }
    }

    /// Puts frames back at the head of their queue, keeping their order.
    fn requeue_front(&mut self, frames: Vec<DataFrame>) {
        for frame in frames.into_iter().rev() {
            let ac = classify(&frame);
            self.ac_mut(ac).queue.push_front(frame);
        }
        for ac in AccessCategory::ALL {
            self.start_contention_if_needed(ac);
        }
    }

    fn transmit_response(&mut self, frame: Frame) {
        let sifs = self.params.sifs();
        let name = frame.kind_name();
        if let Err(err) = self.device.transmit(frame, sifs, TxOrigin::Response) {
            warn!("failed to send {name}: {err}");
        }
    }

    fn respond_to_rts(&mut self, rts: &Rts) {
        let cts = Cts {
            receiver: rts.transmitter,
            duration: rts
                .duration
                .saturating_sub(self.params.sifs() + self.params.cts_duration()),
        };
        self.transmit_response(Frame::Cts(cts));
    }

    fn receive_data(&mut self, data: DataFrame) {
        if !data.is_group_addressed() {
            let ack = Ack {
                receiver: data.transmitter,
                duration: data
                    .duration
                    .saturating_sub(self.params.sifs() + self.params.ack_duration()),
            };
            self.transmit_response(Frame::Ack(ack));
        }

        match data.action_body().copied() {
            Some(body) => self.receive_action(data.transmitter, body),
            None => self.receive_msdu(data),
        }
    }

    fn receive_msdu(&mut self, data: DataFrame) {
        let Some(tid) = data.tid else {
            self.device.deliver(data);
            return;
        };
        let from = data.transmitter;
        let Some(session) = self.ba_recv.session_mut(from, tid) else {
            self.device.deliver(data);
            return;
        };
        let seq = data.seq;
        let mut ready = match session.add_received_frame(data, Instant::now()) {
            Admission::Buffered => Vec::new(),
            Admission::AdvancedWindow(flushed) => flushed,
            Admission::Stale | Admission::Duplicate => {
                trace!("seq {seq} from {from}, tid {tid} dropped");
                return;
            }
        };
        while let Some(frame) = session.extract_next() {
            ready.push(frame);
        }
        for frame in ready {
            self.device.deliver(frame);
        }
    }

    fn receive_action(&mut self, from: MacAddress, body: ActionBody) {
        match body {
            ActionBody::AddbaRequest(request) => {
                let (response, flushed) = self.ba_recv.accept(
                    from,
                    &request,
                    self.params.block_ack_buffer_size,
                    self.params.a_msdu_supported,
                    Instant::now(),
                );
                for frame in flushed {
                    self.device.deliver(frame);
                }
                self.queue_action(from, ActionBody::AddbaResponse(response));
            }
            ActionBody::AddbaResponse(response) => self.receive_addba_response(from, &response),
            ActionBody::Delba(delba) => self.receive_delba(from, &delba),
        }
    }

    fn receive_addba_response(&mut self, from: MacAddress, response: &AddbaResponse) {
        let Some((request, _)) = self.pending_addba.remove(&(from, response.tid)) else {
            warn!("unsolicited ADDBA response from {from}, tid {}", response.tid);
            return;
        };
        if !self.ba_send.negotiate(from, &request, response) && response.is_success() {
            // the peer agreed to terms we cannot use
            let delba = Delba {
                tid: request.tid,
                initiator: true,
                reason: REASON_END_BA,
            };
            self.queue_action(from, ActionBody::Delba(delba));
        }
    }

    fn receive_delba(&mut self, from: MacAddress, delba: &Delba) {
        if delba.initiator {
            // the peer is the originator, we are the recipient
            match self.ba_recv.delete_session(from, delba.tid) {
                Some(frames) => {
                    for frame in frames {
                        self.device.deliver(frame);
                    }
                }
                None => debug!("DELBA from {from} for unknown receive session"),
            }
        } else {
            match self.ba_send.on_delba(from, delba.tid) {
                Some(frames) => self.requeue_front(frames),
                None => debug!("DELBA from {from} for unknown send session"),
            }
        }
    }

    fn receive_block_ack(&mut self, ba: &BlockAck) -> Result<()> {
        let retransmit = self.ba_send.on_block_ack(ba)?;
        if !retransmit.is_empty() {
            debug!("{} frames to retransmit to {}", retransmit.len(), ba.transmitter);
            self.requeue_front(retransmit);
        }
        Ok(())
    }
}

/// Access category a frame is queued on.
fn classify(frame: &DataFrame) -> AccessCategory {
    match (frame.tid, &frame.body) {
        (_, &FrameBody::Action(_)) => AccessCategory::Voice,
        (Some(tid), _) => AccessCategory::from_tid(tid),
        (None, _) => AccessCategory::BestEffort,
    }
}

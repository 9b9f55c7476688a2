//! Frame exchanges: the sequences of frames a station sends and expects in
//! order to deliver one data or management frame.

/// DATA followed by ACK
mod data_ack;
/// RTS/CTS protected DATA and ACK
mod rts_cts;
/// Generic step engine
mod step;
/// DATA without acknowledgment
mod unacked;

pub use data_ack::DataAckSteps;
pub use rts_cts::RtsCtsSteps;
pub use step::{ExchangeSteps, Step, StepBasedExchange};
pub use unacked::UnackedExchange;

use std::fmt;

use crate::{
    config::MacParameters,
    device::FrameIo,
    frame::{DataFrame, Frame, TxFrameKind},
    types::{AccessCategory, TimerId},
};

/// How an exchange classified a received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameProcessingResult {
    /// The frame was the expected reply and is consumed
    ProcessedDiscard,
    /// The exchange acted on the frame, which still needs regular processing
    ProcessedContinue,
    /// Not meant for the exchange
    Ignored,
}

/// Events an exchange reports to its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeNotice {
    TransmissionSucceeded(TxFrameKind),
    /// The attempt failed. The exchange waits for channel access again, or for
    /// an abort if no retry is allowed.
    TransmissionFailed(TxFrameKind),
    /// The exchange terminated; `true` on success
    Finished(bool),
}

/// What kind of exchange carries a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    DataAck,
    RtsCts,
    /// Group addressed, or sent under a Block Ack agreement
    Unacked,
}

/// Collaborators an exchange reaches while handling one event.
pub struct ExchangeCtx<'a> {
    pub io: &'a mut dyn FrameIo,
    pub params: &'a MacParameters,
    pub notices: &'a mut Vec<ExchangeNotice>,
}

impl ExchangeCtx<'_> {
    pub(crate) fn notify(&mut self, notice: ExchangeNotice) {
        self.notices.push(notice);
    }
}

/// One frame exchange, owned by the coordinator while it runs.
pub trait FrameExchange: Send + fmt::Debug {
    /// Starts the exchange after channel access has been granted.
    fn start(&mut self, ctx: &mut ExchangeCtx<'_>);

    /// Resumes after a failed attempt once channel access is granted again.
    fn continue_exchange(&mut self, ctx: &mut ExchangeCtx<'_>);

    /// Offers a received frame to the exchange.
    fn lower_frame_received(&mut self, frame: &Frame, ctx: &mut ExchangeCtx<'_>)
        -> FrameProcessingResult;

    /// A reception ended without a usable frame. Returns `true` if the
    /// exchange was waiting for it.
    fn corrupted_or_not_for_us_frame_received(&mut self, ctx: &mut ExchangeCtx<'_>) -> bool;

    /// The transmit interface finished sending the last frame.
    fn transmission_complete(&mut self, ctx: &mut ExchangeCtx<'_>);

    /// Returns `false` if the timer does not belong to this exchange.
    fn handle_timeout(&mut self, id: TimerId, ctx: &mut ExchangeCtx<'_>) -> bool;

    /// Cancels the exchange. Never reports success.
    fn abort(&mut self, ctx: &mut ExchangeCtx<'_>);

    fn kind(&self) -> ExchangeKind;

    /// Frame whose first attempt an internal collision counts against.
    fn first_frame_kind(&self) -> TxFrameKind;

    fn data_frame(&self) -> &DataFrame;

    fn into_frame(self: Box<Self>) -> DataFrame;

    /// `Some(success)` once the exchange terminated.
    fn outcome(&self) -> Option<bool>;
}

/// Builds the exchange for `data`. `unacked` selects the group addressed or
/// Block Ack policy exchange.
pub fn build_exchange(
    data: DataFrame,
    ac: AccessCategory,
    unacked: bool,
    params: &MacParameters,
) -> Box<dyn FrameExchange> {
    if unacked || data.is_group_addressed() {
        Box::new(UnackedExchange::new(data, ac))
    } else if data.byte_len >= params.rts_threshold {
        Box::new(StepBasedExchange::new(RtsCtsSteps::new(data, params), ac))
    } else {
        Box::new(StepBasedExchange::new(DataAckSteps::new(data, params), ac))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::addr;

    #[test]
    fn selects_exchange_by_address_and_length() {
        let params = MacParameters {
            rts_threshold: 500,
            ..MacParameters::default()
        };
        let ac = AccessCategory::BestEffort;

        let group = DataFrame::data(crate::types::MacAddress::BROADCAST, addr(1), vec![0; 1000]);
        assert_eq!(build_exchange(group, ac, false, &params).kind(), ExchangeKind::Unacked);

        let long = DataFrame::data(addr(2), addr(1), vec![0; 1000]);
        let exchange = build_exchange(long, ac, false, &params);
        assert_eq!(exchange.kind(), ExchangeKind::RtsCts);
        assert_eq!(exchange.first_frame_kind(), TxFrameKind::Rts);

        let short = DataFrame::data(addr(2), addr(1), vec![0; 10]);
        let exchange = build_exchange(short, ac, false, &params);
        assert_eq!(exchange.kind(), ExchangeKind::DataAck);
        assert_eq!(exchange.first_frame_kind(), TxFrameKind::Data);

        let policy = DataFrame::data(addr(2), addr(1), vec![0; 1000]);
        assert_eq!(build_exchange(policy, ac, true, &params).kind(), ExchangeKind::Unacked);
    }
}

use super::{ExchangeKind, ExchangeSteps, Step};
use crate::{
    config::MacParameters,
    frame::{DataFrame, Frame, Rts, TxFrameKind},
};

/// RTS/CTS protected DATA and ACK.
///
/// | step | operation                                          |
/// |------|----------------------------------------------------|
/// | 0    | transmit RTS                                       |
/// | 1    | CTS reception starts within the early CTS timeout  |
/// | 2    | transmit DATA after SIFS                           |
/// | 3    | ACK reception starts within the early ACK timeout  |
/// | 4    | succeed                                            |
#[derive(Debug)]
pub struct RtsCtsSteps {
    rts: Rts,
    data: DataFrame,
}

impl RtsCtsSteps {
    pub fn new(mut data: DataFrame, params: &MacParameters) -> Self {
        data.duration = params.sifs() + params.ack_duration();
        let rts = Rts::protecting(&data, params);
        Self { rts, data }
    }

    pub fn rts(&self) -> &Rts {
        &self.rts
    }
}

impl ExchangeSteps for RtsCtsSteps {
    fn do_step(&mut self, step: usize, params: &MacParameters) -> Step {
        match step {
            0 => Step::Transmit {
                frame: Frame::Rts(self.rts),
                ifs: std::time::Duration::ZERO,
            },
            1 => Step::ExpectReplyRxStart(params.cts_early_timeout()),
            2 => Step::Transmit {
                frame: Frame::Data(self.data.clone()),
                ifs: params.sifs(),
            },
            3 => Step::ExpectReplyRxStart(params.ack_early_timeout()),
            _ => Step::Succeed,
        }
    }

    fn process_reply(&mut self, step: usize, reply: &Frame) -> Option<TxFrameKind> {
        let us = self.data.transmitter;
        match step {
            1 => reply.is_cts_for(us).then_some(TxFrameKind::Rts),
            3 => reply.is_ack_for(us).then_some(TxFrameKind::Data),
            _ => None,
        }
    }

    fn attempt_failed(&mut self, step: usize) -> TxFrameKind {
        if step < 2 {
            TxFrameKind::Rts
        } else {
            self.data.retry = true;
            TxFrameKind::Data
        }
    }

    fn kind(&self) -> ExchangeKind {
        ExchangeKind::RtsCts
    }

    fn first_frame_kind(&self) -> TxFrameKind {
        TxFrameKind::Rts
    }

    fn data(&self) -> &DataFrame {
        &self.data
    }

    fn into_data(self) -> DataFrame {
        self.data
    }
}

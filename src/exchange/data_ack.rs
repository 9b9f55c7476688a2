use super::{ExchangeKind, ExchangeSteps, Step};
use crate::{
    config::MacParameters,
    frame::{DataFrame, Frame, TxFrameKind},
};

/// DATA, then ACK.
///
/// | step | operation                              |
/// |------|----------------------------------------|
/// | 0    | transmit DATA                          |
/// | 1    | full ACK within the early ACK timeout  |
/// | 2    | succeed                                |
#[derive(Debug)]
pub struct DataAckSteps {
    data: DataFrame,
}

impl DataAckSteps {
    pub fn new(mut data: DataFrame, params: &MacParameters) -> Self {
        data.duration = params.sifs() + params.ack_duration();
        Self { data }
    }
}

impl ExchangeSteps for DataAckSteps {
    fn do_step(&mut self, step: usize, params: &MacParameters) -> Step {
        match step {
            0 => Step::Transmit {
                frame: Frame::Data(self.data.clone()),
                ifs: std::time::Duration::ZERO,
            },
            1 => Step::ExpectFullReply(params.ack_early_timeout()),
            _ => Step::Succeed,
        }
    }

    fn process_reply(&mut self, step: usize, reply: &Frame) -> Option<TxFrameKind> {
        (step == 1 && reply.is_ack_for(self.data.transmitter)).then_some(TxFrameKind::Data)
    }

    fn attempt_failed(&mut self, _step: usize) -> TxFrameKind {
        self.data.retry = true;
        TxFrameKind::Data
    }

    fn kind(&self) -> ExchangeKind {
        ExchangeKind::DataAck
    }

    fn first_frame_kind(&self) -> TxFrameKind {
        TxFrameKind::Data
    }

    fn data(&self) -> &DataFrame {
        &self.data
    }

    fn into_data(self) -> DataFrame {
        self.data
    }
}

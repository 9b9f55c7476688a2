use std::time::Duration;

use log::{debug, warn};

use super::{ExchangeCtx, ExchangeKind, ExchangeNotice, FrameExchange, FrameProcessingResult};
use crate::{
    frame::{DataFrame, Frame, TxFrameKind},
    types::{AccessCategory, TimerId, TxOrigin},
};

/// A single DATA transmission that expects no reply: group addressed frames,
/// and frames sent under a Block Ack agreement.
#[derive(Debug)]
pub struct UnackedExchange {
    data: DataFrame,
    ac: AccessCategory,
    transmitting: bool,
    outcome: Option<bool>,
}

impl UnackedExchange {
    pub fn new(mut data: DataFrame, ac: AccessCategory) -> Self {
        data.duration = Duration::ZERO;
        Self {
            data,
            ac,
            transmitting: false,
            outcome: None,
        }
    }

    fn finish(&mut self, success: bool, ctx: &mut ExchangeCtx<'_>) {
        self.transmitting = false;
        self.outcome = Some(success);
        ctx.notify(ExchangeNotice::Finished(success));
    }
}

impl FrameExchange for UnackedExchange {
    fn start(&mut self, ctx: &mut ExchangeCtx<'_>) {
        let frame = Frame::Data(self.data.clone());
        match ctx.io.transmit(frame, Duration::ZERO, TxOrigin::Exchange(self.ac)) {
            Ok(()) => self.transmitting = true,
            Err(err) => {
                warn!("{} unacknowledged transmission failed: {err}", self.ac);
                self.finish(false, ctx);
            }
        }
    }

    fn continue_exchange(&mut self, ctx: &mut ExchangeCtx<'_>) {
        if self.outcome.is_none() && !self.transmitting {
            self.start(ctx);
        }
    }

    fn lower_frame_received(
        &mut self,
        _frame: &Frame,
        _ctx: &mut ExchangeCtx<'_>,
    ) -> FrameProcessingResult {
        FrameProcessingResult::Ignored
    }

    fn corrupted_or_not_for_us_frame_received(&mut self, _ctx: &mut ExchangeCtx<'_>) -> bool {
        false
    }

    fn transmission_complete(&mut self, ctx: &mut ExchangeCtx<'_>) {
        if self.transmitting {
            self.finish(true, ctx);
        }
    }

    fn handle_timeout(&mut self, _id: TimerId, _ctx: &mut ExchangeCtx<'_>) -> bool {
        false
    }

    fn abort(&mut self, ctx: &mut ExchangeCtx<'_>) {
        if self.outcome.is_none() {
            debug!("{} unacknowledged exchange aborted", self.ac);
            self.finish(false, ctx);
        }
    }

    fn kind(&self) -> ExchangeKind {
        ExchangeKind::Unacked
    }

    fn first_frame_kind(&self) -> TxFrameKind {
        TxFrameKind::Data
    }

    fn data_frame(&self) -> &DataFrame {
        &self.data
    }

    fn into_frame(self: Box<Self>) -> DataFrame {
        self.data
    }

    fn outcome(&self) -> Option<bool> {
        self.outcome
    }
}

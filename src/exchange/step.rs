use std::{fmt, time::Duration};

use log::{debug, trace, warn};

use super::{ExchangeCtx, ExchangeKind, ExchangeNotice, FrameExchange, FrameProcessingResult};
use crate::{
    config::MacParameters,
    frame::{DataFrame, Frame, TxFrameKind},
    types::{AccessCategory, TimerId, TxOrigin},
};

/// Operation declared by one step of an exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Hand `frame` to the transmit interface after `ifs`
    Transmit { frame: Frame, ifs: Duration },
    /// Wait for a complete reply frame
    ExpectFullReply(Duration),
    /// Wait for the reception of a reply to start; a reception in progress
    /// at expiry is waited for
    ExpectReplyRxStart(Duration),
    /// Continue at another step without suspending
    Goto(usize),
    Succeed,
    Fail,
}

/// Step semantics of one exchange variant.
pub trait ExchangeSteps: Send + fmt::Debug {
    fn do_step(&mut self, step: usize, params: &MacParameters) -> Step;

    /// Returns the frame `reply` confirms if it is the reply awaited at
    /// `step`.
    fn process_reply(&mut self, step: usize, reply: &Frame) -> Option<TxFrameKind>;

    /// The attempt made or awaited at `step` failed. Marks the frame for
    /// retransmission and returns which frame failed.
    fn attempt_failed(&mut self, step: usize) -> TxFrameKind;

    fn kind(&self) -> ExchangeKind;

    fn first_frame_kind(&self) -> TxFrameKind;

    fn data(&self) -> &DataFrame;

    fn into_data(self) -> DataFrame
    where
        Self: Sized;
}

/// Where a step based exchange is suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Suspension {
    /// Not started, or restarted at step 0 and waiting for channel access
    Idle,
    Transmitting,
    FullReply(TimerId),
    ReplyRxStart(TimerId),
    /// The reply timer expired while a frame was being received
    ReplyInProgress,
    Finished(bool),
}

/// Runs an [`ExchangeSteps`] sequence, one suspension at a time.
#[derive(Debug)]
pub struct StepBasedExchange<S> {
    steps: S,
    ac: AccessCategory,
    step: usize,
    suspension: Suspension,
}

impl<S: ExchangeSteps> StepBasedExchange<S> {
    pub fn new(steps: S, ac: AccessCategory) -> Self {
        Self {
            steps,
            ac,
            step: 0,
            suspension: Suspension::Idle,
        }
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn steps(&self) -> &S {
        &self.steps
    }

    fn proceed(&mut self, ctx: &mut ExchangeCtx<'_>) {
        match self.steps.do_step(self.step, ctx.params) {
            Step::Transmit { frame, ifs } => {
                trace!("{} step {}: transmit {}", self.ac, self.step, frame.kind_name());
                match ctx.io.transmit(frame, ifs, TxOrigin::Exchange(self.ac)) {
                    Ok(()) => self.suspension = Suspension::Transmitting,
                    Err(err) => {
                        warn!("{} step {}: {err}", self.ac, self.step);
                        self.attempt_failed(ctx);
                    }
                }
            }
            Step::ExpectFullReply(timeout) => {
                let id = ctx.io.arm_timer(timeout);
                trace!("{} step {}: full reply within {timeout:?}", self.ac, self.step);
                self.suspension = Suspension::FullReply(id);
            }
            Step::ExpectReplyRxStart(timeout) => {
                let id = ctx.io.arm_timer(timeout);
                trace!("{} step {}: reply start within {timeout:?}", self.ac, self.step);
                self.suspension = Suspension::ReplyRxStart(id);
            }
            Step::Goto(step) => {
                trace!("{} step {}: goto {step}", self.ac, self.step);
                self.step = step;
                self.proceed(ctx);
            }
            Step::Succeed => self.finish(true, ctx),
            Step::Fail => {
                debug!("{} step {}: exchange failed", self.ac, self.step);
                self.finish(false, ctx);
            }
        }
    }

    fn goto_step(&mut self, step: usize) {
        self.step = step;
        self.suspension = Suspension::Idle;
    }

    fn attempt_failed(&mut self, ctx: &mut ExchangeCtx<'_>) {
        let failed = self.steps.attempt_failed(self.step);
        debug!("{} step {}: {failed:?} attempt failed", self.ac, self.step);
        self.goto_step(0);
        ctx.notify(ExchangeNotice::TransmissionFailed(failed));
    }

    fn finish(&mut self, success: bool, ctx: &mut ExchangeCtx<'_>) {
        self.suspension = Suspension::Finished(success);
        ctx.notify(ExchangeNotice::Finished(success));
    }

    fn cancel_timer(&mut self, ctx: &mut ExchangeCtx<'_>) {
        if let Suspension::FullReply(id) | Suspension::ReplyRxStart(id) = self.suspension {
            ctx.io.cancel_timer(id);
        }
    }
}

impl<S: ExchangeSteps> FrameExchange for StepBasedExchange<S> {
    fn start(&mut self, ctx: &mut ExchangeCtx<'_>) {
        self.goto_step(0);
        self.proceed(ctx);
    }

    fn continue_exchange(&mut self, ctx: &mut ExchangeCtx<'_>) {
        if self.suspension == Suspension::Idle {
            self.proceed(ctx);
        } else {
            warn!("{} exchange continued while {:?}", self.ac, self.suspension);
        }
    }

    fn lower_frame_received(
        &mut self,
        frame: &Frame,
        ctx: &mut ExchangeCtx<'_>,
    ) -> FrameProcessingResult {
        let waiting = matches!(
            self.suspension,
            Suspension::FullReply(_) | Suspension::ReplyRxStart(_) | Suspension::ReplyInProgress
        );
        if !waiting {
            return FrameProcessingResult::Ignored;
        }
        if let Some(confirmed) = self.steps.process_reply(self.step, frame) {
            trace!("{} step {}: {} accepted", self.ac, self.step, frame.kind_name());
            self.cancel_timer(ctx);
            ctx.notify(ExchangeNotice::TransmissionSucceeded(confirmed));
            self.step += 1;
            self.proceed(ctx);
            return FrameProcessingResult::ProcessedDiscard;
        }
        if self.suspension == Suspension::ReplyInProgress {
            // the awaited reception turned out to be some other frame
            self.attempt_failed(ctx);
            return FrameProcessingResult::ProcessedContinue;
        }
        FrameProcessingResult::Ignored
    }

    fn corrupted_or_not_for_us_frame_received(&mut self, ctx: &mut ExchangeCtx<'_>) -> bool {
        if self.suspension != Suspension::ReplyInProgress {
            return false;
        }
        self.attempt_failed(ctx);
        true
    }

    fn transmission_complete(&mut self, ctx: &mut ExchangeCtx<'_>) {
        if self.suspension != Suspension::Transmitting {
            warn!("{} unexpected transmission complete, {:?}", self.ac, self.suspension);
            return;
        }
        self.step += 1;
        self.proceed(ctx);
    }

    fn handle_timeout(&mut self, id: TimerId, ctx: &mut ExchangeCtx<'_>) -> bool {
        match self.suspension {
            Suspension::FullReply(armed) if armed == id => {
                self.attempt_failed(ctx);
                true
            }
            Suspension::ReplyRxStart(armed) if armed == id => {
                if ctx.io.is_reception_in_progress() {
                    trace!("{} step {}: reception in progress", self.ac, self.step);
                    self.suspension = Suspension::ReplyInProgress;
                } else {
                    self.attempt_failed(ctx);
                }
                true
            }
            _ => false,
        }
    }

    fn abort(&mut self, ctx: &mut ExchangeCtx<'_>) {
        if matches!(self.suspension, Suspension::Finished(_)) {
            return;
        }
        self.cancel_timer(ctx);
        debug!("{} exchange aborted at step {}", self.ac, self.step);
        self.finish(false, ctx);
    }

    fn kind(&self) -> ExchangeKind {
        self.steps.kind()
    }

    fn first_frame_kind(&self) -> TxFrameKind {
        self.steps.first_frame_kind()
    }

    fn data_frame(&self) -> &DataFrame {
        self.steps.data()
    }

    fn into_frame(self: Box<Self>) -> DataFrame {
        let this = *self;
        this.steps.into_data()
    }

    fn outcome(&self) -> Option<bool> {
        match self.suspension {
            Suspension::Finished(success) => Some(success),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        frame::Ack,
        test_utils::{addr, MockDevice},
    };

    /// Plays back a fixed list of steps.
    #[derive(Debug)]
    struct Scripted {
        script: Vec<Step>,
        data: DataFrame,
    }

    impl Scripted {
        fn new(script: impl FnOnce(&DataFrame) -> Vec<Step>) -> Self {
            let data = DataFrame::data(addr(2), addr(1), vec![0; 40]);
            Self {
                script: script(&data),
                data,
            }
        }
    }

    impl ExchangeSteps for Scripted {
        fn do_step(&mut self, step: usize, _params: &MacParameters) -> Step {
            self.script[step].clone()
        }

        fn process_reply(&mut self, _step: usize, reply: &Frame) -> Option<TxFrameKind> {
            matches!(reply, Frame::Ack(_)).then_some(TxFrameKind::Data)
        }

        fn attempt_failed(&mut self, _step: usize) -> TxFrameKind {
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

    fn transmit(data: &DataFrame) -> Step {
        Step::Transmit {
            frame: Frame::Data(data.clone()),
            ifs: Duration::ZERO,
        }
    }

    #[test]
    fn goto_continues_at_target_step() {
        let params = MacParameters::default();
        let io = MockDevice::new();
        let mut dev = io.clone();
        let mut notices = Vec::new();
        let steps = Scripted::new(|data| {
            vec![
                transmit(data),
                Step::Goto(3),
                Step::Fail,
                Step::ExpectFullReply(Duration::from_micros(50)),
                Step::Succeed,
            ]
        });
        let mut ex = StepBasedExchange::new(steps, AccessCategory::BestEffort);
        let mut ctx = ExchangeCtx {
            io: &mut dev,
            params: &params,
            notices: &mut notices,
        };

        ex.start(&mut ctx);
        ex.transmission_complete(&mut ctx);
        assert_eq!(ex.step(), 3);
        assert_eq!(ex.outcome(), None);
        assert_eq!(io.state().armed.len(), 1);

        let ack = Frame::Ack(Ack {
            receiver: addr(1),
            duration: Duration::ZERO,
        });
        assert_eq!(
            ex.lower_frame_received(&ack, &mut ctx),
            FrameProcessingResult::ProcessedDiscard
        );
        assert_eq!(ex.outcome(), Some(true));
        drop(ctx);
        assert_eq!(
            notices,
            vec![
                ExchangeNotice::TransmissionSucceeded(TxFrameKind::Data),
                ExchangeNotice::Finished(true),
            ]
        );
    }

    #[test]
    fn fail_step_ends_the_exchange() {
        let params = MacParameters::default();
        let io = MockDevice::new();
        let mut dev = io.clone();
        let mut notices = Vec::new();
        let steps = Scripted::new(|data| vec![transmit(data), Step::Fail]);
        let mut ex = StepBasedExchange::new(steps, AccessCategory::Voice);
        let mut ctx = ExchangeCtx {
            io: &mut dev,
            params: &params,
            notices: &mut notices,
        };

        ex.start(&mut ctx);
        assert_eq!(ex.outcome(), None);
        ex.transmission_complete(&mut ctx);
        assert_eq!(ex.outcome(), Some(false));
        // nothing left to abort
        ex.abort(&mut ctx);
        drop(ctx);

        assert_eq!(notices, vec![ExchangeNotice::Finished(false)]);
        let state = io.state();
        assert_eq!(state.transmitted.len(), 1);
        assert!(state.armed.is_empty());
    }
}

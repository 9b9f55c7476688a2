use std::time::Duration;

use crate::{
    error::Result,
    frame::{DataFrame, Frame},
    types::{AccessCategory, TimerId, TxOrigin},
};

/// Transmit, receive-state and timer facilities used by frame exchanges
pub trait FrameIo: Send {
    /// Hands a frame to the PHY after `ifs`. Completion is reported back
    /// through the coordinator's `transmission_complete` with `origin`.
    fn transmit(&mut self, frame: Frame, ifs: Duration, origin: TxOrigin) -> Result<()>;

    /// Whether the receiver is in the middle of receiving a frame
    fn is_reception_in_progress(&self) -> bool;

    /// Arms a one-shot timer; its expiry is reported through `timer_fired`
    fn arm_timer(&mut self, delay: Duration) -> TimerId;

    /// Cancels a timer that has not fired yet
    fn cancel_timer(&mut self, id: TimerId);
}

/// Everything the upper MAC needs from the layers around it
pub trait MacDevice: FrameIo {
    /// Starts EDCA contention for `ac` with contention window `cw`. A grant
    /// is reported through `channel_access_granted`, an internal collision
    /// through `internal_collision`.
    fn start_contention(&mut self, ac: AccessCategory, cw: u32);

    /// Passes a received data frame up the stack
    fn deliver(&mut self, frame: DataFrame);

    /// Reports a frame dropped after its retries were exhausted or its
    /// transmission could not be attempted
    fn discard(&mut self, frame: DataFrame);
}

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use crate::{
    device::{FrameIo, MacDevice},
    error::{MacError, Result},
    frame::{DataFrame, Frame},
    types::{AccessCategory, MacAddress, TimerId, TxOrigin},
};

pub(crate) fn addr(x: u8) -> MacAddress {
    MacAddress([2, 0, 0, 0, 0, x])
}

#[derive(Debug, Default)]
pub(crate) struct MockState {
    pub(crate) transmitted: Vec<(Frame, Duration, TxOrigin)>,
    pub(crate) armed: Vec<(TimerId, Duration)>,
    pub(crate) cancelled: Vec<TimerId>,
    pub(crate) contention: Vec<(AccessCategory, u32)>,
    pub(crate) delivered: Vec<DataFrame>,
    pub(crate) discarded: Vec<DataFrame>,
    pub(crate) rx_in_progress: bool,
    pub(crate) refuse_tx: bool,
    next_timer: u64,
}

/// Records every call; clones share the same state.
#[derive(Debug, Clone, Default)]
pub(crate) struct MockDevice {
    inner: Arc<Mutex<MockState>>,
}

impl MockDevice {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap()
    }

    pub(crate) fn last_timer(&self) -> TimerId {
        self.state().armed.last().unwrap().0
    }

    pub(crate) fn last_transmitted(&self) -> Frame {
        self.state().transmitted.last().unwrap().0.clone()
    }

    pub(crate) fn transmitted_count(&self) -> usize {
        self.state().transmitted.len()
    }

    pub(crate) fn set_rx_in_progress(&self, value: bool) {
        self.state().rx_in_progress = value;
    }

    pub(crate) fn set_refuse_tx(&self, value: bool) {
        self.state().refuse_tx = value;
    }
}

impl FrameIo for MockDevice {
    fn transmit(&mut self, frame: Frame, ifs: Duration, origin: TxOrigin) -> Result<()> {
        let mut state = self.state();
        if state.refuse_tx {
            return Err(MacError::TransmitFailed("transmitter busy".into()));
        }
        state.transmitted.push((frame, ifs, origin));
        Ok(())
    }

    fn is_reception_in_progress(&self) -> bool {
        self.state().rx_in_progress
    }

    fn arm_timer(&mut self, delay: Duration) -> TimerId {
        let mut state = self.state();
        state.next_timer += 1;
        let id = TimerId(state.next_timer);
        state.armed.push((id, delay));
        id
    }

    fn cancel_timer(&mut self, id: TimerId) {
        self.state().cancelled.push(id);
    }
}

impl MacDevice for MockDevice {
    fn start_contention(&mut self, ac: AccessCategory, cw: u32) {
        self.state().contention.push((ac, cw));
    }

    fn deliver(&mut self, frame: DataFrame) {
        self.state().delivered.push(frame);
    }

    fn discard(&mut self, frame: DataFrame) {
        self.state().discarded.push(frame);
    }
}

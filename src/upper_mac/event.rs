use std::time::Instant;

use log::error;

use super::UpperMac;
use crate::{
    device::MacDevice,
    frame::{DataFrame, Frame},
    spawner::SingleThreadTaskWorker,
    types::{AccessCategory, MacAddress, Tid, TimerId, TxOrigin},
};

/// Inputs of the upper MAC when it runs on its own worker thread.
#[derive(Debug)]
pub enum MacEvent {
    UpperFrame(DataFrame),
    ChannelAccessGranted(AccessCategory),
    InternalCollision(AccessCategory),
    FrameReceived(Frame),
    CorruptedFrameReceived,
    TransmissionComplete(TxOrigin),
    TimerFired(TimerId),
    AbortExchange(AccessCategory),
    EstablishBlockAck { peer: MacAddress, tid: Tid },
    SendBlockAck { originator: MacAddress, tid: Tid },
}

impl<D: MacDevice> UpperMac<D> {
    /// Dispatches one event to the matching entry point.
    pub fn handle_event(&mut self, event: MacEvent) {
        let result = match event {
            MacEvent::UpperFrame(frame) => self.upper_frame_received(frame).map(|_id| ()),
            MacEvent::ChannelAccessGranted(ac) => {
                self.channel_access_granted(ac);
                Ok(())
            }
            MacEvent::InternalCollision(ac) => {
                self.internal_collision(ac);
                Ok(())
            }
            MacEvent::FrameReceived(frame) => self.lower_frame_received(frame),
            MacEvent::CorruptedFrameReceived => {
                self.corrupted_frame_received();
                Ok(())
            }
            MacEvent::TransmissionComplete(origin) => {
                self.transmission_complete(origin);
                Ok(())
            }
            MacEvent::TimerFired(id) => {
                self.timer_fired(id);
                Ok(())
            }
            MacEvent::AbortExchange(ac) => {
                self.abort_exchange(ac);
                Ok(())
            }
            MacEvent::EstablishBlockAck { peer, tid } => self.establish_block_ack(peer, tid),
            MacEvent::SendBlockAck { originator, tid } => self.send_block_ack(originator, tid),
        };
        if let Err(err) = result {
            error!("upper MAC event failed: {err}");
        }
    }
}

impl<D: MacDevice + 'static> SingleThreadTaskWorker for UpperMac<D> {
    type Task = MacEvent;

    fn process(&mut self, task: Self::Task) {
        self.handle_event(task);
    }

    fn maintainance(&mut self) {
        self.maintenance(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::MacParameters,
        spawner::{task_channel, AbortSignal},
        test_utils::{addr, MockDevice},
    };

    #[test]
    fn worker_feeds_events_to_the_mac() {
        let io = MockDevice::new();
        let mac = UpperMac::new(addr(1), MacParameters::default(), io.clone()).unwrap();
        let (tx, rx) = task_channel();
        let handle = mac.spawn(rx, "upper-mac", AbortSignal::new()).unwrap();

        let frame = DataFrame::data(addr(2), addr(1), vec![0; 40]);
        tx.send(MacEvent::UpperFrame(frame)).unwrap();
        tx.send(MacEvent::ChannelAccessGranted(AccessCategory::BestEffort))
            .unwrap();
        tx.send(MacEvent::TransmissionComplete(TxOrigin::Exchange(
            AccessCategory::BestEffort,
        )))
        .unwrap();
        // no agreement, logged and dropped
        tx.send(MacEvent::SendBlockAck {
            originator: addr(2),
            tid: Tid::new(0).unwrap(),
        })
        .unwrap();
        drop(tx);
        handle.join().unwrap();

        let state = io.state();
        assert_eq!(state.contention, vec![(AccessCategory::BestEffort, 15)]);
        assert_eq!(state.transmitted.len(), 1);
        assert_eq!(state.armed.len(), 1);
        assert_eq!(state.armed[0].1, MacParameters::default().ack_early_timeout());
    }
}

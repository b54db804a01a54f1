//! Round countdown. One timer task exists per Playing round; it ticks once
//! per second into the session's input queue, tagged with the serial of the
//! round it was started for. The session driver replaces the handle on every
//! new round and aborts it on every exit from the Playing phase, and the
//! state machine additionally ignores ticks carrying a stale serial, so a
//! tick already in flight when its timer is aborted can never touch a later
//! round.

use std::time::Duration;

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};

use crate::session::{RoundSerial, SessionInput};

pub(crate) struct RoundTimer {
    task: JoinHandle<()>,
}

impl RoundTimer {
    pub(crate) fn start(
        input: mpsc::UnboundedSender<SessionInput>,
        round: RoundSerial,
    ) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(1));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of a tokio interval completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if input.send(SessionInput::Tick { round }).is_err() {
                    break;
                }
            }
        });
        Self { task }
    }
}

impl Drop for RoundTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

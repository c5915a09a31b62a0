//! Liveness timer for a peripheral record
//!
//! One-shot and re-armable. Every re-arm takes a fresh process-wide generation;
//! a firing whose generation is not current was overtaken by a later
//! advertisement, or belongs to a record dropped by a reset, and
//! is ignored.

use std::time::Duration;

use crate::core::bluetooth::adapter::TimerEvent;
use crate::core::bluetooth::device::DeviceId;
use crate::core::scheduler::{next_stamp, Scheduler, TimerHandle};

#[derive(Debug)]
pub struct LivenessTimer {
    window: Duration,
    generation: u64,
    handle: Option<TimerHandle>,
}

impl LivenessTimer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            generation: 0,
            handle: None,
        }
    }

    /// Cancels any pending countdown and starts a fresh one
    pub fn rearm(&mut self, id: &DeviceId, scheduler: &Scheduler) {
        self.generation = next_stamp();
        let event = TimerEvent::LivenessExpired {
            id: id.clone(),
            generation: self.generation,
        };
        // replacing the handle cancels the previous countdown
        self.handle = Some(scheduler.schedule(self.window, event));
    }

    /// Consumes a firing. Returns false for stale generations.
    pub fn expire(&mut self, generation: u64) -> bool {
        if self.handle.is_none() || generation != self.generation {
            return false;
        }
        self.handle = None;
        true
    }

    pub fn is_armed(&self) -> bool {
        self.handle.is_some()
    }

    pub fn cancel(&mut self) {
        self.handle = None;
    }
}

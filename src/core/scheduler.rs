//! One-shot timers that post events back to the coordinator
//!
//! Timers run as tokio tasks. Firing never touches session state directly: it
//! only enqueues an event, which the coordinator applies on its own context.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use log::trace;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::adapter::{CoordinatorEvent, EventSender};

static NEXT_STAMP: AtomicU64 = AtomicU64::new(1);

/// A process-wide, strictly increasing number for tagging timer firings.
/// Firings queued for a discarded session never match a later session's stamp.
pub fn next_stamp() -> u64 {
    NEXT_STAMP.fetch_add(1, Ordering::Relaxed)
}

/// Spawns one-shot timers on the current tokio runtime
#[derive(Clone)]
pub struct Scheduler {
    events: EventSender,
}

impl Scheduler {
    pub fn new(events: EventSender) -> Self {
        Self { events }
    }

    /// Posts `event` after `delay` unless the returned handle is cancelled or dropped first
    pub fn schedule(&self, delay: Duration, event: impl Into<CoordinatorEvent>) -> TimerHandle {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let events = self.events.clone();
        let event = event.into();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {
                    trace!("Timer cancelled before firing: {:?}", event);
                }
                _ = sleep(delay) => {
                    // the receiver is gone only during shutdown
                    let _ = events.send(event);
                }
            }
        });

        TimerHandle { token }
    }
}

/// Cancels its timer when dropped
#[derive(Debug)]
pub struct TimerHandle {
    token: CancellationToken,
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

//! Periodic tick scheduling

use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

/// Interval the emulator asks to be ticked at
pub const TICK_INTERVAL: Duration = Duration::from_millis(200);

/// Registration handle for periodic invocation
pub trait TickScheduler {
    fn attach(&mut self, interval: Duration);
    fn detach(&mut self);
}

/// Single-client scheduler driven by the host run loop
#[derive(Debug, Default)]
pub struct IntervalScheduler {
    interval: Option<Duration>,
    next_tick: Option<Instant>,
}

impl IntervalScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn is_attached(&self) -> bool {
        self.interval.is_some()
    }

    /// Sleep until the next tick is due.
    ///
    /// Returns false when nothing is attached. A late caller is not made to
    /// catch up on missed ticks.
    pub fn wait_tick(&mut self) -> bool {
        let Some(interval) = self.interval else {
            return false;
        };
        let now = Instant::now();
        let due = self.next_tick.unwrap_or(now);
        if due > now {
            thread::sleep(due - now);
        }
        self.next_tick = Some(due.max(now) + interval);
        true
    }
}

impl TickScheduler for IntervalScheduler {
    fn attach(&mut self, interval: Duration) {
        debug!("Tick attached at {:?}", interval);
        self.interval = Some(interval);
        self.next_tick = None;
    }

    fn detach(&mut self) {
        if self.interval.take().is_some() {
            debug!("Tick detached");
        }
        self.next_tick = None;
    }
}

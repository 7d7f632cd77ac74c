//! Frame scheduling for the render loop.
//!
//! The engine never loops on its own. After each tick it asks a
//! [`FrameScheduler`] for the next one, and cancels the pending request on
//! close. The binary paces ticks to the display rate; tests step them by hand.

use log::trace;
use std::{
    collections::VecDeque,
    thread,
    time::{Duration, Instant},
};

/// Handle of a requested tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TickId(pub u64);

/// Source of render-loop ticks
pub trait FrameScheduler {
    /// Ask for one tick at the next display refresh
    fn request_tick(&mut self) -> TickId;

    /// Withdraw a requested tick; unknown or already-fired ids are ignored
    fn cancel_tick(&mut self, id: TickId);

    /// Wait for the next due tick, if any is pending
    fn next_tick(&mut self) -> Option<TickId>;
}

/// Display-paced scheduler: at most one tick per refresh interval
pub struct RefreshScheduler {
    interval: Duration,
    last_fire: Option<Instant>,
    pending: Option<TickId>,
    next_id: u64,
}

impl RefreshScheduler {
    /// Create a scheduler pacing to `target_fps` (clamped to at least 1)
    #[must_use]
    pub fn new(target_fps: u32) -> Self {
        Self {
            interval: Duration::from_nanos(1_000_000_000 / u64::from(target_fps.max(1))),
            last_fire: None,
            pending: None,
            next_id: 0,
        }
    }

    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }
}

impl FrameScheduler for RefreshScheduler {
    fn request_tick(&mut self) -> TickId {
        self.next_id += 1;
        let id = TickId(self.next_id);
        self.pending = Some(id);
        id
    }

    fn cancel_tick(&mut self, id: TickId) {
        if self.pending == Some(id) {
            self.pending = None;
        }
    }

    fn next_tick(&mut self) -> Option<TickId> {
        let id = self.pending.take()?;
        if let Some(last) = self.last_fire {
            let elapsed = last.elapsed();
            if elapsed < self.interval {
                thread::sleep(self.interval - elapsed);
            }
        }
        self.last_fire = Some(Instant::now());
        trace!("Tick {} due", id.0);
        Some(id)
    }
}

/// Scheduler stepped explicitly, for tests and offline processing
#[derive(Debug, Default)]
pub struct ManualScheduler {
    queue: VecDeque<TickId>,
    next_id: u64,
    requested: usize,
    cancelled: usize,
}

impl ManualScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ticks waiting to fire
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Total ticks ever requested
    #[must_use]
    pub const fn requested(&self) -> usize {
        self.requested
    }

    /// Total ticks withdrawn before firing
    #[must_use]
    pub const fn cancelled(&self) -> usize {
        self.cancelled
    }
}

impl FrameScheduler for ManualScheduler {
    fn request_tick(&mut self) -> TickId {
        self.next_id += 1;
        self.requested += 1;
        let id = TickId(self.next_id);
        self.queue.push_back(id);
        id
    }

    fn cancel_tick(&mut self, id: TickId) {
        let before = self.queue.len();
        self.queue.retain(|&queued| queued != id);
        self.cancelled += before - self.queue.len();
    }

    fn next_tick(&mut self) -> Option<TickId> {
        self.queue.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_scheduler_fifo() {
        let mut scheduler = ManualScheduler::new();
        let a = scheduler.request_tick();
        let b = scheduler.request_tick();
        assert_ne!(a, b);
        assert_eq!(scheduler.next_tick(), Some(a));
        assert_eq!(scheduler.next_tick(), Some(b));
        assert_eq!(scheduler.next_tick(), None);
    }

    #[test]
    fn test_manual_cancel() {
        let mut scheduler = ManualScheduler::new();
        let a = scheduler.request_tick();
        scheduler.cancel_tick(a);
        scheduler.cancel_tick(a);
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(scheduler.cancelled(), 1);
        assert_eq!(scheduler.next_tick(), None);
    }

    #[test]
    fn test_refresh_scheduler_paces() {
        let mut scheduler = RefreshScheduler::new(100);
        assert_eq!(scheduler.interval(), Duration::from_millis(10));

        let start = Instant::now();
        for _ in 0..3 {
            scheduler.request_tick();
            assert!(scheduler.next_tick().is_some());
        }
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_refresh_cancel() {
        let mut scheduler = RefreshScheduler::new(60);
        let id = scheduler.request_tick();
        scheduler.cancel_tick(id);
        assert_eq!(scheduler.next_tick(), None);
    }
}

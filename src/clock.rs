//! Clocks and the timer queue the schedulers run on.
//!
//! Time is a `Duration` since an arbitrary origin. The queue never sleeps; the
//! owner asks for the next deadline, waits however it likes, and pops what is due.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Source of "now" for a timeline.
pub trait Clock {
    fn now(&self) -> Duration;
}

/// Monotonic wall clock, origin at construction.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Hand-advanced clock for deterministic runs and offline rendering.
#[derive(Debug, Clone, Copy, Default)]
pub struct VirtualClock {
    now: Duration,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward and return the new now.
    pub fn advance(&mut self, by: Duration) -> Duration {
        self.now += by;
        self.now
    }

    pub fn advance_ms(&mut self, ms: u64) -> Duration {
        self.advance(Duration::from_millis(ms))
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Duration {
        self.now
    }
}

/// Handle for a scheduled timer. Ordering is firing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId {
    due: Duration,
    seq: u64,
}

impl TimerId {
    pub fn due(&self) -> Duration {
        self.due
    }
}

/// Deferred events ordered by due time, FIFO among equal due times.
#[derive(Debug)]
pub struct TimerQueue<E> {
    entries: BTreeMap<TimerId, E>,
    next_seq: u64,
}

impl<E> TimerQueue<E> {
    pub fn new() -> Self {
        TimerQueue {
            entries: BTreeMap::new(),
            next_seq: 0,
        }
    }

    /// Schedule `event` to fire `delay` after `now`.
    pub fn schedule(&mut self, now: Duration, delay: Duration, event: E) -> TimerId {
        self.schedule_at(now + delay, event)
    }

    /// Schedule `event` at an absolute due time.
    pub fn schedule_at(&mut self, due: Duration, event: E) -> TimerId {
        let id = TimerId {
            due,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.entries.insert(id, event);
        id
    }

    /// Remove a pending timer. Returns its event if it had not fired yet.
    pub fn cancel(&mut self, id: TimerId) -> Option<E> {
        self.entries.remove(&id)
    }

    /// Due time of the earliest pending timer.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.entries.keys().next().map(|id| id.due)
    }

    /// Pop the earliest timer if it is due at `now`.
    pub fn pop_due(&mut self, now: Duration) -> Option<(TimerId, E)> {
        match self.entries.first_key_value() {
            Some((id, _)) if id.due <= now => self.entries.pop_first(),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<E> Default for TimerQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

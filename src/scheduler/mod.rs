use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Opaque handle to a scheduled single-shot timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerHandle(u64);

/// What a scheduled timer is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timer {
    /// The inactivity deadline owned by the idle watcher
    IdleDeadline,
    /// The next on/off step owned by the flash controller
    FlashStep,
}

/// Single-shot deferred callbacks.
///
/// A zero delay still defers to the next loop tick. Cancelling a handle that
/// already fired or was already cancelled does nothing.
pub trait Scheduler {
    fn schedule_once(&mut self, delay: Duration, timer: Timer) -> TimerHandle;
    fn cancel(&mut self, handle: TimerHandle);
}

/// Cancel the handle held in `slot`, if any, leaving `None` behind
pub fn cancel_slot<S: Scheduler + ?Sized>(scheduler: &mut S, slot: &mut Option<TimerHandle>) {
    if let Some(handle) = slot.take() {
        scheduler.cancel(handle);
    }
}

/// Timer queue measured against a clock the owner advances.
///
/// `now` is an offset from an arbitrary origin; the daemon feeds it from a
/// monotonic clock, simulations from a virtual one. Timers fire in due order,
/// ties broken by scheduling order.
#[derive(Debug, Default)]
pub struct TimerQueue {
    now: Duration,
    next_id: u64,
    entries: BTreeMap<(Duration, TimerHandle), Timer>,
    due_by_handle: HashMap<TimerHandle, Duration>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    /// Move the clock forward. The clock never goes backwards.
    pub fn set_now(&mut self, now: Duration) {
        if now > self.now {
            self.now = now;
        }
    }

    /// Due time of the earliest pending timer
    pub fn next_due(&self) -> Option<Duration> {
        self.entries.keys().next().map(|(due, _)| *due)
    }

    /// Remove and return the earliest timer that is due at the current time
    pub fn pop_due(&mut self) -> Option<(TimerHandle, Timer)> {
        let (&(due, handle), _) = self.entries.iter().next()?;
        if due > self.now {
            return None;
        }
        let timer = self.entries.remove(&(due, handle))?;
        self.due_by_handle.remove(&handle);
        Some((handle, timer))
    }
}

#[cfg(test)]
impl TimerQueue {
    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.due_by_handle.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of pending timers of the given kind
    pub fn count(&self, timer: Timer) -> usize {
        self.entries.values().filter(|t| **t == timer).count()
    }
}

impl Scheduler for TimerQueue {
    fn schedule_once(&mut self, delay: Duration, timer: Timer) -> TimerHandle {
        self.next_id += 1;
        let handle = TimerHandle(self.next_id);
        // Delays past the end of the clock never come due
        let due = self.now.checked_add(delay).unwrap_or(Duration::MAX);
        self.entries.insert((due, handle), timer);
        self.due_by_handle.insert(handle, due);
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        if let Some(due) = self.due_by_handle.remove(&handle) {
            self.entries.remove(&(due, handle));
        }
    }
}

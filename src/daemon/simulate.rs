//! Replays host events against a virtual clock.
//!
//! Script format, one step per line:
//!
//! ```text
//! # comment
//! 0      activity
//! 15000  activity
//! 20000  hide
//! 25000  show
//! 26000  focus
//! 90000  end
//! ```
//!
//! Times are milliseconds from the start and must not decrease. `end` stops
//! the replay at that time; `shutdown` shuts the watcher down.

use super::idle::{HostEvent, IdleWatcher};
use crate::config::Settings;
use crate::highlight::{HighlightEvent, RecordingSink, RegionKind};
use crate::scheduler::TimerQueue;
use anyhow::{bail, Context, Result};
use std::time::Duration;

/// What happens at a script step
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptAction {
    Event(HostEvent),
    End,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptStep {
    pub at: Duration,
    pub action: ScriptAction,
}

/// A parsed replay script
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Script {
    pub steps: Vec<ScriptStep>,
}

impl Script {
    pub fn parse(source: &str) -> Result<Self> {
        let mut steps = Vec::new();
        let mut last = Duration::ZERO;

        for (index, raw) in source.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            let mut parts = line.split_whitespace();
            let (Some(time), Some(name), None) = (parts.next(), parts.next(), parts.next()) else {
                bail!("line {}: expected `<ms> <event>`, got {:?}", line_no, line);
            };

            let at = time
                .parse::<u64>()
                .map(Duration::from_millis)
                .with_context(|| format!("line {}: invalid time {:?}", line_no, time))?;
            if at < last {
                bail!(
                    "line {}: time {} ms goes backwards (previous step at {} ms)",
                    line_no,
                    at.as_millis(),
                    last.as_millis()
                );
            }
            last = at;

            let action = match name {
                "activity" => ScriptAction::Event(HostEvent::Activity),
                "hide" => ScriptAction::Event(HostEvent::VisibilityLost),
                "show" => ScriptAction::Event(HostEvent::VisibilityRestored),
                "focus" => ScriptAction::Event(HostEvent::Focus),
                "shutdown" => ScriptAction::Event(HostEvent::Shutdown),
                "end" => ScriptAction::End,
                other => bail!("line {}: unknown event {:?}", line_no, other),
            };
            steps.push(ScriptStep { at, action });
        }

        Ok(Self { steps })
    }
}

/// A highlight change stamped with the virtual time it happened at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineEntry {
    pub at: Duration,
    pub event: HighlightEvent,
}

impl std::fmt::Display for TimelineEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:>8} ms  {:<12} {}",
            self.at.as_millis(),
            self.event.region,
            if self.event.on { "on" } else { "off" }
        )
    }
}

/// Timers fired at one virtual instant before the replay gives up on it.
///
/// A zero flash duration and interval with no cycle limit reschedules forever
/// without the clock moving.
pub const MAX_TIMERS_PER_INSTANT: usize = 10_000;

/// An idle watcher on a virtual clock with a recorded highlight timeline
pub struct Simulation {
    watcher: IdleWatcher<TimerQueue, RecordingSink>,
    sink: RecordingSink,
    timeline: Vec<TimelineEntry>,
    stalled_at: Option<Duration>,
}

impl Simulation {
    /// Create a simulation at time zero; call [`Simulation::start`] to arm
    pub fn new(settings: Settings) -> Self {
        let sink = RecordingSink::new();
        Self {
            watcher: IdleWatcher::new(settings, TimerQueue::new(), sink.clone()),
            sink,
            timeline: Vec::new(),
            stalled_at: None,
        }
    }

    pub fn start(&mut self) {
        self.watcher.start();
        self.record();
    }

    pub fn now(&self) -> Duration {
        self.watcher.scheduler().now()
    }

    pub fn watcher(&self) -> &IdleWatcher<TimerQueue, RecordingSink> {
        &self.watcher
    }

    /// Fire every timer due up to `until`, in order, then move the clock there.
    ///
    /// Once more than [`MAX_TIMERS_PER_INSTANT`] timers fire without the clock
    /// moving, timers stop firing for the rest of the replay; see
    /// [`Simulation::stalled_at`].
    pub fn advance_to(&mut self, until: Duration) {
        let mut instant = self.now();
        let mut fired_at_instant = 0;

        while self.stalled_at.is_none() {
            let Some(due) = self.watcher.scheduler().next_due().filter(|d| *d <= until) else {
                break;
            };
            if due == instant {
                fired_at_instant += 1;
            } else {
                instant = due;
                fired_at_instant = 1;
            }
            if fired_at_instant > MAX_TIMERS_PER_INSTANT {
                tracing::warn!(
                    "Zero cadence: timers stopped at {} ms after {} steps",
                    due.as_millis(),
                    MAX_TIMERS_PER_INSTANT
                );
                self.stalled_at = Some(due);
                break;
            }

            self.watcher.scheduler_mut().set_now(due);
            if let Some((handle, timer)) = self.watcher.scheduler_mut().pop_due() {
                self.watcher.on_timer(handle, timer);
                self.record();
            }
        }
        self.watcher.scheduler_mut().set_now(until);
    }

    /// Virtual time at which timers stopped firing because the flash never
    /// let the clock advance
    pub fn stalled_at(&self) -> Option<Duration> {
        self.stalled_at
    }

    /// Deliver a host event at the current time
    pub fn apply(&mut self, event: HostEvent) {
        self.watcher.handle(event);
        self.record();
    }

    /// Replay a script from the current state
    pub fn run_script(&mut self, script: &Script) {
        for step in &script.steps {
            self.advance_to(step.at);
            match &step.action {
                ScriptAction::Event(event) => self.apply(event.clone()),
                ScriptAction::End => break,
            }
        }
    }

    /// Every highlight call, including redundant clears
    pub fn timeline(&self) -> &[TimelineEntry] {
        &self.timeline
    }

    /// Only the calls that changed a region's highlight state
    pub fn transitions(&self) -> Vec<TimelineEntry> {
        let mut lit = [false; RegionKind::ALL.len()];
        let mut changes = Vec::new();
        for entry in &self.timeline {
            let slot = RegionKind::ALL
                .iter()
                .position(|r| *r == entry.event.region)
                .unwrap_or(0);
            if lit[slot] != entry.event.on {
                lit[slot] = entry.event.on;
                changes.push(*entry);
            }
        }
        changes
    }

    fn record(&mut self) {
        let at = self.now();
        self.timeline.extend(
            self.sink
                .take()
                .into_iter()
                .map(|event| TimelineEntry { at, event }),
        );
    }
}

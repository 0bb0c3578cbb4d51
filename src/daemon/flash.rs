use crate::config::Settings;
use crate::highlight::{HighlightSink, RegionKind, TargetSet};
use crate::scheduler::{cancel_slot, Scheduler, Timer, TimerHandle};
use std::time::Duration;

/// Where the flash cycle currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashPhase {
    /// Not flashing
    Idle,
    /// Regions are lit, waiting for the flash duration to elapse
    On,
    /// Regions are cleared, waiting for the interval before the next cycle
    Off,
}

/// Flash parameters captured when a flash starts, so a settings change
/// mid-flash never splits an on/off pair across two target sets.
#[derive(Debug, Clone, Copy)]
struct FlashPlan {
    duration: Duration,
    interval: Duration,
    max_cycles: u32,
    targets: TargetSet,
}

impl FlashPlan {
    fn from_settings(settings: &Settings) -> Self {
        Self {
            duration: settings.flash_duration,
            interval: settings.flash_interval,
            max_cycles: settings.max_cycles,
            targets: settings.targets,
        }
    }

    fn limit_reached(&self, cycles: u32) -> bool {
        self.max_cycles != 0 && cycles >= self.max_cycles
    }
}

/// Drives the on/off highlight cadence once the user is idle
#[derive(Debug)]
pub struct FlashController {
    phase: FlashPhase,
    cycle_count: u32,
    pending_step: Option<TimerHandle>,
    plan: Option<FlashPlan>,
}

impl Default for FlashController {
    fn default() -> Self {
        Self::new()
    }
}

impl FlashController {
    pub fn new() -> Self {
        Self {
            phase: FlashPhase::Idle,
            cycle_count: 0,
            pending_step: None,
            plan: None,
        }
    }

    pub fn is_flashing(&self) -> bool {
        self.phase != FlashPhase::Idle
    }

    #[cfg(test)]
    pub fn phase(&self) -> FlashPhase {
        self.phase
    }

    /// Completed on/off pairs since the current flash started
    pub fn cycle_count(&self) -> u32 {
        self.cycle_count
    }

    #[cfg(test)]
    pub fn pending_step(&self) -> Option<TimerHandle> {
        self.pending_step
    }

    /// Begin flashing.
    ///
    /// Does nothing when already flashing or when the host is not visible.
    /// Returns whether a new flash started.
    pub fn start<S, H>(
        &mut self,
        settings: &Settings,
        visible: bool,
        scheduler: &mut S,
        sink: &mut H,
    ) -> bool
    where
        S: Scheduler + ?Sized,
        H: HighlightSink + ?Sized,
    {
        if self.is_flashing() {
            tracing::debug!("Flash already running, ignoring start");
            return false;
        }
        if !visible {
            tracing::debug!("Host not visible, not flashing");
            return false;
        }

        let plan = FlashPlan::from_settings(settings);
        tracing::info!(
            "Starting to flash due to inactivity ({} ms on, {} ms off, {})",
            plan.duration.as_millis(),
            plan.interval.as_millis(),
            match plan.max_cycles {
                0 => "until activity".to_string(),
                n => format!("{} cycles", n),
            }
        );

        self.plan = Some(plan);
        self.cycle_count = 0;
        self.light(plan, scheduler, sink);
        true
    }

    /// Handle a fired flash step timer
    pub fn on_step<S, H>(&mut self, handle: TimerHandle, scheduler: &mut S, sink: &mut H)
    where
        S: Scheduler + ?Sized,
        H: HighlightSink + ?Sized,
    {
        if self.pending_step != Some(handle) {
            tracing::debug!("Ignoring stale flash step {:?}", handle);
            return;
        }
        self.pending_step = None;

        let Some(plan) = self.plan else {
            return;
        };

        match self.phase {
            FlashPhase::On => {
                for region in plan.targets.regions() {
                    sink.apply_off(region);
                }
                self.cycle_count += 1;
                tracing::debug!("Flash cycle {} complete", self.cycle_count);

                if plan.limit_reached(self.cycle_count) {
                    self.stop(scheduler, sink);
                    return;
                }

                self.phase = FlashPhase::Off;
                self.pending_step = Some(scheduler.schedule_once(plan.interval, Timer::FlashStep));
            }
            FlashPhase::Off => self.light(plan, scheduler, sink),
            FlashPhase::Idle => {}
        }
    }

    /// Stop flashing and clear every region, enabled or not.
    ///
    /// Does nothing when not flashing.
    pub fn stop<S, H>(&mut self, scheduler: &mut S, sink: &mut H)
    where
        S: Scheduler + ?Sized,
        H: HighlightSink + ?Sized,
    {
        if !self.is_flashing() {
            return;
        }
        tracing::info!("Stopping flash after {} cycles", self.cycle_count);

        self.phase = FlashPhase::Idle;
        self.plan = None;
        cancel_slot(scheduler, &mut self.pending_step);

        for region in RegionKind::ALL {
            sink.apply_off(region);
        }
    }

    fn light<S, H>(&mut self, plan: FlashPlan, scheduler: &mut S, sink: &mut H)
    where
        S: Scheduler + ?Sized,
        H: HighlightSink + ?Sized,
    {
        for region in plan.targets.regions() {
            sink.apply_on(region);
        }
        self.phase = FlashPhase::On;
        self.pending_step = Some(scheduler.schedule_once(plan.duration, Timer::FlashStep));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::highlight::{HighlightEvent, RecordingSink};
    use crate::scheduler::TimerQueue;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn settings(max_cycles: u32, targets: TargetSet) -> Settings {
        Settings {
            flash_duration: ms(500),
            flash_interval: ms(200),
            max_cycles,
            targets,
            ..Settings::default()
        }
    }

    /// Fire every step due up to `until`, one at a time
    fn run_until(
        flash: &mut FlashController,
        queue: &mut TimerQueue,
        sink: &mut RecordingSink,
        until: Duration,
    ) {
        while let Some(due) = queue.next_due().filter(|d| *d <= until) {
            queue.set_now(due);
            if let Some((handle, _)) = queue.pop_due() {
                flash.on_step(handle, queue, sink);
            }
        }
        queue.set_now(until);
    }

    // =========================================================================
    // start
    // =========================================================================

    #[test]
    fn test_start_lights_enabled_regions() {
        let mut flash = FlashController::new();
        let mut queue = TimerQueue::new();
        let mut sink = RecordingSink::new();
        let targets = TargetSet {
            ribbon: true,
            ..TargetSet::default()
        };

        assert!(flash.start(&settings(0, targets), true, &mut queue, &mut sink));

        assert_eq!(flash.phase(), FlashPhase::On);
        assert_eq!(flash.cycle_count(), 0);
        assert_eq!(
            sink.events(),
            vec![
                HighlightEvent::on(RegionKind::ViewContent),
                HighlightEvent::on(RegionKind::Ribbon),
            ]
        );
        assert_eq!(queue.next_due(), Some(ms(500)));
    }

    #[test]
    fn test_start_when_hidden_is_noop() {
        let mut flash = FlashController::new();
        let mut queue = TimerQueue::new();
        let mut sink = RecordingSink::new();

        assert!(!flash.start(&settings(0, TargetSet::all()), false, &mut queue, &mut sink));

        assert!(!flash.is_flashing());
        assert!(sink.events().is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_start_while_flashing_is_noop() {
        let mut flash = FlashController::new();
        let mut queue = TimerQueue::new();
        let mut sink = RecordingSink::new();
        let s = settings(0, TargetSet::default());

        flash.start(&s, true, &mut queue, &mut sink);
        assert!(!flash.start(&s, true, &mut queue, &mut sink));

        assert_eq!(sink.on_count(RegionKind::ViewContent), 1);
        assert_eq!(queue.count(Timer::FlashStep), 1);
    }

    // =========================================================================
    // Cycling
    // =========================================================================

    #[test]
    fn test_single_cycle_flashes_once() {
        let mut flash = FlashController::new();
        let mut queue = TimerQueue::new();
        let mut sink = RecordingSink::new();

        flash.start(&settings(1, TargetSet::default()), true, &mut queue, &mut sink);
        run_until(&mut flash, &mut queue, &mut sink, ms(10_000));

        assert!(!flash.is_flashing());
        assert_eq!(sink.on_count(RegionKind::ViewContent), 1);
        assert!(sink.lit().is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_bounded_cycles_then_stops() {
        let mut flash = FlashController::new();
        let mut queue = TimerQueue::new();
        let mut sink = RecordingSink::new();

        flash.start(&settings(3, TargetSet::all()), true, &mut queue, &mut sink);
        run_until(&mut flash, &mut queue, &mut sink, ms(60_000));

        for region in RegionKind::ALL {
            assert_eq!(sink.on_count(region), 3);
        }
        assert!(sink.lit().is_empty());
        assert!(!flash.is_flashing());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_phase_timing() {
        let mut flash = FlashController::new();
        let mut queue = TimerQueue::new();
        let mut sink = RecordingSink::new();

        flash.start(&settings(0, TargetSet::default()), true, &mut queue, &mut sink);

        run_until(&mut flash, &mut queue, &mut sink, ms(499));
        assert_eq!(flash.phase(), FlashPhase::On);

        run_until(&mut flash, &mut queue, &mut sink, ms(500));
        assert_eq!(flash.phase(), FlashPhase::Off);
        assert_eq!(flash.cycle_count(), 1);

        run_until(&mut flash, &mut queue, &mut sink, ms(700));
        assert_eq!(flash.phase(), FlashPhase::On);
        assert!(sink.is_lit(RegionKind::ViewContent));
    }

    #[test]
    fn test_unbounded_keeps_flashing() {
        let mut flash = FlashController::new();
        let mut queue = TimerQueue::new();
        let mut sink = RecordingSink::new();

        flash.start(&settings(0, TargetSet::default()), true, &mut queue, &mut sink);
        run_until(&mut flash, &mut queue, &mut sink, ms(7_000));

        // 7000 / (500 + 200) = 10 complete cycles, 11th lit at t=7000
        assert!(flash.is_flashing());
        assert_eq!(flash.cycle_count(), 10);
        assert_eq!(sink.on_count(RegionKind::ViewContent), 11);
    }

    #[test]
    fn test_zero_durations_still_step_through_queue() {
        let mut flash = FlashController::new();
        let mut queue = TimerQueue::new();
        let mut sink = RecordingSink::new();
        let s = Settings {
            flash_duration: Duration::ZERO,
            flash_interval: Duration::ZERO,
            max_cycles: 2,
            ..Settings::default()
        };

        flash.start(&s, true, &mut queue, &mut sink);
        assert_eq!(flash.phase(), FlashPhase::On);

        run_until(&mut flash, &mut queue, &mut sink, Duration::ZERO);
        assert!(!flash.is_flashing());
        assert_eq!(sink.on_count(RegionKind::ViewContent), 2);
    }

    // =========================================================================
    // stop
    // =========================================================================

    #[test]
    fn test_stop_clears_every_region_and_cancels_step() {
        let mut flash = FlashController::new();
        let mut queue = TimerQueue::new();
        let mut sink = RecordingSink::new();

        flash.start(&settings(0, TargetSet::default()), true, &mut queue, &mut sink);
        sink.take();
        flash.stop(&mut queue, &mut sink);

        let cleared: Vec<_> = sink.events().iter().map(|e| e.region).collect();
        assert_eq!(cleared, RegionKind::ALL.to_vec());
        assert!(sink.events().iter().all(|e| !e.on));
        assert!(queue.is_empty());
        assert!(flash.pending_step().is_none());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut flash = FlashController::new();
        let mut queue = TimerQueue::new();
        let mut sink = RecordingSink::new();

        flash.start(&settings(0, TargetSet::default()), true, &mut queue, &mut sink);
        flash.stop(&mut queue, &mut sink);
        let after_first = sink.events();
        flash.stop(&mut queue, &mut sink);

        assert_eq!(sink.events(), after_first);
        assert_eq!(flash.phase(), FlashPhase::Idle);
    }

    #[test]
    fn test_stop_when_idle_touches_nothing() {
        let mut flash = FlashController::new();
        let mut queue = TimerQueue::new();
        let mut sink = RecordingSink::new();

        flash.stop(&mut queue, &mut sink);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_stale_step_ignored_after_stop() {
        let mut flash = FlashController::new();
        let mut queue = TimerQueue::new();
        let mut sink = RecordingSink::new();

        flash.start(&settings(0, TargetSet::default()), true, &mut queue, &mut sink);
        let step = flash.pending_step().unwrap();
        flash.stop(&mut queue, &mut sink);
        let before = sink.events();

        flash.on_step(step, &mut queue, &mut sink);
        assert_eq!(sink.events(), before);
        assert!(!flash.is_flashing());
    }

    #[test]
    fn test_settings_change_does_not_affect_running_flash() {
        let mut flash = FlashController::new();
        let mut queue = TimerQueue::new();
        let mut sink = RecordingSink::new();

        let mut s = settings(0, TargetSet::default());
        flash.start(&s, true, &mut queue, &mut sink);

        // A later start call with new targets is ignored while flashing
        s.targets = TargetSet::all();
        flash.start(&s, true, &mut queue, &mut sink);
        run_until(&mut flash, &mut queue, &mut sink, ms(700));

        assert_eq!(sink.on_count(RegionKind::Ribbon), 0);
        assert_eq!(sink.on_count(RegionKind::ViewContent), 2);
    }
}

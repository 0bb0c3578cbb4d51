use super::flash::FlashController;
use crate::config::Settings;
use crate::highlight::HighlightSink;
use crate::scheduler::{cancel_slot, Scheduler, Timer, TimerHandle};

/// Signals the host delivers to the idle watcher
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// Pointer move, key press, touch, scroll, wheel or pointer up/down
    Activity,
    /// Host went to the background
    VisibilityLost,
    /// Host is visible again; does not count as activity
    VisibilityRestored,
    /// Host gained foreground focus: visible again and counts as activity
    Focus,
    /// New settings from the configuration layer
    SettingsChanged(Settings),
    Shutdown,
}

/// Watches for inactivity and starts flashing when the user has been idle
/// for the configured timeout.
///
/// Owns the single idle deadline and the flash controller. All methods run
/// to completion, so a cancelled timer is gone before the method returns.
pub struct IdleWatcher<S: Scheduler, H: HighlightSink> {
    settings: Settings,
    scheduler: S,
    sink: H,
    flash: FlashController,
    pending_deadline: Option<TimerHandle>,
    visible: bool,
    shut_down: bool,
}

impl<S: Scheduler, H: HighlightSink> IdleWatcher<S, H> {
    /// Create a watcher; the host is assumed visible until told otherwise
    pub fn new(settings: Settings, scheduler: S, sink: H) -> Self {
        Self {
            settings,
            scheduler,
            sink,
            flash: FlashController::new(),
            pending_deadline: None,
            visible: true,
            shut_down: false,
        }
    }

    /// Arm the idle deadline, replacing any pending one
    pub fn start(&mut self) {
        if self.shut_down {
            tracing::debug!("Watcher shut down, not arming");
            return;
        }
        self.arm();
    }

    /// Any qualifying user input
    pub fn on_activity(&mut self) {
        if self.shut_down {
            return;
        }
        cancel_slot(&mut self.scheduler, &mut self.pending_deadline);
        self.flash.stop(&mut self.scheduler, &mut self.sink);
        self.arm();
    }

    /// Host moved to the background: cancel everything and wait for activity
    pub fn on_visibility_lost(&mut self) {
        self.visible = false;
        cancel_slot(&mut self.scheduler, &mut self.pending_deadline);
        self.flash.stop(&mut self.scheduler, &mut self.sink);
        tracing::debug!("Host hidden, idle deadline cancelled");
    }

    /// Host is visible again. The deadline stays disarmed until the next
    /// activity.
    pub fn on_visibility_restored(&mut self) {
        self.visible = true;
    }

    /// Dispatch a fired timer
    pub fn on_timer(&mut self, handle: TimerHandle, timer: Timer) {
        match timer {
            Timer::IdleDeadline => {
                if self.pending_deadline != Some(handle) {
                    tracing::debug!("Ignoring stale idle deadline {:?}", handle);
                    return;
                }
                self.pending_deadline = None;
                self.on_deadline_fired();
            }
            Timer::FlashStep => self.flash.on_step(handle, &mut self.scheduler, &mut self.sink),
        }
    }

    fn on_deadline_fired(&mut self) {
        if !self.visible {
            tracing::debug!("Idle deadline lapsed while hidden");
            return;
        }
        self.flash.start(
            &self.settings,
            self.visible,
            &mut self.scheduler,
            &mut self.sink,
        );
    }

    /// Swap in new settings. The idle timeout applies from the next arm,
    /// flash settings from the next flash start.
    pub fn update_settings(&mut self, settings: Settings) {
        if settings.highlight_color != self.settings.highlight_color {
            self.sink.restyle(&settings.highlight_color);
        }
        self.settings = settings;
        tracing::debug!("Settings updated");
    }

    /// Cancel the deadline and any flash; the watcher stays inert afterwards
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        cancel_slot(&mut self.scheduler, &mut self.pending_deadline);
        self.flash.stop(&mut self.scheduler, &mut self.sink);
        self.shut_down = true;
        tracing::info!("Idle watcher shut down");
    }

    /// Apply a host event
    pub fn handle(&mut self, event: HostEvent) {
        match event {
            HostEvent::Activity => self.on_activity(),
            HostEvent::VisibilityLost => self.on_visibility_lost(),
            HostEvent::VisibilityRestored => self.on_visibility_restored(),
            HostEvent::Focus => {
                self.on_visibility_restored();
                self.on_activity();
            }
            HostEvent::SettingsChanged(settings) => self.update_settings(settings),
            HostEvent::Shutdown => self.shutdown(),
        }
    }

    fn arm(&mut self) {
        cancel_slot(&mut self.scheduler, &mut self.pending_deadline);
        let timeout = self.settings.idle_timeout;
        self.pending_deadline = Some(self.scheduler.schedule_once(timeout, Timer::IdleDeadline));
        tracing::debug!("Idle deadline armed for {} ms", timeout.as_millis());
    }

    pub fn is_flashing(&self) -> bool {
        self.flash.is_flashing()
    }

    pub fn flash(&self) -> &FlashController {
        &self.flash
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

#[cfg(test)]
impl<S: Scheduler, H: HighlightSink> IdleWatcher<S, H> {
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    pub fn pending_deadline(&self) -> Option<TimerHandle> {
        self.pending_deadline
    }

    pub fn sink(&self) -> &H {
        &self.sink
    }
}

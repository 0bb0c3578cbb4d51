pub mod flash;
pub mod idle;
pub mod simulate;

pub use idle::{HostEvent, IdleWatcher};

use crate::config::Settings;
use crate::highlight::HighlightSink;
use crate::scheduler::TimerQueue;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Handle for feeding host events to a running daemon.
/// This is cheap to clone and doesn't require any locks.
#[derive(Clone)]
pub struct DaemonHandle {
    events: mpsc::UnboundedSender<HostEvent>,
}

impl DaemonHandle {
    fn send(&self, event: HostEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("Daemon already stopped, dropping event");
        }
    }

    /// Report qualifying user input
    pub fn activity(&self) {
        self.send(HostEvent::Activity);
    }

    /// Report that the host went to the background
    pub fn visibility_lost(&self) {
        self.send(HostEvent::VisibilityLost);
    }

    /// Report that the host is visible again without user input
    pub fn visibility_restored(&self) {
        self.send(HostEvent::VisibilityRestored);
    }

    /// Report that the host gained foreground focus
    pub fn focus(&self) {
        self.send(HostEvent::Focus);
    }

    /// Replace the settings the daemon works from
    pub fn update_settings(&self, settings: Settings) {
        self.send(HostEvent::SettingsChanged(settings));
    }

    /// Signal the daemon to stop gracefully
    pub fn shutdown(&self) {
        tracing::info!("Shutdown requested, stopping daemon...");
        self.send(HostEvent::Shutdown);
    }
}

/// Runs the idle watcher against the wall clock on a single task
pub struct Daemon<H: HighlightSink> {
    watcher: IdleWatcher<TimerQueue, H>,
    events: mpsc::UnboundedReceiver<HostEvent>,
    sender: mpsc::UnboundedSender<HostEvent>,
}

impl<H: HighlightSink> Daemon<H> {
    pub fn new(settings: Settings, sink: H) -> Self {
        let (sender, events) = mpsc::unbounded_channel();
        Self {
            watcher: IdleWatcher::new(settings, TimerQueue::new(), sink),
            events,
            sender,
        }
    }

    /// Get a handle for delivering host events from outside
    pub fn handle(&self) -> DaemonHandle {
        DaemonHandle {
            events: self.sender.clone(),
        }
    }

    #[cfg(test)]
    pub fn watcher(&self) -> &IdleWatcher<TimerQueue, H> {
        &self.watcher
    }

    /// Run the daemon loop until shutdown.
    ///
    /// Each iteration fires at most one due timer, then waits for either the
    /// next host event or the next due timer. Host events win ties, so a
    /// cancellation always lands before the timer it cancels.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        let origin = Instant::now();
        tracing::info!(
            "Daemon started (idle timeout: {} ms)",
            self.watcher.settings().idle_timeout.as_millis()
        );
        self.watcher.start();

        loop {
            let queue = self.watcher.scheduler_mut();
            queue.set_now(origin.elapsed());
            if let Some((handle, timer)) = queue.pop_due() {
                tracing::debug!("Timer fired: {:?}", timer);
                self.watcher.on_timer(handle, timer);
            }

            let next_due = self.watcher.scheduler().next_due();

            tokio::select! {
                biased;
                event = self.events.recv() => {
                    match event {
                        Some(HostEvent::Shutdown) | None => break,
                        Some(event) => {
                            // Re-arming measures from the moment the event arrived
                            self.watcher.scheduler_mut().set_now(origin.elapsed());
                            self.watcher.handle(event);
                        }
                    }
                }
                _ = sleep_until_due(origin, next_due) => {}
            }
        }

        self.watcher.shutdown();
        tracing::info!("Daemon stopped");
        Ok(())
    }
}

/// Sleep until `due` past `origin`, or forever when nothing is scheduled or
/// the deadline lies beyond what the clock can represent
async fn sleep_until_due(origin: Instant, due: Option<Duration>) {
    match due.and_then(|due| origin.checked_add(due)) {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

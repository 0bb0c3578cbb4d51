use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// CSS class the host toggles on a highlighted element
pub const HIGHLIGHT_CLASS: &str = "hey-wake-up-flash-active";

/// Render the style rule that gives highlighted elements their color
pub fn style_rule(color: &str) -> String {
    format!(
        ".{} {{ background-color: {} !important; }}",
        HIGHLIGHT_CLASS, color
    )
}

/// A class of UI area that can be highlighted independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionKind {
    /// Content area of the active view
    ViewContent,
    /// Left and right side panels
    SidePanes,
    /// Title headers of every open view
    ViewHeaders,
    /// Status bar at the bottom
    StatusBar,
    /// Action ribbon on the far left
    Ribbon,
    /// Window titlebar
    Titlebar,
}

impl RegionKind {
    /// Every region kind, in display order
    pub const ALL: [RegionKind; 6] = [
        RegionKind::ViewContent,
        RegionKind::SidePanes,
        RegionKind::ViewHeaders,
        RegionKind::StatusBar,
        RegionKind::Ribbon,
        RegionKind::Titlebar,
    ];

    /// Host selector for the elements belonging to this region
    pub fn selector(self) -> &'static str {
        match self {
            RegionKind::ViewContent => ".view-content",
            RegionKind::SidePanes => ".workspace-leaf-content",
            RegionKind::ViewHeaders => ".view-header-title-container",
            RegionKind::StatusBar => ".status-bar",
            RegionKind::Ribbon => ".workspace-ribbon",
            RegionKind::Titlebar => ".titlebar",
        }
    }
}

impl std::fmt::Display for RegionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RegionKind::ViewContent => "view-content",
            RegionKind::SidePanes => "side-panes",
            RegionKind::ViewHeaders => "view-headers",
            RegionKind::StatusBar => "status-bar",
            RegionKind::Ribbon => "ribbon",
            RegionKind::Titlebar => "titlebar",
        };
        f.pad(name)
    }
}

/// Which region kinds take part in a flash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSet {
    #[serde(default = "default_view_content")]
    pub view_content: bool,
    #[serde(default)]
    pub side_panes: bool,
    #[serde(default)]
    pub view_headers: bool,
    #[serde(default)]
    pub status_bar: bool,
    #[serde(default)]
    pub ribbon: bool,
    #[serde(default)]
    pub titlebar: bool,
}

fn default_view_content() -> bool {
    true
}

impl Default for TargetSet {
    fn default() -> Self {
        Self {
            view_content: default_view_content(),
            side_panes: false,
            view_headers: false,
            status_bar: false,
            ribbon: false,
            titlebar: false,
        }
    }
}

impl TargetSet {
    /// A set with no region enabled
    #[cfg(test)]
    pub fn none() -> Self {
        Self {
            view_content: false,
            side_panes: false,
            view_headers: false,
            status_bar: false,
            ribbon: false,
            titlebar: false,
        }
    }

    /// A set with every region enabled
    #[cfg(test)]
    pub fn all() -> Self {
        Self {
            view_content: true,
            side_panes: true,
            view_headers: true,
            status_bar: true,
            ribbon: true,
            titlebar: true,
        }
    }

    pub fn contains(&self, region: RegionKind) -> bool {
        match region {
            RegionKind::ViewContent => self.view_content,
            RegionKind::SidePanes => self.side_panes,
            RegionKind::ViewHeaders => self.view_headers,
            RegionKind::StatusBar => self.status_bar,
            RegionKind::Ribbon => self.ribbon,
            RegionKind::Titlebar => self.titlebar,
        }
    }

    /// Enabled regions, in display order
    pub fn regions(&self) -> impl Iterator<Item = RegionKind> + '_ {
        RegionKind::ALL.into_iter().filter(|r| self.contains(*r))
    }
}

/// Receives highlight changes for region kinds.
///
/// Implementations must tolerate repeated calls and regions that do not
/// currently exist in the host; both are no-ops.
pub trait HighlightSink {
    fn apply_on(&mut self, region: RegionKind);
    fn apply_off(&mut self, region: RegionKind);

    /// The highlight color changed
    fn restyle(&mut self, _color: &str) {}
}

/// Sink that reports highlight changes through tracing
#[derive(Debug, Clone)]
pub struct LogSink {
    color: String,
}

impl LogSink {
    pub fn new(color: impl Into<String>) -> Self {
        Self {
            color: color.into(),
        }
    }
}

impl HighlightSink for LogSink {
    fn apply_on(&mut self, region: RegionKind) {
        tracing::info!("Highlight on: {} ({}) in {}", region, region.selector(), self.color);
    }

    fn apply_off(&mut self, region: RegionKind) {
        tracing::debug!("Highlight off: {} ({})", region, region.selector());
    }

    fn restyle(&mut self, color: &str) {
        tracing::info!("Highlight style: {}", style_rule(color));
        self.color = color.to_string();
    }
}

/// A single change recorded by [`RecordingSink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HighlightEvent {
    pub region: RegionKind,
    pub on: bool,
}

impl HighlightEvent {
    pub fn on(region: RegionKind) -> Self {
        Self { region, on: true }
    }

    pub fn off(region: RegionKind) -> Self {
        Self { region, on: false }
    }
}

/// Sink that records every change and tracks which regions are lit.
/// Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<HighlightEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: HighlightEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    /// Remove and return the recorded changes
    pub fn take(&self) -> Vec<HighlightEvent> {
        self.events
            .lock()
            .map(|mut e| std::mem::take(&mut *e))
            .unwrap_or_default()
    }
}

#[cfg(test)]
impl RecordingSink {
    /// All recorded changes so far
    pub fn events(&self) -> Vec<HighlightEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Whether the last change recorded for `region` switched it on
    pub fn is_lit(&self, region: RegionKind) -> bool {
        self.events()
            .iter()
            .rev()
            .find(|e| e.region == region)
            .map(|e| e.on)
            .unwrap_or(false)
    }

    /// Regions currently lit
    pub fn lit(&self) -> Vec<RegionKind> {
        RegionKind::ALL
            .into_iter()
            .filter(|r| self.is_lit(*r))
            .collect()
    }

    /// Number of "on" applications recorded for `region`
    pub fn on_count(&self, region: RegionKind) -> usize {
        self.events()
            .iter()
            .filter(|e| e.region == region && e.on)
            .count()
    }
}

impl HighlightSink for RecordingSink {
    fn apply_on(&mut self, region: RegionKind) {
        self.push(HighlightEvent::on(region));
    }

    fn apply_off(&mut self, region: RegionKind) {
        self.push(HighlightEvent::off(region));
    }
}

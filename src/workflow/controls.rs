use serde::Serialize;
use std::fmt;
use std::sync::Mutex;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriggerState {
    pub enabled: bool,
    pub label: String,
}

/// The button that starts a workflow.
pub struct TriggerControl {
    state: watch::Sender<TriggerState>,
    resting_label: String,
}

impl TriggerControl {
    pub fn new(resting_label: impl Into<String>) -> Self {
        let resting_label = resting_label.into();
        let (state, _) = watch::channel(TriggerState {
            enabled: true,
            label: resting_label.clone(),
        });
        Self {
            state,
            resting_label,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.state.borrow().enabled
    }

    pub fn label(&self) -> String {
        self.state.borrow().label.clone()
    }

    pub fn resting_label(&self) -> &str {
        &self.resting_label
    }

    pub fn current(&self) -> TriggerState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TriggerState> {
        self.state.subscribe()
    }

    /// Disable and show `label`.
    pub fn busy(&self, label: &str) {
        self.state.send_replace(TriggerState {
            enabled: false,
            label: label.to_string(),
        });
    }

    /// Disable and show `label` only if currently enabled. Test and set happen
    /// under the channel lock, so exactly one caller wins.
    pub fn try_busy(&self, label: &str) -> bool {
        self.state.send_if_modified(|state| {
            if !state.enabled {
                return false;
            }
            state.enabled = false;
            state.label = label.to_string();
            true
        })
    }

    pub fn restore(&self) {
        self.state.send_replace(TriggerState {
            enabled: true,
            label: self.resting_label.clone(),
        });
    }

    /// Disable now; re-enable when the guard drops, whatever happened in between.
    pub fn engage(&self, label: &str) -> TriggerGuard<'_> {
        self.busy(label);
        TriggerGuard { control: self }
    }

    /// Like `engage`, but `None` when someone else already holds the trigger.
    pub fn try_engage(&self, label: &str) -> Option<TriggerGuard<'_>> {
        self.try_busy(label).then(|| TriggerGuard { control: self })
    }
}

pub struct TriggerGuard<'a> {
    control: &'a TriggerControl,
}

impl TriggerGuard<'_> {
    pub fn relabel(&self, label: &str) {
        self.control.busy(label);
    }
}

impl Drop for TriggerGuard<'_> {
    fn drop(&mut self) {
        self.control.restore();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressState {
    pub visible: bool,
    pub captured: u32,
    pub total: u32,
}

impl ProgressState {
    /// Share of the capture loop done, 0.0..=100.0.
    pub fn percent(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            self.captured.min(self.total) as f32 / self.total as f32 * 100.0
        }
    }
}

pub struct ProgressIndicator {
    state: watch::Sender<ProgressState>,
}

impl ProgressIndicator {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ProgressState::default());
        Self { state }
    }

    pub fn show(&self, total: u32) {
        self.state.send_replace(ProgressState {
            visible: true,
            captured: 0,
            total,
        });
    }

    pub fn set_captured(&self, captured: u32) {
        self.state
            .send_modify(|state| state.captured = captured.min(state.total));
    }

    pub fn current(&self) -> ProgressState {
        self.state.borrow().clone()
    }

    pub fn percent(&self) -> f32 {
        self.state.borrow().percent()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressState> {
        self.state.subscribe()
    }
}

impl Default for ProgressIndicator {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PanelContent {
    #[default]
    Empty,
    Welcome {
        user: String,
        message: String,
    },
    NotRecognized,
}

impl fmt::Display for PanelContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PanelContent::Empty => Ok(()),
            PanelContent::Welcome { user, message } => {
                write!(f, "Welcome, {}", user)?;
                if !message.is_empty() {
                    write!(f, "\n{}", message)?;
                }
                Ok(())
            }
            PanelContent::NotRecognized => f.write_str("Not Recognized"),
        }
    }
}

/// Region showing the last verification result.
pub struct ResultPanel {
    content: watch::Sender<PanelContent>,
}

impl ResultPanel {
    pub fn new() -> Self {
        let (content, _) = watch::channel(PanelContent::Empty);
        Self { content }
    }

    pub fn show(&self, content: PanelContent) {
        self.content.send_replace(content);
    }

    pub fn current(&self) -> PanelContent {
        self.content.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PanelContent> {
        self.content.subscribe()
    }
}

impl Default for ResultPanel {
    fn default() -> Self {
        Self::new()
    }
}

/// Moves the host to another page.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: &str);
}

/// Keeps requested routes for hosts that poll instead of reacting.
#[derive(Default)]
pub struct RecordingNavigator {
    routes: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visited(&self) -> Vec<String> {
        self.routes
            .lock()
            .map(|routes| routes.clone())
            .unwrap_or_default()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: &str) {
        tracing::info!("Navigating to {}", route);
        if let Ok(mut routes) = self.routes.lock() {
            routes.push(route.to_string());
        }
    }
}

use serde::Serialize;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Success,
    Error,
}

/// What the status toast currently shows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub text: String,
    pub severity: Severity,
    pub visible: bool,
}

/// Shared toast service. Cloning hands out another handle to the same state.
///
/// Each call replaces the visible message and restarts the auto-hide timer;
/// messages are never queued.
#[derive(Clone)]
pub struct Notifier {
    inner: Arc<NotifierInner>,
}

struct NotifierInner {
    state: watch::Sender<Notification>,
    generation: AtomicU64,
    hide_task: Mutex<Option<JoinHandle<()>>>,
    display_for: Duration,
}

impl Notifier {
    pub fn new(display_for: Duration) -> Self {
        let (state, _) = watch::channel(Notification::default());
        Self {
            inner: Arc::new(NotifierInner {
                state,
                generation: AtomicU64::new(0),
                hide_task: Mutex::new(None),
                display_for,
            }),
        }
    }

    /// Must be called from within a tokio runtime: the hide timer is a spawned task.
    pub fn notify(&self, text: impl Into<String>, severity: Severity) {
        let text = text.into();
        match severity {
            Severity::Success => tracing::info!("Notification: {}", text),
            Severity::Error => tracing::warn!("Notification (error): {}", text),
        }

        // Bump, replace and reschedule as one step; the newest text and the
        // surviving hide task must belong to the same call.
        let mut hide_task = match self.inner.hide_task.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(existing) = hide_task.take() {
            existing.abort();
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.state.send_replace(Notification {
            text,
            severity,
            visible: true,
        });

        let inner = self.inner.clone();
        *hide_task = Some(tokio::spawn(async move {
            sleep(inner.display_for).await;
            // A newer call owns the toast now.
            if inner.generation.load(Ordering::SeqCst) == generation {
                inner.state.send_modify(|n| n.visible = false);
            }
        }));
    }

    pub fn success(&self, text: impl Into<String>) {
        self.notify(text, Severity::Success);
    }

    pub fn error(&self, text: impl Into<String>) {
        self.notify(text, Severity::Error);
    }

    pub fn current(&self) -> Notification {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Notification> {
        self.inner.state.subscribe()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(Duration::from_millis(crate::config::DEFAULT_NOTIFICATION_MS))
    }
}

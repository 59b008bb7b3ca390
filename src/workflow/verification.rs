use super::controls::{PanelContent, ResultPanel, TriggerControl};
use super::WorkflowError;
use crate::api::{AttendanceApi, VerifyResponse};
use crate::camera::FrameSnapshot;
use crate::notify::Notifier;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

pub const RESTING_LABEL: &str = "Mark Attendance";
const SCANNING_LABEL: &str = "Scanning...";
const NOT_RECOGNIZED: &str = "Face not recognized";
const SCAN_ERROR: &str = "Error marking attendance";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Error,
}

/// Result of one verification attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationOutcome {
    pub status: OutcomeStatus,
    /// Only meaningful when `status` is `Success`.
    pub matched: bool,
    pub subject_label: Option<String>,
    pub message: String,
}

impl VerificationOutcome {
    pub fn from_response(response: VerifyResponse) -> Self {
        if !response.is_success() {
            return Self::failure(response.backend_message().unwrap_or(SCAN_ERROR));
        }

        let matched = response.matched.unwrap_or(false);
        let message = match response.backend_message() {
            Some(message) => message.to_string(),
            None if matched => String::new(),
            None => NOT_RECOGNIZED.to_string(),
        };

        Self {
            status: OutcomeStatus::Success,
            matched,
            subject_label: if matched { response.user } else { None },
            message,
        }
    }

    pub fn failure(message: &str) -> Self {
        Self {
            status: OutcomeStatus::Error,
            matched: false,
            subject_label: None,
            message: message.to_string(),
        }
    }

    pub fn is_match(&self) -> bool {
        self.status == OutcomeStatus::Success && self.matched
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum VerificationPhase {
    #[default]
    Idle,
    Scanning,
    Result,
}

/// Capture one frame and ask the backend who it is.
pub struct VerificationWorkflow {
    api: Arc<dyn AttendanceApi>,
    snapshot: FrameSnapshot,
    notifier: Notifier,
    trigger: TriggerControl,
    panel: ResultPanel,
    phase: watch::Sender<VerificationPhase>,
}

impl VerificationWorkflow {
    pub fn new(api: Arc<dyn AttendanceApi>, snapshot: FrameSnapshot, notifier: Notifier) -> Self {
        let (phase, _) = watch::channel(VerificationPhase::Idle);
        Self {
            api,
            snapshot,
            notifier,
            trigger: TriggerControl::new(RESTING_LABEL),
            panel: ResultPanel::new(),
            phase,
        }
    }

    pub fn trigger(&self) -> &TriggerControl {
        &self.trigger
    }

    pub fn panel(&self) -> &ResultPanel {
        &self.panel
    }

    pub fn phase(&self) -> VerificationPhase {
        *self.phase.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<VerificationPhase> {
        self.phase.subscribe()
    }

    /// `None` when the trigger is disabled. The trigger is re-enabled on every exit path.
    pub async fn scan(&self) -> Option<VerificationOutcome> {
        let Some(_trigger) = self.trigger.try_engage(SCANNING_LABEL) else {
            tracing::debug!("Verification trigger disabled, ignoring scan");
            return None;
        };
        self.phase.send_replace(VerificationPhase::Scanning);

        let outcome = match self.attempt().await {
            Ok(response) => VerificationOutcome::from_response(response),
            Err(err) => {
                tracing::error!("Verification attempt failed: {}", err);
                VerificationOutcome::failure(SCAN_ERROR)
            }
        };

        tracing::info!(
            "Verification finished: status={:?}, matched={}, user={}",
            outcome.status,
            outcome.matched,
            outcome.subject_label.as_deref().unwrap_or("-")
        );

        self.render(&outcome);
        self.phase.send_replace(VerificationPhase::Result);
        Some(outcome)
    }

    async fn attempt(&self) -> Result<VerifyResponse, WorkflowError> {
        let frame = self.snapshot.capture().await?;
        self.api.verify_face(frame).await.map_err(|e| {
            if e.is_transport() {
                WorkflowError::Transport(e.to_string())
            } else {
                WorkflowError::Match(e.to_string())
            }
        })
    }

    fn render(&self, outcome: &VerificationOutcome) {
        match outcome.status {
            OutcomeStatus::Success if outcome.matched => {
                let user = outcome
                    .subject_label
                    .clone()
                    .unwrap_or_else(|| "Unknown".to_string());
                self.notifier.success(format!("Welcome, {}!", user));
                self.panel.show(PanelContent::Welcome {
                    user,
                    message: outcome.message.clone(),
                });
            }
            OutcomeStatus::Success => {
                self.notifier.error(NOT_RECOGNIZED);
                self.panel.show(PanelContent::NotRecognized);
            }
            OutcomeStatus::Error => self.notifier.error(outcome.message.clone()),
        }
    }
}

use crate::api::ApiError;
use crate::camera::DeviceError;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

pub mod controls;
pub mod enrollment;
pub mod verification;

pub use controls::{
    Navigator, PanelContent, ProgressIndicator, ProgressState, RecordingNavigator, ResultPanel,
    TriggerControl, TriggerState,
};
pub use enrollment::{
    EnrollmentOutcome, EnrollmentPhase, EnrollmentReport, EnrollmentSettings, EnrollmentState,
    EnrollmentWorkflow,
};
pub use verification::{OutcomeStatus, VerificationOutcome, VerificationPhase, VerificationWorkflow};

/// Everything that can stop a workflow. Display text is what the operator sees.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Device(#[from] DeviceError),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Transport(String),

    #[error("{0}")]
    Backend(String),

    #[error("{0}")]
    Match(String),

    #[error("Enrollment cancelled")]
    Cancelled,
}

impl WorkflowError {
    /// Transport failures keep the client's wording, HTTP failures get `fallback`.
    pub(crate) fn from_api(err: ApiError, fallback: &str) -> Self {
        match err {
            e if e.is_transport() => WorkflowError::Transport(e.to_string()),
            ApiError::InvalidResponse(detail) => {
                tracing::debug!("Unreadable backend answer: {}", detail);
                WorkflowError::Backend(fallback.to_string())
            }
            _ => WorkflowError::Backend(fallback.to_string()),
        }
    }
}

/// Checked between workflow steps. Never set unless the host asks for it.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

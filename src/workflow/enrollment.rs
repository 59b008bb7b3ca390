use super::controls::{Navigator, ProgressIndicator, TriggerControl};
use super::{CancelFlag, WorkflowError};
use crate::api::{AttendanceApi, SubjectId};
use crate::camera::FrameSnapshot;
use crate::config::ClientConfig;
use crate::notify::Notifier;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

pub const RESTING_LABEL: &str = "Capture & Register";
const CREATING_LABEL: &str = "Creating User...";
const CAPTURING_LABEL: &str = "Capturing Face...";
const TRAINING_LABEL: &str = "Training Model...";

const EMPTY_NAME: &str = "Please enter a name";
const CREATE_FAILED: &str = "Failed to create user";
const UPLOAD_FAILED: &str = "Failed to upload face";
const TRAIN_FAILED: &str = "Training failed";
const COMPLETE: &str = "Registration Complete!";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum EnrollmentPhase {
    #[default]
    Idle,
    CreatingSubject,
    Capturing,
    Training,
    Complete,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrollmentState {
    pub subject_name: String,
    pub subject_id: Option<SubjectId>,
    pub captured_count: u32,
    pub phase: EnrollmentPhase,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrollmentReport {
    pub subject_id: SubjectId,
    pub subject_name: String,
    pub captured: u32,
    pub accepted: u32,
    pub rejected: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug)]
pub enum EnrollmentOutcome {
    Completed(EnrollmentReport),
    /// Input refused before anything started; state untouched.
    Rejected(WorkflowError),
    Failed(WorkflowError),
    /// The trigger was disabled, an attempt is already running or finished.
    Ignored,
}

#[derive(Debug, Clone)]
pub struct EnrollmentSettings {
    pub total_images: u32,
    pub capture_interval: Duration,
    pub navigate_delay: Duration,
    pub home_route: String,
    pub continue_on_upload_failure: bool,
}

impl From<&ClientConfig> for EnrollmentSettings {
    fn from(config: &ClientConfig) -> Self {
        Self {
            total_images: config.total_images,
            capture_interval: config.capture_interval(),
            navigate_delay: config.navigate_delay(),
            home_route: config.home_route.clone(),
            continue_on_upload_failure: config.continue_on_upload_failure,
        }
    }
}

impl Default for EnrollmentSettings {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

#[derive(Debug, Default)]
struct UploadTally {
    captured: u32,
    accepted: u32,
    rejected: u32,
}

/// Create subject, capture and upload reference frames one at a time, train, then go home.
pub struct EnrollmentWorkflow {
    api: Arc<dyn AttendanceApi>,
    snapshot: FrameSnapshot,
    notifier: Notifier,
    navigator: Arc<dyn Navigator>,
    settings: EnrollmentSettings,
    trigger: TriggerControl,
    progress: ProgressIndicator,
    state: watch::Sender<EnrollmentState>,
    cancel: Option<CancelFlag>,
    navigation: Mutex<Option<JoinHandle<()>>>,
}

impl EnrollmentWorkflow {
    pub fn new(
        api: Arc<dyn AttendanceApi>,
        snapshot: FrameSnapshot,
        notifier: Notifier,
        navigator: Arc<dyn Navigator>,
        settings: EnrollmentSettings,
    ) -> Self {
        let (state, _) = watch::channel(EnrollmentState::default());
        Self {
            api,
            snapshot,
            notifier,
            navigator,
            settings,
            trigger: TriggerControl::new(RESTING_LABEL),
            progress: ProgressIndicator::new(),
            state,
            cancel: None,
            navigation: Mutex::new(None),
        }
    }

    pub fn with_cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn state(&self) -> EnrollmentState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<EnrollmentState> {
        self.state.subscribe()
    }

    pub fn trigger(&self) -> &TriggerControl {
        &self.trigger
    }

    pub fn progress(&self) -> &ProgressIndicator {
        &self.progress
    }

    pub fn settings(&self) -> &EnrollmentSettings {
        &self.settings
    }

    /// Operator pressed the trigger with `name` in the input.
    ///
    /// Every failure is reported through the notifier and leaves the trigger
    /// enabled for another attempt.
    pub async fn submit(&self, name: &str) -> EnrollmentOutcome {
        if !self.trigger.is_enabled() {
            tracing::debug!("Enrollment trigger disabled, ignoring submission");
            return EnrollmentOutcome::Ignored;
        }

        let name = name.trim();
        if name.is_empty() {
            self.notifier.error(EMPTY_NAME);
            return EnrollmentOutcome::Rejected(WorkflowError::Validation(EMPTY_NAME.to_string()));
        }

        if !self.trigger.try_busy(CREATING_LABEL) {
            tracing::debug!("Enrollment already claimed by another submission");
            return EnrollmentOutcome::Ignored;
        }
        self.state.send_modify(|state| {
            state.subject_name = name.to_string();
            state.subject_id = None;
            state.phase = EnrollmentPhase::CreatingSubject;
        });

        match self.run(name, Utc::now()).await {
            Ok(report) => {
                self.complete(&report);
                EnrollmentOutcome::Completed(report)
            }
            Err(err) => {
                self.fail(&err);
                EnrollmentOutcome::Failed(err)
            }
        }
    }

    async fn run(
        &self,
        name: &str,
        started_at: DateTime<Utc>,
    ) -> Result<EnrollmentReport, WorkflowError> {
        tracing::info!("Enrollment started for '{}' via {}", name, self.api.name());
        self.check_cancelled()?;

        let subject_id = self
            .api
            .create_subject(name)
            .await
            .map_err(|e| WorkflowError::from_api(e, CREATE_FAILED))?;
        tracing::info!("Subject '{}' created with id {}", name, subject_id);

        self.state.send_modify(|state| {
            state.subject_id = Some(subject_id.clone());
            state.captured_count = 0;
            state.phase = EnrollmentPhase::Capturing;
        });
        self.trigger.busy(CAPTURING_LABEL);
        self.progress.show(self.settings.total_images);

        let tally = self.capture_loop(&subject_id).await?;

        self.check_cancelled()?;
        self.state
            .send_modify(|state| state.phase = EnrollmentPhase::Training);
        self.trigger.busy(TRAINING_LABEL);

        self.api
            .train_model()
            .await
            .map_err(|e| WorkflowError::from_api(e, TRAIN_FAILED))?;
        tracing::info!("Model trained after enrolling subject {}", subject_id);

        Ok(EnrollmentReport {
            subject_id,
            subject_name: name.to_string(),
            captured: tally.captured,
            accepted: tally.accepted,
            rejected: tally.rejected,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Strictly sequential: the next capture starts only after the previous
    /// upload settled and the capture interval elapsed.
    async fn capture_loop(&self, subject_id: &SubjectId) -> Result<UploadTally, WorkflowError> {
        let total = self.settings.total_images;
        let mut tally = UploadTally::default();

        for iteration in 1..=total {
            self.check_cancelled()?;

            let frame = self.snapshot.capture().await?;
            let receipt = self
                .api
                .upload_face(subject_id, frame)
                .await
                .map_err(|e| WorkflowError::from_api(e, UPLOAD_FAILED))?;

            if receipt.accepted {
                tally.accepted += 1;
            } else {
                tally.rejected += 1;
                tracing::warn!(
                    "Frame {}/{} for subject {} rejected (HTTP {}): {}",
                    iteration,
                    total,
                    subject_id,
                    receipt.http_status,
                    receipt.message.as_deref().unwrap_or("no message")
                );

                if !self.settings.continue_on_upload_failure {
                    let reason = receipt
                        .message
                        .unwrap_or_else(|| UPLOAD_FAILED.to_string());
                    return Err(WorkflowError::Backend(reason));
                }
            }

            tally.captured = iteration;
            self.state
                .send_modify(|state| state.captured_count = iteration);
            self.progress.set_captured(iteration);
            tracing::debug!(
                "Captured {}/{} ({:.0}%)",
                iteration,
                total,
                self.progress.percent()
            );

            sleep(self.settings.capture_interval).await;
        }

        if tally.accepted == 0 {
            tracing::warn!("Backend accepted none of the frames for subject {}", subject_id);
        }
        Ok(tally)
    }

    fn check_cancelled(&self) -> Result<(), WorkflowError> {
        match &self.cancel {
            Some(flag) if flag.is_cancelled() => Err(WorkflowError::Cancelled),
            _ => Ok(()),
        }
    }

    fn complete(&self, report: &EnrollmentReport) {
        tracing::info!(
            "Enrollment complete for {}: {} frames, {} accepted, {} rejected",
            report.subject_id,
            report.captured,
            report.accepted,
            report.rejected
        );
        self.state
            .send_modify(|state| state.phase = EnrollmentPhase::Complete);
        self.notifier.success(COMPLETE);
        self.schedule_navigation();
    }

    fn fail(&self, err: &WorkflowError) {
        tracing::error!("Enrollment failed: {}", err);
        self.state
            .send_modify(|state| state.phase = EnrollmentPhase::Failed);
        self.notifier.error(err.to_string());
        self.trigger.restore();
    }

    fn schedule_navigation(&self) {
        let navigator = self.navigator.clone();
        let route = self.settings.home_route.clone();
        let delay = self.settings.navigate_delay;

        let handle = tokio::spawn(async move {
            sleep(delay).await;
            navigator.navigate(&route);
        });

        if let Ok(mut guard) = self.navigation.lock() {
            if let Some(existing) = guard.replace(handle) {
                existing.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::Severity;
    use crate::testing::{ready_snapshot, Call, FakeApi, Reply};
    use crate::workflow::controls::RecordingNavigator;

    struct Harness {
        workflow: EnrollmentWorkflow,
        api: Arc<FakeApi>,
        notifier: Notifier,
        navigator: Arc<RecordingNavigator>,
    }

    async fn harness(api: FakeApi, settings: EnrollmentSettings) -> Harness {
        let api = Arc::new(api);
        let notifier = Notifier::default();
        let navigator = Arc::new(RecordingNavigator::new());
        let workflow = EnrollmentWorkflow::new(
            api.clone(),
            ready_snapshot().await,
            notifier.clone(),
            navigator.clone(),
            settings,
        );
        Harness {
            workflow,
            api,
            notifier,
            navigator,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_enrollment_completes_and_navigates_home() {
        let h = harness(FakeApi::default(), EnrollmentSettings::default()).await;

        let outcome = h.workflow.submit("  Ada Lovelace ").await;

        let report = match outcome {
            EnrollmentOutcome::Completed(report) => report,
            other => panic!("expected completion, got {:?}", other),
        };
        assert_eq!(report.subject_name, "Ada Lovelace");
        assert_eq!(report.subject_id.as_str(), "7");
        assert_eq!((report.captured, report.accepted, report.rejected), (30, 30, 0));

        let calls = h.api.calls();
        assert_eq!(calls.first(), Some(&Call::CreateSubject("Ada Lovelace".to_string())));
        assert_eq!(calls.last(), Some(&Call::TrainModel));
        assert_eq!(h.api.upload_count(), 30);

        let state = h.workflow.state();
        assert_eq!(state.phase, EnrollmentPhase::Complete);
        assert_eq!(state.captured_count, 30);
        assert_eq!(h.workflow.progress().percent(), 100.0);
        assert!(!h.workflow.trigger().is_enabled());

        let note = h.notifier.current();
        assert_eq!(note.text, "Registration Complete!");
        assert_eq!(note.severity, Severity::Success);

        sleep(Duration::from_millis(999)).await;
        assert!(h.navigator.visited().is_empty());
        sleep(Duration::from_millis(2)).await;
        assert_eq!(h.navigator.visited(), vec!["/".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_name_never_calls_backend() {
        let h = harness(FakeApi::default(), EnrollmentSettings::default()).await;

        let outcome = h.workflow.submit("   ").await;

        assert!(matches!(
            outcome,
            EnrollmentOutcome::Rejected(WorkflowError::Validation(_))
        ));
        assert!(h.api.calls().is_empty());
        assert_eq!(h.workflow.state().phase, EnrollmentPhase::Idle);
        assert!(h.workflow.trigger().is_enabled());
        let note = h.notifier.current();
        assert_eq!(note.text, "Please enter a name");
        assert_eq!(note.severity, Severity::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_failure_restores_trigger() {
        let api = FakeApi {
            create: Reply::Status(500),
            ..FakeApi::default()
        };
        let h = harness(api, EnrollmentSettings::default()).await;

        let outcome = h.workflow.submit("Grace").await;

        assert!(matches!(
            outcome,
            EnrollmentOutcome::Failed(WorkflowError::Backend(_))
        ));
        let state = h.workflow.state();
        assert_eq!(state.phase, EnrollmentPhase::Failed);
        assert_eq!(state.captured_count, 0);
        assert!(state.subject_id.is_none());
        assert_eq!(h.api.upload_count(), 0);

        let trigger = h.workflow.trigger().current();
        assert!(trigger.enabled);
        assert_eq!(trigger.label, "Capture & Register");
        assert_eq!(h.notifier.current().text, "Failed to create user");
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_transport_failure_keeps_progress() {
        let api = FakeApi {
            upload_transport_after: Some(15),
            ..FakeApi::default()
        };
        let h = harness(api, EnrollmentSettings::default()).await;

        let outcome = h.workflow.submit("Grace").await;

        assert!(matches!(
            outcome,
            EnrollmentOutcome::Failed(WorkflowError::Transport(_))
        ));
        assert_eq!(h.workflow.state().captured_count, 15);
        assert_eq!(h.workflow.progress().percent(), 50.0);
        assert!(!h.api.calls().contains(&Call::TrainModel));
        assert!(h.workflow.trigger().is_enabled());
        assert_eq!(h.notifier.current().severity, Severity::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_training_failure_does_not_navigate() {
        let api = FakeApi {
            train: Reply::Status(500),
            ..FakeApi::default()
        };
        let h = harness(api, EnrollmentSettings::default()).await;

        let outcome = h.workflow.submit("Linus").await;

        assert!(matches!(outcome, EnrollmentOutcome::Failed(_)));
        let state = h.workflow.state();
        assert_eq!(state.phase, EnrollmentPhase::Failed);
        assert_eq!(state.captured_count, 30);
        assert_eq!(h.notifier.current().text, "Training failed");
        assert_eq!(h.workflow.trigger().label(), "Capture & Register");

        sleep(Duration::from_millis(2_000)).await;
        assert!(h.navigator.visited().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_uploads_continue_by_default() {
        let api = FakeApi {
            upload: Reply::Status(400),
            ..FakeApi::default()
        };
        let h = harness(api, EnrollmentSettings::default()).await;

        let outcome = h.workflow.submit("Barbara").await;

        match outcome {
            EnrollmentOutcome::Completed(report) => {
                assert_eq!(report.captured, 30);
                assert_eq!(report.accepted, 0);
                assert_eq!(report.rejected, 30);
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_upload_fails_when_strict() {
        let api = FakeApi {
            upload: Reply::Status(400),
            ..FakeApi::default()
        };
        let settings = EnrollmentSettings {
            continue_on_upload_failure: false,
            ..EnrollmentSettings::default()
        };
        let h = harness(api, settings).await;

        let outcome = h.workflow.submit("Barbara").await;

        assert!(matches!(
            outcome,
            EnrollmentOutcome::Failed(WorkflowError::Backend(_))
        ));
        assert_eq!(h.api.upload_count(), 1);
        assert_eq!(h.workflow.state().captured_count, 0);
        assert!(h.workflow.trigger().is_enabled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_body_fails_when_strict() {
        // 200 with {"status": "retry"}: transport fine, frame not stored.
        let api = FakeApi {
            upload: Reply::Status(200),
            ..FakeApi::default()
        };
        let settings = EnrollmentSettings {
            continue_on_upload_failure: false,
            ..EnrollmentSettings::default()
        };
        let h = harness(api, settings).await;

        let outcome = h.workflow.submit("Barbara").await;

        match outcome {
            EnrollmentOutcome::Failed(WorkflowError::Backend(message)) => {
                assert_eq!(message, "No face detected");
            }
            other => panic!("expected strict failure, got {:?}", other),
        }
        assert_eq!(h.api.upload_count(), 1);
        assert_eq!(h.workflow.state().phase, EnrollmentPhase::Failed);
        assert_eq!(h.workflow.state().captured_count, 0);
        assert!(!h.api.calls().contains(&Call::TrainModel));
        assert_eq!(h.notifier.current().text, "No face detected");
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_tracks_every_iteration() {
        let h = harness(FakeApi::default(), EnrollmentSettings::default()).await;
        let mut rx = h.workflow.progress().subscribe();

        let observer = async {
            let mut seen = Vec::new();
            while rx.changed().await.is_ok() {
                let state = rx.borrow_and_update().clone();
                if state.captured > 0 {
                    seen.push((state.captured, state.percent()));
                }
                if state.captured == state.total && state.total > 0 {
                    break;
                }
            }
            seen
        };

        let (outcome, seen) = tokio::join!(h.workflow.submit("Ada"), observer);

        assert!(matches!(outcome, EnrollmentOutcome::Completed(_)));
        let expected: Vec<(u32, f32)> = (1..=30)
            .map(|i| (i, i as f32 / 30.0 * 100.0))
            .collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_submission_ignored_while_running() {
        let h = harness(FakeApi::default(), EnrollmentSettings::default()).await;

        let (first, second) = tokio::join!(h.workflow.submit("Ada"), h.workflow.submit("Bob"));

        assert!(matches!(first, EnrollmentOutcome::Completed(_)));
        assert!(matches!(second, EnrollmentOutcome::Ignored));
        let creates = h
            .api
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::CreateSubject(_)))
            .count();
        assert_eq!(creates, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_failure() {
        let api = FakeApi {
            train: Reply::Transport,
            ..FakeApi::default()
        };
        let settings = EnrollmentSettings {
            total_images: 3,
            ..EnrollmentSettings::default()
        };
        let h = harness(api, settings).await;

        assert!(matches!(h.workflow.submit("Ada").await, EnrollmentOutcome::Failed(_)));
        assert!(matches!(h.workflow.submit("Ada").await, EnrollmentOutcome::Failed(_)));
        assert_eq!(h.api.upload_count(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_flag_stops_between_iterations() {
        let flag = CancelFlag::new();
        let api = Arc::new(FakeApi::default());
        let workflow = EnrollmentWorkflow::new(
            api.clone(),
            ready_snapshot().await,
            Notifier::default(),
            Arc::new(RecordingNavigator::new()),
            EnrollmentSettings::default(),
        )
        .with_cancel_flag(flag.clone());

        let (outcome, _) = tokio::join!(workflow.submit("Ada"), async {
            sleep(Duration::from_millis(350)).await;
            flag.cancel();
        });

        assert!(matches!(
            outcome,
            EnrollmentOutcome::Failed(WorkflowError::Cancelled)
        ));
        assert_eq!(workflow.state().captured_count, 4);
        assert!(!api.calls().contains(&Call::TrainModel));
        assert!(workflow.trigger().is_enabled());
    }
}

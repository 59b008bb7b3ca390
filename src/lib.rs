pub mod api;
pub mod camera;
pub mod config;
pub mod notify;
pub mod workflow;

#[cfg(test)]
mod testing;

use api::{AttendanceApi, HttpAttendanceApi};
use camera::{CameraBackend, CaptureDevice, DeviceError, FrameSnapshot, StillImageCamera};
use config::ClientConfig;
use notify::Notifier;
use std::sync::Arc;
use tokio::task::JoinHandle;
use workflow::{EnrollmentSettings, EnrollmentWorkflow, Navigator, VerificationWorkflow};

const CAMERA_ERROR: &str = "Error accessing webcam. Please allow permissions.";

/// Wires one notifier, one backend client and a camera backend into views.
pub struct Kiosk {
    config: ClientConfig,
    notifier: Notifier,
    camera: Arc<dyn CameraBackend>,
    api: Arc<dyn AttendanceApi>,
    navigator: Arc<dyn Navigator>,
}

impl Kiosk {
    pub fn new(
        config: ClientConfig,
        camera: Arc<dyn CameraBackend>,
        api: Arc<dyn AttendanceApi>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let notifier = Notifier::new(config.notification_duration());
        Self {
            config,
            notifier,
            camera,
            api,
            navigator,
        }
    }

    /// HTTP backend plus whichever camera the config selects.
    pub fn from_config(
        config: ClientConfig,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, DeviceError> {
        let camera = default_camera(&config)?;
        let api: Arc<dyn AttendanceApi> = Arc::new(HttpAttendanceApi::new(&config));
        Ok(Self::new(config, camera, api, navigator))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Loads the enrollment view; its camera is acquired in the background.
    pub fn open_enrollment(&self) -> EnrollmentView {
        let (device, camera_task, snapshot) = self.open_device();
        let workflow = EnrollmentWorkflow::new(
            self.api.clone(),
            snapshot,
            self.notifier.clone(),
            self.navigator.clone(),
            EnrollmentSettings::from(&self.config),
        );
        EnrollmentView {
            workflow,
            device,
            camera_task: Some(camera_task),
        }
    }

    pub fn open_verification(&self) -> VerificationView {
        let (device, camera_task, snapshot) = self.open_device();
        let workflow = VerificationWorkflow::new(self.api.clone(), snapshot, self.notifier.clone());
        VerificationView {
            workflow,
            device,
            camera_task: Some(camera_task),
        }
    }

    fn open_device(&self) -> (Arc<CaptureDevice>, JoinHandle<bool>, FrameSnapshot) {
        let device = Arc::new(CaptureDevice::new(self.camera.clone()));
        let camera_task = start_camera(device.clone(), self.notifier.clone());
        let snapshot = FrameSnapshot::new(
            device.clone(),
            self.config.jpeg_quality,
            self.config.device_ready_timeout(),
        );
        (device, camera_task, snapshot)
    }
}

pub struct EnrollmentView {
    workflow: EnrollmentWorkflow,
    device: Arc<CaptureDevice>,
    camera_task: Option<JoinHandle<bool>>,
}

impl EnrollmentView {
    pub fn workflow(&self) -> &EnrollmentWorkflow {
        &self.workflow
    }

    pub fn device(&self) -> &Arc<CaptureDevice> {
        &self.device
    }

    /// Waits for the background acquisition; true when the camera is streaming.
    pub async fn wait_for_camera(&mut self) -> bool {
        settle_camera(&mut self.camera_task, &self.device).await
    }
}

pub struct VerificationView {
    workflow: VerificationWorkflow,
    device: Arc<CaptureDevice>,
    camera_task: Option<JoinHandle<bool>>,
}

impl VerificationView {
    pub fn workflow(&self) -> &VerificationWorkflow {
        &self.workflow
    }

    pub fn device(&self) -> &Arc<CaptureDevice> {
        &self.device
    }

    pub async fn wait_for_camera(&mut self) -> bool {
        settle_camera(&mut self.camera_task, &self.device).await
    }
}

fn start_camera(device: Arc<CaptureDevice>, notifier: Notifier) -> JoinHandle<bool> {
    tokio::spawn(async move {
        match device.acquire().await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Error accessing webcam: {}", e);
                notifier.error(CAMERA_ERROR);
                false
            }
        }
    })
}

async fn settle_camera(task: &mut Option<JoinHandle<bool>>, device: &CaptureDevice) -> bool {
    match task.take() {
        Some(handle) => handle.await.unwrap_or(false),
        None => device.is_acquired(),
    }
}

fn default_camera(config: &ClientConfig) -> Result<Arc<dyn CameraBackend>, DeviceError> {
    if let Some(path) = &config.still_image_path {
        return Ok(Arc::new(StillImageCamera::from_path(path)));
    }

    #[cfg(feature = "camera-nokhwa")]
    let camera: Result<Arc<dyn CameraBackend>, DeviceError> =
        Ok(Arc::new(camera::WebcamCamera::new(config.camera_index)));

    #[cfg(not(feature = "camera-nokhwa"))]
    let camera: Result<Arc<dyn CameraBackend>, DeviceError> = Err(DeviceError::Unavailable(
        "no camera backend: set still_image_path or build with camera-nokhwa".to_string(),
    ));

    camera
}

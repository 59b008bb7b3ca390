//! In-memory backend and cameras shared by the unit tests.

use crate::api::{ApiError, AttendanceApi, SubjectId, UploadReceipt, VerifyResponse};
use crate::camera::{
    CameraBackend, CaptureDevice, DeviceError, FrameBuffer, FrameSnapshot, LiveStream, RawFrame,
    StillImageCamera,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Ok,
    Status(u16),
    Transport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateSubject(String),
    UploadFace { subject: String, bytes: usize },
    TrainModel,
    VerifyFace { bytes: usize },
}

pub struct FakeApi {
    pub create: Reply,
    pub upload: Reply,
    /// Uploads that go through before every later one fails in transport.
    pub upload_transport_after: Option<usize>,
    pub train: Reply,
    /// `None` answers with a transport failure.
    pub verify: Option<VerifyResponse>,
    pub verify_delay: Option<Duration>,
    pub log: Mutex<Vec<Call>>,
}

impl Default for FakeApi {
    fn default() -> Self {
        Self {
            create: Reply::Ok,
            upload: Reply::Ok,
            upload_transport_after: None,
            train: Reply::Ok,
            verify: None,
            verify_delay: None,
            log: Mutex::new(Vec::new()),
        }
    }
}

impl FakeApi {
    pub fn calls(&self) -> Vec<Call> {
        self.log.lock().unwrap().clone()
    }

    pub fn upload_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::UploadFace { .. }))
            .count()
    }

    fn record(&self, call: Call) {
        self.log.lock().unwrap().push(call);
    }
}

fn transport_error() -> ApiError {
    ApiError::Network("connection refused".to_string())
}

#[async_trait]
impl AttendanceApi for FakeApi {
    async fn create_subject(&self, name: &str) -> Result<SubjectId, ApiError> {
        self.record(Call::CreateSubject(name.to_string()));
        match self.create {
            Reply::Ok => Ok(SubjectId::new("7")),
            Reply::Status(status) => Err(ApiError::Status {
                status,
                message: "{\"error\": \"Name is required\"}".to_string(),
            }),
            Reply::Transport => Err(transport_error()),
        }
    }

    async fn upload_face(
        &self,
        subject: &SubjectId,
        frame: FrameBuffer,
    ) -> Result<UploadReceipt, ApiError> {
        let previous = self.upload_count();
        self.record(Call::UploadFace {
            subject: subject.to_string(),
            bytes: frame.len(),
        });

        if self.upload_transport_after.map_or(false, |limit| previous >= limit) {
            return Err(transport_error());
        }

        match self.upload {
            Reply::Ok => Ok(UploadReceipt {
                http_status: 200,
                accepted: true,
                message: Some("Face detected and saved".to_string()),
            }),
            Reply::Status(status) => Ok(UploadReceipt {
                http_status: status,
                accepted: false,
                message: Some("No face detected".to_string()),
            }),
            Reply::Transport => Err(transport_error()),
        }
    }

    async fn train_model(&self) -> Result<(), ApiError> {
        self.record(Call::TrainModel);
        match self.train {
            Reply::Ok => Ok(()),
            Reply::Status(status) => Err(ApiError::Status {
                status,
                message: String::new(),
            }),
            Reply::Transport => Err(transport_error()),
        }
    }

    async fn verify_face(&self, frame: FrameBuffer) -> Result<VerifyResponse, ApiError> {
        self.record(Call::VerifyFace { bytes: frame.len() });
        if let Some(delay) = self.verify_delay {
            tokio::time::sleep(delay).await;
        }
        self.verify.clone().ok_or_else(transport_error)
    }

    fn name(&self) -> &str {
        "fake backend"
    }
}

/// Refuses access like a browser permission prompt that was denied.
pub struct DeniedCamera;

#[async_trait]
impl CameraBackend for DeniedCamera {
    async fn open_stream(&self) -> Result<Box<dyn LiveStream>, DeviceError> {
        Err(DeviceError::PermissionDenied)
    }

    fn name(&self) -> &str {
        "denied camera"
    }
}

/// Opens fine but never delivers a frame.
pub struct BlankCamera;

struct BlankStream;

impl LiveStream for BlankStream {
    fn dimensions(&self) -> (u32, u32) {
        (0, 0)
    }

    fn current_frame(&self) -> Option<RawFrame> {
        None
    }
}

#[async_trait]
impl CameraBackend for BlankCamera {
    async fn open_stream(&self) -> Result<Box<dyn LiveStream>, DeviceError> {
        Ok(Box::new(BlankStream))
    }

    fn name(&self) -> &str {
        "blank camera"
    }
}

pub async fn ready_snapshot() -> FrameSnapshot {
    let backend = Arc::new(StillImageCamera::from_frame(RawFrame::solid(8, 8, [120, 100, 90])));
    let device = Arc::new(CaptureDevice::new(backend));
    device.acquire().await.unwrap();
    FrameSnapshot::new(device, 90, Duration::from_millis(500))
}

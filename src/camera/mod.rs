#[cfg_attr(not(feature = "camera-nokhwa"), allow(dead_code))]
mod read_health;
pub mod snapshot;
pub mod still;
#[cfg(feature = "camera-nokhwa")]
pub mod webcam;

pub use snapshot::{FrameBuffer, FrameSnapshot};
pub use still::StillImageCamera;
#[cfg(feature = "camera-nokhwa")]
pub use webcam::WebcamCamera;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Camera unavailable: {0}")]
    Unavailable(String),

    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("Camera is not delivering frames yet")]
    NotReady,

    #[error("Frame encoding failed: {0}")]
    Encode(String),
}

impl DeviceError {
    /// Sorts a driver's open failure; drivers report refused access only as text.
    pub fn from_open_failure(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let lower = reason.to_ascii_lowercase();
        let refused = ["permission", "denied", "not authorized", "unauthorized"]
            .iter()
            .any(|marker| lower.contains(marker));
        if refused {
            DeviceError::PermissionDenied
        } else {
            DeviceError::Unavailable(reason)
        }
    }
}

/// Decoded RGB pixels straight from the device, row-major.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub rgb: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl RawFrame {
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = (width as usize) * (height as usize);
        let mut data = Vec::with_capacity(pixels * 3);
        for _ in 0..pixels {
            data.extend_from_slice(&rgb);
        }
        Self {
            rgb: data,
            width,
            height,
        }
    }
}

/// A running video feed.
pub trait LiveStream: Send + Sync {
    /// `(0, 0)` until the device delivers its first frame.
    fn dimensions(&self) -> (u32, u32);

    fn current_frame(&self) -> Option<RawFrame>;
}

#[async_trait]
pub trait CameraBackend: Send + Sync {
    /// Ask the host for camera access and start streaming.
    async fn open_stream(&self) -> Result<Box<dyn LiveStream>, DeviceError>;

    fn name(&self) -> &str;
}

pub struct CaptureSession {
    pub id: String,
    pub opened_at: DateTime<Utc>,
    stream: Box<dyn LiveStream>,
}

impl CaptureSession {
    fn new(stream: Box<dyn LiveStream>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            opened_at: Utc::now(),
            stream,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.stream.dimensions()
    }

    pub fn is_ready(&self) -> bool {
        let (width, height) = self.dimensions();
        width > 0 && height > 0
    }

    pub fn current_frame(&self) -> Option<RawFrame> {
        self.stream.current_frame()
    }
}

/// One camera per view. Frames are read through [`FrameSnapshot`].
pub struct CaptureDevice {
    backend: Arc<dyn CameraBackend>,
    session: Mutex<Option<Arc<CaptureSession>>>,
}

impl CaptureDevice {
    pub fn new(backend: Arc<dyn CameraBackend>) -> Self {
        Self {
            backend,
            session: Mutex::new(None),
        }
    }

    /// Requests the device again on every call; the newest session wins.
    pub async fn acquire(&self) -> Result<(), DeviceError> {
        info!("Requesting camera access from {}", self.backend.name());

        let stream = self.backend.open_stream().await.map_err(|e| {
            warn!("Camera {} unavailable: {}", self.backend.name(), e);
            e
        })?;

        let session = Arc::new(CaptureSession::new(stream));
        let (width, height) = session.dimensions();
        info!(
            "Camera session {} bound ({}x{})",
            session.id, width, height
        );

        if let Ok(mut guard) = self.session.lock() {
            *guard = Some(session);
        }
        Ok(())
    }

    pub fn session(&self) -> Option<Arc<CaptureSession>> {
        self.session.lock().ok().and_then(|guard| guard.clone())
    }

    pub fn is_acquired(&self) -> bool {
        self.session().is_some()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.session()
            .map(|session| session.dimensions())
            .unwrap_or((0, 0))
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }
}

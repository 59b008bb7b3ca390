use super::{CaptureDevice, CaptureSession, DeviceError, RawFrame};
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

const READY_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// One encoded JPEG still.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    bytes: Vec<u8>,
    width: u32,
    height: u32,
    captured_at: DateTime<Utc>,
}

impl FrameBuffer {
    pub const MIME: &'static str = "image/jpeg";
    pub const FILE_NAME: &'static str = "frame.jpg";

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}

pub struct FrameSnapshot {
    device: Arc<CaptureDevice>,
    quality: u8,
    ready_timeout: Duration,
}

impl FrameSnapshot {
    pub fn new(device: Arc<CaptureDevice>, quality: u8, ready_timeout: Duration) -> Self {
        Self {
            device,
            quality: quality.clamp(1, 100),
            ready_timeout,
        }
    }

    pub fn device(&self) -> &Arc<CaptureDevice> {
        &self.device
    }

    /// Waits up to the ready timeout for the device to report non-zero dimensions.
    pub async fn capture(&self) -> Result<FrameBuffer, DeviceError> {
        let session = self.wait_until_ready().await?;
        let (width, height) = session.dimensions();
        let frame = session.current_frame().ok_or(DeviceError::NotReady)?;

        let bytes = encode_jpeg(&frame, width, height, self.quality)?;
        tracing::debug!(
            "Captured {}x{} frame ({} bytes) from session {}",
            width,
            height,
            bytes.len(),
            session.id
        );

        Ok(FrameBuffer {
            bytes,
            width,
            height,
            captured_at: Utc::now(),
        })
    }

    async fn wait_until_ready(&self) -> Result<Arc<CaptureSession>, DeviceError> {
        let deadline = Instant::now() + self.ready_timeout;
        loop {
            if let Some(session) = self.device.session().filter(|s| s.is_ready()) {
                return Ok(session);
            }
            if Instant::now() >= deadline {
                tracing::warn!(
                    "Camera {} produced no frames within {}ms",
                    self.device.backend_name(),
                    self.ready_timeout.as_millis()
                );
                return Err(DeviceError::NotReady);
            }
            sleep(READY_POLL_INTERVAL).await;
        }
    }
}

fn encode_jpeg(frame: &RawFrame, width: u32, height: u32, quality: u8) -> Result<Vec<u8>, DeviceError> {
    let img = RgbImage::from_raw(frame.width, frame.height, frame.rgb.clone()).ok_or_else(|| {
        DeviceError::Encode("frame data does not match its dimensions".to_string())
    })?;

    // The raster always matches what the device reports.
    let img = if (frame.width, frame.height) == (width, height) {
        img
    } else {
        imageops::resize(&img, width, height, FilterType::Triangle)
    };

    let mut out = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
        encoder
            .encode_image(&img)
            .map_err(|e| DeviceError::Encode(e.to_string()))?;
    }
    Ok(out)
}

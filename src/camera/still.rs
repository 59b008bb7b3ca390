use super::{CameraBackend, DeviceError, LiveStream, RawFrame};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

enum Source {
    File(PathBuf),
    Frame(RawFrame),
}

/// Serves one fixed picture as the live feed. Used by headless kiosks and tests.
pub struct StillImageCamera {
    source: Source,
    name: String,
}

impl StillImageCamera {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = format!("still image {}", path.display());
        Self {
            source: Source::File(path),
            name,
        }
    }

    pub fn from_frame(frame: RawFrame) -> Self {
        Self {
            source: Source::Frame(frame),
            name: "still frame".to_string(),
        }
    }

    async fn load(&self) -> Result<RawFrame, DeviceError> {
        match &self.source {
            Source::Frame(frame) => Ok(frame.clone()),
            Source::File(path) => {
                let path = path.clone();
                tokio::task::spawn_blocking(move || -> Result<RawFrame, DeviceError> {
                    let img = image::open(&path)
                        .map_err(|e| open_error(&path, e))?
                        .to_rgb8();
                    let (width, height) = img.dimensions();
                    Ok(RawFrame {
                        rgb: img.into_raw(),
                        width,
                        height,
                    })
                })
                .await
                .map_err(|e| DeviceError::Unavailable(e.to_string()))?
            }
        }
    }
}

fn open_error(path: &Path, err: image::ImageError) -> DeviceError {
    match err {
        image::ImageError::IoError(io) if io.kind() == std::io::ErrorKind::PermissionDenied => {
            DeviceError::PermissionDenied
        }
        other => DeviceError::Unavailable(format!("{}: {}", path.display(), other)),
    }
}

#[async_trait]
impl CameraBackend for StillImageCamera {
    async fn open_stream(&self) -> Result<Box<dyn LiveStream>, DeviceError> {
        let frame = self.load().await?;
        Ok(Box::new(StillStream { frame }))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

struct StillStream {
    frame: RawFrame,
}

impl LiveStream for StillStream {
    fn dimensions(&self) -> (u32, u32) {
        (self.frame.width, self.frame.height)
    }

    fn current_frame(&self) -> Option<RawFrame> {
        Some(self.frame.clone())
    }
}

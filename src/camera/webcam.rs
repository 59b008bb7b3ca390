use super::read_health::{ReadHealth, STALL_AFTER};
use super::{CameraBackend, DeviceError, LiveStream, RawFrame};
use async_trait::async_trait;
use nokhwa::{
    pixel_format::RgbFormat,
    utils::{CameraIndex, RequestedFormat, RequestedFormatType},
    Camera,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::thread;
use tokio::sync::oneshot;

/// Native webcam through `nokhwa`. The device is driven from a dedicated thread.
pub struct WebcamCamera {
    index: u32,
    name: String,
}

impl WebcamCamera {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            name: format!("webcam {}", index),
        }
    }
}

fn build_camera(index: u32) -> Result<Camera, nokhwa::NokhwaError> {
    let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::None);
    let mut camera = Camera::new(CameraIndex::Index(index), requested)?;
    camera.open_stream()?;
    Ok(camera)
}

#[async_trait]
impl CameraBackend for WebcamCamera {
    async fn open_stream(&self) -> Result<Box<dyn LiveStream>, DeviceError> {
        let latest: Arc<Mutex<Option<RawFrame>>> = Arc::new(Mutex::new(None));
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), String>>();

        let index = self.index;
        let latest_frame = latest.clone();
        let stop_flag = stop.clone();
        let handle = thread::spawn(move || {
            let mut camera = match build_camera(index) {
                Ok(camera) => {
                    let _ = ready_tx.send(Ok(()));
                    camera
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err.to_string()));
                    return;
                }
            };

            let mut health = ReadHealth::new();
            while !stop_flag.load(Ordering::Relaxed) {
                let read = camera
                    .frame()
                    .and_then(|frame| frame.decode_image::<RgbFormat>())
                    .map_err(|err| err.to_string())
                    .and_then(|img| {
                        let (width, height) = img.dimensions();
                        let rgb = img.into_raw();
                        if rgb.is_empty() {
                            Err("empty frame".to_string())
                        } else {
                            Ok(RawFrame { rgb, width, height })
                        }
                    });

                match read {
                    Ok(frame) => {
                        if health.record_success() {
                            tracing::info!("Webcam {} delivering frames again", index);
                        }
                        if let Ok(mut guard) = latest_frame.lock() {
                            *guard = Some(frame);
                        }
                    }
                    Err(reason) => {
                        let step = health.record_failure();
                        if step.log {
                            tracing::warn!("Webcam {} frame read failed: {}", index, reason);
                        }
                        if step.just_stalled {
                            tracing::error!(
                                "Webcam {} stalled after {} failed reads, withdrawing last frame",
                                index,
                                STALL_AFTER
                            );
                            if let Ok(mut guard) = latest_frame.lock() {
                                *guard = None;
                            }
                        }
                        thread::sleep(step.backoff);
                    }
                }
            }

            let _ = camera.stop_stream();
        });

        match ready_rx.await {
            Ok(Ok(())) => Ok(Box::new(WebcamStream {
                latest,
                stop,
                handle: Mutex::new(Some(handle)),
            })),
            Ok(Err(reason)) => {
                let _ = handle.join();
                Err(DeviceError::from_open_failure(reason))
            }
            Err(_) => Err(DeviceError::Unavailable(
                "webcam thread exited before opening".to_string(),
            )),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

struct WebcamStream {
    latest: Arc<Mutex<Option<RawFrame>>>,
    stop: Arc<AtomicBool>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl LiveStream for WebcamStream {
    fn dimensions(&self) -> (u32, u32) {
        self.latest
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|f| (f.width, f.height)))
            .unwrap_or((0, 0))
    }

    fn current_frame(&self) -> Option<RawFrame> {
        self.latest.lock().ok().and_then(|guard| guard.clone())
    }
}

impl Drop for WebcamStream {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Ok(mut guard) = self.handle.lock() {
            if let Some(handle) = guard.take() {
                let _ = handle.join();
            }
        }
    }
}

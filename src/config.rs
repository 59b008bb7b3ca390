use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_FILE: &str = "face-attendance.json";

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_TOTAL_IMAGES: u32 = 30;
pub const DEFAULT_CAPTURE_INTERVAL_MS: u64 = 100;
pub const DEFAULT_NOTIFICATION_MS: u64 = 3_000;
pub const DEFAULT_NAVIGATE_DELAY_MS: u64 = 1_000;
pub const DEFAULT_JPEG_QUALITY: u8 = 90;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_DEVICE_READY_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_HOME_ROUTE: &str = "/";

const ENV_BASE_URL: &str = "FACE_ATTENDANCE_BASE_URL";
const ENV_TOTAL_IMAGES: &str = "FACE_ATTENDANCE_TOTAL_IMAGES";
const ENV_CONTINUE_ON_UPLOAD_FAILURE: &str = "FACE_ATTENDANCE_CONTINUE_ON_UPLOAD_FAILURE";
const ENV_CAMERA_INDEX: &str = "FACE_ATTENDANCE_CAMERA_INDEX";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to save config {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub create_subject: String,
    pub upload_face: String,
    pub train_model: String,
    pub verify_face: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            create_subject: "/api/create_user".to_string(),
            upload_face: "/api/upload_face".to_string(),
            train_model: "/api/train".to_string(),
            verify_face: "/api/mark_attendance".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub endpoints: Endpoints,
    pub total_images: u32,
    pub capture_interval_ms: u64,
    pub notification_ms: u64,
    pub navigate_delay_ms: u64,
    pub jpeg_quality: u8,
    pub request_timeout_secs: u64,
    pub device_ready_timeout_ms: u64,
    /// Keep enrolling when the backend rejects an uploaded frame.
    pub continue_on_upload_failure: bool,
    pub home_route: String,
    pub camera_index: u32,
    /// Serve this image as the live feed instead of a webcam.
    pub still_image_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            endpoints: Endpoints::default(),
            total_images: DEFAULT_TOTAL_IMAGES,
            capture_interval_ms: DEFAULT_CAPTURE_INTERVAL_MS,
            notification_ms: DEFAULT_NOTIFICATION_MS,
            navigate_delay_ms: DEFAULT_NAVIGATE_DELAY_MS,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            device_ready_timeout_ms: DEFAULT_DEVICE_READY_TIMEOUT_MS,
            continue_on_upload_failure: true,
            home_route: DEFAULT_HOME_ROUTE.to_string(),
            camera_index: 0,
            still_image_path: None,
        }
    }
}

impl ClientConfig {
    /// The config file at `path` (created with defaults when missing), overlaid
    /// with `FACE_ATTENDANCE_*` variables. A `.env` file is honoured.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// `load` with an explicit variable lookup. Overrides are never written back.
    pub fn load_with<F>(path: &Path, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = load_or_create(path)?;
        Ok(with_overrides(config, lookup))
    }

    /// Defaults overlaid with `FACE_ATTENDANCE_*` variables, no file involved.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        with_overrides(Self::default(), lookup)
    }

    pub fn capture_interval(&self) -> Duration {
        Duration::from_millis(self.capture_interval_ms)
    }

    pub fn notification_duration(&self) -> Duration {
        Duration::from_millis(self.notification_ms)
    }

    pub fn navigate_delay(&self) -> Duration {
        Duration::from_millis(self.navigate_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn device_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.device_ready_timeout_ms)
    }
}

pub fn load_or_create(path: &Path) -> Result<ClientConfig, ConfigError> {
    if !path.exists() {
        let config = ClientConfig::default();
        save(path, &config)?;
        return Ok(config);
    }

    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    match serde_json::from_str::<ClientConfig>(&raw) {
        Ok(mut config) => {
            normalize_config(&mut config);
            Ok(config)
        }
        Err(e) => {
            tracing::warn!("Config {} unreadable ({}), restoring defaults", path.display(), e);
            let backup = path.with_extension("json.bak");
            let _ = fs::copy(path, backup);
            let config = ClientConfig::default();
            save(path, &config)?;
            Ok(config)
        }
    }
}

pub fn save(path: &Path, config: &ClientConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|source| ConfigError::Write {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let json = serde_json::to_string_pretty(config)?;
    fs::write(path, json).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

pub fn apply_env_overrides<F>(config: &mut ClientConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(base_url) = lookup(ENV_BASE_URL) {
        config.base_url = base_url.trim().to_string();
    }

    if let Some(total) = lookup(ENV_TOTAL_IMAGES).and_then(|v| v.trim().parse::<u32>().ok()) {
        config.total_images = total;
    }

    if let Some(flag) = lookup(ENV_CONTINUE_ON_UPLOAD_FAILURE) {
        match flag.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => config.continue_on_upload_failure = true,
            "0" | "false" | "no" => config.continue_on_upload_failure = false,
            other => tracing::warn!("Ignoring {}={}", ENV_CONTINUE_ON_UPLOAD_FAILURE, other),
        }
    }

    if let Some(index) = lookup(ENV_CAMERA_INDEX).and_then(|v| v.trim().parse::<u32>().ok()) {
        config.camera_index = index;
    }
}

fn with_overrides<F>(mut config: ClientConfig, lookup: F) -> ClientConfig
where
    F: Fn(&str) -> Option<String>,
{
    apply_env_overrides(&mut config, lookup);
    normalize_config(&mut config);
    config
}

fn normalize_config(config: &mut ClientConfig) {
    let base_url = config.base_url.trim().trim_end_matches('/');
    config.base_url = if base_url.is_empty() {
        DEFAULT_BASE_URL.to_string()
    } else {
        base_url.to_string()
    };

    if config.total_images == 0 {
        config.total_images = DEFAULT_TOTAL_IMAGES;
    }
    if config.notification_ms == 0 {
        config.notification_ms = DEFAULT_NOTIFICATION_MS;
    }
    if config.request_timeout_secs == 0 {
        config.request_timeout_secs = DEFAULT_REQUEST_TIMEOUT_SECS;
    }
    config.jpeg_quality = config.jpeg_quality.clamp(1, 100);

    if config.home_route.trim().is_empty() {
        config.home_route = DEFAULT_HOME_ROUTE.to_string();
    }
    config.still_image_path = config
        .still_image_path
        .take()
        .filter(|path| !path.as_os_str().is_empty());
}

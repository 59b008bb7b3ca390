// src/api/mod.rs
// Attendance backend client

mod http;
mod types;

pub use http::HttpAttendanceApi;
pub use types::{ApiError, SubjectId, UploadReceipt, VerifyResponse};

use crate::camera::FrameBuffer;
use async_trait::async_trait;

/// The four backend operations the workflows consume.
#[async_trait]
pub trait AttendanceApi: Send + Sync {
    /// Register a subject by name; non-2xx answers are errors.
    async fn create_subject(&self, name: &str) -> Result<SubjectId, ApiError>;

    /// Upload one reference frame. Any HTTP answer is a receipt; only transport failures are errors.
    async fn upload_face(
        &self,
        subject: &SubjectId,
        frame: FrameBuffer,
    ) -> Result<UploadReceipt, ApiError>;

    /// Retrain the recognition model on everything uploaded so far.
    async fn train_model(&self) -> Result<(), ApiError>;

    /// Ask the backend who is in the frame.
    async fn verify_face(&self, frame: FrameBuffer) -> Result<VerifyResponse, ApiError>;

    fn name(&self) -> &str;
}

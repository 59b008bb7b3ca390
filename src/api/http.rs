// src/api/http.rs
// reqwest implementation of the attendance backend

use super::types::{CreateSubjectResponse, UploadBody};
use super::{ApiError, AttendanceApi, SubjectId, UploadReceipt, VerifyResponse};
use crate::camera::FrameBuffer;
use crate::config::{ClientConfig, Endpoints};
use async_trait::async_trait;
use reqwest::multipart;
use serde_json::json;

pub struct HttpAttendanceApi {
    client: reqwest::Client,
    base_url: String,
    endpoints: Endpoints,
}

impl HttpAttendanceApi {
    pub fn new(config: &ClientConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });

        tracing::info!("Attendance backend client initialized for {}", config.base_url);

        Self {
            client,
            base_url: config.base_url.clone(),
            endpoints: config.endpoints.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }
}

#[async_trait]
impl AttendanceApi for HttpAttendanceApi {
    async fn create_subject(&self, name: &str) -> Result<SubjectId, ApiError> {
        let response = self
            .client
            .post(self.url(&self.endpoints.create_subject))
            .json(&json!({ "name": name }))
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_send_error)?;
        parse_create_subject(status, &body)
    }

    async fn upload_face(
        &self,
        subject: &SubjectId,
        frame: FrameBuffer,
    ) -> Result<UploadReceipt, ApiError> {
        let form = multipart::Form::new()
            .text("user_id", subject.to_string())
            .part("image", image_part(frame)?);

        let response = self
            .client
            .post(self.url(&self.endpoints.upload_face))
            .multipart(form)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(upload_receipt(status, &body))
    }

    async fn train_model(&self) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url(&self.endpoints.train_model))
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let error_text = response.text().await.unwrap_or_default();
            Err(ApiError::Status {
                status: status.as_u16(),
                message: error_text,
            })
        }
    }

    async fn verify_face(&self, frame: FrameBuffer) -> Result<VerifyResponse, ApiError> {
        let form = multipart::Form::new().part("image", image_part(frame)?);

        let response = self
            .client
            .post(self.url(&self.endpoints.verify_face))
            .multipart(form)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_send_error)?;
        parse_verify_response(status, &body)
    }

    fn name(&self) -> &str {
        "HTTP attendance backend"
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn map_send_error(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Network(e.to_string())
    }
}

fn image_part(frame: FrameBuffer) -> Result<multipart::Part, ApiError> {
    multipart::Part::bytes(frame.into_bytes())
        .file_name(FrameBuffer::FILE_NAME)
        .mime_str(FrameBuffer::MIME)
        .map_err(|e| ApiError::Request(e.to_string()))
}

fn parse_create_subject(status: u16, body: &str) -> Result<SubjectId, ApiError> {
    if !(200..300).contains(&status) {
        return Err(ApiError::Status {
            status,
            message: body.trim().to_string(),
        });
    }

    serde_json::from_str::<CreateSubjectResponse>(body)
        .map(|parsed| parsed.user_id)
        .map_err(|e| ApiError::InvalidResponse(e.to_string()))
}

fn upload_receipt(status: u16, body: &str) -> UploadReceipt {
    let parsed: UploadBody = serde_json::from_str(body).unwrap_or_default();
    let success = (200..300).contains(&status);
    let accepted = success && parsed.status.as_deref().map_or(true, |s| s == "success");

    UploadReceipt {
        http_status: status,
        accepted,
        message: parsed.message.or(parsed.error),
    }
}

fn parse_verify_response(status: u16, body: &str) -> Result<VerifyResponse, ApiError> {
    match serde_json::from_str::<VerifyResponse>(body) {
        Ok(parsed) => Ok(parsed),
        Err(_) if !(200..300).contains(&status) => Err(ApiError::Status {
            status,
            message: body.trim().to_string(),
        }),
        Err(e) => Err(ApiError::InvalidResponse(e.to_string())),
    }
}

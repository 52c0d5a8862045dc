// src/backend/http.rs
// HTTP adapter for the repair session API

use super::{AnalyzeResponse, BackendError, CurrentStepResponse, RepairBackend};
use crate::capture::JpegFrame;
use async_trait::async_trait;
use reqwest::{multipart, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

const CURRENT_STEP_PATH: &str = "/session/current-step";
const ANALYZE_PATH: &str = "/session/analyze";
const FRAME_FIELD: &str = "file";
const FRAME_FILE_NAME: &str = "frame.jpg";

pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::NetworkFailure(e.to_string()))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        tracing::info!("HTTP backend initialized: {}", base_url);

        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, BackendError> {
        let status = resp.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(BackendError::RateLimited);
        }
        if !status.is_success() {
            return Err(BackendError::ServerError {
                status: status.as_u16(),
            });
        }

        let body = resp.bytes().await.map_err(classify_transport)?;
        serde_json::from_slice(&body).map_err(|e| BackendError::MalformedResponse(e.to_string()))
    }
}

fn classify_transport(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::NetworkFailure("request timed out".to_string())
    } else {
        BackendError::NetworkFailure(e.to_string())
    }
}

#[async_trait]
impl RepairBackend for HttpBackend {
    async fn current_step(&self, user_id: &str) -> Result<CurrentStepResponse, BackendError> {
        tracing::debug!("Fetching current step for user {}", user_id);

        let resp = self
            .client
            .get(self.url(CURRENT_STEP_PATH))
            .query(&[("user_id", user_id)])
            .send()
            .await
            .map_err(classify_transport)?;

        Self::decode(resp).await
    }

    async fn analyze(
        &self,
        user_id: &str,
        frame: JpegFrame,
    ) -> Result<AnalyzeResponse, BackendError> {
        tracing::info!(
            "Submitting frame {}x{} ({} bytes) for analysis",
            frame.width,
            frame.height,
            frame.bytes.len()
        );

        let file_part = multipart::Part::bytes(frame.bytes)
            .file_name(FRAME_FILE_NAME)
            .mime_str("image/jpeg")
            .map_err(|e| BackendError::NetworkFailure(e.to_string()))?;

        let form = multipart::Form::new().part(FRAME_FIELD, file_part);

        let resp = self
            .client
            .post(self.url(ANALYZE_PATH))
            .query(&[("user_id", user_id)])
            .multipart(form)
            .send()
            .await
            .map_err(classify_transport)?;

        Self::decode(resp).await
    }

    fn name(&self) -> &str {
        "http"
    }
}

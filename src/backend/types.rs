// src/backend/types.rs
// Wire types for the verification backend and error classification

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One backend-authored repair instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairStep {
    pub id: i64,
    pub instruction: String,
    pub target_object: String,
    pub action: String,
    #[serde(default)]
    pub image_reference: Option<String>,
}

/// Body of `GET /session/current-step`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CurrentStepResponse {
    pub completed: bool,
    #[serde(default)]
    pub step: Option<RepairStep>,
    #[serde(default)]
    pub total_steps: Option<u32>,
    #[serde(default)]
    pub current_index: Option<u32>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Body of `POST /session/analyze`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalyzeResponse {
    /// Absent when the server has no step to verify against.
    #[serde(default)]
    pub step_complete: bool,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub detected: Vec<String>,
    #[serde(default)]
    pub scene_summary: Option<String>,
    /// Informational only; the session is refetched instead of trusting this.
    #[serde(default)]
    pub next_step: Option<RepairStep>,
    #[serde(default)]
    pub completed: Option<bool>,
    #[serde(default)]
    pub provider: Option<String>,
}

impl AnalyzeResponse {
    /// Whether local progress is stale and must be refetched.
    pub fn ends_step(&self) -> bool {
        self.step_complete || self.completed == Some(true)
    }
}

/// Backend error types with user-facing classification
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Network error: {0}")]
    NetworkFailure(String),

    #[error("Server error: HTTP {status}")]
    ServerError { status: u16 },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl BackendError {
    /// Text shown in the feedback panel after a failed analyze call
    pub fn analyze_message(&self) -> String {
        match self {
            BackendError::RateLimited => "Rate limit reached. Wait and retry.".to_string(),
            other => format!("Analysis failed ({}).", other.short_reason()),
        }
    }

    /// Text shown in the feedback panel after a failed progress fetch
    pub fn fetch_message(&self) -> String {
        format!("Could not reach backend ({}).", self.short_reason())
    }

    fn short_reason(&self) -> String {
        match self {
            BackendError::RateLimited => "rate limited".to_string(),
            BackendError::NetworkFailure(reason) => reason.clone(),
            BackendError::ServerError { status } => format!("HTTP {}", status),
            BackendError::MalformedResponse(reason) => format!("malformed response: {}", reason),
        }
    }
}

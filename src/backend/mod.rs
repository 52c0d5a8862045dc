// src/backend/mod.rs
// Verification backend boundary

mod http;
mod types;

pub use http::HttpBackend;
pub use types::{AnalyzeResponse, BackendError, CurrentStepResponse, RepairStep};

use crate::capture::JpegFrame;
use async_trait::async_trait;

/// Session-aware verification backend
#[async_trait]
pub trait RepairBackend: Send + Sync {
    /// Query session progress for the user
    async fn current_step(&self, user_id: &str) -> Result<CurrentStepResponse, BackendError>;

    /// Submit one captured frame for verification against the current step
    async fn analyze(&self, user_id: &str, frame: JpegFrame)
        -> Result<AnalyzeResponse, BackendError>;

    /// Backend name for logs
    fn name(&self) -> &str;
}

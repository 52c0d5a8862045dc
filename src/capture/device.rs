use super::MediaStream;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("Camera unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Camera stream not ready")]
    NotReady,

    #[error("Frame encoding failed: {0}")]
    Encoding(String),
}

impl CaptureError {
    pub fn user_message(&self) -> String {
        match self {
            CaptureError::PermissionDenied => {
                "Camera access failed (permission denied).".to_string()
            }
            CaptureError::DeviceUnavailable(reason) => {
                format!("Camera access failed ({}).", reason)
            }
            CaptureError::NotReady | CaptureError::Encoding(_) => {
                "Could not capture frame. Try again.".to_string()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    User,
    #[default]
    Environment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamConstraints {
    pub facing_mode: FacingMode,
    pub audio: bool,
}

/// A source of camera streams
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Request device access and open a live stream
    async fn open(&self, constraints: &StreamConstraints) -> Result<MediaStream, CaptureError>;

    /// Detach a stream from the display surface after its tracks were stopped
    fn close(&self, _stream: &MediaStream) {}

    /// Device name for logs
    fn name(&self) -> &str;
}

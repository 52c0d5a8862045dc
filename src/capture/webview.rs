use super::{CaptureDevice, CaptureError, MediaStream, MediaTrack, StreamConstraints, TrackKind};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;
use uuid::Uuid;

type RequestHook = Box<dyn Fn(&StreamConstraints) + Send + Sync>;
type ReleaseHook = Box<dyn Fn(Uuid) + Send + Sync>;

/// Reply from the webview after it asked the OS for camera access
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum CameraAccessOutcome {
    Granted {
        #[serde(default)]
        label: Option<String>,
    },
    Denied,
    #[serde(rename_all = "camelCase")]
    Unavailable {
        #[serde(default)]
        reason: Option<String>,
    },
}

/// Camera owned by the webview's media API. `open` asks the page to call
/// getUserMedia and waits for it to report back through [`WebviewCamera::resolve`];
/// frames are then pushed in through the stream's sink.
pub struct WebviewCamera {
    on_request: RequestHook,
    on_release: ReleaseHook,
    pending: Mutex<Option<oneshot::Sender<CameraAccessOutcome>>>,
    timeout: Duration,
}

impl WebviewCamera {
    pub fn new(
        timeout: Duration,
        on_request: impl Fn(&StreamConstraints) + Send + Sync + 'static,
        on_release: impl Fn(Uuid) + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_request: Box::new(on_request),
            on_release: Box::new(on_release),
            pending: Mutex::new(None),
            timeout,
        }
    }

    /// Delivers the webview's answer. Returns false when no request is waiting.
    pub fn resolve(&self, outcome: CameraAccessOutcome) -> bool {
        let sender = match self.pending.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        match sender {
            Some(tx) => tx.send(outcome).is_ok(),
            None => {
                tracing::debug!("Camera access reply with no pending request: {:?}", outcome);
                false
            }
        }
    }

    fn clear_pending(&self) {
        if let Ok(mut guard) = self.pending.lock() {
            guard.take();
        }
    }
}

#[async_trait]
impl CaptureDevice for WebviewCamera {
    async fn open(&self, constraints: &StreamConstraints) -> Result<MediaStream, CaptureError> {
        let (tx, rx) = oneshot::channel();
        if let Ok(mut guard) = self.pending.lock() {
            if guard.replace(tx).is_some() {
                tracing::warn!("Superseding an unanswered camera access request");
            }
        }

        (self.on_request)(constraints);

        let outcome = match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => {
                return Err(CaptureError::DeviceUnavailable(
                    "access request abandoned".to_string(),
                ))
            }
            Err(_) => {
                self.clear_pending();
                return Err(CaptureError::DeviceUnavailable(
                    "timed out waiting for camera".to_string(),
                ));
            }
        };

        match outcome {
            CameraAccessOutcome::Granted { label } => {
                let mut tracks = vec![MediaTrack::new(
                    TrackKind::Video,
                    label.unwrap_or_else(|| "webview camera".to_string()),
                )];
                if constraints.audio {
                    tracks.push(MediaTrack::new(TrackKind::Audio, "webview microphone"));
                }
                Ok(MediaStream::new(tracks))
            }
            CameraAccessOutcome::Denied => Err(CaptureError::PermissionDenied),
            CameraAccessOutcome::Unavailable { reason } => Err(CaptureError::DeviceUnavailable(
                reason.unwrap_or_else(|| "no matching camera".to_string()),
            )),
        }
    }

    fn close(&self, stream: &MediaStream) {
        (self.on_release)(stream.id());
    }

    fn name(&self) -> &str {
        "webview"
    }
}

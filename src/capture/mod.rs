pub mod device;
pub mod frame;
pub mod stream;
pub mod webview;

pub use device::{CaptureDevice, CaptureError, FacingMode, StreamConstraints};
pub use frame::{encode_jpeg, JpegFrame, JPEG_QUALITY};
pub use stream::{FrameSink, MediaStream, MediaTrack, RawFrame, TrackKind};
pub use webview::{CameraAccessOutcome, WebviewCamera};

use serde::Serialize;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::Mutex as TokioMutex;
use tracing::{info, warn};
use uuid::Uuid;

/// Opaque identity of the active capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CaptureHandle(Uuid);

/// Single owner of the camera stream. The stream itself never leaves this type;
/// callers get a [`CaptureHandle`] for identity and a [`FrameSink`] for feeding frames.
pub struct CaptureResource {
    device: Arc<dyn CaptureDevice>,
    constraints: StreamConstraints,
    session: TokioMutex<Option<MediaStream>>,
    ready: AtomicBool,
    closed: AtomicBool,
}

impl CaptureResource {
    pub fn new(device: Arc<dyn CaptureDevice>) -> Self {
        Self::with_constraints(device, StreamConstraints::default())
    }

    pub fn with_constraints(device: Arc<dyn CaptureDevice>, constraints: StreamConstraints) -> Self {
        Self {
            device,
            constraints,
            session: TokioMutex::new(None),
            ready: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Opens the device, or returns the handle of the session that is already active.
    pub async fn acquire(&self) -> Result<CaptureHandle, CaptureError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CaptureError::DeviceUnavailable("capture closed".to_string()));
        }

        let _check = CloseCheck(self);
        let mut session = self.session.lock().await;
        if let Some(stream) = session.as_ref() {
            if stream.is_active() {
                return Ok(CaptureHandle(stream.id()));
            }
            warn!("Camera stream {} ended externally, reopening", stream.id());
            self.stop_stream(stream);
            session.take();
        }

        let stream = self.device.open(&self.constraints).await.map_err(|e| {
            warn!("Camera acquisition on '{}' failed: {}", self.device.name(), e);
            e
        })?;

        // Teardown may have run while the device prompt was open.
        if self.closed.load(Ordering::SeqCst) {
            self.stop_stream(&stream);
            return Err(CaptureError::DeviceUnavailable("capture closed".to_string()));
        }

        let handle = CaptureHandle(stream.id());
        info!(
            "Camera stream {} acquired on '{}' ({} tracks)",
            stream.id(),
            self.device.name(),
            stream.tracks().len()
        );
        *session = Some(stream);
        self.ready.store(true, Ordering::Release);
        Ok(handle)
    }

    /// Snapshot of the current frame as a JPEG still.
    pub async fn capture_frame(&self) -> Result<JpegFrame, CaptureError> {
        let raw = {
            let _check = CloseCheck(self);
            let session = self.session.lock().await;
            let stream = session
                .as_ref()
                .filter(|s| s.is_active())
                .ok_or(CaptureError::NotReady)?;
            let (width, height) = stream.dimensions();
            if width == 0 || height == 0 {
                return Err(CaptureError::NotReady);
            }
            stream.latest_frame().ok_or(CaptureError::NotReady)?
        };

        tokio::task::spawn_blocking(move || encode_jpeg(&raw))
            .await
            .map_err(|e| CaptureError::Encoding(e.to_string()))?
    }

    pub async fn frame_sink(&self) -> Option<FrameSink> {
        let _check = CloseCheck(self);
        let session = self.session.lock().await;
        session.as_ref().map(MediaStream::frame_sink)
    }

    /// Stops every track of the active stream. No-op without a session.
    pub async fn release(&self) {
        let _check = CloseCheck(self);
        let mut session = self.session.lock().await;
        if let Some(stream) = session.take() {
            self.stop_stream(&stream);
        }
        self.ready.store(false, Ordering::Release);
    }

    /// Teardown path: stops the stream without waiting on the session lock and
    /// refuses any later acquisition. If the lock is held, the holder stops the
    /// stream as it unlocks.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.ready.store(false, Ordering::Release);
        self.stop_if_unlocked();
    }

    fn stop_if_unlocked(&self) {
        if let Ok(mut session) = self.session.try_lock() {
            if let Some(stream) = session.take() {
                self.stop_stream(&stream);
            }
        }
    }

    fn stop_stream(&self, stream: &MediaStream) {
        stream.stop();
        self.device.close(stream);
        self.ready.store(false, Ordering::Release);
        info!("Camera stream {} released", stream.id());
    }
}

/// Declared before a session lock guard so it runs after the guard is released.
/// Whoever unlocks after `closed` was set finishes the teardown that
/// `shutdown` could not do while the lock was taken.
struct CloseCheck<'a>(&'a CaptureResource);

impl Drop for CloseCheck<'_> {
    fn drop(&mut self) {
        if self.0.closed.load(Ordering::SeqCst) {
            self.0.stop_if_unlocked();
        }
    }
}

impl Drop for CaptureResource {
    fn drop(&mut self) {
        if let Some(stream) = self.session.get_mut().take() {
            stream.stop();
            self.device.close(&stream);
        }
    }
}

use crate::analyze::{AnalyzeGate, Ineligible};
use crate::backend::{BackendError, RepairBackend};
use crate::capture::{
    CaptureDevice, CaptureError, CaptureHandle, CaptureResource, RawFrame, StreamConstraints,
};
use crate::session::{ControlFlags, ProgressStore, SessionState, StatusView};
use std::sync::{Arc, Mutex};

pub const CAMERA_CONNECTED_FEEDBACK: &str = "Camera connected. Click Analyze Current Frame.";

pub type StatusListener = Arc<dyn Fn(&StatusView) + Send + Sync>;

/// Ties the capture resource, progress store and analyze gate together for one
/// walkthrough. Owns nothing the presentation layer can write to directly.
pub struct RepairController {
    capture: CaptureResource,
    store: ProgressStore,
    gate: AnalyzeGate,
    camera_error: Mutex<Option<String>>,
    listener: Option<StatusListener>,
}

impl RepairController {
    pub fn new(
        device: Arc<dyn CaptureDevice>,
        backend: Arc<dyn RepairBackend>,
        user_id: impl Into<String>,
    ) -> Self {
        Self::with_constraints(device, StreamConstraints::default(), backend, user_id)
    }

    pub fn with_constraints(
        device: Arc<dyn CaptureDevice>,
        constraints: StreamConstraints,
        backend: Arc<dyn RepairBackend>,
        user_id: impl Into<String>,
    ) -> Self {
        let user_id = user_id.into();
        tracing::info!(
            "Repair controller created for {} (backend={})",
            user_id,
            backend.name()
        );
        Self {
            capture: CaptureResource::with_constraints(device, constraints),
            store: ProgressStore::new(backend, user_id),
            gate: AnalyzeGate::new(),
            camera_error: Mutex::new(None),
            listener: None,
        }
    }

    pub fn with_listener(mut self, listener: StatusListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Initial progress load.
    pub async fn start(&self) -> Result<(), BackendError> {
        let result = self.store.fetch_current_step().await;
        self.notify();
        result
    }

    pub async fn refresh_progress(&self) -> Result<(), BackendError> {
        self.start().await
    }

    /// Opens the camera. Repeat calls on a live session keep the current feedback.
    pub async fn acquire_camera(&self) -> Result<CaptureHandle, CaptureError> {
        let was_ready = self.capture.is_ready();
        let result = self.capture.acquire().await;
        match &result {
            Ok(_) => {
                self.set_camera_error(None);
                if !was_ready {
                    self.store.set_feedback(CAMERA_CONNECTED_FEEDBACK);
                }
            }
            Err(e) => self.set_camera_error(Some(e.user_message())),
        }
        self.notify();
        result
    }

    pub async fn release_camera(&self) {
        self.capture.release().await;
        self.notify();
    }

    /// Feeds a decoded frame into the active stream. False without a live session.
    pub async fn push_frame(&self, frame: RawFrame) -> bool {
        match self.capture.frame_sink().await {
            Some(sink) => sink.push(frame),
            None => false,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.store.is_open()
    }

    /// Eligibility for `request_analysis`, also used to disable the UI affordance.
    pub fn check_eligible(&self) -> Result<(), Ineligible> {
        self.gate.check(&self.store, self.capture.is_ready())
    }

    pub fn can_analyze(&self) -> bool {
        self.check_eligible().is_ok()
    }

    pub fn session(&self) -> SessionState {
        self.store.snapshot()
    }

    pub fn status(&self) -> StatusView {
        let flags = ControlFlags {
            camera_ready: self.capture.is_ready(),
            camera_error: self.camera_error.lock().ok().and_then(|e| e.clone()),
            analyzing: self.gate.is_analyzing(),
        };
        StatusView::build(&self.store.snapshot(), &flags)
    }

    /// Teardown: later results are dropped and the camera is stopped now,
    /// regardless of any analyze call still in flight.
    pub fn shutdown(&self) {
        if !self.store.is_open() {
            return;
        }
        tracing::info!("Repair controller shutting down");
        self.store.close();
        self.capture.shutdown();
    }

    pub(crate) fn capture(&self) -> &CaptureResource {
        &self.capture
    }

    pub(crate) fn store(&self) -> &ProgressStore {
        &self.store
    }

    pub(crate) fn gate(&self) -> &AnalyzeGate {
        &self.gate
    }

    pub(crate) fn notify(&self) {
        if !self.is_alive() {
            return;
        }
        if let Some(listener) = self.listener.as_ref() {
            listener(&self.status());
        }
    }

    fn set_camera_error(&self, error: Option<String>) {
        if let Ok(mut guard) = self.camera_error.lock() {
            *guard = error;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CurrentStepResponse;
    use crate::capture::testing::FakeCamera;
    use crate::session::testing::{progress, ScriptedBackend};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_first_step_becomes_eligible_once_camera_ready() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.push_progress(Ok(progress(1, 0, 5)));
        let controller = RepairController::new(Arc::new(FakeCamera::new()), backend, "demo_user");

        controller.start().await.unwrap();
        assert_eq!(controller.status().progress_label, "Step 1 of 5");
        assert_eq!(controller.check_eligible(), Err(Ineligible::CameraNotReady));

        controller.acquire_camera().await.unwrap();
        assert!(controller.can_analyze());
        let status = controller.status();
        assert!(status.can_analyze);
        assert_eq!(status.feedback, CAMERA_CONNECTED_FEEDBACK);
    }

    #[tokio::test]
    async fn test_reacquire_keeps_verification_feedback() {
        let camera = Arc::new(FakeCamera::new());
        let backend = Arc::new(ScriptedBackend::default());
        backend.push_progress(Ok(progress(1, 0, 5)));
        let controller = RepairController::new(camera.clone(), backend, "demo_user");
        controller.start().await.unwrap();

        controller.acquire_camera().await.unwrap();
        controller.store().set_feedback("Screw not visible yet.");
        controller.acquire_camera().await.unwrap();

        assert_eq!(controller.status().feedback, "Screw not visible yet.");
        assert_eq!(camera.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_after_completion_stays_completed() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.push_progress(Ok(CurrentStepResponse {
            completed: true,
            message: Some("Repair finished.".to_string()),
            ..Default::default()
        }));
        backend.push_progress(Ok(progress(1, 0, 5)));
        let controller = RepairController::new(Arc::new(FakeCamera::new()), backend, "demo_user");

        controller.start().await.unwrap();
        controller.refresh_progress().await.unwrap();
        controller.acquire_camera().await.unwrap();

        let status = controller.status();
        assert!(status.completed);
        assert_eq!(status.progress_label, "Repair flow completed");
        assert!(!status.can_analyze);
        assert_eq!(controller.check_eligible(), Err(Ineligible::SessionCompleted));
    }

    #[tokio::test]
    async fn test_camera_error_is_reported_separately() {
        let camera = Arc::new(FakeCamera::new());
        *camera.fail_with.lock().unwrap() = Some(CaptureError::PermissionDenied);
        let controller =
            RepairController::new(camera.clone(), Arc::new(ScriptedBackend::default()), "u");

        assert!(controller.acquire_camera().await.is_err());
        let status = controller.status();
        assert_eq!(
            status.camera_error.as_deref(),
            Some("Camera access failed (permission denied).")
        );
        assert!(!status.camera_ready);

        *camera.fail_with.lock().unwrap() = None;
        controller.acquire_camera().await.unwrap();
        assert_eq!(controller.status().camera_error, None);
    }

    #[tokio::test]
    async fn test_listener_sees_updates_until_shutdown() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.push_progress(Ok(progress(1, 0, 2)));
        let seen = Arc::new(AtomicUsize::new(0));
        let listener: StatusListener = {
            let seen = seen.clone();
            Arc::new(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
        };
        let controller =
            RepairController::new(Arc::new(FakeCamera::new()), backend, "u").with_listener(listener);

        controller.start().await.unwrap();
        controller.acquire_camera().await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        controller.shutdown();
        controller.release_camera().await;
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert!(!controller.status().camera_ready);
    }
}

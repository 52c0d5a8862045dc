use crate::backend::BackendError;
use crate::capture::JpegFrame;
use crate::session::ProgressStore;
use serde::Serialize;

mod flight;

pub use flight::{FlightGuard, InFlight};

/// Why a submission was not sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Ineligible {
    CameraNotReady,
    NoCurrentStep,
    SessionCompleted,
    AlreadyAnalyzing,
    TornDown,
}

#[derive(Debug)]
pub enum AnalyzeOutcome {
    /// Nothing was sent
    Skipped(Ineligible),
    /// Verified, step not yet complete; feedback updated in place
    Feedback,
    /// Step complete; progress was refetched
    Advanced,
    /// Request failed; step and index untouched
    Failed(BackendError),
    /// Result arrived after teardown and was dropped
    Discarded,
}

/// Single-flight wrapper around the verification call
#[derive(Debug, Default)]
pub struct AnalyzeGate {
    flight: InFlight,
}

impl AnalyzeGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_analyzing(&self) -> bool {
        self.flight.is_busy()
    }

    /// Eligibility predicate shared with the UI affordance.
    pub fn check(&self, store: &ProgressStore, camera_ready: bool) -> Result<(), Ineligible> {
        if !store.is_open() {
            return Err(Ineligible::TornDown);
        }
        if !camera_ready {
            return Err(Ineligible::CameraNotReady);
        }
        let state = store.snapshot();
        if state.is_completed() {
            return Err(Ineligible::SessionCompleted);
        }
        if state.step().is_none() {
            return Err(Ineligible::NoCurrentStep);
        }
        if self.flight.is_busy() {
            return Err(Ineligible::AlreadyAnalyzing);
        }
        Ok(())
    }

    /// Sends one frame unless another submission is outstanding. Concurrent calls
    /// are dropped, not queued. `on_start` runs once the flight is claimed.
    pub async fn submit(
        &self,
        frame: JpegFrame,
        store: &ProgressStore,
        camera_ready: bool,
        on_start: impl FnOnce(),
    ) -> AnalyzeOutcome {
        if let Err(reason) = self.check(store, camera_ready) {
            return AnalyzeOutcome::Skipped(reason);
        }
        let Some(_guard) = self.flight.try_claim() else {
            return AnalyzeOutcome::Skipped(Ineligible::AlreadyAnalyzing);
        };
        on_start();

        let result = store.backend().analyze(store.user_id(), frame).await;

        if !store.is_open() {
            tracing::debug!("Discarding analyze result that arrived after teardown");
            return AnalyzeOutcome::Discarded;
        }

        match result {
            Ok(resp) => {
                tracing::info!(
                    "Analysis: step_complete={}, detected={}, provider={:?}",
                    resp.step_complete,
                    resp.detected.len(),
                    resp.provider
                );
                store.apply_verification(&resp);
                if !resp.ends_step() {
                    return AnalyzeOutcome::Feedback;
                }
                if let Some(next) = resp.next_step.as_ref() {
                    tracing::debug!("Ignoring hinted next step {}, refetching progress", next.id);
                }
                // Keep the flight claimed through the refetch so nothing is
                // submitted against the step that just finished.
                let _ = store.fetch_current_step().await;
                AnalyzeOutcome::Advanced
            }
            Err(e) => {
                tracing::warn!("Analysis failed: {}", e);
                store.apply_analyze_error(&e);
                AnalyzeOutcome::Failed(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{AnalyzeResponse, CurrentStepResponse};
    use crate::session::testing::{progress, ScriptedBackend};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    fn frame() -> JpegFrame {
        JpegFrame {
            bytes: vec![0xFF, 0xD8, 0xFF, 0xD9],
            width: 1,
            height: 1,
        }
    }

    async fn store_at_first_step(backend: Arc<ScriptedBackend>) -> ProgressStore {
        backend.push_progress(Ok(progress(1, 0, 5)));
        let store = ProgressStore::new(backend, "demo_user");
        store.fetch_current_step().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_skips_without_camera() {
        let backend = Arc::new(ScriptedBackend::default());
        let store = store_at_first_step(backend.clone()).await;
        let gate = AnalyzeGate::new();

        let outcome = gate.submit(frame(), &store, false, || {}).await;
        assert!(matches!(outcome, AnalyzeOutcome::Skipped(Ineligible::CameraNotReady)));
        assert_eq!(backend.analyze_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_skips_before_first_step() {
        let backend = Arc::new(ScriptedBackend::default());
        let store = ProgressStore::new(backend.clone(), "demo_user");
        let gate = AnalyzeGate::new();

        let outcome = gate.submit(frame(), &store, true, || {}).await;
        assert!(matches!(outcome, AnalyzeOutcome::Skipped(Ineligible::NoCurrentStep)));
    }

    #[tokio::test]
    async fn test_step_complete_refetches_instead_of_using_hint() {
        let backend = Arc::new(ScriptedBackend::default());
        let store = store_at_first_step(backend.clone()).await;
        backend.push_analysis(Ok(AnalyzeResponse {
            step_complete: true,
            feedback: Some("ok".to_string()),
            next_step: Some(crate::session::testing::step(99)),
            completed: Some(false),
            ..Default::default()
        }));
        backend.push_progress(Ok(progress(2, 1, 5)));
        let gate = AnalyzeGate::new();

        let outcome = gate.submit(frame(), &store, true, || {}).await;

        assert!(matches!(outcome, AnalyzeOutcome::Advanced));
        assert_eq!(backend.progress_calls.load(Ordering::SeqCst), 2);
        let state = store.snapshot();
        assert_eq!(state.step().map(|s| s.id), Some(2));
        assert_eq!(state.progress_label(), "Step 2 of 5");
        assert_eq!(state.feedback, "ok");
        assert!(!gate.is_analyzing());
    }

    #[tokio::test]
    async fn test_completed_without_step_complete_refetches() {
        let backend = Arc::new(ScriptedBackend::default());
        let store = store_at_first_step(backend.clone()).await;
        backend.push_analysis(Ok(AnalyzeResponse {
            completed: Some(true),
            ..Default::default()
        }));
        backend.push_progress(Ok(CurrentStepResponse {
            completed: true,
            message: Some("All done".to_string()),
            ..Default::default()
        }));
        let gate = AnalyzeGate::new();

        let outcome = gate.submit(frame(), &store, true, || {}).await;

        assert!(matches!(outcome, AnalyzeOutcome::Advanced));
        assert_eq!(backend.progress_calls.load(Ordering::SeqCst), 2);
        let state = store.snapshot();
        assert!(state.is_completed());
        assert_eq!(state.feedback, "All done");
        assert_eq!(
            gate.check(&store, true),
            Err(Ineligible::SessionCompleted)
        );
    }

    #[tokio::test]
    async fn test_rate_limit_leaves_step_untouched() {
        let backend = Arc::new(ScriptedBackend::default());
        let store = store_at_first_step(backend.clone()).await;
        backend.push_analysis(Err(BackendError::RateLimited));
        let before = store.snapshot();
        let gate = AnalyzeGate::new();

        let outcome = gate.submit(frame(), &store, true, || {}).await;

        assert!(matches!(outcome, AnalyzeOutcome::Failed(BackendError::RateLimited)));
        let after = store.snapshot();
        assert_eq!(after.phase(), before.phase());
        assert_eq!(after.feedback, "Rate limit reached. Wait and retry.");
        assert_eq!(backend.progress_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_submits_send_one_request() {
        let backend = Arc::new(ScriptedBackend::default());
        let store = store_at_first_step(backend.clone()).await;
        *backend.analyze_delay.lock().unwrap() = Some(Duration::from_millis(50));
        backend.push_analysis(Ok(AnalyzeResponse {
            step_complete: false,
            feedback: Some("Keep going".to_string()),
            ..Default::default()
        }));
        let gate = AnalyzeGate::new();

        let (a, b, c) = tokio::join!(
            gate.submit(frame(), &store, true, || {}),
            gate.submit(frame(), &store, true, || {}),
            gate.submit(frame(), &store, true, || {}),
        );

        let sent = [a, b, c]
            .iter()
            .filter(|o| matches!(o, AnalyzeOutcome::Feedback))
            .count();
        assert_eq!(sent, 1);
        assert_eq!(backend.analyze_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_result_after_close_is_discarded() {
        let backend = Arc::new(ScriptedBackend::default());
        let store = Arc::new(store_at_first_step(backend.clone()).await);
        *backend.analyze_delay.lock().unwrap() = Some(Duration::from_millis(50));
        backend.push_analysis(Ok(AnalyzeResponse {
            step_complete: true,
            feedback: Some("late".to_string()),
            ..Default::default()
        }));
        let gate = Arc::new(AnalyzeGate::new());
        let before = store.snapshot();

        let task = {
            let (gate, store) = (gate.clone(), store.clone());
            tokio::spawn(async move { gate.submit(frame(), &store, true, || {}).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        store.close();

        assert!(matches!(task.await.unwrap(), AnalyzeOutcome::Discarded));
        assert_eq!(store.snapshot(), before);
        assert_eq!(backend.progress_calls.load(Ordering::SeqCst), 1);
    }
}

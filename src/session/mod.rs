use crate::backend::{AnalyzeResponse, BackendError, RepairBackend};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex,
};

pub mod progress;
pub mod state;

pub use progress::{ControlFlags, StatusView};
pub use state::{SessionPhase, SessionState};

/// Holds the local session mirror and reconciles it with the backend.
///
/// Every mutation is dropped once the store is closed, so results that land
/// after teardown never reach a destroyed view.
pub struct ProgressStore {
    backend: Arc<dyn RepairBackend>,
    user_id: String,
    state: Mutex<SessionState>,
    open: AtomicBool,
    fetch_count: AtomicU64,
}

impl ProgressStore {
    pub fn new(backend: Arc<dyn RepairBackend>, user_id: impl Into<String>) -> Self {
        Self {
            backend,
            user_id: user_id.into(),
            state: Mutex::new(SessionState::default()),
            open: AtomicBool::new(true),
            fetch_count: AtomicU64::new(0),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn backend(&self) -> &Arc<dyn RepairBackend> {
        &self.backend
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
    }

    /// Number of progress fetches issued so far
    pub fn fetch_count(&self) -> u64 {
        self.fetch_count.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> SessionState {
        match self.state.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Queries the backend and applies the outcome. A failure keeps the previous
    /// step visible and only rewrites the feedback line.
    pub async fn fetch_current_step(&self) -> Result<(), BackendError> {
        self.fetch_count.fetch_add(1, Ordering::Relaxed);
        let result = self.backend.current_step(&self.user_id).await;

        match result {
            Ok(resp) => {
                let completed = resp.completed;
                self.mutate(|state| state.apply_progress(resp));
                let snapshot = self.snapshot();
                if completed {
                    tracing::info!("Repair session completed for {}", self.user_id);
                } else {
                    tracing::info!(
                        "Session progress: {} (step id {:?})",
                        snapshot.progress_label(),
                        snapshot.step().map(|s| s.id)
                    );
                }
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Progress fetch failed: {}", e);
                self.mutate(|state| state.apply_fetch_error(&e));
                Err(e)
            }
        }
    }

    pub fn apply_verification(&self, resp: &AnalyzeResponse) {
        self.mutate(|state| state.apply_verification(resp));
    }

    pub fn apply_analyze_error(&self, err: &BackendError) {
        self.mutate(|state| state.apply_analyze_error(err));
    }

    pub fn set_feedback(&self, feedback: impl Into<String>) {
        let feedback = feedback.into();
        self.mutate(|state| state.feedback = feedback);
    }

    fn mutate(&self, f: impl FnOnce(&mut SessionState)) {
        if !self.is_open() {
            tracing::debug!("Dropping session update after teardown");
            return;
        }
        match self.state.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::backend::{
        AnalyzeResponse, BackendError, CurrentStepResponse, RepairBackend, RepairStep,
    };
    use crate::capture::JpegFrame;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    pub fn step(id: i64) -> RepairStep {
        RepairStep {
            id,
            instruction: format!("Do step {}", id),
            target_object: "screw".to_string(),
            action: "remove".to_string(),
            image_reference: None,
        }
    }

    pub fn progress(id: i64, index: u32, total: u32) -> CurrentStepResponse {
        CurrentStepResponse {
            completed: false,
            step: Some(step(id)),
            total_steps: Some(total),
            current_index: Some(index),
            message: None,
        }
    }

    /// Backend double that replays queued replies and counts calls.
    #[derive(Default)]
    pub struct ScriptedBackend {
        pub progress: Mutex<VecDeque<Result<CurrentStepResponse, BackendError>>>,
        pub analyses: Mutex<VecDeque<Result<AnalyzeResponse, BackendError>>>,
        pub progress_calls: AtomicUsize,
        pub analyze_calls: AtomicUsize,
        pub analyze_delay: Mutex<Option<Duration>>,
    }

    impl ScriptedBackend {
        pub fn push_progress(&self, reply: Result<CurrentStepResponse, BackendError>) {
            self.progress.lock().unwrap().push_back(reply);
        }

        pub fn push_analysis(&self, reply: Result<AnalyzeResponse, BackendError>) {
            self.analyses.lock().unwrap().push_back(reply);
        }
    }

    #[async_trait]
    impl RepairBackend for ScriptedBackend {
        async fn current_step(&self, _user_id: &str) -> Result<CurrentStepResponse, BackendError> {
            self.progress_calls.fetch_add(1, Ordering::SeqCst);
            let next = self.progress.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Err(BackendError::NetworkFailure("no scripted reply".into())))
        }

        async fn analyze(
            &self,
            _user_id: &str,
            _frame: JpegFrame,
        ) -> Result<AnalyzeResponse, BackendError> {
            self.analyze_calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.analyze_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let next = self.analyses.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Err(BackendError::NetworkFailure("no scripted reply".into())))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{progress, ScriptedBackend};
    use super::*;

    #[tokio::test]
    async fn test_fetch_failure_keeps_previous_step() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.push_progress(Ok(progress(1, 0, 5)));
        backend.push_progress(Err(BackendError::ServerError { status: 503 }));
        let store = ProgressStore::new(backend.clone(), "demo_user");

        store.fetch_current_step().await.unwrap();
        assert!(store.fetch_current_step().await.is_err());

        let state = store.snapshot();
        assert_eq!(state.step().map(|s| s.id), Some(1));
        assert_eq!(state.progress_label(), "Step 1 of 5");
        assert_eq!(state.feedback, "Could not reach backend (HTTP 503).");
        assert_eq!(store.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_closed_store_ignores_results() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.push_progress(Ok(progress(1, 0, 5)));
        let store = ProgressStore::new(backend, "demo_user");

        store.close();
        store.fetch_current_step().await.unwrap();

        assert_eq!(store.snapshot(), SessionState::default());
    }
}

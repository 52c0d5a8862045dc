use crate::backend::{AnalyzeResponse, BackendError, CurrentStepResponse, RepairStep};
use serde::Serialize;

pub const INITIAL_FEEDBACK: &str = "Enable camera, then analyze a frame.";
pub const DEFAULT_COMPLETION_MESSAGE: &str = "Repair finished.";
pub const MISSING_FEEDBACK: &str = "No feedback.";

/// Controller-level progress. `Completed` is terminal for analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "camelCase")]
pub enum SessionPhase {
    Loading,
    InProgress {
        step: RepairStep,
        index: u32,
        total: u32,
    },
    Completed {
        message: String,
    },
}

/// Local mirror of the server-side session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    phase: SessionPhase,
    pub feedback: String,
    pub detected_objects: Vec<String>,
    pub scene_summary: String,
    pub provider: String,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Loading,
            feedback: INITIAL_FEEDBACK.to_string(),
            detected_objects: Vec::new(),
            scene_summary: String::new(),
            provider: String::new(),
        }
    }
}

impl SessionState {
    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    pub fn step(&self) -> Option<&RepairStep> {
        match &self.phase {
            SessionPhase::InProgress { step, .. } => Some(step),
            _ => None,
        }
    }

    pub fn index(&self) -> u32 {
        match &self.phase {
            SessionPhase::InProgress { index, .. } => *index,
            _ => 0,
        }
    }

    pub fn total(&self) -> u32 {
        match &self.phase {
            SessionPhase::InProgress { total, .. } => *total,
            _ => 0,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.phase, SessionPhase::Completed { .. })
    }

    pub fn progress_label(&self) -> String {
        match &self.phase {
            SessionPhase::Completed { .. } => "Repair flow completed".to_string(),
            SessionPhase::InProgress { index, total, .. } if *total > 0 => {
                format!("Step {} of {}", index + 1, total)
            }
            _ => "Loading steps...".to_string(),
        }
    }

    /// Reconciles with a progress fetch. Verification fields are left alone.
    /// Once completed, only another completion is accepted.
    pub fn apply_progress(&mut self, resp: CurrentStepResponse) {
        if self.is_completed() && !resp.completed {
            tracing::warn!("Ignoring in-progress reply for a completed session");
            return;
        }
        if resp.completed {
            let message = resp
                .message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_COMPLETION_MESSAGE.to_string());
            self.feedback = message.clone();
            self.phase = SessionPhase::Completed { message };
            return;
        }

        let total = resp.total_steps.unwrap_or(0);
        let mut index = resp.current_index.unwrap_or(0);
        if total > 0 && index >= total {
            tracing::warn!("Backend index {} out of range for {} steps, clamping", index, total);
            index = total - 1;
        }

        self.phase = match resp.step {
            Some(step) => SessionPhase::InProgress { step, index, total },
            None => {
                tracing::warn!("Backend reported an unfinished session without a current step");
                SessionPhase::Loading
            }
        };
    }

    pub fn apply_fetch_error(&mut self, err: &BackendError) {
        self.feedback = err.fetch_message();
    }

    /// Feedback-only update from a verification result; never moves the step.
    pub fn apply_verification(&mut self, resp: &AnalyzeResponse) {
        self.feedback = resp
            .feedback
            .clone()
            .unwrap_or_else(|| MISSING_FEEDBACK.to_string());
        self.detected_objects = resp.detected.clone();
        self.scene_summary = resp.scene_summary.clone().unwrap_or_default();
        if let Some(provider) = resp.provider.as_ref().filter(|p| !p.is_empty()) {
            self.provider = provider.clone();
        }
    }

    pub fn apply_analyze_error(&mut self, err: &BackendError) {
        self.feedback = err.analyze_message();
    }
}

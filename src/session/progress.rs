use super::SessionState;
use chrono::Utc;
use serde::Serialize;

/// Everything the presentation layer renders, in one snapshot
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub progress_label: String,
    pub instruction: String,
    pub target: Option<String>,
    pub action: Option<String>,
    pub step_id: Option<i64>,
    pub completed: bool,
    pub feedback: String,
    pub scene_summary: String,
    pub detected: Vec<String>,
    pub provider: Option<String>,
    pub camera_ready: bool,
    pub camera_error: Option<String>,
    pub analyzing: bool,
    pub can_analyze: bool,
    pub updated_at: String,
}

/// Controller flags that live outside [`SessionState`]
#[derive(Debug, Clone, Default)]
pub struct ControlFlags {
    pub camera_ready: bool,
    pub camera_error: Option<String>,
    pub analyzing: bool,
}

impl ControlFlags {
    pub fn can_analyze(&self, state: &SessionState) -> bool {
        self.camera_ready && state.step().is_some() && !state.is_completed() && !self.analyzing
    }
}

impl StatusView {
    pub fn build(state: &SessionState, flags: &ControlFlags) -> Self {
        let step = state.step();
        let instruction = match step {
            Some(step) => step.instruction.clone(),
            None if state.is_completed() => "Done.".to_string(),
            None => "Loading current step...".to_string(),
        };

        Self {
            progress_label: state.progress_label(),
            instruction,
            target: step.map(|s| s.target_object.clone()),
            action: step.map(|s| s.action.clone()),
            step_id: step.map(|s| s.id),
            completed: state.is_completed(),
            feedback: state.feedback.clone(),
            scene_summary: state.scene_summary.clone(),
            detected: state.detected_objects.clone(),
            provider: Some(state.provider.clone()).filter(|p| !p.is_empty()),
            camera_ready: flags.camera_ready,
            camera_error: flags.camera_error.clone(),
            analyzing: flags.analyzing,
            can_analyze: flags.can_analyze(state),
            updated_at: Utc::now().to_rfc3339(),
        }
    }
}

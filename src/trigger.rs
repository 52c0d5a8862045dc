use crate::analyze::{AnalyzeOutcome, Ineligible};
use crate::capture::CaptureError;
use crate::controller::RepairController;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

pub const CAPTURE_RETRY_FEEDBACK: &str = "Could not capture frame. Try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TriggerSource {
    Action,
    Shortcut,
}

#[derive(Debug)]
pub enum DispatchOutcome {
    Skipped(Ineligible),
    CaptureFailed(CaptureError),
    Submitted(AnalyzeOutcome),
}

/// Where keyboard shortcuts get registered (the OS, a window, a test double)
pub trait ShortcutRegistry: Send + Sync {
    fn register(&self, accelerator: &str) -> Result<(), String>;
    fn unregister(&self, accelerator: &str) -> Result<(), String>;
}

/// A registered shortcut; unregisters itself when dropped.
pub struct ShortcutBinding {
    registry: Arc<dyn ShortcutRegistry>,
    accelerator: String,
}

impl ShortcutBinding {
    pub fn bind(registry: Arc<dyn ShortcutRegistry>, accelerator: &str) -> Result<Self, String> {
        registry.register(accelerator)?;
        tracing::info!("Analyze shortcut '{}' registered", accelerator);
        Ok(Self {
            registry,
            accelerator: accelerator.to_string(),
        })
    }

    pub fn accelerator(&self) -> &str {
        &self.accelerator
    }
}

impl Drop for ShortcutBinding {
    fn drop(&mut self) {
        match self.registry.unregister(&self.accelerator) {
            Ok(()) => tracing::info!("Analyze shortcut '{}' unregistered", self.accelerator),
            Err(e) => tracing::warn!(
                "Failed to unregister shortcut '{}': {}",
                self.accelerator,
                e
            ),
        }
    }
}

/// Routes user triggers to capture + analyze, applying the eligibility check first.
pub struct TriggerDispatcher {
    controller: Arc<RepairController>,
    binding: Mutex<Option<ShortcutBinding>>,
}

impl TriggerDispatcher {
    pub fn new(controller: Arc<RepairController>) -> Self {
        Self {
            controller,
            binding: Mutex::new(None),
        }
    }

    pub fn controller(&self) -> &Arc<RepairController> {
        &self.controller
    }

    /// Binds the analyze shortcut for the controller's lifetime. Rebinding
    /// replaces (and unregisters) the previous binding.
    pub fn mount(&self, registry: Arc<dyn ShortcutRegistry>, accelerator: &str) -> Result<(), String> {
        let mut guard = self.binding.lock().map_err(|e| e.to_string())?;
        guard.take();
        *guard = Some(ShortcutBinding::bind(registry, accelerator)?);
        Ok(())
    }

    pub fn bound_shortcut(&self) -> Option<String> {
        self.binding
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|b| b.accelerator().to_string()))
    }

    pub fn unmount(&self) {
        if let Ok(mut guard) = self.binding.lock() {
            guard.take();
        }
    }

    /// Unbinds the shortcut and shuts the controller down.
    pub fn teardown(&self) {
        self.unmount();
        self.controller.shutdown();
    }

    pub async fn request_analysis(&self, source: TriggerSource) -> DispatchOutcome {
        let controller = &self.controller;
        if let Err(reason) = controller.check_eligible() {
            tracing::debug!("Analyze trigger from {:?} ignored: {:?}", source, reason);
            return DispatchOutcome::Skipped(reason);
        }

        let frame = match controller.capture().capture_frame().await {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Frame capture failed: {}", e);
                controller.store().set_feedback(CAPTURE_RETRY_FEEDBACK);
                controller.notify();
                return DispatchOutcome::CaptureFailed(e);
            }
        };

        let outcome = controller
            .gate()
            .submit(
                frame,
                controller.store(),
                controller.capture().is_ready(),
                || controller.notify(),
            )
            .await;

        match &outcome {
            AnalyzeOutcome::Skipped(reason) => {
                tracing::debug!("Analyze trigger from {:?} dropped: {:?}", source, reason);
            }
            AnalyzeOutcome::Discarded => {}
            _ => controller.notify(),
        }
        DispatchOutcome::Submitted(outcome)
    }
}

impl Drop for TriggerDispatcher {
    fn drop(&mut self) {
        self.teardown();
    }
}

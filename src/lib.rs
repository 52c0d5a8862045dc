pub mod analyze;
pub mod backend;
pub mod capture;
pub mod config;
pub mod controller;
pub mod session;
pub mod trigger;

#[cfg(feature = "desktop")]
mod desktop;

pub use analyze::{AnalyzeGate, AnalyzeOutcome, Ineligible};
pub use backend::{AnalyzeResponse, BackendError, CurrentStepResponse, HttpBackend, RepairBackend, RepairStep};
pub use capture::{CaptureDevice, CaptureError, CaptureHandle, CaptureResource};
pub use controller::{RepairController, StatusListener};
pub use session::{SessionPhase, SessionState, StatusView};
pub use trigger::{DispatchOutcome, ShortcutRegistry, TriggerDispatcher, TriggerSource};

#[cfg(feature = "desktop")]
pub use desktop::run;

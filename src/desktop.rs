use crate::backend::HttpBackend;
use crate::capture::{CameraAccessOutcome, CaptureHandle, RawFrame, StreamConstraints, WebviewCamera};
use crate::config;
use crate::controller::{RepairController, StatusListener};
use crate::session::StatusView;
use crate::trigger::{ShortcutRegistry, TriggerDispatcher, TriggerSource};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use std::sync::Arc;
use tauri::path::BaseDirectory;
use tauri::{AppHandle, Emitter, Manager, State, WindowEvent};
use tauri_plugin_global_shortcut::{GlobalShortcutExt, ShortcutState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const STATUS_EVENT: &str = "repair:status";
const CAMERA_REQUEST_EVENT: &str = "camera:request-access";
const CAMERA_RELEASE_EVENT: &str = "camera:release";

struct AppState {
    dispatcher: Arc<TriggerDispatcher>,
    camera: Arc<WebviewCamera>,
}

struct TauriShortcuts {
    app: AppHandle,
}

impl ShortcutRegistry for TauriShortcuts {
    fn register(&self, accelerator: &str) -> Result<(), String> {
        self.app
            .global_shortcut()
            .register(accelerator)
            .map_err(|e| format!("Failed to register shortcut '{}': {}", accelerator, e))
    }

    fn unregister(&self, accelerator: &str) -> Result<(), String> {
        self.app
            .global_shortcut()
            .unregister(accelerator)
            .map_err(|e| format!("Failed to unregister shortcut '{}': {}", accelerator, e))
    }
}

#[tauri::command]
async fn acquire_camera(state: State<'_, AppState>) -> Result<CaptureHandle, String> {
    state
        .dispatcher
        .controller()
        .acquire_camera()
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
async fn release_camera(state: State<'_, AppState>) -> Result<(), String> {
    state.dispatcher.controller().release_camera().await;
    Ok(())
}

/// `source` is `shortcut` when the window's own Space handler fired.
#[tauri::command]
async fn request_analysis(
    source: Option<TriggerSource>,
    state: State<'_, AppState>,
) -> Result<StatusView, String> {
    state
        .dispatcher
        .request_analysis(source.unwrap_or(TriggerSource::Action))
        .await;
    Ok(state.dispatcher.controller().status())
}

#[tauri::command]
async fn refresh_progress(state: State<'_, AppState>) -> Result<StatusView, String> {
    let controller = state.dispatcher.controller();
    controller.refresh_progress().await.map_err(|e| e.to_string())?;
    Ok(controller.status())
}

#[tauri::command]
fn get_status(state: State<'_, AppState>) -> StatusView {
    state.dispatcher.controller().status()
}

#[tauri::command]
fn camera_access_result(outcome: CameraAccessOutcome, state: State<'_, AppState>) -> bool {
    state.camera.resolve(outcome)
}

#[tauri::command]
async fn push_camera_frame(
    width: u32,
    height: u32,
    rgba: String,
    state: State<'_, AppState>,
) -> Result<bool, String> {
    let bytes = BASE64_STANDARD.decode(rgba).map_err(|e| e.to_string())?;
    let frame = RawFrame::new(width, height, bytes)
        .ok_or_else(|| format!("Frame buffer does not match {}x{} RGBA", width, height))?;
    Ok(state.dispatcher.controller().push_frame(frame).await)
}

fn build_state(app: &AppHandle) -> Result<AppState, Box<dyn std::error::Error>> {
    let config_dir = app.path().resolve(config::CONFIG_DIR, BaseDirectory::AppData)?;
    let mut settings = config::load_or_create(&config_dir)?;
    settings.apply_env_overrides();
    tracing::info!(
        "Using backend {} as user {}",
        settings.backend_url,
        settings.user_id
    );

    let backend = Arc::new(HttpBackend::new(
        settings.backend_url.clone(),
        settings.request_timeout(),
    )?);

    let request_handle = app.clone();
    let release_handle = app.clone();
    let camera = Arc::new(WebviewCamera::new(
        settings.camera_timeout(),
        move |constraints: &StreamConstraints| {
            let _ = request_handle.emit(CAMERA_REQUEST_EVENT, *constraints);
        },
        move |stream_id| {
            let _ = release_handle.emit(CAMERA_RELEASE_EVENT, stream_id.to_string());
        },
    ));

    let status_handle = app.clone();
    let listener: StatusListener = Arc::new(move |view: &StatusView| {
        let _ = status_handle.emit(STATUS_EVENT, view.clone());
    });

    let controller = RepairController::new(camera.clone(), backend, settings.user_id.clone())
        .with_listener(listener);
    let dispatcher = Arc::new(TriggerDispatcher::new(Arc::new(controller)));

    let shortcuts = Arc::new(TauriShortcuts { app: app.clone() });
    if let Err(e) = dispatcher.mount(shortcuts, &settings.analyze_hotkey) {
        tracing::warn!("{}", e);
    }

    Ok(AppState { dispatcher, camera })
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    // Load environment variables from .env file
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "repair_guide_lib=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tauri::Builder::default()
        .plugin(
            tauri_plugin_global_shortcut::Builder::new()
                .with_handler(|app, _shortcut, event| {
                    if event.state != ShortcutState::Pressed {
                        return;
                    }
                    if let Some(state) = app.try_state::<AppState>() {
                        let dispatcher = state.dispatcher.clone();
                        tauri::async_runtime::spawn(async move {
                            dispatcher.request_analysis(TriggerSource::Shortcut).await;
                        });
                    }
                })
                .build(),
        )
        .setup(|app| {
            let state = build_state(app.handle())?;
            let controller = state.dispatcher.controller().clone();
            app.manage(state);

            tauri::async_runtime::spawn(async move {
                let _ = controller.start().await;
            });
            Ok(())
        })
        .on_window_event(|window, event| {
            if let WindowEvent::Destroyed = event {
                if window.label() == "main" {
                    if let Some(state) = window.app_handle().try_state::<AppState>() {
                        state.dispatcher.teardown();
                    }
                }
            }
        })
        .invoke_handler(tauri::generate_handler![
            acquire_camera,
            release_camera,
            request_analysis,
            refresh_progress,
            get_status,
            camera_access_result,
            push_camera_frame
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_DIR: &str = "repair-guide";
const CONFIG_FILE: &str = "config.json";

pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_USER_ID: &str = "demo_user";
pub const DEFAULT_ANALYZE_HOTKEY: &str = "CommandOrControl+Shift+Space";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
const DEFAULT_CAMERA_TIMEOUT_SECS: u64 = 20;

const ENV_BACKEND_URL: &str = "REPAIR_BACKEND_URL";
const ENV_USER_ID: &str = "REPAIR_USER_ID";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to access config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub backend_url: String,
    pub user_id: String,
    pub analyze_hotkey: String,
    pub request_timeout_secs: u64,
    pub camera_timeout_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            user_id: DEFAULT_USER_ID.to_string(),
            analyze_hotkey: DEFAULT_ANALYZE_HOTKEY.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            camera_timeout_secs: DEFAULT_CAMERA_TIMEOUT_SECS,
        }
    }
}

impl ControllerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn camera_timeout(&self) -> Duration {
        Duration::from_secs(self.camera_timeout_secs)
    }

    /// Applies `REPAIR_BACKEND_URL` / `REPAIR_USER_ID` on top of the file values.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(
            std::env::var(ENV_BACKEND_URL).ok(),
            std::env::var(ENV_USER_ID).ok(),
        );
    }

    fn apply_overrides(&mut self, backend_url: Option<String>, user_id: Option<String>) {
        if let Some(url) = backend_url.filter(|u| !u.trim().is_empty()) {
            self.backend_url = url;
        }
        if let Some(user) = user_id.filter(|u| !u.trim().is_empty()) {
            self.user_id = user;
        }
        normalize_config(self);
    }
}

pub fn normalize_backend_url(input: &str) -> String {
    let trimmed = input.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        DEFAULT_BACKEND_URL.to_string()
    } else {
        trimmed.to_string()
    }
}

/// The analyze hotkey is registered OS-wide, so it must carry a modifier.
/// Bare keys (plain `Space`) are handled by the window itself.
pub fn normalize_hotkey(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return DEFAULT_ANALYZE_HOTKEY.to_string();
    }
    if !trimmed.contains('+') {
        tracing::warn!(
            "Global hotkey '{}' has no modifier, using {}",
            trimmed,
            DEFAULT_ANALYZE_HOTKEY
        );
        return DEFAULT_ANALYZE_HOTKEY.to_string();
    }
    trimmed.to_string()
}

/// Reads `<dir>/config.json`, creating it with defaults when missing. A file that
/// fails to parse is kept as `config.json.bak` and replaced with defaults.
pub fn load_or_create(dir: &Path) -> Result<ControllerConfig, ConfigError> {
    fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let path = dir.join(CONFIG_FILE);

    if !path.exists() {
        let config = ControllerConfig::default();
        save_raw(&path, &config)?;
        return Ok(config);
    }

    let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    match serde_json::from_str::<ControllerConfig>(&raw) {
        Ok(mut config) => {
            normalize_config(&mut config);
            Ok(config)
        }
        Err(e) => {
            tracing::warn!("Config at {} is unreadable ({}), resetting", path.display(), e);
            let backup = path.with_extension("json.bak");
            let _ = fs::copy(&path, backup);
            let config = ControllerConfig::default();
            save_raw(&path, &config)?;
            Ok(config)
        }
    }
}

fn save_raw(path: &Path, config: &ControllerConfig) -> Result<(), ConfigError> {
    let json = serde_json::to_string_pretty(config)?;
    fs::write(path, json).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn normalize_config(config: &mut ControllerConfig) {
    config.backend_url = normalize_backend_url(&config.backend_url);
    config.analyze_hotkey = normalize_hotkey(&config.analyze_hotkey);
    let user = config.user_id.trim();
    config.user_id = if user.is_empty() {
        DEFAULT_USER_ID.to_string()
    } else {
        user.to_string()
    };
    if config.request_timeout_secs == 0 {
        config.request_timeout_secs = DEFAULT_REQUEST_TIMEOUT_SECS;
    }
    if config.camera_timeout_secs == 0 {
        config.camera_timeout_secs = DEFAULT_CAMERA_TIMEOUT_SECS;
    }
}

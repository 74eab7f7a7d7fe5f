use std::path::{Path, PathBuf};
use std::time::Duration;

use kmsview_common::{kmsview_config_dir, kmsview_system_config_dir};
use serde::Deserialize;

use crate::modes::{parse_max_size, ModePreference};

pub const ENV_MODE_INDEX: &str = "KMSVIEW_DRM_MODE_INDEX";
pub const ENV_VIDEO_MODE: &str = "KMSVIEW_DRM_VIDEO_MODE";
pub const ENV_MODE_MAX: &str = "KMSVIEW_DRM_MODE_MAX";

fn default_drm_device() -> String {
    "auto".to_string()
}
fn default_mode() -> String {
    "auto".to_string()
}
fn default_focused() -> bool {
    true
}
fn default_atomic() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub display: DisplayConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DisplayConfig {
    #[serde(default = "default_drm_device")]
    pub device: String,

    /// Mode name as advertised by the connector, e.g. `1920x1080`.
    #[serde(default = "default_mode")]
    pub mode: String,

    pub mode_index: Option<usize>,

    /// `WxH` upper bound on the selected mode.
    pub mode_max: Option<String>,

    #[serde(default = "default_focused")]
    pub focused: bool,

    /// Milliseconds before a pending flip is reported as stalled. 0 disables.
    pub flip_timeout_ms: u64,

    /// Use atomic modesetting when the driver supports it.
    #[serde(default = "default_atomic")]
    pub atomic: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            device: default_drm_device(),
            mode: default_mode(),
            mode_index: None,
            mode_max: None,
            focused: default_focused(),
            flip_timeout_ms: 0,
            atomic: default_atomic(),
        }
    }
}

impl DisplayConfig {
    pub fn drm_device_path(&self) -> Option<PathBuf> {
        match self.device.as_str() {
            "auto" | "" => None,
            path => Some(PathBuf::from(path)),
        }
    }

    pub fn mode_name(&self) -> Option<&str> {
        match self.mode.as_str() {
            "auto" | "" => None,
            name => Some(name),
        }
    }

    pub fn flip_timeout(&self) -> Option<Duration> {
        match self.flip_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn mode_preference(&self) -> ModePreference {
        let max_size = self.mode_max.as_deref().and_then(|value| {
            let parsed = parse_max_size(value);
            if parsed.is_none() {
                log::warn!("Ignoring invalid mode_max '{}' (expected WxH)", value);
            }
            parsed
        });

        ModePreference {
            index: self.mode_index,
            name: self.mode_name().map(str::to_string),
            max_size,
        }
    }
}

impl ModePreference {
    /// Layers environment overrides on top. Invalid values are ignored.
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(value) = lookup(ENV_MODE_INDEX) {
            match value.trim().parse::<usize>() {
                Ok(index) => self.index = Some(index),
                Err(_) => log::warn!("Ignoring invalid {}='{}'", ENV_MODE_INDEX, value),
            }
        }

        if let Some(value) = lookup(ENV_VIDEO_MODE) {
            let value = value.trim();
            if value.is_empty() {
                log::warn!("Ignoring empty {}", ENV_VIDEO_MODE);
            } else {
                self.name = Some(value.to_string());
            }
        }

        if let Some(value) = lookup(ENV_MODE_MAX) {
            match parse_max_size(&value) {
                Some(size) => self.max_size = Some(size),
                None => log::warn!("Ignoring invalid {}='{}' (expected WxH)", ENV_MODE_MAX, value),
            }
        }

        self
    }

    pub fn from_process_env(self) -> Self {
        self.apply_env(|key| std::env::var(key).ok())
    }
}

impl Config {
    pub fn load() -> Self {
        let user_config = kmsview_config_dir().join("config.toml");
        let system_config = kmsview_system_config_dir().join("config.toml");

        for path in [user_config, system_config] {
            if !path.exists() {
                continue;
            }
            match Self::load_from_path(&path) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    return config;
                }
                Err(e) => {
                    log::warn!("Failed to load {}: {}", path.display(), e);
                }
            }
        }

        log::info!("Using default configuration");
        Self::default()
    }

    pub fn load_from_path(path: &Path) -> Result<Self, String> {
        let content =
            std::fs::read_to_string(path).map_err(|e| format!("Failed to read file: {}", e))?;
        toml::from_str(&content).map_err(|e| format!("Failed to parse TOML: {}", e))
    }
}

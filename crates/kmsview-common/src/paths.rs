use std::path::PathBuf;

pub fn config_dir() -> PathBuf {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg_config);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".config");
    }
    PathBuf::from("/tmp")
}

pub fn data_dir() -> PathBuf {
    if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg_data);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from("/tmp")
}

pub fn kmsview_config_dir() -> PathBuf {
    config_dir().join("kmsview")
}

/// System-wide configuration, consulted after the per-user file.
pub fn kmsview_system_config_dir() -> PathBuf {
    PathBuf::from("/etc/kmsview")
}

pub fn kmsview_data_dir() -> PathBuf {
    data_dir().join("kmsview")
}

pub fn kmsview_log_dir() -> PathBuf {
    kmsview_data_dir().join("logs")
}

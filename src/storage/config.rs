use std::path::{Path, PathBuf};

use flacdl_core::fs_paths::{AppPaths, DesktopPaths};

use crate::models::settings::AppSettings;

const SETTINGS_FILE: &str = "settings.json";
const CONFIG_DIR_ENV: &str = "FLACDL_CONFIG_DIR";

pub fn config_dir() -> PathBuf {
    match std::env::var_os(CONFIG_DIR_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => DesktopPaths.config_dir(),
    }
}

pub fn settings_path() -> PathBuf {
    config_dir().join(SETTINGS_FILE)
}

pub fn load_settings(path: &Path) -> AppSettings {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return AppSettings::default(),
        Err(e) => {
            tracing::warn!("Failed to read {}: {}", path.display(), e);
            return AppSettings::default();
        }
    };

    match serde_json::from_str::<AppSettings>(&raw) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!("Ignoring malformed settings file {}: {}", path.display(), e);
            AppSettings::default()
        }
    }
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, json)?;
    Ok(())
}

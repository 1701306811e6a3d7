use std::path::Path;

use crate::models::settings::AppSettings;
use crate::storage::config;

pub fn get_settings(path: &Path) -> Result<AppSettings, String> {
    Ok(config::load_settings(path))
}

/// Applies a partial JSON document on top of the stored settings.
pub fn update_settings(path: &Path, partial: &str) -> Result<AppSettings, String> {
    let current = config::load_settings(path);

    let patch: serde_json::Value =
        serde_json::from_str(partial).map_err(|e| format!("Invalid JSON: {}", e))?;
    if !patch.is_object() {
        return Err("Settings patch must be a JSON object".into());
    }
    let mut current_val =
        serde_json::to_value(&current).map_err(|e| format!("Serialize: {}", e))?;
    merge_json(&mut current_val, &patch);
    let updated: AppSettings =
        serde_json::from_value(current_val).map_err(|e| format!("Deserialize: {}", e))?;
    config::save_settings(path, &updated).map_err(|e| format!("Save: {}", e))?;
    Ok(updated)
}

pub fn reset_settings(path: &Path) -> Result<AppSettings, String> {
    let defaults = AppSettings::default();
    config::save_settings(path, &defaults).map_err(|e| format!("Save: {}", e))?;
    Ok(defaults)
}

fn merge_json(base: &mut serde_json::Value, patch: &serde_json::Value) {
    let (Some(base_obj), Some(patch_obj)) = (base.as_object_mut(), patch.as_object()) else {
        return;
    };
    for (key, value) in patch_obj {
        match base_obj.get_mut(key) {
            Some(existing) if existing.is_object() && value.is_object() => {
                merge_json(existing, value)
            }
            _ => {
                base_obj.insert(key.clone(), value.clone());
            }
        }
    }
}

use std::path::PathBuf;

pub trait AppPaths: Send + Sync {
    fn music_dir(&self) -> PathBuf;
    fn config_dir(&self) -> PathBuf;
}

pub struct DesktopPaths;

impl AppPaths for DesktopPaths {
    fn music_dir(&self) -> PathBuf {
        dirs::audio_dir()
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn config_dir(&self) -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("flacdl"))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

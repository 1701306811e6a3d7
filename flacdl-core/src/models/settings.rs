use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::fs_paths::{AppPaths, DesktopPaths};
use crate::sources::{Source, SourceMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingSystem {
    Windows,
    Posix,
}

impl OperatingSystem {
    pub fn host() -> Self {
        if cfg!(windows) {
            OperatingSystem::Windows
        } else {
            OperatingSystem::Posix
        }
    }

    pub fn separator(self) -> char {
        match self {
            OperatingSystem::Windows => '\\',
            OperatingSystem::Posix => '/',
        }
    }
}

impl Default for OperatingSystem {
    fn default() -> Self {
        Self::host()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Downloader {
    #[default]
    Auto,
    Tidal,
    Amazon,
    Qobuz,
}

impl Downloader {
    pub fn mode(self) -> SourceMode {
        match self {
            Downloader::Auto => SourceMode::Auto,
            Downloader::Tidal => SourceMode::Single(Source::Tidal),
            Downloader::Amazon => SourceMode::Single(Source::Amazon),
            Downloader::Qobuz => SourceMode::Single(Source::Qobuz),
        }
    }
}

impl From<SourceMode> for Downloader {
    fn from(mode: SourceMode) -> Self {
        match mode {
            SourceMode::Auto => Downloader::Auto,
            SourceMode::Single(Source::Tidal) => Downloader::Tidal,
            SourceMode::Single(Source::Amazon) => Downloader::Amazon,
            SourceMode::Single(Source::Qobuz) => Downloader::Qobuz,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TidalQuality {
    #[default]
    #[serde(rename = "LOSSLESS")]
    Lossless,
    #[serde(rename = "HI_RES_LOSSLESS")]
    HiResLossless,
}

impl TidalQuality {
    pub fn as_str(self) -> &'static str {
        match self {
            TidalQuality::Lossless => "LOSSLESS",
            TidalQuality::HiResLossless => "HI_RES_LOSSLESS",
        }
    }
}

/// Qobuz format ids: 16-bit CD, 24-bit up to 96 kHz, 24-bit up to 192 kHz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QobuzQuality {
    #[default]
    #[serde(rename = "6")]
    Cd,
    #[serde(rename = "7")]
    HiRes96,
    #[serde(rename = "27")]
    HiRes192,
}

impl QobuzQuality {
    pub fn as_str(self) -> &'static str {
        match self {
            QobuzQuality::Cd => "6",
            QobuzQuality::HiRes96 => "7",
            QobuzQuality::HiRes192 => "27",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadSettings {
    #[serde(default = "default_download_path")]
    pub download_path: PathBuf,
    #[serde(default)]
    pub downloader: Downloader,
    #[serde(default)]
    pub folder_template: String,
    #[serde(default = "default_filename_template")]
    pub filename_template: String,
    #[serde(default)]
    pub track_number: bool,
    #[serde(default)]
    pub embed_lyrics: bool,
    #[serde(default)]
    pub embed_max_quality_cover: bool,
    #[serde(default)]
    pub operating_system: OperatingSystem,
    #[serde(default)]
    pub tidal_quality: TidalQuality,
    #[serde(default)]
    pub qobuz_quality: QobuzQuality,
}

fn default_download_path() -> PathBuf {
    DesktopPaths.music_dir()
}

pub fn default_filename_template() -> String {
    "{title} - {artist}".into()
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            download_path: default_download_path(),
            downloader: Downloader::Auto,
            folder_template: String::new(),
            filename_template: default_filename_template(),
            track_number: false,
            embed_lyrics: false,
            embed_max_quality_cover: false,
            operating_system: OperatingSystem::host(),
            tidal_quality: TidalQuality::default(),
            qobuz_quality: QobuzQuality::default(),
        }
    }
}

pub struct TemplatePreset {
    pub label: &'static str,
    pub template: &'static str,
}

pub const FOLDER_PRESETS: &[TemplatePreset] = &[
    TemplatePreset { label: "No subfolder", template: "" },
    TemplatePreset { label: "Artist", template: "{artist}" },
    TemplatePreset { label: "Album", template: "{album}" },
    TemplatePreset { label: "Artist / Album", template: "{artist}/{album}" },
    TemplatePreset { label: "Album Artist / Album", template: "{album_artist}/{album}" },
    TemplatePreset { label: "Year - Album", template: "{year} - {album}" },
    TemplatePreset { label: "Artist / Year - Album", template: "{artist}/{year} - {album}" },
    TemplatePreset { label: "Playlist", template: "{playlist}" },
];

pub const FILENAME_PRESETS: &[TemplatePreset] = &[
    TemplatePreset { label: "Title", template: "{title}" },
    TemplatePreset { label: "Title - Artist", template: "{title} - {artist}" },
    TemplatePreset { label: "Artist - Title", template: "{artist} - {title}" },
    TemplatePreset { label: "Track. Title", template: "{track}. {title}" },
    TemplatePreset { label: "Track. Title - Artist", template: "{track}. {title} - {artist}" },
    TemplatePreset { label: "Track. Artist - Title", template: "{track}. {artist} - {title}" },
];

/// Settings frozen and validated once at batch start.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub base_dir: String,
    pub mode: SourceMode,
    pub folder_template: String,
    pub filename_template: String,
    pub embed_lyrics: bool,
    pub embed_max_quality_cover: bool,
    pub os: OperatingSystem,
    pub tidal_quality: TidalQuality,
    pub qobuz_quality: QobuzQuality,
}

impl BatchConfig {
    /// Album folders number files by the album's own track order.
    pub fn use_album_track_number(&self) -> bool {
        self.folder_template.contains("{album}")
    }

    pub fn quality_for(&self, source: Source) -> Option<String> {
        match source {
            Source::Tidal => Some(self.tidal_quality.as_str().to_string()),
            Source::Qobuz => Some(self.qobuz_quality.as_str().to_string()),
            Source::Amazon => None,
        }
    }
}

impl DownloadSettings {
    pub fn to_batch_config(&self) -> anyhow::Result<BatchConfig> {
        let base_dir = self.download_path.to_string_lossy().trim().to_string();
        if base_dir.is_empty() {
            anyhow::bail!("Download path is not set");
        }

        let mut filename_template = self.filename_template.trim().to_string();
        if filename_template.is_empty() {
            filename_template = default_filename_template();
        }
        if self.track_number && !filename_template.contains("{track}") {
            filename_template = format!("{{track}}. {}", filename_template);
        }

        Ok(BatchConfig {
            base_dir,
            mode: self.downloader.mode(),
            folder_template: self.folder_template.trim().to_string(),
            filename_template,
            embed_lyrics: self.embed_lyrics,
            embed_max_quality_cover: self.embed_max_quality_cover,
            os: self.operating_system,
            tidal_quality: self.tidal_quality,
            qobuz_quality: self.qobuz_quality,
        })
    }
}

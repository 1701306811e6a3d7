use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Everything a content source needs for one attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Shared by every attempt made for the same queue item.
    pub item_id: String,
    pub isrc: String,
    pub spotify_id: String,
    pub track_name: String,
    pub artist_name: String,
    pub album_name: String,
    pub album_artist: String,
    pub release_date: String,
    pub duration_secs: u64,
    pub cover_url: String,
    pub output_dir: PathBuf,
    /// Resolved file stem, without extension.
    pub filename: String,
    pub filename_template: String,
    pub position: u32,
    pub track_number: u32,
    pub disc_number: u32,
    pub total_tracks: u32,
    pub use_album_track_number: bool,
    pub service_url: Option<String>,
    pub quality: Option<String>,
    pub embed_lyrics: bool,
    pub embed_max_quality_cover: bool,
}

impl FetchRequest {
    pub fn expected_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.flac", self.filename))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchResponse {
    pub success: bool,
    #[serde(default)]
    pub already_exists: bool,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl FetchResponse {
    pub fn downloaded(file_path: impl Into<String>) -> Self {
        Self {
            success: true,
            file_path: Some(file_path.into()),
            ..Default::default()
        }
    }

    pub fn exists(file_path: impl Into<String>) -> Self {
        Self {
            success: true,
            already_exists: true,
            file_path: Some(file_path.into()),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FetchProgress {
    pub downloaded_bytes: u64,
}

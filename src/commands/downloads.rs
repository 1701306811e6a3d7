use std::path::Path;

use flacdl_core::core::batch::{BatchReport, TrackOutcome};
use flacdl_core::core::queue::{ProgressInfo, QueueSnapshot};
use serde::Serialize;

use crate::models::manifest::Manifest;
use crate::AppState;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum DownloadSummary {
    Batch(BatchReport),
    Track(TrackOutcome),
}

impl DownloadSummary {
    pub fn is_failure(&self) -> bool {
        match self {
            DownloadSummary::Batch(report) => report.outcome.is_failure(),
            DownloadSummary::Track(outcome) => matches!(outcome, TrackOutcome::Failed { .. }),
        }
    }

    pub fn message(&self) -> String {
        match self {
            DownloadSummary::Batch(report) => match &report.stop_notice {
                Some(notice) => notice.clone(),
                None => report.outcome.message(),
            },
            DownloadSummary::Track(TrackOutcome::Downloaded { file_path }) => {
                format!("Downloaded {}", file_path)
            }
            DownloadSummary::Track(TrackOutcome::Skipped { file_path }) => {
                format!("Already in library: {}", file_path)
            }
            DownloadSummary::Track(TrackOutcome::Failed { error }) => {
                format!("Download failed: {}", error)
            }
        }
    }
}

pub async fn load_manifest(path: &Path) -> Result<Manifest, String> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    serde_json::from_str(&raw).map_err(|e| format!("Invalid manifest: {}", e))
}

/// Runs a manifest. A lone track in single context takes the direct
/// path; anything else becomes a batch, optionally narrowed to `only`.
pub async fn start_download(
    state: &AppState,
    manifest: &Manifest,
    only: &[String],
) -> Result<DownloadSummary, String> {
    let config = state
        .settings
        .download
        .to_batch_config()
        .map_err(|e| e.to_string())?;

    if only.is_empty() && manifest.is_single_track() {
        return state
            .coordinator
            .download_track(&manifest.tracks[0], &manifest.context, &config)
            .await
            .map(DownloadSummary::Track)
            .map_err(|e| e.to_string());
    }

    let report = if only.is_empty() {
        state
            .coordinator
            .download_all(&manifest.tracks, &manifest.context, &config)
            .await
    } else {
        state
            .coordinator
            .download_selected(only, &manifest.tracks, &manifest.context, &config)
            .await
    };
    report.map(DownloadSummary::Batch).map_err(|e| e.to_string())
}

pub fn stop_download(state: &AppState) {
    state.stop.stop();
}

pub fn get_queue_state(state: &AppState) -> QueueSnapshot {
    state.queue.snapshot()
}

pub fn get_live_progress(state: &AppState) -> ProgressInfo {
    state.queue.live_progress()
}

use flacdl_core::models::track::{DownloadContext, TrackRef};
use serde::{Deserialize, Serialize};

/// Batch description as exported by the catalog lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub context: DownloadContext,
    pub tracks: Vec<TrackRef>,
}

impl Manifest {
    pub fn is_single_track(&self) -> bool {
        self.context == DownloadContext::Single && self.tracks.len() == 1
    }
}

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::fetch::{FetchProgress, FetchRequest, FetchResponse};
use crate::sources::Source;

/// One content source able to locate, download and tag a track.
///
/// Ordinary failures are reported as `FetchResponse { success: false, .. }`.
/// An `Err` is reserved for unexpected breakage and is treated the same way
/// by the fallback chain.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch(
        &self,
        request: &FetchRequest,
        progress: tokio::sync::mpsc::Sender<FetchProgress>,
    ) -> anyhow::Result<FetchResponse>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamingUrls {
    pub tidal_url: Option<String>,
    pub amazon_url: Option<String>,
}

impl StreamingUrls {
    pub fn for_source(&self, source: Source) -> Option<&str> {
        match source {
            Source::Tidal => self.tidal_url.as_deref(),
            Source::Amazon => self.amazon_url.as_deref(),
            Source::Qobuz => None,
        }
    }
}

/// Maps a catalog track ID to the per-source streaming URLs.
#[async_trait]
pub trait LinkResolver: Send + Sync {
    async fn resolve(&self, track_id: &str) -> anyhow::Result<StreamingUrls>;
}

use serde::{Deserialize, Serialize};

/// A track as handed over by the catalog service. Immutable once a batch starts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackRef {
    /// Catalog track ID, also the key for streaming-link lookup.
    pub id: String,
    #[serde(default)]
    pub isrc: Option<String>,
    pub name: String,
    #[serde(default)]
    pub artists: Option<String>,
    #[serde(default)]
    pub album_name: Option<String>,
    #[serde(default)]
    pub album_artist: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub track_number: Option<u32>,
    #[serde(default)]
    pub disc_number: Option<u32>,
    #[serde(default)]
    pub total_tracks: Option<u32>,
    #[serde(default)]
    pub cover_url: Option<String>,
}

impl TrackRef {
    /// Stable identity: the ISRC when known, the catalog ID otherwise.
    pub fn identity(&self) -> String {
        match self.isrc.as_deref().map(str::trim) {
            Some(isrc) if !isrc.is_empty() => isrc.to_uppercase(),
            _ => self.id.clone(),
        }
    }

    pub fn has_isrc(&self) -> bool {
        self.isrc.as_deref().is_some_and(|i| !i.trim().is_empty())
    }

    pub fn artist_name(&self) -> &str {
        self.artists.as_deref().unwrap_or_default()
    }

    pub fn album(&self) -> &str {
        self.album_name.as_deref().unwrap_or_default()
    }
}

/// Where a batch was started from. Playlists and discographies get their own
/// collection folder; albums rely on the folder template instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "snake_case")]
pub enum DownloadContext {
    #[default]
    Single,
    Album(String),
    Playlist(String),
    Discography(String),
}

impl DownloadContext {
    pub fn collection_folder(&self) -> Option<&str> {
        match self {
            DownloadContext::Playlist(name) | DownloadContext::Discography(name) => {
                Some(name.as_str()).filter(|n| !n.trim().is_empty())
            }
            DownloadContext::Single | DownloadContext::Album(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_prefers_isrc() {
        let track = TrackRef {
            id: "4uLU6hMCjMI75M1A2tKUQC".into(),
            isrc: Some(" usrc17607839 ".into()),
            name: "Never".into(),
            ..Default::default()
        };
        assert_eq!(track.identity(), "USRC17607839");

        let bare = TrackRef {
            id: "abc".into(),
            isrc: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(bare.identity(), "abc");
        assert!(!bare.has_isrc());
    }

    #[test]
    fn album_has_no_collection_folder() {
        assert_eq!(DownloadContext::Album("Dummy".into()).collection_folder(), None);
        assert_eq!(
            DownloadContext::Playlist("Road Trip".into()).collection_folder(),
            Some("Road Trip")
        );
        assert_eq!(DownloadContext::Discography(" ".into()).collection_folder(), None);
    }

    #[test]
    fn context_json_shape() {
        let ctx: DownloadContext =
            serde_json::from_str(r#"{"type":"playlist","name":"Mix"}"#).unwrap();
        assert_eq!(ctx, DownloadContext::Playlist("Mix".into()));
        let single: DownloadContext = serde_json::from_str(r#"{"type":"single"}"#).unwrap();
        assert_eq!(single, DownloadContext::Single);
    }
}

pub mod registry;
pub mod traits;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Tidal,
    Amazon,
    Qobuz,
}

impl Source {
    /// Priority order used in automatic mode.
    pub const PRIORITY: [Source; 3] = [Source::Tidal, Source::Amazon, Source::Qobuz];

    /// Link-addressed sources can only be tried automatically once a
    /// streaming URL for the track is known. Qobuz matches by ISRC.
    pub fn needs_link(self) -> bool {
        matches!(self, Source::Tidal | Source::Amazon)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Source::Tidal => "tidal",
            Source::Amazon => "amazon",
            Source::Qobuz => "qobuz",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tidal" => Ok(Source::Tidal),
            "amazon" | "amazonmusic" => Ok(Source::Amazon),
            "qobuz" => Ok(Source::Qobuz),
            other => Err(anyhow::anyhow!("Unknown source: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    Auto,
    Single(Source),
}

impl FromStr for SourceMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("auto") {
            return Ok(SourceMode::Auto);
        }
        s.parse().map(SourceMode::Single)
    }
}

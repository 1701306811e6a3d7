use std::collections::HashMap;

use flacdl_core::models::settings::DownloadSettings;
use flacdl_core::sources::Source;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub download: DownloadSettings,
    #[serde(default)]
    pub sources: SourceCommands,
    #[serde(default)]
    pub advanced: AdvancedSettings,
}

/// External program that fetches from one source. It receives the fetch
/// request as JSON on stdin and answers with JSON lines on stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceCommands {
    #[serde(default)]
    pub tidal: Option<SourceCommand>,
    #[serde(default)]
    pub amazon: Option<SourceCommand>,
    #[serde(default)]
    pub qobuz: Option<SourceCommand>,
}

impl SourceCommands {
    pub fn get(&self, source: Source) -> Option<&SourceCommand> {
        match source {
            Source::Tidal => self.tidal.as_ref(),
            Source::Amazon => self.amazon.as_ref(),
            Source::Qobuz => self.qobuz.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedSettings {
    #[serde(default = "default_true")]
    pub songlink_enabled: bool,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default)]
    pub proxy_url: Option<String>,
}

fn default_schema_version() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

fn default_fetch_timeout_secs() -> u64 {
    30 * 60
}

fn default_http_timeout_secs() -> u64 {
    30
}

impl Default for AdvancedSettings {
    fn default() -> Self {
        Self {
            songlink_enabled: true,
            fetch_timeout_secs: default_fetch_timeout_secs(),
            http_timeout_secs: default_http_timeout_secs(),
            proxy_url: None,
        }
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            download: DownloadSettings::default(),
            sources: SourceCommands::default(),
            advanced: AdvancedSettings::default(),
        }
    }
}

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use flacdl_core::models::settings::{FILENAME_PRESETS, FOLDER_PRESETS};
use flacdl_core::sources::SourceMode;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::commands::{downloads, library, settings};
use crate::storage::config;
use crate::AppState;

const LIVE_PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Parser)]
#[command(name = "flacdl", version, about = "Download lossless tracks with multi-source fallback")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Download the tracks listed in a manifest file
    Download {
        manifest: PathBuf,
        /// Catalog IDs or ISRCs to download, in this order
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,
        /// auto, tidal, amazon or qobuz
        #[arg(long, value_parser = parse_source_mode)]
        source: Option<SourceMode>,
        /// Library root, overriding the stored download path
        #[arg(long)]
        output: Option<PathBuf>,
        /// Print the report and final queue as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show or change stored settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Look for tagged FLAC files in a directory
    Scan {
        dir: PathBuf,
        #[arg(long, value_delimiter = ',')]
        isrc: Vec<String>,
        #[arg(long)]
        follow_links: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum SettingsAction {
    Show,
    Reset,
    /// List the built-in folder and filename templates
    Presets,
    /// Merge a JSON object into the stored settings
    Set { patch: String },
}

fn parse_source_mode(raw: &str) -> Result<SourceMode, String> {
    raw.parse::<SourceMode>().map_err(|e| e.to_string())
}

pub async fn dispatch(cli: Cli) -> anyhow::Result<ExitCode> {
    let settings_path = config::settings_path();

    match cli.command {
        Command::Download {
            manifest,
            only,
            source,
            output,
            json,
        } => {
            let mut current = config::load_settings(&settings_path);
            if let Some(mode) = source {
                current.download.downloader = mode.into();
            }
            if let Some(dir) = output {
                current.download.download_path = dir;
            }

            let manifest = downloads::load_manifest(&manifest)
                .await
                .map_err(anyhow::Error::msg)?;
            let state = Arc::new(AppState::from_settings(current)?);

            let watchers = spawn_watchers(&state);
            let result = downloads::start_download(&state, &manifest, &only).await;
            for watcher in watchers {
                watcher.abort();
            }

            let summary = match result {
                Ok(summary) => summary,
                Err(e) => {
                    tracing::error!("{}", e);
                    return Ok(ExitCode::FAILURE);
                }
            };

            if json {
                let out = serde_json::json!({
                    "summary": summary,
                    "queue": downloads::get_queue_state(&state),
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("{}", summary.message());
            }

            Ok(if summary.is_failure() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
        Command::Settings { action } => {
            let current = match action {
                SettingsAction::Show => settings::get_settings(&settings_path),
                SettingsAction::Reset => settings::reset_settings(&settings_path),
                SettingsAction::Set { patch } => settings::update_settings(&settings_path, &patch),
                SettingsAction::Presets => {
                    for (kind, presets) in [("folder", FOLDER_PRESETS), ("filename", FILENAME_PRESETS)] {
                        for preset in presets {
                            println!("{}\t{}\t{}", kind, preset.label, preset.template);
                        }
                    }
                    return Ok(ExitCode::SUCCESS);
                }
            }
            .map_err(anyhow::Error::msg)?;
            println!("{}", serde_json::to_string_pretty(&current)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Scan {
            dir,
            isrc,
            follow_links,
        } => {
            let state = AppState::from_settings(config::load_settings(&settings_path))?;
            let results = library::scan_library(&state, &dir, &isrc, follow_links)
                .await
                .map_err(anyhow::Error::msg)?;
            for result in &results {
                match &result.file_path {
                    Some(path) if result.exists => println!("{}\t{}", result.identity, path),
                    _ => println!("{}\tmissing", result.identity),
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Ctrl-C handling plus a ticker that logs live throughput.
fn spawn_watchers(state: &Arc<AppState>) -> Vec<JoinHandle<()>> {
    let (forwarder, interrupts) = forward_ctrl_c();
    let stop_state = state.clone();
    let ctrl_c = tokio::spawn(async move {
        if watch_interrupts(interrupts, || downloads::stop_download(&stop_state)).await {
            tracing::error!("Interrupted");
            std::process::exit(130);
        }
    });

    let progress_state = state.clone();
    let ticker = tokio::spawn(async move {
        let mut interval = tokio::time::interval(LIVE_PROGRESS_INTERVAL);
        let mut last_mb = 0.0_f64;
        loop {
            interval.tick().await;
            let info = downloads::get_live_progress(&progress_state);
            if info.is_downloading && info.speed_mbps > 0.0 && info.mb_downloaded != last_mb {
                tracing::info!(
                    "{:.2} MB at {:.2} MB/s",
                    info.mb_downloaded,
                    info.speed_mbps
                );
                last_mb = info.mb_downloaded;
            }
        }
    });

    vec![forwarder, ctrl_c, ticker]
}

fn forward_ctrl_c() -> (JoinHandle<()>, mpsc::Receiver<()>) {
    let (tx, rx) = mpsc::channel(2);
    let forwarder = tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(()).await.is_err() {
                break;
            }
        }
    });
    (forwarder, rx)
}

/// The first interrupt requests a stop between tracks. Returns true when a
/// second one arrives and the process should exit.
async fn watch_interrupts(mut interrupts: mpsc::Receiver<()>, stop: impl FnOnce()) -> bool {
    if interrupts.recv().await.is_none() {
        return false;
    }
    tracing::warn!("Stop requested, finishing the current track (Ctrl-C again to quit)");
    stop();
    interrupts.recv().await.is_some()
}

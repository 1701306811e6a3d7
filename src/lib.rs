use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use flacdl_core::core::batch::{BatchCoordinator, StopSignal};
use flacdl_core::core::existence::LibraryScanner;
use flacdl_core::core::fallback::FallbackStrategy;
use flacdl_core::core::queue::DownloadQueue;
use flacdl_core::sources::registry::SourceRegistry;
use flacdl_core::sources::Source;
use tracing_subscriber::EnvFilter;

pub mod cli;
pub mod commands;
pub mod core;
pub mod models;
pub mod storage;

use crate::core::command_fetcher::CommandFetcher;
use crate::core::events::LogEventEmitter;
use crate::core::http_client;
use crate::core::songlink::SongLinkClient;
use crate::models::settings::AppSettings;

pub struct AppState {
    pub settings: AppSettings,
    pub queue: DownloadQueue,
    pub coordinator: Arc<BatchCoordinator>,
    pub stop: StopSignal,
    pub scanner: LibraryScanner,
}

impl AppState {
    pub fn from_settings(settings: AppSettings) -> anyhow::Result<Self> {
        let queue = DownloadQueue::new();
        let timeout = Duration::from_secs(settings.advanced.fetch_timeout_secs.max(1));

        let mut registry = SourceRegistry::new();
        for source in Source::PRIORITY {
            if let Some(command) = settings.sources.get(source) {
                registry.register(
                    source,
                    Arc::new(CommandFetcher::new(source, command.clone(), timeout)),
                );
            }
        }
        if registry.is_empty() {
            tracing::warn!("No source helpers configured; downloads will fail");
        }

        let mut strategy = FallbackStrategy::new(Arc::new(registry), queue.clone());
        if settings.advanced.songlink_enabled {
            let client = http_client::build_client(&settings.advanced)?;
            strategy = strategy.with_link_resolver(Arc::new(SongLinkClient::new(client)));
        }

        let scanner = LibraryScanner::new();
        let stop = StopSignal::new();
        let coordinator = BatchCoordinator::new(queue.clone(), strategy, Arc::new(scanner.clone()))
            .with_emitter(Arc::new(LogEventEmitter))
            .with_stop_signal(stop.clone());

        Ok(Self {
            settings,
            queue,
            coordinator: Arc::new(coordinator),
            stop,
            scanner,
        })
    }
}

pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(cli::dispatch(args)) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

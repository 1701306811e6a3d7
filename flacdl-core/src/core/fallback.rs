use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;

use crate::core::queue::{DownloadQueue, ProgressThrottle};
use crate::models::fetch::{FetchProgress, FetchRequest, FetchResponse};
use crate::models::settings::BatchConfig;
use crate::models::track::TrackRef;
use crate::sources::registry::SourceRegistry;
use crate::sources::traits::{ContentFetcher, LinkResolver, StreamingUrls};
use crate::sources::{Source, SourceMode};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Where and how one track should be written.
#[derive(Debug, Clone)]
pub struct ItemPlan {
    pub output_dir: String,
    pub filename: String,
    pub position: u32,
    pub track_number: u32,
    pub use_album_track_number: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceAttempt {
    pub source: Source,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FallbackOutcome {
    Completed { source: Source, file_path: String },
    AlreadyExists { source: Source, file_path: String },
    /// `error` is the last attempted source's message; `attempts` keeps them all.
    Exhausted { error: String, attempts: Vec<SourceAttempt> },
}

enum ChainState {
    Pending,
    Trying(usize),
    Exhausted,
}

enum Step {
    Advance(SourceAttempt),
    Stop(FallbackOutcome),
}

struct Candidate {
    source: Source,
    fetcher: Arc<dyn ContentFetcher>,
    service_url: Option<String>,
}

pub struct FallbackStrategy {
    registry: Arc<SourceRegistry>,
    resolver: Option<Arc<dyn LinkResolver>>,
    queue: DownloadQueue,
}

impl FallbackStrategy {
    pub fn new(registry: Arc<SourceRegistry>, queue: DownloadQueue) -> Self {
        Self {
            registry,
            resolver: None,
            queue,
        }
    }

    pub fn with_link_resolver(mut self, resolver: Arc<dyn LinkResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub async fn run(
        &self,
        item_id: &str,
        track: &TrackRef,
        plan: &ItemPlan,
        config: &BatchConfig,
    ) -> FallbackOutcome {
        let urls = self.lookup_links(track, config.mode).await;
        let chain = self.candidates(config.mode, &urls);
        let base = base_request(item_id, track, plan, config);

        let mut attempts: Vec<SourceAttempt> = Vec::new();
        let mut state = ChainState::Pending;
        loop {
            state = match state {
                ChainState::Pending if chain.is_empty() => ChainState::Exhausted,
                ChainState::Pending => ChainState::Trying(0),
                ChainState::Trying(i) => {
                    let candidate = &chain[i];
                    let mut request = base.clone();
                    request.service_url = candidate.service_url.clone();
                    request.quality = config.quality_for(candidate.source);

                    match self.attempt(candidate, &request).await {
                        Step::Stop(outcome) => return outcome,
                        Step::Advance(attempt) => {
                            attempts.push(attempt);
                            if i + 1 < chain.len() {
                                ChainState::Trying(i + 1)
                            } else {
                                ChainState::Exhausted
                            }
                        }
                    }
                }
                ChainState::Exhausted => {
                    let error = exhausted_message(config.mode, &chain, &attempts);
                    tracing::error!("[fallback] '{}' failed: {}", track.name, error);
                    return FallbackOutcome::Exhausted { error, attempts };
                }
            };
        }
    }

    async fn lookup_links(&self, track: &TrackRef, mode: SourceMode) -> StreamingUrls {
        let linked: Vec<Source> = match mode {
            SourceMode::Auto => Source::PRIORITY.to_vec(),
            SourceMode::Single(source) => vec![source],
        };
        let wanted = linked
            .into_iter()
            .any(|s| s.needs_link() && self.registry.find(s).is_some());
        let resolver = match &self.resolver {
            Some(r) if wanted && !track.id.trim().is_empty() => r,
            _ => return StreamingUrls::default(),
        };
        match resolver.resolve(&track.id).await {
            Ok(urls) => urls,
            Err(e) => {
                tracing::warn!("[fallback] link lookup failed for '{}': {}", track.name, e);
                StreamingUrls::default()
            }
        }
    }

    fn candidates(&self, mode: SourceMode, urls: &StreamingUrls) -> Vec<Candidate> {
        let sources: Vec<Source> = match mode {
            SourceMode::Auto => Source::PRIORITY
                .into_iter()
                .filter(|s| !s.needs_link() || urls.for_source(*s).is_some())
                .collect(),
            SourceMode::Single(source) => vec![source],
        };
        sources
            .into_iter()
            .filter_map(|source| {
                let fetcher = self.registry.find(source)?;
                Some(Candidate {
                    source,
                    fetcher,
                    service_url: urls.for_source(source).map(str::to_string),
                })
            })
            .collect()
    }

    async fn attempt(&self, candidate: &Candidate, request: &FetchRequest) -> Step {
        tracing::info!(
            "[fallback] trying {} for '{}'",
            candidate.source,
            request.track_name
        );
        self.queue.begin_attempt(&request.item_id);

        let (tx, rx) = mpsc::channel::<FetchProgress>(32);
        let forwarder = spawn_progress_forwarder(self.queue.clone(), request.item_id.clone(), rx);
        let result = candidate.fetcher.fetch(request, tx).await;
        let _ = forwarder.await;

        let error = match result {
            Ok(FetchResponse {
                success: true,
                already_exists,
                file_path,
                ..
            }) => {
                let file_path = file_path
                    .filter(|p| !p.is_empty())
                    .unwrap_or_else(|| request.expected_path().to_string_lossy().to_string());
                let source = candidate.source;
                return Step::Stop(if already_exists {
                    tracing::info!("[fallback] already present: {}", file_path);
                    FallbackOutcome::AlreadyExists { source, file_path }
                } else {
                    tracing::info!("[fallback] {} delivered {}", source, file_path);
                    FallbackOutcome::Completed { source, file_path }
                });
            }
            Ok(response) => response.error.unwrap_or_default(),
            Err(e) => format!("{:#}", e),
        };

        tracing::warn!(
            "[fallback] {} failed for '{}': {}",
            candidate.source,
            request.track_name,
            if error.is_empty() { "no error given" } else { error.as_str() }
        );
        Step::Advance(SourceAttempt {
            source: candidate.source,
            error,
        })
    }
}

fn exhausted_message(mode: SourceMode, chain: &[Candidate], attempts: &[SourceAttempt]) -> String {
    if chain.is_empty() {
        return "No content source available".to_string();
    }
    match attempts.last() {
        Some(last) if !last.error.trim().is_empty() => last.error.clone(),
        _ => match mode {
            SourceMode::Auto => "All services failed".to_string(),
            SourceMode::Single(_) => "Download failed".to_string(),
        },
    }
}

fn base_request(item_id: &str, track: &TrackRef, plan: &ItemPlan, config: &BatchConfig) -> FetchRequest {
    FetchRequest {
        item_id: item_id.to_string(),
        isrc: track.isrc.clone().unwrap_or_default(),
        spotify_id: track.id.clone(),
        track_name: track.name.clone(),
        artist_name: track.artist_name().to_string(),
        album_name: track.album().to_string(),
        album_artist: track.album_artist.clone().unwrap_or_default(),
        release_date: track.release_date.clone().unwrap_or_default(),
        duration_secs: track.duration_ms.map(|ms| (ms + 500) / 1000).unwrap_or(0),
        cover_url: track.cover_url.clone().unwrap_or_default(),
        output_dir: plan.output_dir.clone().into(),
        filename: plan.filename.clone(),
        filename_template: config.filename_template.clone(),
        position: plan.position,
        track_number: plan.track_number,
        disc_number: track.disc_number.unwrap_or(1),
        total_tracks: track.total_tracks.unwrap_or(0),
        use_album_track_number: plan.use_album_track_number,
        service_url: None,
        quality: None,
        embed_lyrics: config.embed_lyrics,
        embed_max_quality_cover: config.embed_max_quality_cover,
    }
}

fn spawn_progress_forwarder(
    queue: DownloadQueue,
    item_id: String,
    mut rx: mpsc::Receiver<FetchProgress>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut throttle = ProgressThrottle::new(150);
        let mut last_bytes: u64 = 0;
        let mut last_time = Instant::now();
        let mut current_speed: f64 = 0.0;

        while let Some(progress) = rx.recv().await {
            if !throttle.should_emit() {
                continue;
            }
            let now = Instant::now();
            let bytes = progress.downloaded_bytes;
            if bytes > last_bytes {
                let dt = now.duration_since(last_time).as_secs_f64();
                if dt > 0.1 {
                    let instant_speed = (bytes - last_bytes) as f64 / BYTES_PER_MB / dt;
                    current_speed = if current_speed > 0.0 {
                        current_speed * 0.7 + instant_speed * 0.3
                    } else {
                        instant_speed
                    };
                }
            }
            last_bytes = bytes;
            last_time = now;
            queue.update_progress(&item_id, bytes as f64 / BYTES_PER_MB, current_speed);
        }
    })
}

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::bail;
use futures::FutureExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::core::events::{BatchProgress, EventEmitter, NoopEmitter};
use crate::core::existence::{ExistenceChecker, ExistenceQuery};
use crate::core::fallback::{FallbackOutcome, FallbackStrategy, ItemPlan};
use crate::core::queue::DownloadQueue;
use crate::core::template::{TemplateContext, TemplateResolver};
use crate::models::settings::BatchConfig;
use crate::models::track::{DownloadContext, TrackRef};

/// Cooperative stop flag, polled between items. Cloning shares the flag.
#[derive(Clone, Default)]
pub struct StopSignal {
    token: Arc<Mutex<CancellationToken>>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&self) -> CancellationToken {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn stop(&self) {
        self.current().cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.current().is_cancelled()
    }

    pub fn reset(&self) {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = CancellationToken::new();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BatchOutcome {
    AllDownloaded { downloaded: usize },
    AllPresent { skipped: usize },
    Mixed { downloaded: usize, skipped: usize },
    Failed { downloaded: usize, skipped: usize, failed: usize },
}

impl BatchOutcome {
    pub fn classify(downloaded: usize, skipped: usize, failed: usize) -> Self {
        if failed > 0 {
            BatchOutcome::Failed {
                downloaded,
                skipped,
                failed,
            }
        } else if skipped == 0 {
            BatchOutcome::AllDownloaded { downloaded }
        } else if downloaded == 0 {
            BatchOutcome::AllPresent { skipped }
        } else {
            BatchOutcome::Mixed {
                downloaded,
                skipped,
            }
        }
    }

    pub fn message(&self) -> String {
        match self {
            BatchOutcome::AllDownloaded { downloaded } => {
                format!("Downloaded {} tracks successfully", downloaded)
            }
            BatchOutcome::AllPresent { skipped } => format!("{} tracks already exist", skipped),
            BatchOutcome::Mixed {
                downloaded,
                skipped,
            } => format!("{} downloaded, {} skipped", downloaded, skipped),
            BatchOutcome::Failed {
                downloaded,
                skipped,
                failed,
            } => {
                let parts: Vec<String> = [
                    (*downloaded, "downloaded"),
                    (*skipped, "skipped"),
                    (*failed, "failed"),
                ]
                .iter()
                .filter(|(n, _)| *n > 0)
                .map(|(n, label)| format!("{} {}", n, label))
                .collect();
                parts.join(", ")
            }
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, BatchOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Items never started because the batch was stopped.
    pub cancelled: usize,
    pub stopped: bool,
    pub outcome: BatchOutcome,
    pub stop_notice: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrackOutcome {
    Downloaded { file_path: String },
    Skipped { file_path: String },
    Failed { error: String },
}

pub struct BatchCoordinator {
    queue: DownloadQueue,
    strategy: FallbackStrategy,
    existence: Arc<dyn ExistenceChecker>,
    emitter: Arc<dyn EventEmitter>,
    stop: StopSignal,
    progress: Mutex<Option<BatchProgress>>,
}

impl BatchCoordinator {
    pub fn new(
        queue: DownloadQueue,
        strategy: FallbackStrategy,
        existence: Arc<dyn ExistenceChecker>,
    ) -> Self {
        Self {
            queue,
            strategy,
            existence,
            emitter: Arc::new(NoopEmitter),
            stop: StopSignal::new(),
            progress: Mutex::new(None),
        }
    }

    pub fn with_emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn queue(&self) -> &DownloadQueue {
        &self.queue
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Latest batch progress, kept for observers that poll.
    pub fn current_progress(&self) -> Option<BatchProgress> {
        self.progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Downloads every track that carries an ISRC, in list order.
    pub async fn download_all(
        &self,
        tracks: &[TrackRef],
        context: &DownloadContext,
        config: &BatchConfig,
    ) -> anyhow::Result<BatchReport> {
        let tracks: Vec<TrackRef> = tracks.iter().filter(|t| t.has_isrc()).cloned().collect();
        if tracks.is_empty() {
            bail!("No tracks available for download");
        }
        self.run_batch(tracks, context, config).await
    }

    /// Downloads the tracks whose catalog ID or ISRC is in `selected`, in selection order.
    pub async fn download_selected(
        &self,
        selected: &[String],
        tracks: &[TrackRef],
        context: &DownloadContext,
        config: &BatchConfig,
    ) -> anyhow::Result<BatchReport> {
        let mut seen = HashSet::new();
        let picked: Vec<TrackRef> = selected
            .iter()
            .filter_map(|key| {
                tracks.iter().find(|t| {
                    t.id == *key || t.isrc.as_deref().is_some_and(|i| i.eq_ignore_ascii_case(key))
                })
            })
            .filter(|t| seen.insert(t.id.clone()))
            .cloned()
            .collect();
        if picked.is_empty() {
            bail!("No tracks selected");
        }
        self.run_batch(picked, context, config).await
    }

    /// Single-track download. No pre-flight; the source reports an existing file.
    pub async fn download_track(
        &self,
        track: &TrackRef,
        context: &DownloadContext,
        config: &BatchConfig,
    ) -> anyhow::Result<TrackOutcome> {
        if !self.queue.try_start() {
            bail!("A download batch is already running");
        }
        let item_id = self.queue.enqueue(track);
        let resolver = TemplateResolver::new(config.os);
        let shared_dir = resolver.collection_dir(&config.base_dir, context.collection_folder());
        let position = track.track_number.filter(|n| *n > 0).unwrap_or(1);
        let plan = plan_item(track, position, &shared_dir, context, config);

        let outcome = self.process_item(&item_id, track, &plan, config).await;
        self.stop.reset();
        self.queue.set_downloading(false);
        self.emit_queue_state();
        Ok(outcome)
    }

    async fn run_batch(
        &self,
        tracks: Vec<TrackRef>,
        context: &DownloadContext,
        config: &BatchConfig,
    ) -> anyhow::Result<BatchReport> {
        if !self.queue.try_start() {
            bail!("A download batch is already running");
        }

        let total = tracks.len();
        let resolver = TemplateResolver::new(config.os);
        let shared_dir = resolver.collection_dir(&config.base_dir, context.collection_folder());
        tracing::info!("[batch] {} tracks into '{}'", total, shared_dir);

        let existing = self.preflight(&shared_dir, &tracks).await;
        let ids: Vec<String> = tracks.iter().map(|t| self.queue.enqueue(t)).collect();

        let mut skipped = 0;
        let mut pending = Vec::with_capacity(total);
        for (index, track) in tracks.iter().enumerate() {
            match existing.get(&track.identity()) {
                Some(path) => {
                    self.queue.mark_skipped(&ids[index], path);
                    skipped += 1;
                }
                None => pending.push(index),
            }
        }
        if skipped > 0 {
            tracing::info!("[batch] {} tracks already on disk", skipped);
        }
        self.emit_queue_state();
        self.publish_progress(skipped, total, None);

        let mut downloaded = 0;
        let mut failed = 0;
        let mut stopped = false;
        for index in pending {
            if self.stop.is_stopped() {
                stopped = true;
                break;
            }
            let track = &tracks[index];
            self.publish_progress(downloaded + skipped + failed, total, Some(track.name.clone()));

            let plan = plan_item(track, index as u32 + 1, &shared_dir, context, config);
            match self.process_item(&ids[index], track, &plan, config).await {
                TrackOutcome::Downloaded { .. } => downloaded += 1,
                TrackOutcome::Skipped { .. } => skipped += 1,
                TrackOutcome::Failed { .. } => failed += 1,
            }
            self.publish_progress(downloaded + skipped + failed, total, None);
        }

        self.stop.reset();
        let cancelled = self.queue.cancel_all_queued();
        self.queue.set_downloading(false);
        self.emit_queue_state();

        let outcome = BatchOutcome::classify(downloaded, skipped, failed);
        let stop_notice = stopped.then(|| {
            format!(
                "Download stopped. {} tracks downloaded, {} remaining.",
                downloaded, cancelled
            )
        });
        match &stop_notice {
            Some(notice) => tracing::info!("[batch] {}", notice),
            None => tracing::info!("[batch] {}", outcome.message()),
        }

        Ok(BatchReport {
            total,
            downloaded,
            skipped,
            failed,
            cancelled,
            stopped,
            outcome,
            stop_notice,
        })
    }

    /// Identity to existing file path. A failing checker means nothing is skipped.
    async fn preflight(&self, dir: &str, tracks: &[TrackRef]) -> HashMap<String, String> {
        let queries: Vec<ExistenceQuery> = tracks
            .iter()
            .map(|t| ExistenceQuery {
                identity: t.identity(),
                track_name: t.name.clone(),
                artist_name: t.artist_name().to_string(),
            })
            .collect();

        match self.existence.check(Path::new(dir), &queries).await {
            Ok(results) => results
                .into_iter()
                .filter(|r| r.exists)
                .map(|r| (r.identity, r.file_path.unwrap_or_default()))
                .collect(),
            Err(e) => {
                tracing::warn!("[batch] existence check failed: {}", e);
                HashMap::new()
            }
        }
    }

    async fn process_item(
        &self,
        item_id: &str,
        track: &TrackRef,
        plan: &ItemPlan,
        config: &BatchConfig,
    ) -> TrackOutcome {
        self.queue.mark_downloading(item_id);
        self.emit_queue_state();

        let run = AssertUnwindSafe(self.strategy.run(item_id, track, plan, config))
            .catch_unwind()
            .await;

        let outcome = match run {
            Ok(FallbackOutcome::Completed { file_path, .. }) => {
                let size = file_size_mb(&file_path).await;
                self.queue.mark_completed(item_id, &file_path, size);
                TrackOutcome::Downloaded { file_path }
            }
            Ok(FallbackOutcome::AlreadyExists { file_path, .. }) => {
                self.queue.mark_skipped(item_id, &file_path);
                TrackOutcome::Skipped { file_path }
            }
            Ok(FallbackOutcome::Exhausted { error, .. }) => {
                self.queue.mark_failed(item_id, &error);
                TrackOutcome::Failed { error }
            }
            Err(payload) => {
                let error = panic_message(payload.as_ref());
                tracing::error!("[batch] '{}' aborted: {}", track.name, error);
                self.queue.mark_failed(item_id, &error);
                TrackOutcome::Failed { error }
            }
        };
        self.emit_queue_state();
        outcome
    }

    fn publish_progress(&self, completed: usize, total: usize, current: Option<String>) {
        let progress = BatchProgress::new(completed, total, current);
        self.emitter.emit_batch_progress(&progress);
        *self.progress.lock().unwrap_or_else(PoisonError::into_inner) = Some(progress);
    }

    fn emit_queue_state(&self) {
        self.emitter.emit_queue_state(&self.queue.snapshot());
    }
}

fn plan_item(
    track: &TrackRef,
    position: u32,
    shared_dir: &str,
    context: &DownloadContext,
    config: &BatchConfig,
) -> ItemPlan {
    let use_album_track_number = config.use_album_track_number();
    let track_number = match track.track_number {
        Some(n) if use_album_track_number && n > 0 => n,
        _ => position,
    };
    let ctx = TemplateContext::from_track(track, track_number, context.collection_folder());
    let resolver = TemplateResolver::new(config.os);
    ItemPlan {
        output_dir: resolver.folder_path(shared_dir, &config.folder_template, &ctx),
        filename: resolver.resolve(&config.filename_template, &ctx),
        position,
        track_number,
        use_album_track_number,
    }
}

async fn file_size_mb(path: &str) -> Option<f64> {
    tokio::fs::metadata(path)
        .await
        .ok()
        .map(|m| m.len() as f64 / (1024.0 * 1024.0))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unexpected error during download".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::existence::ExistenceResult;
    use crate::core::queue::{ItemStatus, QueueSnapshot, SkipReason};
    use crate::models::fetch::{FetchProgress, FetchRequest, FetchResponse};
    use crate::models::settings::{DownloadSettings, Downloader, OperatingSystem};
    use crate::sources::registry::SourceRegistry;
    use crate::sources::traits::ContentFetcher;
    use crate::sources::Source;
    use async_trait::async_trait;

    type Script = dyn Fn(usize, &FetchRequest) -> anyhow::Result<FetchResponse> + Send + Sync;

    struct FakeFetcher {
        script: Box<Script>,
        seen: Mutex<Vec<FetchRequest>>,
    }

    impl FakeFetcher {
        fn new(
            script: impl Fn(usize, &FetchRequest) -> anyhow::Result<FetchResponse>
                + Send
                + Sync
                + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                script: Box::new(script),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }

        fn filenames(&self) -> Vec<String> {
            self.seen
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.filename.clone())
                .collect()
        }
    }

    #[async_trait]
    impl ContentFetcher for FakeFetcher {
        fn name(&self) -> &str {
            "fake"
        }

        async fn fetch(
            &self,
            request: &FetchRequest,
            _progress: tokio::sync::mpsc::Sender<FetchProgress>,
        ) -> anyhow::Result<FetchResponse> {
            let n = {
                let mut seen = self.seen.lock().unwrap();
                seen.push(request.clone());
                seen.len() - 1
            };
            (self.script)(n, request)
        }
    }

    #[derive(Default)]
    struct FakeLibrary {
        present: HashMap<String, String>,
        fail: bool,
        asked: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ExistenceChecker for FakeLibrary {
        async fn check(
            &self,
            output_dir: &Path,
            queries: &[ExistenceQuery],
        ) -> anyhow::Result<Vec<ExistenceResult>> {
            self.asked
                .lock()
                .unwrap()
                .push(output_dir.to_string_lossy().to_string());
            if self.fail {
                bail!("permission denied");
            }
            Ok(queries
                .iter()
                .map(|q| ExistenceResult {
                    identity: q.identity.clone(),
                    exists: self.present.contains_key(&q.identity),
                    file_path: self.present.get(&q.identity).cloned(),
                })
                .collect())
        }
    }

    #[derive(Default)]
    struct RecordingEmitter {
        progress: Mutex<Vec<u8>>,
        states: Mutex<usize>,
    }

    impl EventEmitter for RecordingEmitter {
        fn emit_queue_state(&self, _snapshot: &QueueSnapshot) {
            *self.states.lock().unwrap() += 1;
        }

        fn emit_batch_progress(&self, progress: &BatchProgress) {
            self.progress.lock().unwrap().push(progress.percent);
        }
    }

    fn tracks(n: usize) -> Vec<TrackRef> {
        (1..=n)
            .map(|i| TrackRef {
                id: format!("sp{}", i),
                isrc: Some(format!("ISRC{}", i)),
                name: format!("Song {}", i),
                artists: Some("Artist".into()),
                album_name: Some("Album".into()),
                track_number: Some(10 + i as u32),
                ..Default::default()
            })
            .collect()
    }

    fn config() -> BatchConfig {
        DownloadSettings {
            download_path: "/music".into(),
            downloader: Downloader::Qobuz,
            operating_system: OperatingSystem::Posix,
            filename_template: "{track}. {title}".into(),
            ..Default::default()
        }
        .to_batch_config()
        .unwrap()
    }

    fn coordinator(fetcher: &Arc<FakeFetcher>, library: Arc<FakeLibrary>) -> BatchCoordinator {
        let queue = DownloadQueue::new();
        let mut registry = SourceRegistry::new();
        registry.register(Source::Qobuz, fetcher.clone());
        let strategy = FallbackStrategy::new(Arc::new(registry), queue.clone());
        BatchCoordinator::new(queue, strategy, library)
    }

    fn present(ids: &[&str]) -> Arc<FakeLibrary> {
        Arc::new(FakeLibrary {
            present: ids
                .iter()
                .map(|id| (id.to_string(), format!("/music/{}.flac", id)))
                .collect(),
            ..Default::default()
        })
    }

    fn assert_counts_add_up(snapshot: &QueueSnapshot, total: usize) {
        assert_eq!(
            snapshot.completed_count
                + snapshot.failed_count
                + snapshot.skipped_count
                + snapshot.queued_count,
            total
        );
        assert_eq!(snapshot.downloading_count, 0);
    }

    #[tokio::test]
    async fn pre_existing_tracks_never_reach_a_source() {
        let fetcher = FakeFetcher::new(|_, r| Ok(FetchResponse::downloaded(format!("/music/{}.flac", r.filename))));
        let coordinator = coordinator(&fetcher, present(&["ISRC2", "ISRC4"]));

        let report = coordinator
            .download_all(&tracks(5), &DownloadContext::Album("Album".into()), &config())
            .await
            .unwrap();

        assert_eq!(fetcher.calls(), 3);
        let isrcs: Vec<_> = fetcher.seen.lock().unwrap().iter().map(|r| r.isrc.clone()).collect();
        assert_eq!(isrcs, vec!["ISRC1", "ISRC3", "ISRC5"]);
        assert_eq!(
            report.outcome,
            BatchOutcome::Mixed {
                downloaded: 3,
                skipped: 2
            }
        );
        assert_eq!(report.outcome.message(), "3 downloaded, 2 skipped");

        let snap = coordinator.queue().snapshot();
        assert_counts_add_up(&snap, 5);
        let skipped = &snap.queue[1];
        assert_eq!(skipped.status, ItemStatus::Skipped);
        assert_eq!(skipped.skip_reason, Some(SkipReason::AlreadyExists));
        assert_eq!(skipped.file_path.as_deref(), Some("/music/ISRC2.flac"));
        assert!(!snap.is_downloading);
    }

    #[tokio::test]
    async fn all_sources_failing_is_reported_per_item() {
        let fetcher = FakeFetcher::new(|_, _| Ok(FetchResponse::failed("track not found")));
        let coordinator = coordinator(&fetcher, present(&[]));

        let report = coordinator
            .download_all(&tracks(2), &DownloadContext::Single, &config())
            .await
            .unwrap();

        assert_eq!(
            report.outcome,
            BatchOutcome::Failed {
                downloaded: 0,
                skipped: 0,
                failed: 2
            }
        );
        assert_eq!(report.outcome.message(), "2 failed");
        let snap = coordinator.queue().snapshot();
        assert_eq!(snap.failed_count, 2);
        for item in &snap.queue {
            assert_eq!(item.error_message.as_deref(), Some("track not found"));
        }
    }

    #[tokio::test]
    async fn stopping_mid_batch_cancels_the_rest() {
        let stop = StopSignal::new();
        let trigger = stop.clone();
        let fetcher = FakeFetcher::new(move |n, r| {
            if n == 1 {
                trigger.stop();
            }
            Ok(FetchResponse::downloaded(format!("/music/{}.flac", r.filename)))
        });
        let coordinator = coordinator(&fetcher, present(&[])).with_stop_signal(stop.clone());

        let report = coordinator
            .download_all(&tracks(5), &DownloadContext::Single, &config())
            .await
            .unwrap();

        assert_eq!(fetcher.calls(), 2);
        assert!(report.stopped);
        assert_eq!((report.downloaded, report.cancelled), (2, 3));
        assert_eq!(
            report.stop_notice.as_deref(),
            Some("Download stopped. 2 tracks downloaded, 3 remaining.")
        );
        assert!(!stop.is_stopped());

        let snap = coordinator.queue().snapshot();
        assert_counts_add_up(&snap, 5);
        assert_eq!(snap.completed_count, 2);
        assert_eq!(snap.cancelled_count, 3);
        for item in &snap.queue[2..] {
            assert_eq!(item.skip_reason, Some(SkipReason::Cancelled));
        }
    }

    #[tokio::test]
    async fn a_panicking_source_fails_one_item_only() {
        let fetcher = FakeFetcher::new(|n, r| {
            if n == 0 {
                panic!("decoder exploded");
            }
            Ok(FetchResponse::downloaded(format!("/music/{}.flac", r.filename)))
        });
        let coordinator = coordinator(&fetcher, present(&[]));

        let report = coordinator
            .download_all(&tracks(3), &DownloadContext::Single, &config())
            .await
            .unwrap();

        assert_eq!((report.downloaded, report.failed), (2, 1));
        let first = &coordinator.queue().snapshot().queue[0];
        assert_eq!(first.status, ItemStatus::Failed);
        assert_eq!(first.error_message.as_deref(), Some("decoder exploded"));
    }

    #[tokio::test]
    async fn source_reported_duplicate_counts_as_skipped() {
        let fetcher = FakeFetcher::new(|_, _| Ok(FetchResponse::exists("/music/old.flac")));
        let coordinator = coordinator(&fetcher, present(&[]));

        let report = coordinator
            .download_all(&tracks(2), &DownloadContext::Single, &config())
            .await
            .unwrap();
        assert_eq!(report.outcome, BatchOutcome::AllPresent { skipped: 2 });
        assert_eq!(report.outcome.message(), "2 tracks already exist");
    }

    #[tokio::test]
    async fn selection_order_drives_track_positions() {
        let fetcher = FakeFetcher::new(|_, r| Ok(FetchResponse::downloaded(r.filename.clone())));
        let coordinator = coordinator(&fetcher, present(&[]));

        let selected = vec!["sp3".to_string(), "missing".to_string(), "isrc1".to_string(), "sp3".to_string()];
        let report = coordinator
            .download_selected(&selected, &tracks(3), &DownloadContext::Single, &config())
            .await
            .unwrap();

        assert_eq!(report.total, 2);
        assert_eq!(fetcher.filenames(), vec!["01. Song 3", "02. Song 1"]);
        assert_eq!(report.outcome.message(), "Downloaded 2 tracks successfully");
    }

    #[tokio::test]
    async fn album_folder_uses_album_track_numbers() {
        let fetcher = FakeFetcher::new(|_, r| Ok(FetchResponse::downloaded(r.filename.clone())));
        let coordinator = coordinator(&fetcher, present(&[]));
        let mut config = config();
        config.folder_template = "{artist}/{album}".into();

        coordinator
            .download_all(&tracks(2), &DownloadContext::Album("Album".into()), &config)
            .await
            .unwrap();

        let seen = fetcher.seen.lock().unwrap();
        assert_eq!(seen[0].filename, "11. Song 1");
        assert_eq!(seen[1].filename, "12. Song 2");
        assert!(seen[0].use_album_track_number);
        assert_eq!(seen[0].output_dir, std::path::PathBuf::from("/music/Artist/Album"));
    }

    #[tokio::test]
    async fn playlist_gets_its_own_folder() {
        let fetcher = FakeFetcher::new(|_, r| Ok(FetchResponse::downloaded(r.filename.clone())));
        let library = present(&[]);
        let coordinator = coordinator(&fetcher, library.clone());

        coordinator
            .download_all(&tracks(1), &DownloadContext::Playlist("Road/Trip".into()), &config())
            .await
            .unwrap();

        assert_eq!(library.asked.lock().unwrap().as_slice(), ["/music/Road Trip"]);
        let seen = fetcher.seen.lock().unwrap();
        assert_eq!(seen[0].output_dir, std::path::PathBuf::from("/music/Road Trip"));
    }

    #[tokio::test]
    async fn failed_existence_check_skips_nothing() {
        let fetcher = FakeFetcher::new(|_, r| Ok(FetchResponse::downloaded(r.filename.clone())));
        let library = Arc::new(FakeLibrary {
            fail: true,
            ..Default::default()
        });
        let coordinator = coordinator(&fetcher, library);

        let report = coordinator
            .download_all(&tracks(2), &DownloadContext::Single, &config())
            .await
            .unwrap();
        assert_eq!(report.downloaded, 2);
    }

    #[tokio::test]
    async fn nothing_to_download_is_refused() {
        let fetcher = FakeFetcher::new(|_, _| Ok(FetchResponse::failed("")));
        let coordinator = coordinator(&fetcher, present(&[]));
        let mut no_isrc = tracks(2);
        for t in &mut no_isrc {
            t.isrc = None;
        }

        let err = coordinator
            .download_all(&no_isrc, &DownloadContext::Single, &config())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No tracks available for download");

        let err = coordinator
            .download_selected(&["zzz".to_string()], &tracks(2), &DownloadContext::Single, &config())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No tracks selected");
        assert!(coordinator.queue().snapshot().queue.is_empty());
    }

    #[tokio::test]
    async fn second_batch_is_refused_while_one_runs() {
        let fetcher = FakeFetcher::new(|_, _| Ok(FetchResponse::failed("")));
        let coordinator = coordinator(&fetcher, present(&[]));
        assert!(coordinator.queue().try_start());

        let err = coordinator
            .download_all(&tracks(1), &DownloadContext::Single, &config())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already running"));
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn single_track_download() {
        let fetcher = FakeFetcher::new(|_, r| Ok(FetchResponse::downloaded(r.filename.clone())));
        let coordinator = coordinator(&fetcher, present(&["ISRC1"]));
        let track = tracks(1).remove(0);

        let outcome = coordinator
            .download_track(&track, &DownloadContext::Single, &config())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            TrackOutcome::Downloaded {
                file_path: "11. Song 1".into()
            }
        );
        assert!(!coordinator.queue().is_downloading());
        assert_eq!(coordinator.queue().snapshot().completed_count, 1);
    }

    #[tokio::test]
    async fn stop_during_single_track_does_not_carry_over() {
        let stop = StopSignal::new();
        let trigger = stop.clone();
        let fetcher = FakeFetcher::new(move |n, r| {
            if n == 0 {
                trigger.stop();
            }
            Ok(FetchResponse::downloaded(format!("/music/{}.flac", r.filename)))
        });
        let coordinator = coordinator(&fetcher, present(&[])).with_stop_signal(stop.clone());
        let single = tracks(1).remove(0);

        coordinator
            .download_track(&single, &DownloadContext::Single, &config())
            .await
            .unwrap();
        assert!(!stop.is_stopped());

        let report = coordinator
            .download_all(&tracks(2), &DownloadContext::Single, &config())
            .await
            .unwrap();
        assert!(!report.stopped);
        assert_eq!(report.downloaded, 2);
        assert_eq!(fetcher.calls(), 3);
    }

    #[tokio::test]
    async fn progress_is_emitted_and_kept() {
        let fetcher = FakeFetcher::new(|_, r| Ok(FetchResponse::downloaded(r.filename.clone())));
        let emitter = Arc::new(RecordingEmitter::default());
        let coordinator = coordinator(&fetcher, present(&["ISRC1"])).with_emitter(emitter.clone());

        coordinator
            .download_all(&tracks(4), &DownloadContext::Single, &config())
            .await
            .unwrap();

        let percents = emitter.progress.lock().unwrap().clone();
        assert_eq!(percents.first(), Some(&25));
        assert_eq!(percents.last(), Some(&100));
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
        assert!(*emitter.states.lock().unwrap() > 0);
        assert_eq!(coordinator.current_progress().map(|p| p.percent), Some(100));
    }

    #[test]
    fn classification_is_exhaustive() {
        assert_eq!(
            BatchOutcome::classify(4, 0, 0).message(),
            "Downloaded 4 tracks successfully"
        );
        assert_eq!(BatchOutcome::classify(0, 3, 0).message(), "3 tracks already exist");
        assert_eq!(BatchOutcome::classify(3, 2, 0).message(), "3 downloaded, 2 skipped");
        assert_eq!(
            BatchOutcome::classify(1, 2, 3).message(),
            "1 downloaded, 2 skipped, 3 failed"
        );
        assert_eq!(BatchOutcome::classify(1, 0, 3).message(), "1 downloaded, 3 failed");
        assert!(BatchOutcome::classify(0, 0, 1).is_failure());
        assert!(!BatchOutcome::classify(0, 0, 0).is_failure());
    }

    #[test]
    fn stop_signal_resets() {
        let stop = StopSignal::new();
        let other = stop.clone();
        other.stop();
        assert!(stop.is_stopped());
        stop.reset();
        assert!(!other.is_stopped());
    }
}

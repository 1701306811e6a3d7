use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::track::TrackRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Queued,
    Downloading,
    Completed,
    Failed,
    Skipped,
}

impl ItemStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ItemStatus::Completed | ItemStatus::Failed | ItemStatus::Skipped
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyExists,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueItem {
    pub id: String,
    pub track_name: String,
    pub artist_name: String,
    pub album_name: String,
    pub isrc: String,
    pub status: ItemStatus,
    /// MB transferred by the current or last attempt.
    pub progress: f64,
    pub total_size: f64,
    /// MB/s.
    pub speed: f64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub file_path: Option<String>,
    pub skip_reason: Option<SkipReason>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    pub is_downloading: bool,
    pub queue: Vec<QueueItem>,
    pub current_speed: f64,
    pub total_downloaded: f64,
    pub session_start_time: Option<DateTime<Utc>>,
    pub queued_count: usize,
    pub downloading_count: usize,
    pub completed_count: usize,
    pub failed_count: usize,
    /// Includes cancelled items.
    pub skipped_count: usize,
    pub cancelled_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressInfo {
    pub is_downloading: bool,
    pub mb_downloaded: f64,
    pub speed_mbps: f64,
}

#[derive(Default)]
struct QueueState {
    items: Vec<QueueItem>,
    is_downloading: bool,
    current_speed: f64,
    live_mb: f64,
    total_downloaded: f64,
    session_start: Option<DateTime<Utc>>,
}

impl QueueState {
    fn find_open(&mut self, id: &str) -> Option<&mut QueueItem> {
        self.items
            .iter_mut()
            .find(|i| i.id == id && !i.status.is_terminal())
    }

    fn has_open_items(&self) -> bool {
        self.items.iter().any(|i| !i.status.is_terminal())
    }

    fn reset_session(&mut self) {
        self.current_speed = 0.0;
        self.live_mb = 0.0;
        self.total_downloaded = 0.0;
        self.session_start = None;
    }
}

/// Session-wide queue and telemetry. Cloning shares the same state.
///
/// Marking an unknown or already-terminal item is a no-op returning `false`.
#[derive(Clone, Default)]
pub struct DownloadQueue {
    inner: Arc<Mutex<QueueState>>,
}

impl DownloadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn enqueue(&self, track: &TrackRef) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let mut state = self.lock();
        if state.session_start.is_none() {
            state.session_start = Some(Utc::now());
        }
        state.items.push(QueueItem {
            id: id.clone(),
            track_name: track.name.clone(),
            artist_name: track.artist_name().to_string(),
            album_name: track.album().to_string(),
            isrc: track.isrc.clone().unwrap_or_default(),
            status: ItemStatus::Queued,
            progress: 0.0,
            total_size: 0.0,
            speed: 0.0,
            start_time: None,
            end_time: None,
            error_message: None,
            file_path: None,
            skip_reason: None,
        });
        id
    }

    pub fn mark_downloading(&self, id: &str) -> bool {
        let mut state = self.lock();
        let Some(item) = state
            .items
            .iter_mut()
            .find(|i| i.id == id && i.status == ItemStatus::Queued)
        else {
            return false;
        };
        item.status = ItemStatus::Downloading;
        item.start_time = Some(Utc::now());
        item.progress = 0.0;
        item.speed = 0.0;
        state.live_mb = 0.0;
        true
    }

    /// Resets per-attempt progress before the next source is tried.
    pub fn begin_attempt(&self, id: &str) {
        let mut state = self.lock();
        if let Some(item) = state.find_open(id) {
            item.progress = 0.0;
            item.speed = 0.0;
            state.live_mb = 0.0;
        }
    }

    pub fn update_progress(&self, id: &str, mb_downloaded: f64, speed_mbps: f64) {
        let mut state = self.lock();
        if let Some(item) = state.find_open(id) {
            item.progress = mb_downloaded;
            item.speed = speed_mbps;
            state.current_speed = speed_mbps;
            state.live_mb = mb_downloaded;
        }
    }

    /// `final_size_mb` falls back to the last reported progress when unknown.
    pub fn mark_completed(&self, id: &str, file_path: &str, final_size_mb: Option<f64>) -> bool {
        let mut state = self.lock();
        let Some(item) = state.find_open(id) else {
            return false;
        };
        let size = final_size_mb
            .filter(|s| s.is_finite() && *s >= 0.0)
            .unwrap_or(item.progress)
            .max(0.0);
        item.status = ItemStatus::Completed;
        item.progress = size;
        item.total_size = size;
        item.speed = 0.0;
        item.end_time = Some(Utc::now());
        item.file_path = Some(file_path.to_string());
        state.total_downloaded += size;
        state.current_speed = 0.0;
        true
    }

    pub fn mark_skipped(&self, id: &str, file_path: &str) -> bool {
        let mut state = self.lock();
        let Some(item) = state.find_open(id) else {
            return false;
        };
        item.status = ItemStatus::Skipped;
        item.skip_reason = Some(SkipReason::AlreadyExists);
        item.speed = 0.0;
        item.end_time = Some(Utc::now());
        item.file_path = Some(file_path.to_string());
        true
    }

    pub fn mark_failed(&self, id: &str, error_message: &str) -> bool {
        let mut state = self.lock();
        let Some(item) = state.find_open(id) else {
            return false;
        };
        item.status = ItemStatus::Failed;
        item.speed = 0.0;
        item.end_time = Some(Utc::now());
        item.error_message = Some(error_message.to_string());
        state.current_speed = 0.0;
        true
    }

    /// Moves every still-queued item to skipped/cancelled. Returns how many.
    pub fn cancel_all_queued(&self) -> usize {
        let mut state = self.lock();
        let now = Utc::now();
        let mut cancelled = 0;
        for item in state
            .items
            .iter_mut()
            .filter(|i| i.status == ItemStatus::Queued)
        {
            item.status = ItemStatus::Skipped;
            item.skip_reason = Some(SkipReason::Cancelled);
            item.error_message = Some("Cancelled".to_string());
            item.end_time = Some(now);
            cancelled += 1;
        }
        cancelled
    }

    pub fn set_downloading(&self, downloading: bool) {
        let mut state = self.lock();
        state.is_downloading = downloading;
        if !downloading {
            state.current_speed = 0.0;
            state.live_mb = 0.0;
        }
    }

    /// Claims the session for one batch. `false` if another batch holds it.
    pub fn try_start(&self) -> bool {
        let mut state = self.lock();
        if state.is_downloading {
            return false;
        }
        state.is_downloading = true;
        true
    }

    pub fn is_downloading(&self) -> bool {
        self.lock().is_downloading
    }

    pub fn item(&self, id: &str) -> Option<QueueItem> {
        self.lock().items.iter().find(|i| i.id == id).cloned()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.lock();
        let count = |status: ItemStatus| state.items.iter().filter(|i| i.status == status).count();
        QueueSnapshot {
            is_downloading: state.is_downloading,
            queue: state.items.clone(),
            current_speed: state.current_speed,
            total_downloaded: state.total_downloaded,
            session_start_time: state.session_start,
            queued_count: count(ItemStatus::Queued),
            downloading_count: count(ItemStatus::Downloading),
            completed_count: count(ItemStatus::Completed),
            failed_count: count(ItemStatus::Failed),
            skipped_count: count(ItemStatus::Skipped),
            cancelled_count: state
                .items
                .iter()
                .filter(|i| i.skip_reason == Some(SkipReason::Cancelled))
                .count(),
        }
    }

    pub fn live_progress(&self) -> ProgressInfo {
        let state = self.lock();
        ProgressInfo {
            is_downloading: state.is_downloading,
            mb_downloaded: state.live_mb,
            speed_mbps: state.current_speed,
        }
    }

    /// Drops terminal items. The session ends once nothing is left in flight.
    pub fn clear_completed_history(&self) {
        let mut state = self.lock();
        state.items.retain(|i| !i.status.is_terminal());
        if !state.has_open_items() && !state.is_downloading {
            state.reset_session();
        }
    }

    pub fn clear_all(&self) {
        let mut state = self.lock();
        state.items.clear();
        state.reset_session();
    }
}

pub struct ProgressThrottle {
    last_emit: std::time::Instant,
    min_interval: std::time::Duration,
}

impl ProgressThrottle {
    pub fn new(min_interval_ms: u64) -> Self {
        let min_interval = std::time::Duration::from_millis(min_interval_ms);
        let now = std::time::Instant::now();
        Self {
            last_emit: now.checked_sub(min_interval).unwrap_or(now),
            min_interval,
        }
    }

    pub fn should_emit(&mut self) -> bool {
        let now = std::time::Instant::now();
        if now.duration_since(self.last_emit) >= self.min_interval {
            self.last_emit = now;
            true
        } else {
            false
        }
    }
}

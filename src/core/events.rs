use flacdl_core::core::events::{BatchProgress, EventEmitter};
use flacdl_core::core::queue::QueueSnapshot;

/// Emitter for terminal sessions: queue changes go to the debug log,
/// batch progress to the info log.
#[derive(Clone, Default)]
pub struct LogEventEmitter;

impl EventEmitter for LogEventEmitter {
    fn emit_queue_state(&self, snapshot: &QueueSnapshot) {
        tracing::debug!(
            queued = snapshot.queued_count,
            downloading = snapshot.downloading_count,
            completed = snapshot.completed_count,
            failed = snapshot.failed_count,
            skipped = snapshot.skipped_count,
            "queue updated"
        );
    }

    fn emit_batch_progress(&self, progress: &BatchProgress) {
        match &progress.current {
            Some(current) => tracing::info!(
                "[{:>3}%] {}/{} {}",
                progress.percent,
                progress.completed,
                progress.total,
                current
            ),
            None => tracing::info!(
                "[{:>3}%] {}/{}",
                progress.percent,
                progress.completed,
                progress.total
            ),
        }
    }
}

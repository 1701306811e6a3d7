use serde::Serialize;

use crate::core::queue::QueueSnapshot;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchProgress {
    pub percent: u8,
    pub completed: usize,
    pub total: usize,
    pub current: Option<String>,
}

impl BatchProgress {
    pub fn new(completed: usize, total: usize, current: Option<String>) -> Self {
        let percent = if total == 0 {
            100
        } else {
            ((completed as f64 / total as f64) * 100.0).round().min(100.0) as u8
        };
        Self {
            percent,
            completed,
            total,
            current,
        }
    }
}

/// Push channel for observers. Polling the queue works without one.
pub trait EventEmitter: Send + Sync + 'static {
    fn emit_queue_state(&self, snapshot: &QueueSnapshot);
    fn emit_batch_progress(&self, progress: &BatchProgress);
}

#[derive(Clone, Default)]
pub struct NoopEmitter;

impl EventEmitter for NoopEmitter {
    fn emit_queue_state(&self, _snapshot: &QueueSnapshot) {}
    fn emit_batch_progress(&self, _progress: &BatchProgress) {}
}

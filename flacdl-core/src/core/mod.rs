pub mod batch;
pub mod events;
pub mod existence;
pub mod fallback;
pub mod filename;
pub mod queue;
pub mod template;

pub mod core;
pub mod fs_paths;
pub mod models;
pub mod sources;

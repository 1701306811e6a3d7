pub mod downloads;
pub mod library;
pub mod settings;

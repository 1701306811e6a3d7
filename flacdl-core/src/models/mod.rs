pub mod fetch;
pub mod settings;
pub mod track;

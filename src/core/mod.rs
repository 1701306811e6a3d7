pub mod command_fetcher;
pub mod events;
pub mod http_client;
pub mod process;
pub mod songlink;

pub mod admin_handlers;
pub mod cache;
pub mod config;
pub mod filters;
pub mod handlers;
pub mod maintenance;
pub mod moderator;
pub mod reputation;
pub mod settings;
pub mod sweeper;
pub mod transport;
pub mod triggers;

pub mod auth_cmd;
pub mod cache;
pub mod common;
pub mod completions;
pub mod config;
pub mod entity;
pub mod outbox;
pub mod sync;

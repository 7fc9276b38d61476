use std::io;

use stockroom_core::auth::AuthError;
use stockroom_core::http::TransportError;
use stockroom_core::SyncFailure;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] stockroom_core::Error),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Sync failed: {}", describe_failure(*.0))]
    Sync(SyncFailure),
}

const fn describe_failure(failure: SyncFailure) -> &'static str {
    match failure {
        SyncFailure::Token => "not signed in or token expired. Run `stockroom auth login`.",
        SyncFailure::Network => "server unreachable; changes stay queued for the next sync.",
        SyncFailure::Storage => "local database error; see the log for details.",
    }
}

use chrono::DateTime;
use stockroom_core::auth::{token_status, AuthClient, AuthStatus};
use stockroom_core::http::SyncApiClient;
use stockroom_core::util::unix_timestamp_now;

use crate::cli::AuthCommands;
use crate::commands::common::Settings;
use crate::error::CliError;

pub async fn run_auth(command: AuthCommands, settings: &Settings) -> Result<(), CliError> {
    let store = settings.open_store().await?;
    match command {
        AuthCommands::Login { username, password } => {
            let client = AuthClient::new(SyncApiClient::new(settings.network(&store)?), store);
            let token = client.login(&username, &password).await?;
            match token.expires_at() {
                Some(expires_at) => println!(
                    "Signed in as {} (token expires {})",
                    username.trim(),
                    format_expiry(expires_at)
                ),
                None => println!("Signed in as {}", username.trim()),
            }
        }
        AuthCommands::Status => {
            let token = store.access_token().await?;
            let status = token_status(token.as_deref(), unix_timestamp_now());
            println!("{}", describe_status(status));
        }
        AuthCommands::Logout => {
            store.clear_access_token().await?;
            println!("Signed out");
        }
    }
    Ok(())
}

pub fn describe_status(status: AuthStatus) -> String {
    match status {
        AuthStatus::SignedOut => "Not signed in.".to_string(),
        AuthStatus::Active { expires_at } => {
            format!("Signed in; token valid until {}", format_expiry(expires_at))
        }
        AuthStatus::Expired {
            expires_at: Some(expires_at),
        } => format!(
            "Token expired at {}. Run `stockroom auth login`.",
            format_expiry(expires_at)
        ),
        AuthStatus::Expired { expires_at: None } => {
            "Stored token is unreadable. Run `stockroom auth login`.".to_string()
        }
    }
}

pub fn format_expiry(expires_at: i64) -> String {
    DateTime::from_timestamp(expires_at, 0).map_or_else(
        || expires_at.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

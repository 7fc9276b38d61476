use stockroom_core::models::OutboxStatus;

use crate::cli::OutboxCommands;
use crate::commands::common::{format_outbox_lines, Settings};
use crate::error::CliError;

pub async fn run_outbox(command: OutboxCommands, settings: &Settings) -> Result<(), CliError> {
    let store = settings.open_store().await?;
    match command {
        OutboxCommands::List { status, json } => {
            let status = status.map(OutboxStatus::from);
            let events = store
                .list_outbox()
                .await?
                .into_iter()
                .filter(|event| status.is_none() || status == Some(event.status))
                .collect::<Vec<_>>();

            if json {
                println!("{}", serde_json::to_string_pretty(&events)?);
            } else if events.is_empty() {
                println!("Outbox is empty.");
            } else {
                for line in format_outbox_lines(&events) {
                    println!("{line}");
                }
            }
        }
        OutboxCommands::Purge { event_id: Some(event_id) } => {
            if store.purge(event_id.trim()).await? {
                println!("Purged {}", event_id.trim());
            } else {
                return Err(CliError::NotFound(format!(
                    "sent outbox event {}",
                    event_id.trim()
                )));
            }
        }
        OutboxCommands::Purge { event_id: None } => {
            let purged = store.purge_sent().await?;
            println!("Purged {purged} sent events");
        }
    }
    Ok(())
}

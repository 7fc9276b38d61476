use crate::cli::CacheCommands;
use crate::commands::common::Settings;
use crate::error::CliError;

pub async fn run_cache(command: CacheCommands, settings: &Settings) -> Result<(), CliError> {
    let store = settings.open_store().await?;
    let interceptor = settings.network(&store)?;
    match command {
        CacheCommands::Install => {
            let stored = interceptor.install().await?;
            println!(
                "Cached {stored} offline pages in '{}'",
                interceptor.generation()
            );
        }
        CacheCommands::Activate => {
            let dropped = interceptor.activate().await?;
            if dropped.is_empty() {
                println!("No stale caches to delete");
            } else {
                println!("Deleted stale caches: {}", dropped.join(", "));
            }
        }
    }
    Ok(())
}

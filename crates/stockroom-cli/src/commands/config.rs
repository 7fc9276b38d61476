use std::path::Path;

use stockroom_core::config::ClientConfig;

use crate::cli::ConfigCommands;
use crate::commands::common::{display_path, Settings};
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, settings: &Settings) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show => {
            for line in format_config_lines(&settings.config, &settings.db_path) {
                println!("{line}");
            }
        }
        ConfigCommands::Set { key, value } => {
            let path = set_config_value(&settings.config_path, &key, &value)?;
            println!("Updated {key} in {}", display_path(&path));
        }
        ConfigCommands::Path => println!("{}", display_path(&settings.config_path)),
    }
    Ok(())
}

/// Update the file itself; env overrides are not written back.
pub fn set_config_value(path: &Path, key: &str, value: &str) -> Result<std::path::PathBuf, CliError> {
    let mut config = ClientConfig::load_from_path(path)?;
    config.set(key.trim(), value)?;
    config.save_to_path(path)?;
    Ok(path.to_path_buf())
}

pub fn format_config_lines(config: &ClientConfig, db_path: &Path) -> Vec<String> {
    vec![
        format!(
            "api_base_url         {}",
            config.api_base_url.as_deref().unwrap_or("(not set)")
        ),
        format!("db_path              {}", display_path(db_path)),
        format!("sync_interval_secs   {}", config.sync_interval_secs),
        format!("request_timeout_secs {}", config.request_timeout_secs),
        format!("cache_generation     {}", config.cache_generation),
    ]
}

//! Stockroom CLI - offline point-of-sale client
//!
//! Records sales and stock changes locally and syncs them when the server is reachable.

mod cli;
mod commands;
mod error;


use clap::Parser;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::auth_cmd::run_auth;
use crate::commands::cache::run_cache;
use crate::commands::common::Settings;
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::entity::{
    run_customer, run_delete, run_expense, run_get, run_list, run_product, run_sale,
};
use crate::commands::outbox::run_outbox;
use crate::commands::sync::{run_status, run_sync, run_watch, SyncMode};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let directive: Directive = "stockroom=info"
        .parse()
        .map_err(|error| CliError::Config(format!("invalid log directive: {error}")))?;
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive))
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell, output } = &cli.command {
        return run_completions(*shell, output.as_deref());
    }

    let settings = Settings::resolve(cli.config, cli.db_path)?;

    match cli.command {
        Commands::Auth { command } => run_auth(command, &settings).await?,
        Commands::Product { command } => run_product(command, &settings).await?,
        Commands::Customer { command } => run_customer(command, &settings).await?,
        Commands::Sale { command } => run_sale(command, &settings).await?,
        Commands::Expense { command } => run_expense(command, &settings).await?,
        Commands::List {
            collection,
            limit,
            json,
        } => run_list(collection.into(), limit, json, &settings).await?,
        Commands::Get { collection, id } => run_get(collection.into(), &id, &settings).await?,
        Commands::Delete { collection, id } => {
            run_delete(collection.into(), &id, &settings).await?;
        }
        Commands::Outbox { command } => run_outbox(command, &settings).await?,
        Commands::Status { json } => run_status(json, &settings).await?,
        Commands::Sync {
            watch: true, ..
        } => run_watch(&settings).await?,
        Commands::Sync {
            push_only,
            pull_only,
            ..
        } => run_sync(SyncMode::from_flags(push_only, pull_only), &settings).await?,
        Commands::Cache { command } => run_cache(command, &settings).await?,
        Commands::Config { command } => run_config(command, &settings)?,
        Commands::Completions { .. } => {}
    }

    Ok(())
}

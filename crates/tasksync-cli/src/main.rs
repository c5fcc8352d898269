//! tasksync CLI - replay offline sync batches against a local task store

mod cli;
mod commands;
mod error;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::common::resolve_db_path;
use crate::commands::list::run_list;
use crate::commands::show::run_show;
use crate::commands::sync::{policy_from_flags, run_sync};
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

    // Logs go to stderr so `--json` output stays machine-readable.
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    let filter = match "tasksync=warn".parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Commands::Sync {
            owner,
            file,
            strict,
            count_missing_deletes,
            json,
        } => {
            let policy = policy_from_flags(strict, count_missing_deletes);
            run_sync(&owner, file.as_deref(), policy, json, &db_path).await?;
        }
        Commands::List { owner, limit, json } => run_list(&owner, limit, json, &db_path).await?,
        Commands::Show { owner, id } => run_show(&owner, &id, &db_path).await?,
    }

    Ok(())
}

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tasksync")]
#[command(about = "Replay offline task batches and inspect the local task store")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Apply a batch of sync operations for one owner
    Sync {
        /// Owner the batch is applied on behalf of
        #[arg(long)]
        owner: String,
        /// JSON batch file; reads stdin when omitted or `-`
        #[arg(short, long, value_name = "PATH")]
        file: Option<PathBuf>,
        /// Reject updates unless the client version matches exactly
        #[arg(long)]
        strict: bool,
        /// Count deletes of already-missing tasks as synced
        #[arg(long)]
        count_missing_deletes: bool,
        /// Output the full sync response as JSON
        #[arg(long)]
        json: bool,
    },
    /// List an owner's tasks, newest first
    List {
        #[arg(long)]
        owner: String,
        /// Number of tasks to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one task
    Show {
        #[arg(long)]
        owner: String,
        /// Task ID
        id: String,
    },
}

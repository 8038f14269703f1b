use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};
use crate::services::CheckpointStore;

#[derive(Debug, Args)]
pub struct CheckpointArgs {
    #[arg(long, help = "Checkpoint database path")]
    pub path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CheckpointCommand,
}

#[derive(Debug, Subcommand)]
pub enum CheckpointCommand {
    #[command(about = "List failed and deferred products")]
    Failures,
    #[command(about = "Forget one product so the next run retries it")]
    Forget {
        #[arg(help = "Product identifier (ASIN)")]
        id: String,
    },
    #[command(
        about = "Forget every failed product",
        long_about = "Forget every failed product so the next run retries it. \
                      Products whose rows are already in the output file are \
                      re-marked as persisted when a run starts."
    )]
    ClearFailed,
}

pub async fn handle_checkpoint(
    args: CheckpointArgs,
    format: OutputFormat,
    _verbose: bool,
) -> Result<()> {
    let path = match args.path {
        Some(path) => path,
        None => Config::load()?.output.checkpoint_path,
    };
    let store = CheckpointStore::open(&path)?;
    let formatter = get_formatter(format);

    match args.command {
        CheckpointCommand::Failures => {
            let failures = store.failures()?;
            print!("{}", formatter.format_failures(&failures));
        }
        CheckpointCommand::Forget { id } => {
            let message = if store.forget(&id)? {
                format!("Forgot {id}")
            } else {
                format!("{id} is not in the checkpoint")
            };
            print!("{}", formatter.format_message(&message));
        }
        CheckpointCommand::ClearFailed => {
            let cleared = store.clear_failed()?;
            print!(
                "{}",
                formatter.format_message(&format!("Cleared {cleared} failed item(s)"))
            );
        }
    }

    Ok(())
}

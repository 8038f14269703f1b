//! CLI module for labelscout.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

use crate::models::OutputFormat;

/// Collect supplement-facts data from product listings.
#[derive(Debug, Parser)]
#[command(name = "labelscout")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(long, short = 'f', global = true, help = "Output format: text or json")]
    pub format: Option<OutputFormat>,

    #[arg(long, short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Search, extract and append new products to the output file
    Run(commands::RunArgs),

    /// Show checkpoint totals and recent runs
    Status,

    /// Publish the existing output file to the configured sink
    Publish(commands::PublishArgs),

    /// Inspect or edit the checkpoint store
    Checkpoint(commands::CheckpointArgs),

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::ConfigCommand),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::try_parse_from([
            "labelscout",
            "--format",
            "json",
            "run",
            "--limit",
            "5",
            "--no-publish",
            "--refresh-search",
        ])
        .unwrap();

        assert_eq!(cli.format, Some(OutputFormat::Json));
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.limit, Some(5));
                assert!(args.no_publish);
                assert!(args.refresh_search);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_checkpoint_forget() {
        let cli =
            Cli::try_parse_from(["labelscout", "checkpoint", "forget", "B07XJ8C8F5"]).unwrap();
        match cli.command {
            Commands::Checkpoint(args) => assert!(matches!(
                args.command,
                commands::CheckpointCommand::Forget { ref id } if id == "B07XJ8C8F5"
            )),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}

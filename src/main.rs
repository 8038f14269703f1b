use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use labelscout::cli::commands::{
    handle_checkpoint, handle_config, handle_publish, handle_run, handle_status,
};
use labelscout::cli::output::get_formatter;
use labelscout::cli::{Cli, Commands};
use labelscout::error::ConfigError;
use labelscout::models::OutputFormat;

/// Exit code for configuration problems detected before any work starts.
const EXIT_CONFIG: u8 = 2;

fn init_tracing(verbose: bool) {
    let default = if verbose { "labelscout=debug,info" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let format = cli.format.unwrap_or_default();
    let verbose = cli.verbose;
    init_tracing(verbose);

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::warn!("shutdown requested, finishing the current item");
        let _ = stop_tx.send(true);

        shutdown_signal().await;
        eprintln!("\nReceived second shutdown signal, exiting");
        std::process::exit(130);
    });

    match run_command(cli.command, format, verbose, stop_rx).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprint!("{}", get_formatter(format).format_error(&format!("{err:#}")));
            if err.chain().any(|e| e.is::<ConfigError>()) {
                ExitCode::from(EXIT_CONFIG)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

async fn run_command(
    command: Commands,
    format: OutputFormat,
    verbose: bool,
    stop: watch::Receiver<bool>,
) -> Result<()> {
    match command {
        Commands::Run(args) => {
            handle_run(args, format, verbose, stop).await?;
        }
        Commands::Status => {
            handle_status(format, verbose).await?;
        }
        Commands::Publish(args) => {
            handle_publish(args, format, verbose).await?;
        }
        Commands::Checkpoint(args) => {
            handle_checkpoint(args, format, verbose).await?;
        }
        Commands::Config(cmd) => {
            handle_config(cmd, format, verbose).await?;
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};
use crate::services::create_sink;

#[derive(Debug, Args)]
pub struct PublishArgs {
    #[arg(long, short = 'o', help = "File to publish (defaults to the configured output)")]
    pub output: Option<PathBuf>,
}

pub async fn handle_publish(args: PublishArgs, format: OutputFormat, _verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);

    let publish = config
        .publish
        .clone()
        .with_env(|key| std::env::var(key).ok());
    publish.validate()?;

    let sink = create_sink(&publish)?.ok_or_else(|| {
        anyhow::anyhow!("no publish sink configured; set [publish] sink = \"local\" or \"drive\"")
    })?;

    let path = args.output.unwrap_or(config.output.path);
    let destination = sink
        .publish(&path)
        .await
        .with_context(|| format!("failed to publish {}", path.display()))?;

    tracing::info!(%destination, "output published");
    print!("{}", formatter.format_destination(&destination));
    Ok(())
}

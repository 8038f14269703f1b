use anyhow::Result;

use crate::cli::output::{StatusInfo, get_formatter};
use crate::models::{Config, OutputFormat};
use crate::services::{CheckpointStore, OutputWriter};

const RECENT_RUNS: usize = 5;

pub async fn handle_status(format: OutputFormat, _verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);

    let checkpoint = CheckpointStore::open(&config.output.checkpoint_path)?;
    let summary = checkpoint.summary()?;
    let recent_runs = checkpoint.recent_runs(RECENT_RUNS)?;
    let failures = checkpoint.failures()?;

    let output_rows = OutputWriter::row_counts(&config.output.path)?
        .iter()
        .map(|(_, rows)| rows)
        .sum::<usize>();

    let status = StatusInfo {
        checkpoint_path: config.output.checkpoint_path.display().to_string(),
        output_path: config.output.path.display().to_string(),
        output_rows,
        sink: config.publish.sink.to_string(),
        summary,
        recent_runs,
        failures,
    };

    print!("{}", formatter.format_status(&status));
    Ok(())
}

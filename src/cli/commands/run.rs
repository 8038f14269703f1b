use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tokio::sync::watch;

use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat, RunConfiguration, RunOverrides};
use crate::services::{CheckpointStore, OpenAiVision, Pipeline, create_sink};
use crate::sources::RainforestSource;
use crate::utils::read_keywords;

#[derive(Debug, Args)]
pub struct RunArgs {
    #[arg(long, short = 'n', help = "Maximum number of new products to process")]
    pub limit: Option<usize>,

    #[arg(long, help = "Keyword list (.csv or one keyword per line)")]
    pub keywords_file: Option<PathBuf>,

    #[arg(long, help = "Only use the first N keywords")]
    pub keyword_limit: Option<usize>,

    #[arg(long, help = "Search result pages to fetch per keyword")]
    pub max_pages: Option<u32>,

    #[arg(long, short = 'o', help = "Output CSV path")]
    pub output: Option<PathBuf>,

    #[arg(long, help = "Checkpoint database path")]
    pub checkpoint: Option<PathBuf>,

    #[arg(long, help = "Do not publish the output file after the run")]
    pub no_publish: bool,

    #[arg(long, help = "Ignore cached search results and search again")]
    pub refresh_search: bool,

    #[arg(
        long,
        env = "RAINFOREST_API_KEY",
        hide_env_values = true,
        help = "Rainforest API key"
    )]
    pub rainforest_key: Option<String>,

    #[arg(
        long,
        env = "OPENAI_API_KEY",
        hide_env_values = true,
        help = "OpenAI API key"
    )]
    pub openai_key: Option<String>,
}

impl RunArgs {
    fn overrides(self) -> RunOverrides {
        RunOverrides {
            item_limit: self.limit,
            keyword_limit: self.keyword_limit,
            keywords_file: self.keywords_file,
            max_pages: self.max_pages,
            output_path: self.output,
            checkpoint_path: self.checkpoint,
            search_api_key: self.rainforest_key,
            vision_api_key: self.openai_key,
            no_publish: self.no_publish,
            refresh_search: self.refresh_search,
        }
    }
}

pub async fn handle_run(
    args: RunArgs,
    format: OutputFormat,
    verbose: bool,
    stop: watch::Receiver<bool>,
) -> Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    let run_config = RunConfiguration::resolve(&config, args.overrides(), |key| {
        std::env::var(key).ok()
    })?;
    let formatter = get_formatter(format);

    let keywords = read_keywords(&run_config.keywords_file, run_config.keyword_column)?;
    tracing::info!(
        keywords = keywords.len(),
        limit = run_config.item_limit,
        output = %run_config.output_path.display(),
        "starting run"
    );

    let checkpoint = Arc::new(CheckpointStore::open(&run_config.checkpoint_path)?);
    let source = Arc::new(RainforestSource::new(
        &run_config.search,
        &run_config.search_api_key,
    )?);
    let extractor = Arc::new(OpenAiVision::new(
        &run_config.vision,
        &run_config.vision_api_key,
    )?);
    let sink = create_sink(&run_config.publish)?;

    let mut pipeline = Pipeline::new(run_config, source.clone(), extractor, checkpoint)
        .with_stop_signal(stop)
        .with_progress(format == OutputFormat::Text && !verbose);
    if let Some(sink) = sink {
        pipeline = pipeline.with_sink(Arc::from(sink));
    }

    let report = pipeline.run(&keywords).await?;
    tracing::info!(credits = source.credits_used(), "search credits used");

    print!("{}", formatter.format_run_report(&report));
    Ok(())
}

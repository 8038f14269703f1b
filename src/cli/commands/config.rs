use anyhow::{Context, Result};
use clap::Subcommand;

use crate::cli::output::{Formatter, get_formatter};
use crate::models::{Config, OutputFormat};

const MASK: &str = "********";

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Initialize configuration file")]
    Init {
        #[arg(
            long,
            short = 'g',
            help = "Create global config instead of project config"
        )]
        global: bool,
        #[arg(long, help = "Force overwrite existing config")]
        force: bool,
    },
    #[command(about = "Show current configuration")]
    Show,
    #[command(about = "Show configuration file paths")]
    Path,
}

pub async fn handle_config(cmd: ConfigCommand, format: OutputFormat, _verbose: bool) -> Result<()> {
    let formatter = get_formatter(format);

    match cmd {
        ConfigCommand::Init { global, force } => handle_init(global, force, formatter.as_ref()),
        ConfigCommand::Show => handle_show(format),
        ConfigCommand::Path => handle_path(formatter.as_ref()),
    }
}

fn handle_init(global: bool, force: bool, formatter: &dyn Formatter) -> Result<()> {
    let config_path = if global {
        Config::global_path().ok_or_else(|| anyhow::anyhow!("could not determine config directory"))?
    } else {
        Config::project_path()
    };

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config already exists at: {}\nUse --force to overwrite.",
            config_path.display()
        );
    }

    let path = if global {
        Config::init_global().context("failed to create global config")?
    } else {
        Config::init_project().context("failed to create project config")?
    };
    print!(
        "{}",
        formatter.format_message(&format!("Created config at: {}", path.display()))
    );
    Ok(())
}

/// Replace stored secrets so `show` never prints them.
fn masked(mut config: Config) -> Config {
    let mask = |v: &mut Option<String>| {
        if v.is_some() {
            *v = Some(MASK.to_string());
        }
    };
    mask(&mut config.search.api_key);
    mask(&mut config.vision.api_key);
    mask(&mut config.publish.access_token);
    config
}

fn handle_show(format: OutputFormat) -> Result<()> {
    let config = masked(Config::load()?);

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    match Config::locate() {
        Some(path) => println!("# Loaded from: {}", path.display()),
        None => println!("# No config file found, showing defaults"),
    }
    println!();
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn handle_path(formatter: &dyn Formatter) -> Result<()> {
    let active = Config::locate();
    let project = Config::project_path();
    let mut lines = vec!["Configuration paths:".to_string()];

    let state = |path: &std::path::Path| {
        if active.as_deref() == Some(path) {
            "active"
        } else if path.exists() {
            "shadowed"
        } else {
            "would be"
        }
    };

    lines.push(format!("  Project ({}): {}", state(project.as_path()), project.display()));
    if let Some(global) = Config::global_path() {
        lines.push(format!("  Global ({}): {}", state(global.as_path()), global.display()));
    }

    print!("{}", formatter.format_message(&lines.join("\n")));
    Ok(())
}

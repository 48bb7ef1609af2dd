//! `aecflow` binary.

mod cli;
mod config;
mod simulate;

use anyhow::{Context, Result};
use clap::Parser;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = aecflow_log::Config::from_env();
    if cli.verbose && std::env::var_os("AECFLOW_LOG").is_none() {
        log_config.level = "debug".to_owned();
    }
    let _log_guard = aecflow_log::init_with(log_config)?;

    let config = config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Simulate {
            prompt,
            answers,
            edit_once,
            cancel,
        } => {
            let script = simulate::Script {
                prompt,
                answers,
                edit_once,
                cancel,
            };
            let status = simulate::run(&config, script).await?;
            tracing::info!(%status, "simulation finished");
        }
        Commands::Config => {
            let rendered = toml::to_string_pretty(&config).context("failed to render configuration")?;
            print!("{rendered}");
        }
    }
    Ok(())
}

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// aecflow - drive Agent Execution Contracts through generation.
#[derive(Parser, Debug)]
#[command(name = "aecflow")]
#[command(version)]
#[command(about = "Generation workflow coordinator for Agent Execution Contracts.", long_about = None)]
pub struct Cli {
    /// TOML config file layered over the built-in defaults
    #[arg(short, long, global = true, env = "AECFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log at debug level unless AECFLOW_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one contract end to end on in-memory drivers
    Simulate {
        /// Prompt the draft contract starts from
        #[arg(short, long, default_value = "Add rate limiting to the public API")]
        prompt: String,

        /// Answer a clarification question (repeatable); none means skip
        #[arg(short, long = "answer", value_name = "ID=VALUE", value_parser = parse_answer)]
        answers: Vec<(String, String)>,

        /// Send the contract back to draft at the first findings review
        #[arg(long, conflicts_with = "cancel")]
        edit_once: bool,

        /// Cancel at the findings review
        #[arg(long)]
        cancel: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn parse_answer(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((id, value)) if !id.trim().is_empty() => Ok((id.trim().to_owned(), value.to_owned())),
        _ => Err(format!("expected ID=VALUE, got '{raw}'")),
    }
}

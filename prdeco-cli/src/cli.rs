use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};

/// Decorate pull requests with code analysis results
#[derive(Parser)]
#[command(name = "prdeco", version)]
pub struct Cli {
    /// Path to the TOML run configuration
    #[arg(
        short,
        long,
        env = "PRDECO_CONFIG",
        global = true,
        default_value = "prdeco.toml"
    )]
    pub config: PathBuf,

    /// Token replacing the one stored in the configuration (ignored for github)
    #[arg(long, env = "PRDECO_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Log as JSON lines and print the result as JSON
    #[arg(long, env = "PRDECO_JSON", global = true)]
    pub json: bool,

    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Publish an analysis result onto its pull request
    Decorate {
        /// Path to the analysis result JSON
        #[arg(short, long, env = "PRDECO_ANALYSIS")]
        analysis: PathBuf,
    },
    /// Check the configured credentials without publishing anything
    Validate,
}

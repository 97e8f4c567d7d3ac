mod cli;
mod config;
mod telemetry;

use std::fs;
use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use prdeco::{AnalysisResult, DecorationResult};
use tracing::{debug, error};

use cli::{Cli, Command};
use config::RunConfig;

const EXIT_FAILURE: u8 = 1;
const EXIT_CONFIG: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    telemetry::init(cli.json, cli.verbosity.tracing_level_filter());

    let config = match RunConfig::load(&cli.config, cli.token.clone()) {
        Ok(config) => config,
        Err(e) => return fail(&e, EXIT_CONFIG),
    };

    let outcome = match &cli.command {
        Command::Decorate { analysis } => match read_analysis(analysis) {
            Ok(analysis) => prdeco::decorate(&config.binding, &config.settings, &analysis)
                .await
                .map(|result| print_result(&result, cli.json))
                .map_err(anyhow::Error::from),
            Err(e) => return fail(&e, EXIT_CONFIG),
        },
        Command::Validate => prdeco::validate(&config.binding)
            .await
            .map(|()| println!("ok"))
            .map_err(anyhow::Error::from),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(&e, EXIT_FAILURE),
    }
}

fn read_analysis(path: &Path) -> anyhow::Result<AnalysisResult> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read analysis {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid analysis {}", path.display()))
}

fn print_result(result: &DecorationResult, json: bool) {
    if json {
        match serde_json::to_string(result) {
            Ok(line) => println!("{line}"),
            Err(e) => error!(error = %e, "failed to serialize result"),
        }
    } else {
        println!("{}", result.url);
    }
}

fn fail(e: &anyhow::Error, code: u8) -> ExitCode {
    let kind = e.downcast_ref::<prdeco::Error>().map(prdeco::Error::kind);
    debug!(?kind, code, "run aborted");
    eprintln!("error: {e:#}");
    ExitCode::from(code)
}

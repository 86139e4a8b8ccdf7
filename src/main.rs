mod cli;
mod logging;

use std::process;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use cli::{Cli, Commands};
use colored::*;
use dlprune::config::load_configuration;
use dlprune::{App, AppConfig, PruneSummary};
use dotenv::dotenv;
use indicatif::HumanBytes;
use tracing::{error, info};

fn main() {
    dotenv().ok();

    let _guard = logging::init_logger();

    let args = Cli::parse();

    let Some(command) = args.command else {
        let _ = Cli::command().print_long_help();
        return;
    };

    let config = match load_configuration(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    match command {
        Commands::Prune => {
            if let Err(err) = run_prune(&config) {
                error!("Error: {:#}", err);
                process::exit(1);
            }
        }
        Commands::PrintConfig => {
            println!("Configuration: {:#?}", config);
        }
    }
}

fn run_prune(config: &AppConfig) -> anyhow::Result<()> {
    let app = App::from_config(config).context("setting up PVR clients")?;
    if app.pvrs().is_empty() {
        anyhow::bail!("no PVRs configured");
    }
    let summary = app.prune().context("prune run aborted")?;
    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &PruneSummary) {
    println!();
    info!(
        "{} imports, {} deletions, {} invalid downloads, {} failed",
        format!("{}", summary.imports).green(),
        format!("{}", summary.deletions).cyan(),
        format!("{}", summary.invalid_dl).yellow(),
        format!("{}", summary.forced_failures).red(),
    );
    info!(
        "{} freed, queue: {} marked failed, {} cleaned up",
        format!("{}", HumanBytes(summary.total_freed)).green(),
        format!("{}", summary.queue_failed).red(),
        format!("{}", summary.queue_cleanup).cyan(),
    );
}

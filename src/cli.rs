use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "dlprune")]
#[command(about = "Reconciles a usenet download directory with Sonarr/Radarr", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to ./config.{yml,toml,json})
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Import, clean up and reconcile PVR queues once
    Prune,
    /// Print configuration values
    PrintConfig,
}

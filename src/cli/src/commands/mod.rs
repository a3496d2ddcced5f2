//! CLI command definitions and dispatch.

mod cache;
mod chain;
mod diagnose;
mod fallback;
mod status;
mod version;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use regtrust_core::config::regtrust_home;
use regtrust_core::FallbackConfig;

/// RegTrust - registry certificate diagnosis and trust fallback.
#[derive(Parser)]
#[command(name = "regtrust", version, about)]
pub struct Cli {
    /// Configuration file (defaults to ~/.regtrust/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Classify a certificate validation error and recommend fixes
    Diagnose(diagnose::DiagnoseArgs),
    /// Validate every certificate of a PEM chain
    Chain(chain::ChainArgs),
    /// Run the fallback strategies for a registry
    Fallback(fallback::FallbackArgs),
    /// Store a certificate in the local certificate cache
    Cache(cache::CacheArgs),
    /// Show the persistent trust store
    Status(status::StatusArgs),
    /// Show version information
    Version(version::VersionArgs),
}

/// Path of the default configuration file (~/.regtrust/config.yaml).
pub(crate) fn default_config_path() -> PathBuf {
    regtrust_home().join("config.yaml")
}

/// Load configuration and overlay `REGTRUST_*` environment variables.
///
/// An explicit path must exist; the default path is optional.
pub(crate) fn load_config(
    path: Option<&Path>,
) -> Result<FallbackConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => FallbackConfig::load(path)?,
        None => FallbackConfig::load_or_default(Some(&default_config_path()))?,
    };
    Ok(config.apply_env()?)
}

/// A validation error as reported by a registry client.
#[derive(Debug)]
pub(crate) struct ReportedError(pub String);

impl std::fmt::Display for ReportedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ReportedError {}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = cli.config.as_deref();
    match cli.command {
        Command::Diagnose(args) => diagnose::execute(args, config).await,
        Command::Chain(args) => chain::execute(args).await,
        Command::Fallback(args) => fallback::execute(args, config).await,
        Command::Cache(args) => cache::execute(args, config).await,
        Command::Status(args) => status::execute(args, config).await,
        Command::Version(args) => version::execute(args).await,
    }
}

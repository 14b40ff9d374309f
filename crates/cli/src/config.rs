//! Command-line arguments and the `sweep.toml` run configuration.
//!
//! Precedence for concurrency limits: command-line flag, then `[limits]` in
//! the file, then the built-in defaults. The bearer token is read from the
//! environment variable named by `token_env`, never from the file.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use pipeline::{ConcurrencyLimits, SweepError};
use remote::RemoteConfig;
use serde::Deserialize;

/// Default environment variable holding the bearer token.
pub const DEFAULT_TOKEN_ENV: &str = "SWEEP_API_TOKEN";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Apply a mutation to every item of a paginated remote collection.
#[derive(Debug, Parser)]
#[command(name = "sweep", version, about)]
pub struct Cli {
    /// Path to the run configuration.
    #[arg(long, env = "SWEEP_CONFIG", default_value = "sweep.toml")]
    pub config: PathBuf,

    /// Pages processed concurrently (overrides `[limits]`).
    #[arg(long)]
    pub max_concurrent_pages: Option<usize>,

    /// Mutations in flight per page (overrides `[limits]`).
    #[arg(long)]
    pub max_concurrent_items: Option<usize>,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Print the final report as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Contents of `sweep.toml`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub remote: RemoteConfig,
    #[serde(default)]
    pub limits: LimitsSection,
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsSection {
    pub max_concurrent_pages: Option<usize>,
    pub max_concurrent_items: Option<usize>,
}

fn default_token_env() -> String {
    DEFAULT_TOKEN_ENV.into()
}

/// Everything the composition root needs to build a pipeline.
#[derive(Debug)]
pub struct RunConfig {
    pub remote: RemoteConfig,
    pub limits: ConcurrencyLimits,
}

impl RunConfig {
    /// Reads the file named on the command line and applies overrides.
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let file = read_file_config(&cli.config)?;
        let token = std::env::var(&file.token_env).ok().filter(|t| !t.is_empty());
        if token.is_none() {
            tracing::warn!(
                token_env = %file.token_env,
                "No bearer token in environment; requests will be unauthenticated"
            );
        }
        Ok(resolve(file, cli, token)?)
    }
}

fn read_file_config(path: &Path) -> anyhow::Result<FileConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading configuration from {}", path.display()))?;
    parse_file_config(&text).with_context(|| format!("parsing {}", path.display()))
}

pub fn parse_file_config(text: &str) -> Result<FileConfig, SweepError> {
    toml::from_str(text).map_err(|err| SweepError::ConfigurationError {
        message: err.to_string(),
    })
}

/// Merges file values, command-line overrides and the token.
pub fn resolve(file: FileConfig, cli: &Cli, token: Option<String>) -> Result<RunConfig, SweepError> {
    let pages = cli
        .max_concurrent_pages
        .or(file.limits.max_concurrent_pages)
        .unwrap_or(ConcurrencyLimits::DEFAULT_PAGES);
    let items = cli
        .max_concurrent_items
        .or(file.limits.max_concurrent_items)
        .unwrap_or(ConcurrencyLimits::DEFAULT_ITEMS);
    let limits = ConcurrencyLimits::new(pages, items)?;

    let mut remote = file.remote;
    remote.bearer_token = token;
    remote
        .validate()
        .map_err(|err| SweepError::ConfigurationError {
            message: err.to_string(),
        })?;

    Ok(RunConfig { remote, limits })
}

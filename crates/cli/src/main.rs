//! Sweep CLI entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse configuration** — command-line flags plus `sweep.toml`.
//! 2. **Wire observability** — `tracing-subscriber` with a text or JSON layer
//!    and an optional OpenTelemetry OTLP exporter.
//! 3. **Construct infrastructure** — a [`remote::HttpCollectionClient`]
//!    injected into [`pipeline::PagePipeline`] as all three collaborators.
//! 4. **Run** — Ctrl-C cancels the run; in-flight mutations drain before the
//!    report is printed.

mod config;
mod observability;
mod report;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use pipeline::{CancellationToken, PagePipeline};
use remote::HttpCollectionClient;
use tracing::warn;

use crate::config::{Cli, RunConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let _telemetry = observability::init(cli.log_format).context("initialising tracing")?;
    let config = RunConfig::load(&cli)?;

    let client = Arc::new(
        HttpCollectionClient::new(config.remote).context("building remote collection client")?,
    );
    let pipeline =
        PagePipeline::new(client.clone(), client.clone(), config.limits).with_estimator(client);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Stop requested; finishing in-flight work");
                cancel.cancel();
            }
        }
    });

    let report = pipeline.run_until_cancelled(cancel).await;

    if cli.json {
        println!("{}", report::render_json(&report)?);
    } else {
        println!("{}", report::render(&report));
    }
    Ok(())
}

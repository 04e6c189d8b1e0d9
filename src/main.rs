use anyhow::Result;
use clap::{Parser, Subcommand};
use grantscope::{config::PipelineConfig, pipeline};
use std::{path::PathBuf, time::Instant};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Build the NSF award and cancellation tables and the views derived from them.
#[derive(Parser, Debug)]
#[command(name = "grantscope")]
#[command(version)]
struct Cli {
    /// YAML pipeline config; defaults are used for anything not set
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract the award corpus from the raw per-year documents
    Awards,
    /// Reconcile the cancellation feed against the award table
    Cancellations,
    /// Derive and write the presentation views
    Views,
    /// Run every stage in order
    All,
}

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,grantscope=info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();

    std::panic::set_hook(Box::new(|info| {
        eprintln!("panic: {:?}", info);
    }));

    // ─── 2) load config ──────────────────────────────────────────────
    let cli = Cli::parse();
    let config = PipelineConfig::load(cli.config.as_deref())?;
    info!(command = ?cli.command, years = ?config.years, "startup");

    // ─── 3) run ──────────────────────────────────────────────────────
    let start = Instant::now();
    match cli.command {
        Command::Awards => {
            let awards = pipeline::run_awards(&config)?;
            info!(rows = awards.len(), "awards done");
        }
        Command::Cancellations => {
            let (rows, report) = pipeline::run_cancellations(&config)?;
            info!(rows = rows.len(), matched = report.matched, "cancellations done");
        }
        Command::Views => {
            let views = pipeline::run_views(&config)?;
            info!(complete = views.complete.len(), "views done");
        }
        Command::All => pipeline::run_all(&config)?,
    }
    info!("finished in {:?}", start.elapsed());
    Ok(())
}

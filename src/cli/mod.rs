//! Command-line interface for s3lite
//!
//! ```bash
//! s3lite mb s3://bucket
//! s3lite put ./report.csv s3://bucket/reports/
//! s3lite put ./site s3://bucket/www --recursive
//! s3lite get s3://bucket/reports/report.csv -o report.csv
//! s3lite stat s3://bucket/reports/report.csv
//! s3lite rm s3://bucket/reports/report.csv
//! s3lite rb s3://bucket
//! ```
//!
//! Credentials come from `--config` (YAML profiles) or, without it, from
//! the environment (see [`crate::config::load_from_env`]).

pub mod args;
pub mod commands;

use crate::config;
use crate::s3::S3Client;
use anyhow::{Context, Result};
use tracing::debug;

use args::{Cli, Commands};
use commands::*;

/// Run a parsed command line against the configured endpoint
pub fn run(cli: Cli) -> Result<()> {
    let config = config::load_config(cli.config.as_deref(), cli.profile.as_deref())
        .context("Failed to load configuration")?;

    let mut profile = config
        .get_profile(cli.profile.as_deref())
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("No profile configured"))?;
    if cli.insecure {
        profile.insecure_tls = true;
    }
    debug!(?profile, "using profile");

    let mut client = S3Client::from_profile(&profile)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Commands::Mb { bucket } => cmd_mb(&mut client, &bucket, &mut out)?,
        Commands::Rb { bucket } => cmd_rb(&mut client, &bucket, &mut out)?,
        Commands::Put {
            source,
            dest,
            content_type,
            recursive,
        } => cmd_put(&mut client, &source, &dest, &content_type, recursive, &mut out)?,
        Commands::Get { path, output } => cmd_get(&mut client, &path, output.as_deref(), &mut out)?,
        Commands::Rm { path } => cmd_rm(&mut client, &path, &mut out)?,
        Commands::Stat { path } => cmd_stat(&mut client, &path, &mut out)?,
    }

    Ok(())
}

/// Initialize logging to stderr; `RUST_LOG` overrides `level`
pub fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

use std::sync::Arc;

use anyhow::{Result, ensure};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use market_data_ingestor::auth::Credential;
use quote_sync::SyncEngine;
use quote_sync::config::{self, Config};
use quote_sync::sweeper::spawn_sweeper;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about = "Quote Sync CLI")]
struct Cli {
    /// TOML config; defaults apply when omitted.
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<String>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Print a daily series, from the cache when possible.
    Series {
        symbol: String,
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
        /// Always fetch from the upstream.
        #[arg(long)]
        no_cache: bool,
    },
    /// Re-fetch the recent window and merge it into the stored history.
    Refresh { symbol: String },
    /// Print the upstream symbol catalog.
    Symbols,
    Stats,
    /// Remove one symbol, or everything.
    Clear { symbol: Option<String> },
    TestConnection,
    /// Run one TTL sweep.
    Sweep,
    /// Sweep expired entries every `cache.sweep_interval_secs` until Ctrl-C.
    Watch,
    /// Set a symbol's eviction priority (1 = evicted first).
    Priority {
        symbol: String,
        #[arg(value_parser = clap::value_parser!(u8).range(1..=10))]
        priority: u8,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let cfg = match &cli.config {
        Some(path) => config::load_config_path(path)?,
        None => Config::default(),
    }
    .with_env_overrides();
    cfg.validate()?;

    let engine = Arc::new(SyncEngine::from_config(&cfg, Credential::from_env()).await?);

    match cli.cmd {
        Cmd::Series {
            symbol,
            from,
            to,
            no_cache,
        } => print_json(&engine.get_series(&symbol, from, to, !no_cache).await?)?,
        Cmd::Refresh { symbol } => print_json(&engine.refresh_recent(&symbol).await?)?,
        Cmd::Symbols => print_json(&engine.list_symbols().await?)?,
        Cmd::Stats => print_json(&engine.get_cache_stats().await?)?,
        Cmd::Clear { symbol } => {
            let removed = engine.clear_cache(symbol.as_deref()).await?;
            print_json(&serde_json::json!({ "removed": removed }))?;
        }
        Cmd::TestConnection => {
            let status = engine.test_connection().await;
            print_json(&status)?;
            ensure!(status.success, "connection test failed");
        }
        Cmd::Sweep => print_json(&engine.sweep_expired().await?)?,
        Cmd::Watch => {
            let sweeper = spawn_sweeper(Arc::clone(&engine), cfg.sweep_interval());
            info!(interval_secs = cfg.cache.sweep_interval_secs, "sweeper running");
            tokio::signal::ctrl_c().await?;
            sweeper.shutdown().await;
        }
        Cmd::Priority { symbol, priority } => engine.set_priority(&symbol, priority).await?,
    }

    Ok(())
}

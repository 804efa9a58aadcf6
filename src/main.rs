use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

mod account;
mod config;
mod control;
mod monitor;
mod notify;
mod snapshot;
mod status;

use config::Config;
use control::{ProcessClient, WindowMatcher};
use monitor::Monitor;
use notify::WebhookNotifier;
use snapshot::FileStateSource;

#[derive(Debug, Parser)]
#[command(
    name = "subwatch",
    version,
    about = "Multi-account game client lifecycle monitor"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run a single poll cycle, print the status table, and exit
    #[arg(long)]
    once: bool,

    /// Override how many cycles pass between status tables
    #[arg(long)]
    status_every: Option<u64>,
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("subwatch")
        .join("subwatch.toml")
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let path = cli.config.unwrap_or_else(default_config_path);
    let mut cfg = Config::load(&path)?;
    if let Some(every) = cli.status_every {
        cfg.status_every = every;
    }

    let matcher = WindowMatcher::from_accounts(&cfg.accounts)?;
    let control = ProcessClient::new(cfg.client_path.clone(), matcher);
    let source = FileStateSource::new(cfg.state_dir.clone());
    let notifier = WebhookNotifier::new(cfg.webhook_url.clone())?;

    let mut monitor = Monitor::new(cfg, source, control, notifier);
    if cli.once {
        monitor.run_once().await;
        return Ok(());
    }
    monitor.run().await
}

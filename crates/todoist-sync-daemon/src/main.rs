//! todoist-sync: Headless daemon mirroring Todoist projects into a vault.
//!
//! Runs the todoist-sync engine against the native filesystem and the
//! Todoist REST API, either once or on a timer.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use todoist_sync::{DeviceGate, PassReport, Scheduler, SyncEngine, SystemClock, TickOutcome};
use todoist_sync_daemon::{Config, NativeFs, RestClient};

#[derive(Parser, Debug)]
#[command(name = "todoist-sync")]
#[command(about = "Mirror Todoist projects into a markdown vault")]
struct Args {
    /// Path to the vault directory
    #[arg(short, long, env = "TODOIST_SYNC_VAULT")]
    vault: PathBuf,

    /// Config file (default: ~/.config/todoist-sync/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Todoist API token (overrides the config file)
    #[arg(long, env = "TODOIST_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    /// Run a single pass and exit
    #[arg(long)]
    once: bool,

    /// Print the pass report as JSON (with --once)
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "info,todoist_sync=debug,todoist_sync_daemon=debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load(&config_path)?;
    if let Some(token) = args.api_token.clone() {
        config.api_token = token;
    }
    config
        .validate()
        .with_context(|| format!("Invalid configuration in {:?}", config_path))?;

    if !args.vault.is_dir() {
        bail!("Vault directory {:?} does not exist", args.vault);
    }
    let vault = args
        .vault
        .canonicalize()
        .with_context(|| format!("Failed to resolve vault path {:?}", args.vault))?;

    let host = hostname::get()
        .context("Failed to read hostname")?
        .to_string_lossy()
        .to_string();
    let settings = config.settings(&vault);

    info!("Starting todoist-sync");
    info!("Vault path: {:?} ({})", vault, settings.vault_name);
    info!(
        "Projects folder: {}, archive folder: {}",
        settings.project_folder, settings.archive_folder
    );

    let client = RestClient::new(&config.api_base_url, &config.api_token)?;
    let engine = SyncEngine::new(NativeFs::new(vault), client, SystemClock, settings);
    let scheduler = Scheduler::new(
        engine,
        DeviceGate::new(&config.primary_sync_device, host),
    );

    if args.once {
        return run_once(&scheduler, args.json).await;
    }

    info!("Daemon running. Press Ctrl+C to stop.");
    scheduler
        .run(config.sync_interval(), async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
        })
        .await;

    info!("Shutting down");
    Ok(())
}

/// Manual trigger: one gated pass, report on stdout.
async fn run_once(
    scheduler: &Scheduler<NativeFs, RestClient, SystemClock>,
    json: bool,
) -> Result<()> {
    let handle = match scheduler.tick() {
        TickOutcome::Started(handle) => handle,
        TickOutcome::SkippedDevice => {
            info!("Not the primary sync device, nothing to do");
            return Ok(());
        }
        TickOutcome::Dropped => bail!("A sync pass is already running"),
    };

    let report = handle.await.context("Sync pass panicked")??;
    print_report(&report, json)?;
    Ok(())
}

fn print_report(report: &PassReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("{}", report.summary());
    for path in &report.created {
        println!("  created   {}", path);
    }
    for m in &report.moved {
        println!("  moved     {} -> {}", m.from, m.to);
    }
    for m in &report.archived {
        println!("  archived  {} -> {}", m.from, m.to);
    }
    for folder in &report.pruned_folders {
        println!("  removed   {}/", folder);
    }
    for conflict in &report.conflicts {
        println!("  conflict  {}: {}", conflict.path, conflict.reason);
    }
    for failure in report.failures.iter().chain(&report.breadcrumb_failures) {
        println!("  failed    {}: {}", failure.id, failure.error);
    }
    for dup in &report.duplicates {
        println!(
            "  duplicate TodoistId {} in {} (kept {})",
            dup.id, dup.ignored, dup.kept
        );
    }
    Ok(())
}

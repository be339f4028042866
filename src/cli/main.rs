mod commands;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use commands::Args;
use transfer_ledger::{EngineConfig, InMemoryAccountStore, TransferEngine};

fn main() -> Result<()> {
    // Parse the CLI arguments
    let args = Args::parse();

    // Initialize logger with default level of info (can be overridden with RUST_LOG)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // 1. Resolve config: defaults, then file, then flags
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(max_attempts) = args.max_attempts {
        config = config.with_max_attempts(max_attempts);
    }
    if let Some(lock_timeout_ms) = args.lock_timeout_ms {
        config = config.with_lock_timeout(Duration::from_millis(lock_timeout_ms));
    }
    log::debug!("Using {config:?}");

    // 2. Initialize the store and engine
    let store = Arc::new(InMemoryAccountStore::from_config(&config));
    let engine = TransferEngine::new(store, config);

    // 3. Seed opening balances
    log::info!("Loading accounts from {}", args.accounts.display());
    let accounts = std::fs::File::open(&args.accounts)
        .with_context(|| format!("Failed to open accounts file: {}", args.accounts.display()))?;
    engine
        .load_accounts(accounts)
        .context("Failed to load accounts")?;

    // 4. Apply transfers
    log::info!(
        "Processing transfers from {} with {} worker(s)",
        args.transfers_file.display(),
        args.workers
    );
    let transfers = std::fs::File::open(&args.transfers_file).with_context(|| {
        format!(
            "Failed to open transfers file: {}",
            args.transfers_file.display()
        )
    })?;
    let report = engine
        .process_transfers(transfers, args.workers)
        .context("Failed to process transfers")?;
    for (kind, count) in &report.by_kind {
        log::info!("  {kind}: {count}");
    }

    // 5. Export the balances to stdout
    engine
        .export_accounts(std::io::stdout())
        .context("Failed to export accounts to stdout")?;

    log::info!("Export complete");

    Ok(())
}

//! Basic example of using the `TransferEngine`.
//!
//! Run with: `cargo run --example basic`

use rust_decimal::Decimal;
use std::io::Cursor;
use std::str::FromStr;
use std::sync::Arc;
use transfer_ledger::{EngineConfig, InMemoryAccountStore, OwnerId, TransferEngine};

fn main() {
    // Initialize logger (optional, but shows what's happening)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let accounts = r"owner,balance
alice,100.00
bob,20.00
carol,0
";

    // Sample transfers as CSV
    let transfers = r"from,to,amount
alice,bob,30
bob,carol,45.50
carol,alice,0.50
alice,alice,10
bob,dave,1
carol,bob,1000
";

    // Create engine and seed accounts
    let config = EngineConfig::default();
    let engine = TransferEngine::new(Arc::new(InMemoryAccountStore::from_config(&config)), config);
    engine
        .load_accounts(Cursor::new(accounts))
        .expect("Failed to load accounts");

    // Process the batch on two workers
    let report = engine
        .process_transfers(Cursor::new(transfers), 2)
        .expect("Failed to process transfers");
    println!("\n=== Batch Report ===\n{report:?}");

    // A single request, the way a request handler would issue it
    let amount = Decimal::from_str("5").expect("valid decimal");
    match engine.transfer(&OwnerId::from("bob"), &OwnerId::from("alice"), amount) {
        Ok(()) => println!("bob -> alice: ok"),
        Err(err) => println!("bob -> alice: {} ({err})", err.status_code()),
    }

    // Export results to stdout
    println!("\n=== Final Account State ===");
    engine
        .export_accounts(std::io::stdout())
        .expect("Failed to export accounts");
}

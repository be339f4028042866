pub(crate) use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "transfer-ledger",
    author,
    version,
    about = "Apply a batch of funds transfers to a set of accounts",
    long_about = None,
    after_help = "OUTPUT:\n    Final balances are printed to stdout in CSV format (owner,balance).\n    Use shell redirection to save to a file:\n\n    transfer-ledger --accounts accounts.csv transfers.csv > balances.csv"
)]
pub struct Args {
    /// Path to the transfers CSV file
    #[arg(
        index = 1,
        value_name = "FILE",
        help = "Input CSV file with columns: from, to, amount"
    )]
    pub transfers_file: PathBuf,

    /// Path to the opening balances CSV file
    #[arg(long, value_name = "FILE", help = "CSV file with columns: owner, balance")]
    pub accounts: PathBuf,

    /// Optional JSON engine config
    #[arg(long, value_name = "FILE", env = "LEDGER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Number of worker threads executing transfers
    #[arg(long, default_value_t = 1, env = "LEDGER_WORKERS")]
    pub workers: usize,

    /// Attempts per transfer when the store reports a conflict (overrides config)
    #[arg(long, env = "LEDGER_MAX_ATTEMPTS")]
    pub max_attempts: Option<u32>,

    /// Longest wait for an account lock, in milliseconds (overrides config)
    #[arg(long, env = "LEDGER_LOCK_TIMEOUT_MS")]
    pub lock_timeout_ms: Option<u64>,
}

use super::account::OwnerId;
use super::amount::{Amount, AmountError};
use super::Decimal;

/// Top-level error type for batch input/output around the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Invalid account record for {owner}: {reason}")]
    InvalidAccount { owner: OwnerId, reason: AmountError },
}

/// Errors reported by an account store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Contention with another transaction; the whole unit of work may be retried.
    #[error("transaction conflict: {0}")]
    Conflict(String),
    #[error("account {0} already exists")]
    AccountExists(OwnerId),
    #[error("account {0} does not exist")]
    AccountMissing(OwnerId),
    #[error("commit would leave account {0} with an invalid balance")]
    ConstraintViolation(OwnerId),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store state poisoned by a panicked writer")]
    Poisoned,
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// Reasons a transfer was refused or failed.
///
/// Validation variants are listed in the order the engine checks them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    #[error("Invalid amount {amount}: {reason}")]
    InvalidAmount { amount: Decimal, reason: AmountError },

    #[error("Cannot transfer money to yourself")]
    SelfTransfer,

    #[error("Source account {owner} not found")]
    SourceNotFound { owner: OwnerId },

    #[error("Insufficient balance: {owner} has {available}, requested {requested}")]
    InsufficientBalance {
        owner: OwnerId,
        available: Amount,
        requested: Amount,
    },

    #[error("Receiver account {owner} not found")]
    DestinationNotFound { owner: OwnerId },

    /// Returned by a single attempt. The retrying entry points never surface it:
    /// running out of attempts is reported as `StorageFailure`.
    #[error("Transient store conflict: {0}")]
    TransientConflict(String),

    #[error("Storage failure: {0}")]
    StorageFailure(String),
}

impl TransferError {
    /// Transport status a boundary layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            TransferError::InvalidAmount { .. }
            | TransferError::SelfTransfer
            | TransferError::InsufficientBalance { .. } => 400,
            TransferError::SourceNotFound { .. } | TransferError::DestinationNotFound { .. } => {
                404
            }
            TransferError::TransientConflict(_) | TransferError::StorageFailure(_) => 500,
        }
    }

    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            TransferError::InvalidAmount { .. } => "invalid_amount",
            TransferError::SelfTransfer => "self_transfer",
            TransferError::SourceNotFound { .. } => "source_not_found",
            TransferError::InsufficientBalance { .. } => "insufficient_balance",
            TransferError::DestinationNotFound { .. } => "destination_not_found",
            TransferError::TransientConflict(_) => "transient_conflict",
            TransferError::StorageFailure(_) => "storage_failure",
        }
    }
}

impl From<StoreError> for TransferError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(reason) => TransferError::TransientConflict(reason),
            other => TransferError::StorageFailure(other.to_string()),
        }
    }
}

/// Errors from the balance query.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("Account {owner} not found")]
    NotFound { owner: OwnerId },
    #[error("Storage failure: {0}")]
    Storage(#[from] StoreError),
}

impl QueryError {
    pub fn status_code(&self) -> u16 {
        match self {
            QueryError::NotFound { .. } => 404,
            QueryError::Storage(_) => 500,
        }
    }
}

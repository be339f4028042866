//! Transfer engine module.
//!
//! This module contains the core ledger logic including:
//! - `TransferEngine` - Atomic funds transfer, balance query and batch driver
//! - `Account` / `OwnerId` - Account records keyed by their owner
//! - `Amount` - Fixed-point money in minor units
//! - `AccountStore` - The transactional storage seam, plus an in-memory store
//! - `Error` types - Validation, query and storage errors

mod account;
mod amount;
mod config;
mod error;
mod request;
mod store;
mod transfer_engine;

pub(crate) use rust_decimal::Decimal;

pub use account::{Account, OwnerId};
pub use amount::{Amount, AmountError, MINOR_UNIT_SCALE};
pub use config::EngineConfig;
pub use error::{Error, QueryError, StoreError, TransferError};
pub use request::{TransferRecord, TransferRequest};
pub use store::{AccountStore, InMemoryAccountStore, InMemoryTransaction, StoreFault, StoreTransaction};
pub use transfer_engine::{BatchReport, TransferEngine};

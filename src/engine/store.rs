mod memory;

pub use memory::{InMemoryAccountStore, InMemoryTransaction, StoreFault};

use super::account::{Account, OwnerId};
use super::amount::Amount;
use super::error::StoreError;

/// Durable keyed storage of account balances.
///
/// Any store that offers these primitives with row-level locking (or
/// optimistic concurrency with conflict detection) can back the engine.
pub trait AccountStore: Send + Sync {
    type Transaction<'a>: StoreTransaction
    where
        Self: 'a;

    /// Open a transaction. Nothing is locked until an account is read through it.
    fn begin(&self) -> Result<Self::Transaction<'_>, StoreError>;

    /// Create the account for `owner`. Each owner gets exactly one account.
    fn create_account(&self, owner: OwnerId, balance: Amount) -> Result<(), StoreError>;

    /// Read committed state without taking any lock.
    fn read_committed(&self, owner: &OwnerId) -> Result<Option<Account>, StoreError>;

    /// Snapshot of all committed accounts, ordered by owner.
    fn accounts(&self) -> Result<Vec<Account>, StoreError>;
}

/// One atomic, isolated unit of work against an [`AccountStore`].
///
/// Dropping a transaction without committing aborts it.
pub trait StoreTransaction: Sized {
    /// Read `owner`'s account, locking it until the transaction ends.
    /// Pending increments made by this transaction are visible.
    fn read_account(&mut self, owner: &OwnerId) -> Result<Option<Account>, StoreError>;

    /// Add `delta` minor units to `owner`'s balance when the transaction commits.
    fn increment_balance(&mut self, owner: &OwnerId, delta: i64) -> Result<(), StoreError>;

    /// Apply every pending increment, or none of them.
    fn commit(self) -> Result<(), StoreError>;

    /// Discard pending increments and release locks.
    fn abort(self);
}

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::{AccountStore, StoreTransaction};
use crate::engine::account::{Account, OwnerId};
use crate::engine::amount::Amount;
use crate::engine::config::EngineConfig;
use crate::engine::error::StoreError;

/// Failure to inject into the next commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFault {
    /// Reported as a transient conflict, like a serialization failure.
    Conflict,
    /// Reported as a non-retryable outage.
    Unavailable,
}

impl StoreFault {
    fn into_error(self) -> StoreError {
        match self {
            StoreFault::Conflict => StoreError::Conflict("injected write conflict".into()),
            StoreFault::Unavailable => StoreError::Unavailable("injected outage".into()),
        }
    }
}

/// In-process transactional account store.
///
/// Committed balances live in one map guarded by a mutex that is only held
/// for short reads and for applying a commit. Row locks are tracked
/// separately in a lock table, so transactions on disjoint accounts never
/// wait for each other.
#[derive(Debug)]
pub struct InMemoryAccountStore {
    balances: Mutex<HashMap<OwnerId, Amount>>,
    locks: Mutex<HashSet<OwnerId>>,
    lock_released: Condvar,
    lock_timeout: Duration,
    faults: Mutex<VecDeque<StoreFault>>,
}

impl Default for InMemoryAccountStore {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl InMemoryAccountStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            balances: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashSet::new()),
            lock_released: Condvar::new(),
            lock_timeout,
            faults: Mutex::new(VecDeque::new()),
        }
    }

    /// Store whose lock waits follow `config.lock_timeout`.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.lock_timeout)
    }

    /// Make an upcoming commit fail. Faults queue up and are consumed one per commit.
    pub fn inject_fault(&self, fault: StoreFault) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(fault);
    }

    /// Number of injected faults not yet consumed.
    pub fn pending_faults(&self) -> usize {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn balances(&self) -> Result<MutexGuard<'_, HashMap<OwnerId, Amount>>, StoreError> {
        self.balances.lock().map_err(|_| StoreError::Poisoned)
    }

    fn next_fault(&self) -> Option<StoreFault> {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    /// Block until `owner` is unlocked, then take the lock.
    fn acquire(&self, owner: &OwnerId) -> Result<(), StoreError> {
        let deadline = Instant::now().checked_add(self.lock_timeout);
        let mut locks = self.locks.lock().map_err(|_| StoreError::Poisoned)?;

        while locks.contains(owner) {
            locks = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        log::debug!("[store] lock wait on {owner} timed out");
                        return Err(StoreError::Conflict(format!(
                            "timed out waiting for lock on account {owner}"
                        )));
                    }
                    self.lock_released
                        .wait_timeout(locks, deadline - now)
                        .map_err(|_| StoreError::Poisoned)?
                        .0
                }
                None => self
                    .lock_released
                    .wait(locks)
                    .map_err(|_| StoreError::Poisoned)?,
            };
        }

        locks.insert(owner.clone());
        Ok(())
    }

    fn release(&self, owners: &[OwnerId]) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        for owner in owners {
            locks.remove(owner);
        }
        drop(locks);
        self.lock_released.notify_all();
    }
}

impl AccountStore for InMemoryAccountStore {
    type Transaction<'a> = InMemoryTransaction<'a>;

    fn begin(&self) -> Result<Self::Transaction<'_>, StoreError> {
        Ok(InMemoryTransaction {
            store: self,
            held: Vec::with_capacity(2),
            pending: Vec::with_capacity(2),
        })
    }

    fn create_account(&self, owner: OwnerId, balance: Amount) -> Result<(), StoreError> {
        let mut balances = self.balances()?;
        if balances.contains_key(&owner) {
            return Err(StoreError::AccountExists(owner));
        }
        log::debug!("[store] created account {owner} with balance {balance}");
        balances.insert(owner, balance);
        Ok(())
    }

    fn read_committed(&self, owner: &OwnerId) -> Result<Option<Account>, StoreError> {
        Ok(self
            .balances()?
            .get(owner)
            .map(|balance| Account::new(owner.clone(), *balance)))
    }

    fn accounts(&self) -> Result<Vec<Account>, StoreError> {
        let mut accounts: Vec<Account> = self
            .balances()?
            .iter()
            .map(|(owner, balance)| Account::new(owner.clone(), *balance))
            .collect();
        accounts.sort_by(|a, b| a.owner_id().cmp(b.owner_id()));
        Ok(accounts)
    }
}

/// Transaction handle for [`InMemoryAccountStore`].
///
/// Increments are buffered and applied in one step on commit. Locks are
/// released when the handle is dropped, whichever way it ends.
#[derive(Debug)]
pub struct InMemoryTransaction<'a> {
    store: &'a InMemoryAccountStore,
    held: Vec<OwnerId>,
    pending: Vec<(OwnerId, i64)>,
}

impl InMemoryTransaction<'_> {
    fn lock(&mut self, owner: &OwnerId) -> Result<(), StoreError> {
        if !self.held.contains(owner) {
            self.store.acquire(owner)?;
            self.held.push(owner.clone());
        }
        Ok(())
    }

    fn pending_for<'p>(&'p self, owner: &'p OwnerId) -> impl Iterator<Item = i64> + 'p {
        self.pending
            .iter()
            .filter(move |(pending_owner, _)| pending_owner == owner)
            .map(|(_, delta)| *delta)
    }
}

impl StoreTransaction for InMemoryTransaction<'_> {
    fn read_account(&mut self, owner: &OwnerId) -> Result<Option<Account>, StoreError> {
        self.lock(owner)?;

        let Some(committed) = self.store.balances()?.get(owner).copied() else {
            return Ok(None);
        };
        let mut balance = committed;
        for delta in self.pending_for(owner) {
            balance = balance
                .checked_apply(delta)
                .ok_or_else(|| StoreError::ConstraintViolation(owner.clone()))?;
        }
        Ok(Some(Account::new(owner.clone(), balance)))
    }

    fn increment_balance(&mut self, owner: &OwnerId, delta: i64) -> Result<(), StoreError> {
        self.lock(owner)?;

        if !self.store.balances()?.contains_key(owner) {
            return Err(StoreError::AccountMissing(owner.clone()));
        }
        self.pending.push((owner.clone(), delta));
        Ok(())
    }

    fn commit(mut self) -> Result<(), StoreError> {
        if let Some(fault) = self.store.next_fault() {
            log::debug!("[store] commit failed with injected {fault:?}");
            return Err(fault.into_error());
        }

        let mut balances = self.store.balances()?;

        // Validate every row before touching any of them.
        let mut updated: HashMap<&OwnerId, Amount> = HashMap::with_capacity(self.pending.len());
        for (owner, delta) in &self.pending {
            let current = match updated.get(owner) {
                Some(balance) => *balance,
                None => *balances
                    .get(owner)
                    .ok_or_else(|| StoreError::AccountMissing(owner.clone()))?,
            };
            let next = current
                .checked_apply(*delta)
                .ok_or_else(|| StoreError::ConstraintViolation(owner.clone()))?;
            updated.insert(owner, next);
        }

        for (owner, balance) in updated {
            if let Some(row) = balances.get_mut(owner) {
                *row = balance;
            }
        }
        drop(balances);

        log::trace!("[store] committed {} increments", self.pending.len());
        self.pending.clear();
        Ok(())
    }

    fn abort(mut self) {
        if !self.pending.is_empty() {
            log::trace!("[store] aborted, discarding {} increments", self.pending.len());
        }
        self.pending.clear();
    }
}

impl Drop for InMemoryTransaction<'_> {
    fn drop(&mut self) {
        if !self.held.is_empty() {
            self.store.release(&self.held);
            self.held.clear();
        }
    }
}

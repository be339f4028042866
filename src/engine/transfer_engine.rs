use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use serde::Deserialize;

use super::account::OwnerId;
use super::amount::Amount;
use super::config::EngineConfig;
use super::error::{Error, QueryError, StoreError, TransferError};
use super::request::{TransferRecord, TransferRequest};
use super::store::{AccountStore, StoreTransaction};
use super::Decimal;

/// Moves funds between accounts held in an [`AccountStore`].
///
/// Every transfer runs as one store transaction: both accounts are read
/// (and locked) in owner order, validated, and updated with relative
/// increments before a single commit. Either both balances change or
/// neither does.
///
/// The engine is `Sync`; share one instance across request handlers.
#[derive(Debug)]
pub struct TransferEngine<S> {
    store: Arc<S>,
    config: EngineConfig,
}

impl<S: AccountStore> TransferEngine<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        log::trace!("TransferEngine initialized with {config:?}");
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create the account for a newly registered owner.
    pub fn open_account(&self, owner: OwnerId, initial_balance: Amount) -> Result<(), StoreError> {
        self.store.create_account(owner, initial_balance)
    }

    /// Move `amount` (major units) from `source` to `destination`.
    ///
    /// Checks run in a fixed order and the first failure is returned:
    /// invalid amount, self-transfer, missing source, insufficient balance,
    /// missing destination.
    pub fn transfer(
        &self,
        source: &OwnerId,
        destination: &OwnerId,
        amount: Decimal,
    ) -> Result<(), TransferError> {
        let request = TransferRequest::new(source.clone(), destination.clone(), amount)?;
        self.execute(&request)
    }

    /// Run a validated transfer, retrying transient store conflicts.
    ///
    /// Each retry starts over with a fresh transaction. When the configured
    /// attempts run out the conflict is reported as `StorageFailure`.
    pub fn execute(&self, request: &TransferRequest) -> Result<(), TransferError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.execute_once(request) {
                Err(TransferError::TransientConflict(reason)) => {
                    if attempt >= max_attempts {
                        log::warn!("{request} gave up after {attempt} attempts: {reason}");
                        return Err(TransferError::StorageFailure(format!(
                            "transaction conflict persisted after {attempt} attempts: {reason}"
                        )));
                    }
                    attempt += 1;
                    let delay = self.config.backoff_before(attempt);
                    log::debug!(
                        "{request} conflicted, retrying in {}ms (attempt {attempt}/{max_attempts}): {reason}",
                        delay.as_millis()
                    );
                    thread::sleep(delay);
                }
                result => return result,
            }
        }
    }

    /// A single attempt, without retries. Conflicts come back as `TransientConflict`.
    pub fn execute_once(&self, request: &TransferRequest) -> Result<(), TransferError> {
        log::trace!("Processing {request}");
        let mut txn = self.store.begin()?;

        if let Err(err) = Self::debit_and_credit(&mut txn, request) {
            txn.abort();
            log::trace!("{request} rejected: {err}");
            return Err(err);
        }
        txn.commit()?;

        log::trace!("{request} committed");
        Ok(())
    }

    /// Current committed balance of `owner`'s account.
    pub fn balance(&self, owner: &OwnerId) -> Result<Amount, QueryError> {
        self.store
            .read_committed(owner)?
            .map(|account| account.balance())
            .ok_or_else(|| QueryError::NotFound {
                owner: owner.clone(),
            })
    }

    fn debit_and_credit<T: StoreTransaction>(
        txn: &mut T,
        request: &TransferRequest,
    ) -> Result<(), TransferError> {
        let (first, second) = request.lock_order();
        let first_account = txn.read_account(first)?;
        let second_account = txn.read_account(second)?;
        let (source, destination) = if first == request.source() {
            (first_account, second_account)
        } else {
            (second_account, first_account)
        };

        let source = source.ok_or_else(|| TransferError::SourceNotFound {
            owner: request.source().clone(),
        })?;

        let amount = request.amount();
        if !source.can_cover(amount) {
            return Err(TransferError::InsufficientBalance {
                owner: request.source().clone(),
                available: source.balance(),
                requested: amount,
            });
        }

        if destination.is_none() {
            return Err(TransferError::DestinationNotFound {
                owner: request.destination().clone(),
            });
        }

        let delta = amount.minor_units();
        txn.increment_balance(request.source(), -delta)?;
        txn.increment_balance(request.destination(), delta)?;
        Ok(())
    }
}

// =============================================================================
// Batch processing
// =============================================================================

/// Raw `owner,balance` row used to seed accounts.
#[derive(Debug, Deserialize)]
struct AccountRecord {
    owner: OwnerId,
    #[serde(with = "rust_decimal::serde::str")]
    balance: Decimal,
}

/// Outcome counts of a batch run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: usize,
    /// Failures per error kind, keyed by [`TransferError::kind`].
    pub by_kind: BTreeMap<&'static str, usize>,
}

impl BatchReport {
    fn record(&mut self, result: &Result<(), TransferError>) {
        match result {
            Ok(()) => self.succeeded += 1,
            Err(err) => {
                self.failed += 1;
                *self.by_kind.entry(err.kind()).or_default() += 1;
            }
        }
    }

    fn merge(&mut self, other: BatchReport) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        for (kind, count) in other.by_kind {
            *self.by_kind.entry(kind).or_default() += count;
        }
    }

    pub fn failures_of(&self, kind: &str) -> usize {
        self.by_kind.get(kind).copied().unwrap_or_default()
    }
}

impl<S: AccountStore> TransferEngine<S> {
    /// Create accounts from `owner,balance` CSV rows. Returns how many were created.
    /// The CSV reader buffers internally; pass the raw reader, not an `io::BufReader`.
    pub fn load_accounts<R: Read>(&self, reader: R) -> Result<usize, Error> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut created = 0;
        for result in csv_reader.deserialize() {
            let record: AccountRecord = result?;
            let balance = Amount::try_from(record.balance).map_err(|reason| {
                Error::InvalidAccount {
                    owner: record.owner.clone(),
                    reason,
                }
            })?;
            self.open_account(record.owner, balance)?;
            created += 1;
        }

        log::info!("Loaded {created} accounts");
        Ok(created)
    }

    /// Execute `from,to,amount` CSV rows.
    ///
    /// Malformed CSV aborts the batch. Refused or failed transfers are logged
    /// and counted, and the batch continues. With `workers > 1` rows are
    /// executed concurrently, so their relative order is not preserved.
    /// At most one worker per row is started; if no worker thread can be
    /// started the batch fails with [`Error::Io`] before any row runs.
    pub fn process_transfers<R: Read>(&self, reader: R, workers: usize) -> Result<BatchReport, Error> {
        log::info!("Starting transfer processing");

        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let records = csv_reader
            .deserialize()
            .collect::<Result<Vec<TransferRecord>, _>>()?;

        // no point in more threads than rows
        let workers = workers.min(records.len());
        let report = if workers <= 1 {
            self.run_rows(&records, &AtomicUsize::new(0))
        } else {
            let next_row = AtomicUsize::new(0);
            thread::scope(|scope| -> Result<BatchReport, Error> {
                let mut handles = Vec::with_capacity(workers);
                for worker in 0..workers {
                    let spawned = thread::Builder::new()
                        .name(format!("transfer-worker-{worker}"))
                        .spawn_scoped(scope, || self.run_rows(&records, &next_row));
                    match spawned {
                        Ok(handle) => handles.push(handle),
                        // nothing has run yet, so failing here leaves every balance untouched
                        Err(e) if handles.is_empty() => return Err(Error::Io(e)),
                        Err(e) => {
                            log::warn!(
                                "Could only start {} of {workers} workers: {e}",
                                handles.len()
                            );
                            break;
                        }
                    }
                }

                let mut report = BatchReport::default();
                for handle in handles {
                    match handle.join() {
                        Ok(worker_report) => report.merge(worker_report),
                        Err(panic) => std::panic::resume_unwind(panic),
                    }
                }
                Ok(report)
            })?
        };

        log::info!(
            "Processing complete: {} succeeded, {} failed",
            report.succeeded,
            report.failed
        );
        Ok(report)
    }

    /// Write all committed accounts as `owner,balance` CSV, ordered by owner.
    pub fn export_accounts<W: Write>(&self, writer: W) -> Result<(), Error> {
        let accounts = self.store.accounts()?;
        log::info!("Exporting {} accounts", accounts.len());

        let mut csv_writer = csv::Writer::from_writer(writer);
        for account in &accounts {
            csv_writer.serialize(account)?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    /// Pull rows off the shared cursor until none are left.
    fn run_rows(&self, records: &[TransferRecord], next_row: &AtomicUsize) -> BatchReport {
        let mut report = BatchReport::default();
        loop {
            let index = next_row.fetch_add(1, Ordering::Relaxed);
            let Some(record) = records.get(index) else {
                return report;
            };
            let row_num = index + 1;

            let result = TransferRequest::try_from(record.clone())
                .and_then(|request| self.execute(&request));
            if let Err(e) = &result {
                log::warn!("[row {row_num}] - Skipped {record}: {e}");
            }
            report.record(&result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::amount::AmountError;
    use crate::engine::store::{InMemoryAccountStore, StoreFault};
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn owner(id: &str) -> OwnerId {
        OwnerId::from(id)
    }

    fn amount(value: Decimal) -> Amount {
        Amount::try_from(value).unwrap()
    }

    fn engine_with(accounts: &[(&str, Decimal)]) -> TransferEngine<InMemoryAccountStore> {
        let config = EngineConfig::default().with_retry_backoff(Duration::ZERO);
        let engine = TransferEngine::new(Arc::new(InMemoryAccountStore::default()), config);
        for (id, balance) in accounts {
            engine.open_account(owner(id), amount(*balance)).unwrap();
        }
        engine
    }

    fn balance(engine: &TransferEngine<InMemoryAccountStore>, id: &str) -> Decimal {
        engine.balance(&owner(id)).unwrap().to_decimal()
    }

    #[test]
    fn test_transfer_moves_funds() {
        let engine = engine_with(&[("alice", dec!(100)), ("bob", dec!(0))]);
        engine
            .transfer(&owner("alice"), &owner("bob"), dec!(25.50))
            .unwrap();

        assert_eq!(balance(&engine, "alice"), dec!(74.50));
        assert_eq!(balance(&engine, "bob"), dec!(25.50));
    }

    #[test]
    fn test_transfer_of_exact_balance_empties_source() {
        let engine = engine_with(&[("alice", dec!(100)), ("bob", dec!(0))]);
        engine
            .transfer(&owner("alice"), &owner("bob"), dec!(100))
            .unwrap();

        assert_eq!(balance(&engine, "alice"), dec!(0));
        assert_eq!(balance(&engine, "bob"), dec!(100));
    }

    #[test]
    fn test_transfer_in_reverse_lock_order() {
        let engine = engine_with(&[("alice", dec!(0)), ("bob", dec!(30))]);
        engine
            .transfer(&owner("bob"), &owner("alice"), dec!(10))
            .unwrap();

        assert_eq!(balance(&engine, "alice"), dec!(10));
        assert_eq!(balance(&engine, "bob"), dec!(20));
    }

    #[test]
    fn test_missing_source() {
        let engine = engine_with(&[("bob", dec!(0))]);
        let err = engine
            .transfer(&owner("ghost"), &owner("bob"), dec!(1))
            .unwrap_err();
        assert_eq!(
            err,
            TransferError::SourceNotFound {
                owner: owner("ghost")
            }
        );
        assert_eq!(balance(&engine, "bob"), dec!(0));
    }

    #[test]
    fn test_missing_source_reported_before_missing_destination() {
        let engine = engine_with(&[]);
        let err = engine
            .transfer(&owner("ghost"), &owner("phantom"), dec!(1))
            .unwrap_err();
        assert!(matches!(err, TransferError::SourceNotFound { .. }));
    }

    #[test]
    fn test_insufficient_balance_reported_before_missing_destination() {
        let engine = engine_with(&[("alice", dec!(5))]);
        let err = engine
            .transfer(&owner("alice"), &owner("ghost"), dec!(10))
            .unwrap_err();
        assert_eq!(
            err,
            TransferError::InsufficientBalance {
                owner: owner("alice"),
                available: amount(dec!(5)),
                requested: amount(dec!(10)),
            }
        );
    }

    #[test]
    fn test_missing_destination_leaves_source_untouched() {
        let engine = engine_with(&[("alice", dec!(50))]);
        let err = engine
            .transfer(&owner("alice"), &owner("ghost"), dec!(10))
            .unwrap_err();

        assert_eq!(
            err,
            TransferError::DestinationNotFound {
                owner: owner("ghost")
            }
        );
        assert_eq!(balance(&engine, "alice"), dec!(50));
    }

    #[test]
    fn test_self_transfer_rejected_even_with_funds() {
        let engine = engine_with(&[("alice", dec!(50))]);
        let err = engine
            .transfer(&owner("alice"), &owner("alice"), dec!(10))
            .unwrap_err();
        assert_eq!(err, TransferError::SelfTransfer);
        assert_eq!(balance(&engine, "alice"), dec!(50));
    }

    #[test]
    fn test_invalid_amounts() {
        let engine = engine_with(&[("alice", dec!(50)), ("bob", dec!(0))]);
        for (value, reason) in [
            (dec!(0), AmountError::NotPositive),
            (dec!(-5), AmountError::Negative),
            (dec!(0.005), AmountError::TooPrecise),
        ] {
            let err = engine
                .transfer(&owner("alice"), &owner("bob"), value)
                .unwrap_err();
            assert_eq!(
                err,
                TransferError::InvalidAmount {
                    amount: value,
                    reason
                }
            );
        }
        assert_eq!(balance(&engine, "alice"), dec!(50));
    }

    #[test]
    fn test_conflicts_are_retried_from_scratch() {
        let engine = engine_with(&[("alice", dec!(50)), ("bob", dec!(0))]);
        engine.store().inject_fault(StoreFault::Conflict);
        engine.store().inject_fault(StoreFault::Conflict);

        engine
            .transfer(&owner("alice"), &owner("bob"), dec!(20))
            .unwrap();

        assert_eq!(engine.store().pending_faults(), 0);
        assert_eq!(balance(&engine, "alice"), dec!(30));
        assert_eq!(balance(&engine, "bob"), dec!(20));
    }

    #[test]
    fn test_exhausted_retries_surface_as_storage_failure() {
        let engine = engine_with(&[("alice", dec!(50)), ("bob", dec!(0))]);
        for _ in 0..3 {
            engine.store().inject_fault(StoreFault::Conflict);
        }

        let err = engine
            .transfer(&owner("alice"), &owner("bob"), dec!(20))
            .unwrap_err();

        assert!(matches!(err, TransferError::StorageFailure(_)));
        assert_eq!(err.status_code(), 500);
        assert_eq!(balance(&engine, "alice"), dec!(50));
        assert_eq!(balance(&engine, "bob"), dec!(0));
    }

    #[test]
    fn test_single_attempt_reports_transient_conflict() {
        let engine = engine_with(&[("alice", dec!(50)), ("bob", dec!(0))]);
        engine.store().inject_fault(StoreFault::Conflict);
        let request = TransferRequest::new(owner("alice"), owner("bob"), dec!(1)).unwrap();

        let err = engine.execute_once(&request).unwrap_err();
        assert!(matches!(err, TransferError::TransientConflict(_)));
    }

    #[test]
    fn test_outage_is_not_retried() {
        let engine = engine_with(&[("alice", dec!(50)), ("bob", dec!(0))]);
        engine.store().inject_fault(StoreFault::Unavailable);
        engine.store().inject_fault(StoreFault::Conflict);

        let err = engine
            .transfer(&owner("alice"), &owner("bob"), dec!(20))
            .unwrap_err();

        assert!(matches!(err, TransferError::StorageFailure(_)));
        // the queued conflict was never reached
        assert_eq!(engine.store().pending_faults(), 1);
        assert_eq!(balance(&engine, "alice"), dec!(50));
    }

    #[test]
    fn test_balance_of_unknown_owner() {
        let engine = engine_with(&[]);
        let err = engine.balance(&owner("ghost")).unwrap_err();
        assert_eq!(
            err,
            QueryError::NotFound {
                owner: owner("ghost")
            }
        );
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_batch_report_counts_by_kind() {
        let engine = engine_with(&[]);
        engine
            .load_accounts("owner,balance\nalice,100\nbob,0\n".as_bytes())
            .unwrap();

        let report = engine
            .process_transfers(
                "from,to,amount\nalice,bob,60\nalice,bob,60\nalice,alice,1\nbob,ghost,1\n".as_bytes(),
                1,
            )
            .unwrap();

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 3);
        assert_eq!(report.failures_of("insufficient_balance"), 1);
        assert_eq!(report.failures_of("self_transfer"), 1);
        assert_eq!(report.failures_of("destination_not_found"), 1);
        assert_eq!(balance(&engine, "alice"), dec!(40));
        assert_eq!(balance(&engine, "bob"), dec!(60));
    }

    #[test]
    fn test_load_accounts_rejects_fractional_cents() {
        let engine = engine_with(&[]);
        let err = engine
            .load_accounts("owner,balance\nalice,1.005\n".as_bytes())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidAccount {
                reason: AmountError::TooPrecise,
                ..
            }
        ));
    }

    #[test]
    fn test_load_accounts_rejects_duplicates() {
        let engine = engine_with(&[]);
        let err = engine
            .load_accounts("owner,balance\nalice,1\nalice,2\n".as_bytes())
            .unwrap_err();
        assert!(matches!(err, Error::Store(StoreError::AccountExists(_))));
    }
}

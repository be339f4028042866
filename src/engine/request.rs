use super::account::OwnerId;
use super::amount::Amount;
use super::error::TransferError;
use super::Decimal;
use serde::Deserialize;

/// Raw transfer record as received from a caller or parsed from CSV.
/// This is the unvalidated form that needs conversion to a [`TransferRequest`].
#[derive(Debug, Deserialize, Clone)]
pub struct TransferRecord {
    pub from: OwnerId,
    pub to: OwnerId,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
}

impl std::fmt::Display for TransferRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {} ({})", self.from, self.to, self.amount)
    }
}

/// A validated transfer, ready for the engine.
///
/// Holding one proves the amount is a positive whole number of minor units
/// and that source and destination differ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    source: OwnerId,
    destination: OwnerId,
    amount: Amount,
}

impl TransferRequest {
    /// Checks, in order: the amount, then self-transfer.
    pub fn new(
        source: OwnerId,
        destination: OwnerId,
        amount: Decimal,
    ) -> Result<Self, TransferError> {
        let amount = Amount::positive(amount)
            .map_err(|reason| TransferError::InvalidAmount { amount, reason })?;
        if source == destination {
            return Err(TransferError::SelfTransfer);
        }
        Ok(Self {
            source,
            destination,
            amount,
        })
    }

    pub fn source(&self) -> &OwnerId {
        &self.source
    }

    pub fn destination(&self) -> &OwnerId {
        &self.destination
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    /// Both owners in ascending order. Locks are always taken in this order
    /// so that A->B and B->A can't deadlock.
    pub fn lock_order(&self) -> (&OwnerId, &OwnerId) {
        if self.source <= self.destination {
            (&self.source, &self.destination)
        } else {
            (&self.destination, &self.source)
        }
    }
}

impl TryFrom<TransferRecord> for TransferRequest {
    type Error = TransferError;

    fn try_from(record: TransferRecord) -> Result<Self, Self::Error> {
        Self::new(record.from, record.to, record.amount)
    }
}

impl std::fmt::Display for TransferRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[transfer] from={} to={} amount={}",
            self.source, self.destination, self.amount
        )
    }
}

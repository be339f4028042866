use super::amount::Amount;
use serde::{Deserialize, Serialize};

/// Stable identifier of the user that owns an account.
///
/// Supplied by the identity resolver and trusted as-is. Ordering is used to
/// acquire account locks in a deterministic order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for OwnerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for OwnerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A balance record owned by exactly one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    #[serde(rename = "owner")]
    owner_id: OwnerId,
    balance: Amount,
}

impl Account {
    pub fn new(owner_id: OwnerId, balance: Amount) -> Self {
        Self { owner_id, balance }
    }

    /// Returns the owner ID
    pub fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }

    /// Returns the current balance
    pub fn balance(&self) -> Amount {
        self.balance
    }

    /// Whether the balance covers a debit of `amount`.
    pub fn can_cover(&self, amount: Amount) -> bool {
        self.balance >= amount
    }
}

use super::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Deserializer, Serialize};

/// Number of fractional digits in one major currency unit (cents).
pub const MINOR_UNIT_SCALE: u32 = 2;

/// Why a decimal value could not become an [`Amount`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("amount must not be negative")]
    Negative,
    #[error("amount must be greater than zero")]
    NotPositive,
    #[error("amount has more than 2 fractional digits")]
    TooPrecise,
    #[error("amount is out of range")]
    OutOfRange,
}

/// A non-negative monetary amount stored as an integer count of minor units.
///
/// Built from a [`Decimal`] in major units. Values that would need rounding
/// (e.g. `10.005`) are rejected instead of rounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "Decimal")]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Build an amount from a raw count of minor units.
    pub fn from_minor_units(units: i64) -> Result<Self, AmountError> {
        if units < 0 {
            return Err(AmountError::Negative);
        }
        Ok(Self(units))
    }

    /// Build an amount that must be strictly positive, as required for a transfer.
    pub fn positive(value: Decimal) -> Result<Self, AmountError> {
        let amount = Self::try_from(value)?;
        if amount.is_zero() {
            return Err(AmountError::NotPositive);
        }
        Ok(amount)
    }

    pub fn minor_units(self) -> i64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, MINOR_UNIT_SCALE)
    }

    /// Apply a signed delta in minor units.
    ///
    /// Returns `None` when the result would be negative or overflow.
    pub fn checked_apply(self, delta: i64) -> Option<Self> {
        let units = self.0.checked_add(delta)?;
        (units >= 0).then_some(Self(units))
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = AmountError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(AmountError::Negative);
        }
        // trailing zeros don't count towards precision: 10.5000 == 10.50
        let value = value.normalize();
        if value.scale() > MINOR_UNIT_SCALE {
            return Err(AmountError::TooPrecise);
        }
        let units = value
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|units| units.to_i64())
            .ok_or(AmountError::OutOfRange)?;
        Ok(Self(units))
    }
}

/// Parsed from the exact decimal text, never through a float.
impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = rust_decimal::serde::str::deserialize(deserializer)?;
        Self::try_from(value).map_err(serde::de::Error::custom)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.to_decimal()
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_converts_major_units_to_minor_units() {
        assert_eq!(Amount::try_from(dec!(10)).unwrap().minor_units(), 1000);
        assert_eq!(Amount::try_from(dec!(10.5)).unwrap().minor_units(), 1050);
        assert_eq!(Amount::try_from(dec!(0.01)).unwrap().minor_units(), 1);
        assert_eq!(Amount::try_from(dec!(0)).unwrap(), Amount::ZERO);
    }

    #[test]
    fn test_trailing_zeros_are_not_extra_precision() {
        assert_eq!(
            Amount::try_from(dec!(10.5000)).unwrap(),
            Amount::try_from(dec!(10.5)).unwrap()
        );
    }

    #[test]
    fn test_rejects_fractional_minor_units() {
        assert_eq!(Amount::try_from(dec!(10.005)), Err(AmountError::TooPrecise));
        assert_eq!(Amount::try_from(dec!(0.001)), Err(AmountError::TooPrecise));
    }

    #[test]
    fn test_rejects_negative_values() {
        assert_eq!(Amount::try_from(dec!(-5)), Err(AmountError::Negative));
        assert_eq!(Amount::from_minor_units(-1), Err(AmountError::Negative));
    }

    #[test]
    fn test_negative_zero_is_zero() {
        assert_eq!(Amount::try_from(dec!(-0.00)).unwrap(), Amount::ZERO);
    }

    #[test]
    fn test_rejects_values_beyond_i64_minor_units() {
        assert_eq!(
            Amount::try_from(Decimal::MAX),
            Err(AmountError::OutOfRange)
        );
    }

    #[test]
    fn test_positive_rejects_zero() {
        assert_eq!(Amount::positive(dec!(0)), Err(AmountError::NotPositive));
        assert_eq!(Amount::positive(dec!(-5)), Err(AmountError::Negative));
        assert!(Amount::positive(dec!(0.01)).is_ok());
    }

    #[test]
    fn test_checked_apply_never_goes_negative() {
        let amount = Amount::from_minor_units(100).unwrap();
        assert_eq!(amount.checked_apply(-100), Some(Amount::ZERO));
        assert_eq!(amount.checked_apply(-101), None);
        assert_eq!(amount.checked_apply(i64::MAX), None);
    }

    #[test]
    fn test_displays_two_fractional_digits() {
        assert_eq!(Amount::from_minor_units(1050).unwrap().to_string(), "10.50");
        assert_eq!(Amount::ZERO.to_string(), "0.00");
    }

    #[test]
    fn test_repeated_increments_do_not_drift() {
        let dime = Amount::try_from(dec!(0.1)).unwrap();
        let mut total = Amount::ZERO;
        for _ in 0..10 {
            total = total.checked_add(dime).unwrap();
        }
        assert_eq!(total, Amount::try_from(dec!(1)).unwrap());
    }
}

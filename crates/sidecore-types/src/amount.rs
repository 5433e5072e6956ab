//! Arbitrary-precision smallest-unit integer arithmetic.
//!
//! All monetary quantities in the core (balances, reserves, order quantities,
//! prices, fee-growth accumulators) are represented as [`Amount`], a thin
//! wrapper around [`BigInt`] so that accounts with many-decimal tokens never
//! overflow a fixed-width integer. Division always truncates toward zero,
//! consistent with the rest of this core's smallest-unit math.

use std::fmt;
use std::str::FromStr;

use num_bigint::{BigInt, Sign};
use num_traits::{Signed, Zero};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A signed, arbitrary-precision smallest-unit integer.
///
/// Most entities in the data model constrain this to be non-negative (account
/// balances, reserves, supplies); callers enforce that at the point of
/// mutation (see `sidecore-engine`'s account ledger), not in this type, since
/// some quantities (fee-growth deltas, settlement deltas) are legitimately
/// signed in transit.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(BigInt);

impl Amount {
    pub fn zero() -> Self {
        Amount(BigInt::zero())
    }

    pub fn from_i128(v: i128) -> Self {
        Amount(BigInt::from(v))
    }

    pub fn from_u128(v: u128) -> Self {
        Amount(BigInt::from(v))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.sign() == Sign::Minus
    }

    pub fn is_positive(&self) -> bool {
        self.0.sign() == Sign::Plus
    }

    pub fn abs(&self) -> Self {
        Amount(self.0.abs())
    }

    pub fn checked_add(&self, rhs: &Amount) -> Amount {
        Amount(&self.0 + &rhs.0)
    }

    pub fn checked_sub(&self, rhs: &Amount) -> Amount {
        Amount(&self.0 - &rhs.0)
    }

    pub fn checked_mul(&self, rhs: &Amount) -> Amount {
        Amount(&self.0 * &rhs.0)
    }

    /// Integer division truncating toward zero. Returns `None` on division by zero.
    pub fn checked_div(&self, rhs: &Amount) -> Option<Amount> {
        if rhs.is_zero() {
            None
        } else {
            Some(Amount(&self.0 / &rhs.0))
        }
    }

    /// Remainder of truncating division. Returns `None` on division by zero.
    /// Used by tick/lot-size quantization checks.
    pub fn checked_rem(&self, rhs: &Amount) -> Option<Amount> {
        if rhs.is_zero() {
            None
        } else {
            Some(Amount(&self.0 % &rhs.0))
        }
    }

    pub fn neg(&self) -> Amount {
        Amount(-&self.0)
    }

    pub fn min(&self, other: &Amount) -> Amount {
        if self <= other {
            self.clone()
        } else {
            other.clone()
        }
    }

    pub fn max(&self, other: &Amount) -> Amount {
        if self >= other {
            self.clone()
        } else {
            other.clone()
        }
    }

    /// `10^exp` as an [`Amount`].
    pub fn pow10(exp: u32) -> Amount {
        Amount(BigInt::from(10u32).pow(exp))
    }

    /// Integer square root, truncated (floor). Used by the AMM's initial LP mint.
    ///
    /// Newton's method over `BigInt`; converges in O(log n) iterations and
    /// avoids depending on an optional `Roots` trait impl.
    pub fn isqrt(&self) -> Amount {
        if self.is_negative() || self.is_zero() {
            return Amount::zero();
        }
        let two = BigInt::from(2);
        let mut x = self.0.clone();
        let mut y = (&x + &self.0 / &x) / &two;
        while y < x {
            x = y.clone();
            y = (&x + &self.0 / &x) / &two;
        }
        Amount(x)
    }

    pub fn to_i128(&self) -> Option<i128> {
        use num_traits::ToPrimitive;
        self.0.to_i128()
    }

    pub fn to_u128(&self) -> Option<u128> {
        use num_traits::ToPrimitive;
        self.0.to_u128()
    }

    pub fn as_bigint(&self) -> &BigInt {
        &self.0
    }
}

impl From<u64> for Amount {
    fn from(v: u64) -> Self {
        Amount(BigInt::from(v))
    }
}

impl From<i64> for Amount {
    fn from(v: i64) -> Self {
        Amount(BigInt::from(v))
    }
}

impl From<u32> for Amount {
    fn from(v: u32) -> Self {
        Amount(BigInt::from(v))
    }
}

impl FromStr for Amount {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BigInt::from_str(s)
            .map(Amount)
            .map_err(|e| format!("invalid smallest-unit integer {s:?}: {e}"))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Amount::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl std::ops::Add for Amount {
    type Output = Amount;
    fn add(self, rhs: Amount) -> Amount {
        self.checked_add(&rhs)
    }
}

impl std::ops::Sub for Amount {
    type Output = Amount;
    fn sub(self, rhs: Amount) -> Amount {
        self.checked_sub(&rhs)
    }
}

impl std::ops::Mul for Amount {
    type Output = Amount;
    fn mul(self, rhs: Amount) -> Amount {
        self.checked_mul(&rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_serde() {
        let a = Amount::from_str("123456789012345678901234567890").unwrap();
        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, "\"123456789012345678901234567890\"");
        let b: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn truncating_division() {
        let a = Amount::from_i128(10);
        let b = Amount::from_i128(3);
        assert_eq!(a.checked_div(&b).unwrap().to_string(), "3");

        let a = Amount::from_i128(-10);
        assert_eq!(a.checked_div(&b).unwrap().to_string(), "-3");
    }

    #[test]
    fn isqrt_floor() {
        assert_eq!(Amount::from_i128(1_000_000_000 * 1_000_000).isqrt().to_string(), "31622776");
    }

    #[test]
    fn pow10() {
        assert_eq!(Amount::pow10(6).to_string(), "1000000");
        assert_eq!(Amount::pow10(0).to_string(), "1");
    }
}

use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const DEFAULT_CURRENCY: Currency = Currency::INR;

//--------------------------------------       Money       -----------------------------------------------------------
/// A monetary amount in minor units (paise, cents, fils). All arithmetic is integer arithmetic; conversion to a
/// decimal representation only ever happens at presentation boundaries.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);

impl Mul<i64> for Money {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in minor units: {0}")]
pub struct MoneyConversionError(String);

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Money {}

impl TryFrom<u64> for Money {
    type Error = MoneyConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(MoneyConversionError(format!("Value {value} is too large to convert to Money")))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl Money {
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Converts an amount in major units (rupees, dollars) into minor units.
    pub fn from_major(major: i64) -> Self {
        Self(major * 100)
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

//--------------------------------------      Currency     -----------------------------------------------------------
/// The closed set of currencies the gateway accepts. Amounts are always carried in the minor unit of the currency.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum Currency {
    #[default]
    INR,
    USD,
    EUR,
    GBP,
    AED,
}

#[derive(Debug, Clone, Error)]
#[error("Unsupported currency: {0}")]
pub struct CurrencyError(String);

impl Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            Currency::INR => "INR",
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::AED => "AED",
        };
        write!(f, "{code}")
    }
}

impl FromStr for Currency {
    type Err = CurrencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INR" => Ok(Self::INR),
            "USD" => Ok(Self::USD),
            "EUR" => Ok(Self::EUR),
            "GBP" => Ok(Self::GBP),
            "AED" => Ok(Self::AED),
            s => Err(CurrencyError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn money_arithmetic() {
        let a = Money::from(1_500);
        let b = Money::from(499);
        assert_eq!((a + b).value(), 1_999);
        assert_eq!((a - b).value(), 1_001);
        assert_eq!((-b).value(), -499);
        assert_eq!((b * 3).value(), 1_497);
        let total: Money = vec![a, b, b].into_iter().sum();
        assert_eq!(total.value(), 2_498);
    }

    #[test]
    fn money_display_is_major_units() {
        assert_eq!(Money::from(99_900).to_string(), "999.00");
        assert_eq!(Money::from(1).to_string(), "0.01");
        assert_eq!(Money::from(-2_505).to_string(), "-25.05");
        assert_eq!(Money::from_major(42).to_string(), "42.00");
    }

    #[test]
    fn currency_round_trip() {
        for code in ["INR", "USD", "EUR", "GBP", "AED"] {
            let c = code.parse::<Currency>().unwrap();
            assert_eq!(c.to_string(), code);
        }
        assert!("BTC".parse::<Currency>().is_err());
        assert_eq!(Currency::default(), Currency::INR);
    }
}

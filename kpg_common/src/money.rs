use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const KES_CURRENCY_CODE: &str = "KES";
pub const KES_CURRENCY_CODE_LOWER: &str = "kes";

//--------------------------------------       Money         ---------------------------------------------------------
/// An amount of Kenyan Shillings, stored as an integer number of cents.
///
/// All ledger arithmetic happens in cents, so sums of shares are exact. Fractional shilling values coming off the
/// wire are converted with half-up rounding via [`Money::from_kes_f64`].
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
        Self::from(self.cents() * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as a money amount: {0}")]
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
            Err(MoneyConversionError(format!("Value {} is too large to convert to Money", value)))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kes = self.0 as f64 / 100.0;
        write!(f, "{KES_CURRENCY_CODE} {kes:0.2}")
    }
}

impl Money {
    /// The raw value in cents.
    pub fn cents(&self) -> i64 {
        self.0
    }

    pub fn from_kes(kes: i64) -> Self {
        Self(kes * 100)
    }

    /// Converts a fractional shilling amount to cents, rounding half-up. Negative inputs round away from zero, which
    /// is what refunds want.
    pub fn from_kes_f64(kes: f64) -> Self {
        let cents = kes * 100.0;
        let rounded = if cents >= 0.0 { (cents + 0.5).floor() } else { (cents - 0.5).ceil() };
        Self(rounded as i64)
    }

    /// The amount as a fractional shilling value, for wire DTOs.
    pub fn to_kes_f64(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// True if the two amounts agree to within `tolerance` cents.
    pub fn is_within(&self, other: Money, tolerance: i64) -> bool {
        (self.0 - other.0).abs() <= tolerance
    }
}

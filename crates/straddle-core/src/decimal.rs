//! Precision-safe decimal types for option premiums and quantities.
//!
//! Uses `rust_decimal` for exact decimal arithmetic so that threshold
//! comparisons (e.g. `step1 == step2`) and tick rounding never drift the
//! way binary floats do.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};
use std::str::FromStr;

/// Round to the nearest 0.05 tick.
///
/// Ties go to the even multiple, the same behaviour as rounding the binary
/// float `x * 20` half-to-even.
#[inline]
pub fn round_to_0_05(value: Decimal) -> Decimal {
    (value * dec!(20)).round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven) / dec!(20)
}

/// Round to two decimal places (half-to-even).
#[inline]
pub fn round_to_cent(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}

/// Option premium with exact decimal precision.
///
/// Wraps `Decimal` to provide type safety and prevent mixing
/// prices with quantities in calculations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(pub Decimal);

impl Price {
    pub const ZERO: Self = Self(Decimal::ZERO);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Round to the exchange's 0.05 tick.
    #[inline]
    pub fn round_to_tick(&self) -> Self {
        Self(round_to_0_05(self.0))
    }

    /// Round to two decimal places.
    #[inline]
    pub fn round_to_cent(&self) -> Self {
        Self(round_to_cent(self.0))
    }

    /// `self * factor`, rounded to the 0.05 tick.
    #[inline]
    pub fn scaled_to_tick(&self, factor: Decimal) -> Self {
        Self(round_to_0_05(self.0 * factor))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Price {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl From<Decimal> for Price {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Price {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Mul<Decimal> for Price {
    type Output = Self;

    fn mul(self, rhs: Decimal) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl Div<Decimal> for Price {
    type Output = Self;

    fn div(self, rhs: Decimal) -> Self::Output {
        Self(self.0 / rhs)
    }
}

/// Order quantity in contracts (lots × lot size).
///
/// Option quantities are whole contracts, so this wraps `u32` rather
/// than a decimal.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Quantity(pub u32);

impl Quantity {
    pub const ZERO: Self = Self(0);

    #[inline]
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> u32 {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Total contracts for `lots` lots of `lot_size` each.
    #[inline]
    pub fn from_lots(lots: u32, lot_size: u32) -> Self {
        Self(lots.saturating_mul(lot_size))
    }

    /// `floor(self * percent / 100)` in exact integer arithmetic.
    #[inline]
    pub fn floor_percent(&self, percent: u32) -> Self {
        Self((u64::from(self.0) * u64::from(percent) / 100) as u32)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Quantity {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

impl Add for Quantity {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

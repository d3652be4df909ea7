//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  Tax authorities compare invoices to the paisa. A bill whose            │
//! │  SGST + CGST + chargeable differs from the net amount by 0.01 is        │
//! │  a defective invoice.                                                   │
//! │                                                                         │
//! │  OUR SOLUTION: Integer minor units                                      │
//! │    ₹5,600.00 is stored as 560000                                        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use hearth_core::money::Money;
//!
//! let night = Money::from_cents(500_000); // ₹5,000.00
//! let stay = night * 3;                   // ₹15,000.00
//! assert_eq!(stay.cents(), 1_500_000);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

use crate::types::TaxRate;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (paise for INR).
///
/// The accessor keeps the `cents` name used across the schema
/// (`price_cents`, `net_cents`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    ///
    /// ## Example
    /// ```rust
    /// use hearth_core::money::Money;
    ///
    /// let price = Money::from_cents(1099); // ₹10.99
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// ## Example
    /// ```rust
    /// use hearth_core::money::Money;
    ///
    /// assert_eq!(Money::from_major_minor(5600, 0).cents(), 560_000);
    /// assert_eq!(Money::from_major_minor(-5, 50).cents(), -550);
    /// ```
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit (rupee) portion.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the smaller of two amounts.
    #[inline]
    pub fn min(self, other: Money) -> Money {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }

    /// Calculates tax at `rate`, rounded half-up to the minor unit.
    ///
    /// ## Rounding
    /// ```text
    /// ┌─────────────────────────────────────────────────────────────────────┐
    /// │  ROUND HALF UP (2 decimal places)                                   │
    /// │                                                                     │
    /// │  ₹10.00 × 8.25% = ₹0.825  → ₹0.83                                  │
    /// │  ₹10.10 × 2.50% = ₹0.2525 → ₹0.25                                  │
    /// │                                                                     │
    /// │  GST invoices must be reproducible by the tax authority, so the    │
    /// │  rounding is deterministic half-up, never banker's rounding.        │
    /// └─────────────────────────────────────────────────────────────────────┘
    /// ```
    ///
    /// ## Implementation
    /// Integer math: `(amount * bps + 5000) / 10000`. Amounts reaching the
    /// tax engine are never negative.
    ///
    /// ## Example
    /// ```rust
    /// use hearth_core::money::Money;
    /// use hearth_core::types::TaxRate;
    ///
    /// let room = Money::from_cents(500_000);
    /// assert_eq!(room.calculate_tax(TaxRate::from_bps(600)).cents(), 30_000);
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        // i128 keeps large hotel invoices from overflowing the product
        let tax_cents = (self.0 as i128 * rate.bps() as i128 + 5000) / 10000;
        Money::from_cents(tax_cents as i64)
    }

    /// Multiplies money by a quantity (items, nights).
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Debug-friendly rendering. Frontends format for display themselves.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}₹{}.{:02}", sign, self.major().abs(), self.minor())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

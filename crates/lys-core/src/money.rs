//! # Money Module
//!
//! Provides the `Money` type and the VAT/discount/shipping policy functions.
//!
//! ## VAT-Inclusive Prices
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  EVERY SHELF PRICE ALREADY CONTAINS 20% VAT                             │
//! │                                                                         │
//! │  Shelf price £120.00                                                    │
//! │    net  = 120.00 / 1.2 = £100.00                                        │
//! │    VAT  = 120.00 - 100.00 = £20.00   ← derived, never entered           │
//! │                                                                         │
//! │  VAT is reported, never added on top. The payable total is the          │
//! │  (discounted) shelf price.                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use lys_core::money::{vat_portion, Money};
//!
//! let price = Money::from_cents(12000); // £120.00
//! let vat = vat_portion(price).unwrap();
//! assert_eq!(vat.cents(), 2000);        // £20.00
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::types::TaxRate;
use crate::VAT_RATE;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest unit of the settlement currency (pence).
///
/// ## Design Decisions
/// - **i64 (signed)**: intermediate differences may go negative before clamping
/// - **Single field tuple struct**: zero-cost abstraction over i64
///
/// ## Where Money Flows
/// ```text
/// CartItem.unit_price ──► Cart.subtotal ──┬──► preorder discount
///                                         ├──► promotional discount
///                                         └──► total ──► vat_portion(total)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from pence.
    ///
    /// ```rust
    /// use lys_core::money::Money;
    ///
    /// let price = Money::from_cents(1099); // £10.99
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// For negative amounts only the major unit carries the sign:
    /// `from_major_minor(-5, 50)` is -£5.50.
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in pence.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit (pounds) portion.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero.
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

    /// Returns the larger of `self` and zero.
    #[inline]
    pub const fn non_negative(&self) -> Self {
        if self.0 < 0 {
            Money(0)
        } else {
            Money(self.0)
        }
    }

    /// Multiplies money by a quantity.
    ///
    /// ```rust
    /// use lys_core::money::Money;
    ///
    /// let line_total = Money::from_cents(299).multiply_quantity(3);
    /// assert_eq!(line_total.cents(), 897);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Returns `bps` basis points of this amount, rounded half-up.
    ///
    /// ## Arguments
    /// * `bps` - Share in basis points (1000 = 10%)
    ///
    /// ```rust
    /// use lys_core::money::Money;
    ///
    /// let subtotal = Money::from_cents(10000);     // £100.00
    /// assert_eq!(subtotal.percentage(1000).cents(), 1000); // 10% = £10.00
    /// ```
    pub fn percentage(&self, bps: u32) -> Money {
        // i128 prevents overflow on large amounts
        let share = (self.0 as i128 * bps as i128 + 5000) / 10000;
        Money::from_cents(share as i64)
    }

    /// Removes the tax contained in a tax-inclusive amount and returns the
    /// net remainder, rounded half-up.
    ///
    /// `net = amount × 10000 / (10000 + rate_bps)`
    pub fn net_of_tax(&self, rate: TaxRate) -> Money {
        let divisor = 10000_i128 + rate.bps() as i128;
        let net = (self.0 as i128 * 10000 * 2 + divisor) / (2 * divisor);
        Money::from_cents(net as i64)
    }

    /// Returns the tax contained in a tax-inclusive amount.
    ///
    /// Defined as `amount - net_of_tax(amount)` so the two portions always
    /// add back up to the amount exactly.
    pub fn inclusive_tax(&self, rate: TaxRate) -> Money {
        *self - self.net_of_tax(rate)
    }
}

// =============================================================================
// Pricing Policy Functions
// =============================================================================

/// Returns the VAT contained in a VAT-inclusive amount (`amount − amount/1.2`).
///
/// ## Errors
/// Negative amounts are rejected: a cart can never price below zero, so a
/// negative input means the caller skipped discount clamping.
///
/// ## Cart Workflow
/// ```text
/// subtotal − preorder − promotional ──► vat_portion() ──► Cart.tax
/// ```
pub fn vat_portion(amount: Money) -> Result<Money, ValidationError> {
    if amount.is_negative() {
        return Err(ValidationError::OutOfRange {
            field: "taxable amount".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(amount.inclusive_tax(VAT_RATE))
}

/// Caps a discount at the amount it is applied to, so it can never drive a
/// total negative. Negative discounts count as zero.
pub fn clamp_discount(discount: Money, subtotal: Money) -> Money {
    discount.min(subtotal.non_negative()).non_negative()
}

/// Shipping charge for a given subtotal.
///
/// The marketplace ships every order for free.
pub fn shipping(_subtotal: Money) -> Money {
    Money::zero()
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Debug-oriented display in pounds sterling. Storefront formatting and
/// currency conversion happen outside this crate.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}£{}.{:02}", sign, self.major().abs(), self.minor())
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

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

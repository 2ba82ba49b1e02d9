//! # Money Module
//!
//! Provides the `Money` type for handling monetary values without floats.
//!
//! ## Why Micro-Units?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  TWO SOURCES, TWO ROUNDING POLICIES                                     │
//! │                                                                         │
//! │  Merchant report:  2 × $5.45 @ 9.63% tax  → tax $1.05 (per order)      │
//! │  Split to qty 1:   $1.05 / 2 = $0.525     → not a whole cent!           │
//! │                                                                         │
//! │  OUR SOLUTION: Integer micro-units (1/1,000,000 of a dollar)            │
//! │    $0.525 = 525_000 micro-units, exact                                  │
//! │    Sums never drift; comparisons tolerate EPSILON (50 micro-units)      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tagger_core::money::Money;
//!
//! let price = Money::parse("$10.99").unwrap();
//! assert_eq!(price.micros(), 10_990_000);
//!
//! let total = price + Money::from_cents(500);
//! assert_eq!(total.to_string(), "$15.99");
//! assert!(total.nearly_equal(Money::from_micros(15_990_049)));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

use crate::error::ValidationError;

/// Micro-units in one whole currency unit.
pub const MICROS_PER_UNIT: i64 = 1_000_000;

/// Micro-units in one cent.
pub const MICROS_PER_CENT: i64 = 10_000;

/// Default tolerance for `nearly_equal` comparisons.
pub const EPSILON_MICROS: i64 = 50;

// Bias added before rounding to a cent: half a cent plus 0.0001 of a unit.
const CENT_ROUNDING_BIAS: i64 = MICROS_PER_CENT / 2 + 100;

// =============================================================================
// Money Type
// =============================================================================

/// A signed monetary value in micro-units (one millionth of a dollar).
///
/// ## Design Decisions
/// - **i64 (signed)**: refunds, promotions and credits are negative
/// - **Single field tuple struct**: serializes as a bare integer
/// - **No float constructor**: parse from report strings instead
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    /// One cent.
    pub const CENT: Money = Money(MICROS_PER_CENT);

    /// Default comparison tolerance.
    pub const EPSILON: Money = Money(EPSILON_MICROS);

    /// Creates a Money value from micro-units.
    #[inline]
    pub const fn from_micros(micros: i64) -> Self {
        Money(micros)
    }

    /// Creates a Money value from whole cents.
    ///
    /// ```rust
    /// use tagger_core::money::Money;
    ///
    /// assert_eq!(Money::from_cents(1099).micros(), 10_990_000);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents * MICROS_PER_CENT)
    }

    /// Returns the raw micro-unit count.
    #[inline]
    pub const fn micros(&self) -> i64 {
        self.0
    }

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

    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// True when the two values differ by less than [`Money::EPSILON`].
    ///
    /// Multiplying and dividing per-unit taxes leaves a few stray
    /// micro-units; this is the comparison every reconciliation step uses.
    #[inline]
    pub fn nearly_equal(self, other: Money) -> bool {
        self.nearly_equal_within(other, Money::EPSILON)
    }

    /// Same as [`Money::nearly_equal`] with an explicit tolerance.
    #[inline]
    pub fn nearly_equal_within(self, other: Money, epsilon: Money) -> bool {
        (self.0 - other.0).abs() < epsilon.0
    }

    /// Rounds to a whole cent, half up, with a 0.0001 bias.
    ///
    /// The bias reproduces the rounding both report producers apply, so a
    /// value sitting just under a half cent still rounds up.
    ///
    /// ```rust
    /// use tagger_core::money::Money;
    ///
    /// assert_eq!(Money::from_micros(50_505_050).round_to_cent().micros(), 50_510_000);
    /// assert_eq!(Money::from_micros(-550).round_to_cent().micros(), 0);
    /// ```
    pub fn round_to_cent(self) -> Money {
        let cents = (self.0 + CENT_ROUNDING_BIAS).div_euclid(MICROS_PER_CENT);
        Money(cents * MICROS_PER_CENT)
    }

    /// Splits into `parts` shares that differ by at most one micro-unit and
    /// sum exactly to `self`. The first shares absorb the remainder.
    ///
    /// ```rust
    /// use tagger_core::money::Money;
    ///
    /// let shares = Money::from_cents(100).split_evenly(3);
    /// assert_eq!(shares[0].micros(), 333_334);
    /// assert_eq!(shares[2].micros(), 333_333);
    /// ```
    pub fn split_evenly(self, parts: usize) -> Vec<Money> {
        if parts == 0 {
            return Vec::new();
        }
        let count = parts as i64;
        let base = self.0 / count;
        let remainder = self.0 - base * count;
        let step = remainder.signum();
        (0..count)
            .map(|n| {
                let extra = if n < remainder.abs() { step } else { 0 };
                Money(base + extra)
            })
            .collect()
    }

    /// Parses a currency string such as `"$1,234.56"` or `"-$0.99"`.
    ///
    /// ## Rules
    /// - Grouping commas are ignored
    /// - An optional leading `-` then an optional `$`
    /// - An empty string is zero
    /// - The result is rounded to a whole cent
    ///
    /// ```rust
    /// use tagger_core::money::Money;
    ///
    /// assert_eq!(Money::parse("$55").unwrap().micros(), 55_000_000);
    /// assert_eq!(Money::parse("").unwrap(), Money::zero());
    /// assert!(Money::parse("$abc").is_err());
    /// ```
    pub fn parse(input: &str) -> Result<Money, ValidationError> {
        let cleaned: String = input.trim().chars().filter(|c| *c != ',').collect();
        if cleaned.is_empty() {
            return Ok(Money::zero());
        }

        let (negate, rest) = match cleaned.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, cleaned.as_str()),
        };
        let digits = rest.strip_prefix('$').unwrap_or(rest);

        let micros = parse_decimal_micros(digits).ok_or_else(|| ValidationError::InvalidFormat {
            field: "amount".to_string(),
            reason: format!("'{}' is not a currency amount", input),
        })?;

        let signed = if negate { -micros } else { micros };
        Ok(Money(signed).round_to_cent())
    }
}

/// Parses `123.456789` into micro-units. Digits past the sixth decimal place
/// are dropped.
fn parse_decimal_micros(s: &str) -> Option<i64> {
    let (whole, fraction) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let whole_value: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };

    let mut fraction_value: i64 = 0;
    let mut scale = MICROS_PER_UNIT;
    for digit in fraction.chars().take(6) {
        scale /= 10;
        fraction_value += i64::from(digit.to_digit(10)?) * scale;
    }

    whole_value
        .checked_mul(MICROS_PER_UNIT)?
        .checked_add(fraction_value)
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Formats as `$1.23` / `-$1.23`, rounded to the cent.
///
/// Values within half a cent of zero print as `$0.00` without a sign.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < -(MICROS_PER_CENT / 2) { "-" } else { "" };
        let cents = self.abs().round_to_cent().0 / MICROS_PER_CENT;
        write!(f, "{}${}.{:02}", sign, cents / 100, cents % 100)
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

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

/// Multiplication by a quantity.
impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.micros(), 10_990_000);
        assert_eq!(Money::CENT.micros(), 10_000);
    }

    #[test]
    fn test_nearly_equal() {
        let a = Money::from_micros(1_000_000);
        assert!(a.nearly_equal(a));
        assert!(a.nearly_equal(Money::from_micros(1_000_049)));
        assert!(Money::from_micros(1_000_049).nearly_equal(a));
        assert!(!a.nearly_equal(Money::from_micros(1_000_050)));
        assert!(!Money::from_micros(1_000_050).nearly_equal(a));
        assert!(a.nearly_equal_within(Money::from_micros(1_000_099), Money::from_micros(100)));
    }

    #[test]
    fn test_round_to_cent() {
        assert_eq!(Money::from_micros(50_505_050).round_to_cent().micros(), 50_510_000);
        assert_eq!(Money::from_micros(50_514_550).round_to_cent().micros(), 50_510_000);
        assert_eq!(Money::from_micros(550).round_to_cent().micros(), 0);
        assert_eq!(Money::from_micros(-550).round_to_cent().micros(), 0);
        assert_eq!(Money::from_micros(4_900).round_to_cent().micros(), 10_000);
        assert_eq!(Money::from_micros(-125_000).round_to_cent().micros(), -120_000);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_micros(1_230_040).to_string(), "$1.23");
        assert_eq!(Money::from_micros(-123_000).to_string(), "-$0.12");
        assert_eq!(Money::from_micros(-1_900).to_string(), "$0.00");
        assert_eq!(Money::from_micros(-10_000).to_string(), "-$0.01");
        assert_eq!(Money::from_cents(123_456).to_string(), "$1234.56");
        assert_eq!(Money::zero().to_string(), "$0.00");
    }

    #[test]
    fn test_parse() {
        assert_eq!(Money::parse("$55").unwrap().micros(), 55_000_000);
        assert_eq!(Money::parse("$1,234.56").unwrap().micros(), 1_234_560_000);
        assert_eq!(Money::parse("-$0.99").unwrap().micros(), -990_000);
        assert_eq!(Money::parse("12.3").unwrap().micros(), 12_300_000);
        assert_eq!(Money::parse(".5").unwrap().micros(), 500_000);
        assert_eq!(Money::parse("$0.125").unwrap().micros(), 130_000);
        assert_eq!(Money::parse("").unwrap(), Money::zero());
        assert_eq!(Money::parse("  ").unwrap(), Money::zero());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Money::parse("$").is_err());
        assert!(Money::parse("12.3.4").is_err());
        assert!(Money::parse("ten dollars").is_err());
        assert!(Money::parse("$-5").is_err());
    }

    #[test]
    fn test_parse_format_round_trip() {
        for cents in [-123_456, -101, -1, 0, 1, 99, 100, 1_195, 9_999_999] {
            let value = Money::from_cents(cents);
            assert_eq!(Money::parse(&value.to_string()).unwrap(), value, "cents={}", cents);
        }
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).micros(), 15_000_000);
        assert_eq!((a - b).micros(), 5_000_000);
        assert_eq!((a * 3).micros(), 30_000_000);
        assert_eq!((-a).micros(), -10_000_000);

        let total: Money = [a, b, b].iter().sum();
        assert_eq!(total, Money::from_cents(2000));
    }

    #[test]
    fn test_serializes_as_integer() {
        let json = serde_json::to_string(&Money::from_cents(199)).unwrap();
        assert_eq!(json, "1990000");
        let back: Money = serde_json::from_str("1990000").unwrap();
        assert_eq!(back, Money::from_cents(199));
    }
}

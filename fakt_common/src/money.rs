use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

pub const DEFAULT_CURRENCY_CODE: &str = "NOK";

/// Scale factor between major currency units (kroner) and minor units (øre).
const MINOR_PER_MAJOR: i64 = 100;
/// Quantities are stored in thousandths so that fractional quantities (hours, kilograms) stay exact.
const MILLIS_PER_UNIT: i64 = 1_000;
/// VAT rates are stored in basis points. 25% == 2500bp.
const BASIS_POINTS: i64 = 10_000;

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as a fixed-point amount: {0}")]
pub struct MoneyConversionError(pub String);

//--------------------------------------       Money        ----------------------------------------------------------
/// A monetary amount in integer minor units (øre).
///
/// All invoice arithmetic happens in minor units so that the `total == subtotal + vat` invariant
/// holds exactly. Floating point only appears at the JSON boundary, where values carry at most two
/// decimals and convert losslessly.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, PartialEq, Eq, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Money(i64);

impl Money {
    pub const fn from_minor(value: i64) -> Self {
        Self(value)
    }

    /// Convert a major-unit JSON number (e.g. `1000` or `19.99`) into minor units, rounding
    /// half-away-from-zero to the nearest øre.
    pub fn from_major_f64(value: f64) -> Result<Self, MoneyConversionError> {
        scaled_from_f64(value, MINOR_PER_MAJOR).map(Self)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    /// The amount in major units, for JSON responses and webhook payloads.
    pub fn as_major(&self) -> f64 {
        self.0 as f64 / MINOR_PER_MAJOR as f64
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Applies a VAT rate to this amount, rounding half-away-from-zero.
    pub fn vat(&self, rate: VatRate) -> Money {
        Money(div_round(self.0 * rate.basis_points(), BASIS_POINTS))
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        write!(f, "{sign}{}.{:02}", abs / MINOR_PER_MAJOR, abs % MINOR_PER_MAJOR)
    }
}

//--------------------------------------      Quantity      ----------------------------------------------------------
/// A line quantity in integer milli-units. The smallest representable quantity is 0.001.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, PartialEq, Eq, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Quantity(i64);

impl Quantity {
    pub const fn from_millis(value: i64) -> Self {
        Self(value)
    }

    pub fn from_f64(value: f64) -> Result<Self, MoneyConversionError> {
        scaled_from_f64(value, MILLIS_PER_UNIT).map(Self)
    }

    pub fn millis(&self) -> i64 {
        self.0
    }

    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / MILLIS_PER_UNIT as f64
    }

    /// `quantity × unit price`, rounded half-away-from-zero to the nearest øre.
    pub fn times(&self, unit_price: Money) -> Money {
        Money(div_round(self.0 * unit_price.value(), MILLIS_PER_UNIT))
    }
}

impl Neg for Quantity {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_f64())
    }
}

//--------------------------------------      VatRate       ----------------------------------------------------------
/// A VAT rate in basis points. The wire format is a fraction in [0, 1], e.g. 0.25 for Norwegian
/// standard MVA.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, PartialEq, Eq, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct VatRate(i64);

impl VatRate {
    pub const fn from_basis_points(value: i64) -> Self {
        Self(value)
    }

    pub fn from_fraction_f64(value: f64) -> Result<Self, MoneyConversionError> {
        let rate = scaled_from_f64(value, BASIS_POINTS).map(Self)?;
        if rate.0 < 0 || rate.0 > BASIS_POINTS {
            return Err(MoneyConversionError(format!("VAT rate {value} is not in [0, 1]")));
        }
        Ok(rate)
    }

    pub fn basis_points(&self) -> i64 {
        self.0
    }

    pub fn as_fraction(&self) -> f64 {
        self.0 as f64 / BASIS_POINTS as f64
    }
}

impl Display for VatRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0 as f64 / 100.0)
    }
}

fn scaled_from_f64(value: f64, scale: i64) -> Result<i64, MoneyConversionError> {
    if !value.is_finite() {
        return Err(MoneyConversionError(format!("{value} is not a finite number")));
    }
    let scaled = value * scale as f64;
    if scaled.abs() >= i64::MAX as f64 {
        return Err(MoneyConversionError(format!("{value} is out of range")));
    }
    Ok(scaled.round() as i64)
}

/// Integer division rounding half-away-from-zero.
fn div_round(n: i64, d: i64) -> i64 {
    let half = d / 2;
    if n >= 0 {
        (n + half) / d
    } else {
        (n - half) / d
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn major_to_minor_conversion() {
        assert_eq!(Money::from_major_f64(1000.0).unwrap().value(), 100_000);
        assert_eq!(Money::from_major_f64(19.99).unwrap().value(), 1_999);
        assert_eq!(Money::from_major_f64(0.005).unwrap().value(), 1);
        assert_eq!(Money::from_major_f64(-12.5).unwrap().value(), -1_250);
        assert!(Money::from_major_f64(f64::NAN).is_err());
    }

    #[test]
    fn quantity_times_price_rounds_to_ore() {
        let q = Quantity::from_f64(2.5).unwrap();
        let p = Money::from_major_f64(99.90).unwrap();
        assert_eq!(q.times(p).value(), 24_975);
        // 0.333 × 10.00 = 3.33, exact after rounding
        let q = Quantity::from_f64(0.333).unwrap();
        let p = Money::from_major_f64(10.0).unwrap();
        assert_eq!(q.times(p).value(), 333);
        // negative quantities (credit notes) round symmetrically
        let q = Quantity::from_f64(-0.333).unwrap();
        assert_eq!(q.times(p).value(), -333);
    }

    #[test]
    fn vat_application() {
        let amount = Money::from_minor(100_000);
        let rate = VatRate::from_fraction_f64(0.25).unwrap();
        assert_eq!(amount.vat(rate).value(), 25_000);
        let odd = Money::from_minor(333);
        assert_eq!(odd.vat(rate).value(), 83); // 83.25 rounds down
    }

    #[test]
    fn vat_rate_bounds() {
        assert!(VatRate::from_fraction_f64(1.01).is_err());
        assert!(VatRate::from_fraction_f64(-0.1).is_err());
        assert_eq!(VatRate::from_fraction_f64(0.15).unwrap().basis_points(), 1500);
    }

    #[test]
    fn display_formats() {
        assert_eq!(Money::from_minor(125_000).to_string(), "1250.00");
        assert_eq!(Money::from_minor(-50).to_string(), "-0.50");
        assert_eq!(VatRate::from_basis_points(2500).to_string(), "25%");
    }
}

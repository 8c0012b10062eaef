//! Money in minor units and the tax calculation.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Money amount represented in cents to avoid floating point issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money {
    /// Amount in cents (e.g., 1000 = 10.00)
    cents: i64,
}

impl Money {
    /// Creates a new Money amount from cents.
    pub const fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Creates a new Money amount from a whole-unit value.
    pub const fn from_units(units: i64) -> Self {
        Self { cents: units * 100 }
    }

    /// Returns zero money.
    pub const fn zero() -> Self {
        Self { cents: 0 }
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns the whole-unit portion.
    pub fn units(&self) -> i64 {
        self.cents / 100
    }

    /// Returns the cents portion (remainder after whole units).
    pub fn cents_part(&self) -> i64 {
        self.cents.abs() % 100
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.cents == 0
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.cents < 0
    }

    /// Multiplies by a quantity, failing if the product leaves the `i64` range.
    pub fn multiply(&self, quantity: u32) -> Result<Money, DomainError> {
        self.cents
            .checked_mul(i64::from(quantity))
            .map(Money::from_cents)
            .ok_or(DomainError::AmountOverflow { operation: "multiply" })
    }

    /// Adds two amounts, failing if the sum leaves the `i64` range.
    pub fn checked_add(&self, other: Money) -> Result<Money, DomainError> {
        self.cents
            .checked_add(other.cents)
            .map(Money::from_cents)
            .ok_or(DomainError::AmountOverflow { operation: "add" })
    }

    /// Sums amounts, failing on the first overflow.
    pub fn checked_sum(amounts: impl IntoIterator<Item = Money>) -> Result<Money, DomainError> {
        amounts
            .into_iter()
            .try_fold(Money::zero(), |acc, m| acc.checked_add(m))
    }

    /// Applies a rate in basis points, rounding half away from zero to the cent.
    pub fn apply_rate(&self, rate: TaxRate) -> Result<Money, DomainError> {
        let scaled = i128::from(self.cents) * i128::from(rate.basis_points());
        let half = if scaled < 0 { -5_000 } else { 5_000 };
        i64::try_from((scaled + half) / 10_000)
            .map(Money::from_cents)
            .map_err(|_| DomainError::AmountOverflow {
                operation: "apply tax rate to",
            })
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.cents < 0 {
            write!(f, "-{}.{:02}", self.units().abs(), self.cents_part())
        } else {
            write!(f, "{}.{:02}", self.units(), self.cents_part())
        }
    }
}

/// A tax rate expressed in basis points (1800 = 18%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaxRate(u32);

impl TaxRate {
    /// The rate applied when none is configured.
    pub const DEFAULT: TaxRate = TaxRate(1_800);

    pub const fn from_basis_points(bps: u32) -> Self {
        Self(bps)
    }

    pub fn basis_points(&self) -> u32 {
        self.0
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Computes `round((cart_cost + shipping_cost) * rate, 2)`.
///
/// Both inputs must be non-negative.
pub fn calculate_tax(
    cart_cost: Money,
    shipping_cost: Money,
    rate: TaxRate,
) -> Result<Money, DomainError> {
    if cart_cost.is_negative() {
        return Err(DomainError::NegativeAmount {
            field: "cart_cost",
            amount: cart_cost,
        });
    }
    if shipping_cost.is_negative() {
        return Err(DomainError::NegativeAmount {
            field: "shipping_cost",
            amount: shipping_cost,
        });
    }
    cart_cost.checked_add(shipping_cost)?.apply_rate(rate)
}

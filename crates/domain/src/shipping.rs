//! Per-country shipping rates.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::money::Money;

/// Flat shipping cost charged for delivery to a country.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingCost {
    pub country: String,
    pub cost: Money,
}

impl ShippingCost {
    pub fn new(country: impl Into<String>, cost: Money) -> Result<Self, DomainError> {
        if cost.is_negative() {
            return Err(DomainError::NegativeAmount {
                field: "shipping_cost",
                amount: cost,
            });
        }
        Ok(Self {
            country: country.into(),
            cost,
        })
    }
}

//! Type-safe monetary value with embedded currency.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DomainError;

/// Currencies the credit shop can be denominated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    USD,
    EUR,
    THB,
}

impl Currency {
    /// Returns the currency symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::USD => "$",
            Currency::EUR => "€",
            Currency::THB => "฿",
        }
    }

    /// Lowercase ISO code as the payment gateway expects it.
    pub fn gateway_code(&self) -> &'static str {
        match self {
            Currency::USD => "usd",
            Currency::EUR => "eur",
            Currency::THB => "thb",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::str::FromStr for Currency {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "USD" => Ok(Currency::USD),
            "EUR" => Ok(Currency::EUR),
            "THB" => Ok(Currency::THB),
            other => Err(DomainError::ValidationError(format!(
                "Unsupported currency: {}",
                other
            ))),
        }
    }
}

/// Type-safe money representation with embedded currency.
///
/// Amount is stored in the smallest unit of the currency (cents, satang)
/// to avoid floating-point precision issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    amount: i64,
    currency: Currency,
}

impl Money {
    /// Creates a new Money value.
    pub fn new(amount: i64, currency: Currency) -> Result<Self, DomainError> {
        if amount < 0 {
            return Err(DomainError::NegativeAmount);
        }
        Ok(Self { amount, currency })
    }

    /// Creates a zero-value Money for the given currency.
    pub fn zero(currency: Currency) -> Self {
        Self {
            amount: 0,
            currency,
        }
    }

    /// Creates a Money value that may be negative. Account balances use
    /// this: funds-checked debits never overdraw, but unconditional
    /// entry types (an operator debit, say) can.
    pub fn balance(amount: i64, currency: Currency) -> Self {
        Self { amount, currency }
    }

    /// Returns the amount in smallest currency unit.
    pub fn amount(&self) -> i64 {
        self.amount
    }

    /// Returns the currency.
    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Checked addition - returns error if currencies don't match.
    pub fn checked_add(&self, other: Money) -> Result<Money, DomainError> {
        if self.currency != other.currency {
            return Err(DomainError::CurrencyMismatch {
                expected: self.currency,
                got: other.currency,
            });
        }
        Ok(Money {
            amount: self.amount.saturating_add(other.amount),
            currency: self.currency,
        })
    }

    /// Checked subtraction - returns error if currencies don't match or
    /// the result would be negative.
    pub fn checked_sub(&self, other: Money) -> Result<Money, DomainError> {
        if self.currency != other.currency {
            return Err(DomainError::CurrencyMismatch {
                expected: self.currency,
                got: other.currency,
            });
        }
        if self.amount < other.amount {
            return Err(DomainError::InsufficientFunds {
                available: self.amount,
                requested: other.amount,
            });
        }
        Ok(Money {
            amount: self.amount - other.amount,
            currency: self.currency,
        })
    }

    /// Scales the amount by a line-item quantity.
    pub fn checked_mul(&self, quantity: i64) -> Result<Money, DomainError> {
        if quantity < 0 {
            return Err(DomainError::NegativeAmount);
        }
        let amount = self
            .amount
            .checked_mul(quantity)
            .ok_or(DomainError::ValidationError("Amount overflow".into()))?;
        Ok(Money {
            amount,
            currency: self.currency,
        })
    }

    /// Returns true if this Money is greater than or equal to the other.
    pub fn gte(&self, other: &Money) -> bool {
        assert_eq!(
            self.currency, other.currency,
            "Cannot compare Money with different currencies"
        );
        self.amount >= other.amount
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let major = self.amount / 100;
        let minor = (self.amount % 100).abs();
        write!(f, "{}{}.{:02}", self.currency.symbol(), major, minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_creation() {
        let money = Money::new(1000, Currency::THB).unwrap();
        assert_eq!(money.amount(), 1000);
        assert_eq!(money.currency(), Currency::THB);
    }

    #[test]
    fn test_negative_money_fails() {
        let result = Money::new(-100, Currency::THB);
        assert!(matches!(result, Err(DomainError::NegativeAmount)));
    }

    #[test]
    fn test_balance_allows_negative() {
        let overdrawn = Money::balance(-200, Currency::THB);
        assert_eq!(overdrawn.amount(), -200);
    }

    #[test]
    fn test_money_scaling() {
        let price = Money::new(250, Currency::THB).unwrap();
        let line = price.checked_mul(4).unwrap();
        assert_eq!(line.amount(), 1000);
    }

    #[test]
    fn test_currency_mismatch() {
        let usd = Money::new(100, Currency::USD).unwrap();
        let thb = Money::new(50, Currency::THB).unwrap();
        let result = usd.checked_add(thb);
        assert!(matches!(result, Err(DomainError::CurrencyMismatch { .. })));
    }

    #[test]
    fn test_money_display() {
        let money = Money::new(1050, Currency::THB).unwrap();
        assert_eq!(format!("{}", money), "฿10.50");
    }
}

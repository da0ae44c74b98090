//! Currency codes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CurrencyCodeError;

/// ISO 4217 currency code.
///
/// Codes are stored upper-cased. `Currency::new` accepts anything so that
/// codes read back from the database never fail to load; use
/// [`Currency::parse`] at input boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Currency(String);

impl Currency {
    /// Create a new currency from code.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().trim().to_uppercase())
    }

    /// Parse a user-supplied code, requiring three ASCII letters.
    pub fn parse(code: &str) -> Result<Self, CurrencyCodeError> {
        let currency = Self::new(code);
        if currency.is_well_formed() {
            Ok(currency)
        } else {
            Err(CurrencyCodeError::Malformed(code.to_string()))
        }
    }

    /// Get the currency code.
    pub fn code(&self) -> &str {
        &self.0
    }

    /// Whether the code has the three-letter ISO 4217 shape.
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == 3 && self.0.bytes().all(|b| b.is_ascii_uppercase())
    }

    /// Display symbol used by en-US currency formatting, if it has one.
    pub fn symbol(&self) -> Option<&'static str> {
        let symbol = match self.0.as_str() {
            "USD" => "$",
            "EUR" => "€",
            "GBP" => "£",
            "JPY" => "¥",
            "CNY" => "CN¥",
            "INR" => "₹",
            "KRW" => "₩",
            "ILS" => "₪",
            "VND" => "₫",
            "PHP" => "₱",
            "CAD" => "CA$",
            "AUD" => "A$",
            "NZD" => "NZ$",
            "HKD" => "HK$",
            "MXN" => "MX$",
            "BRL" => "R$",
            "TWD" => "NT$",
            _ => return None,
        };
        Some(symbol)
    }

    /// The pivot currency all stored rates are quoted against.
    pub fn base() -> Self {
        Self::usd()
    }

    /// Common currencies
    pub fn usd() -> Self {
        Self::new("USD")
    }

    pub fn eur() -> Self {
        Self::new("EUR")
    }

    pub fn gbp() -> Self {
        Self::new("GBP")
    }

    pub fn jpy() -> Self {
        Self::new("JPY")
    }

    pub fn myr() -> Self {
        Self::new("MYR")
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self::base()
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Currency {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl FromStr for Currency {
    type Err = CurrencyCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

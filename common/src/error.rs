//! Error types for shared value parsing.

use thiserror::Error;

/// Errors raised while parsing a currency code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CurrencyCodeError {
    /// The code is not three ASCII letters.
    #[error("Malformed currency code: {0:?}")]
    Malformed(String),
}

impl CurrencyCodeError {
    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            CurrencyCodeError::Malformed(_) => "MALFORMED_CURRENCY",
        }
    }
}

//! FX subsystem error types.

use nosco_common::{Currency, CurrencyCodeError};
use thiserror::Error;

/// Failures of the external rate-quoting service.
///
/// Surfaced unchanged to whoever triggered the refresh; never retried here.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Network failure or timeout before a response arrived.
    #[error("Rate provider unreachable: {0}")]
    Unreachable(String),

    /// Provider answered with a non-success HTTP status.
    #[error("Rate provider rejected the request with HTTP {status}")]
    Rejected { status: u16 },

    /// Success status, but the payload reports an error or lacks rates.
    #[error("Invalid rate provider response: {0}")]
    InvalidResponse(String),
}

/// Failures of the persistence collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Underlying storage could not be read or written.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Stored document could not be encoded or decoded.
    #[error("Corrupt document {collection}/{key}: {reason}")]
    Corrupt {
        collection: String,
        key: String,
        reason: String,
    },
}

/// Errors that can occur in the FX subsystem.
#[derive(Debug, Error)]
pub enum FxError {
    /// Rate provider failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Rate store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// No stored rate for the currency.
    #[error("Rate not available for {0}")]
    RateUnavailable(Currency),

    /// Rate value is zero, negative or not a number.
    #[error("Invalid rate {rate} for {currency}")]
    InvalidRate { currency: Currency, rate: f64 },

    /// Currency is not in the tracked set.
    #[error("Currency {0} is not tracked")]
    UntrackedCurrency(Currency),

    /// Manual rate edits are only allowed while auto-refresh is off.
    #[error("Manual rate override rejected: auto-refresh is enabled")]
    AutoRefreshEnabled,

    /// Refresh interval must be at least one day.
    #[error("Invalid refresh interval: {0} days")]
    InvalidRefreshInterval(u32),

    /// Malformed currency code.
    #[error(transparent)]
    CurrencyCode(#[from] CurrencyCodeError),
}

impl FxError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FxError::Provider(ProviderError::Unreachable(_))
                | FxError::Store(StoreError::Unavailable(_))
        ) || matches!(self, FxError::Provider(ProviderError::Rejected { status }) if *status >= 500 || *status == 429)
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            FxError::Provider(ProviderError::Unreachable(_)) => "PROVIDER_UNREACHABLE",
            FxError::Provider(ProviderError::Rejected { .. }) => "PROVIDER_REJECTED",
            FxError::Provider(ProviderError::InvalidResponse(_)) => "PROVIDER_INVALID_RESPONSE",
            FxError::Store(StoreError::Unavailable(_)) => "STORE_UNAVAILABLE",
            FxError::Store(StoreError::Corrupt { .. }) => "STORE_CORRUPT",
            FxError::RateUnavailable(_) => "RATE_UNAVAILABLE",
            FxError::InvalidRate { .. } => "INVALID_RATE",
            FxError::UntrackedCurrency(_) => "UNTRACKED_CURRENCY",
            FxError::AutoRefreshEnabled => "AUTO_REFRESH_ENABLED",
            FxError::InvalidRefreshInterval(_) => "INVALID_REFRESH_INTERVAL",
            FxError::CurrencyCode(e) => e.error_code(),
        }
    }
}

/// Result type for FX operations.
pub type FxResult<T> = Result<T, FxError>;

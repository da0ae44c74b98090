//! Exchange-rate subsystem configuration.

use std::path::PathBuf;
use std::time::Duration;

use nosco_common::{constants, Currency, DurationExt};

/// Rate provider configuration.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Provider endpoint root, without the key or path.
    pub base_url: String,
    /// API key placed in the request path.
    pub api_key: String,
    /// Per-request timeout; expiry surfaces as `ProviderError::Unreachable`.
    pub request_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://v6.exchangerate-api.com/v6".to_string(),
            api_key: String::new(),
            request_timeout: constants::provider_request_timeout().as_std(),
        }
    }
}

/// Main configuration.
#[derive(Debug, Clone)]
pub struct FxConfig {
    /// Provider settings.
    pub provider: ProviderConfig,
    /// Pivot currency for stored rates.
    pub base_currency: Currency,
    /// JSON file backing the document store.
    pub store_path: PathBuf,
    /// Log level.
    pub log_level: String,
    /// Emit logs as JSON.
    pub log_json: bool,
}

impl Default for FxConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            base_currency: Currency::base(),
            store_path: PathBuf::from("nosco-rates.json"),
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl FxConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("NOSCO_RATES_PROVIDER_URL") {
            config.provider.base_url = url;
        }

        if let Ok(key) = std::env::var("NOSCO_RATES_API_KEY") {
            config.provider.api_key = key;
        }

        if let Ok(secs) = std::env::var("NOSCO_RATES_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                config.provider.request_timeout = Duration::from_secs(secs);
            }
        }

        if let Ok(base) = std::env::var("NOSCO_RATES_BASE_CURRENCY") {
            config.base_currency = Currency::new(base);
        }

        if let Ok(path) = std::env::var("NOSCO_RATES_STORE_PATH") {
            config.store_path = PathBuf::from(path);
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.log_level = level;
        }

        if let Ok(json) = std::env::var("NOSCO_RATES_LOG_JSON") {
            config.log_json = matches!(json.as_str(), "1" | "true" | "yes");
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if !self.base_currency.is_well_formed() {
            return Err(format!("Invalid base currency: {}", self.base_currency));
        }

        if self.provider.base_url.is_empty() {
            return Err("Provider URL cannot be empty".to_string());
        }

        if self.provider.request_timeout.is_zero() {
            return Err("Provider timeout cannot be 0".to_string());
        }

        if self.store_path.as_os_str().is_empty() {
            return Err("Store path cannot be empty".to_string());
        }

        Ok(())
    }

    /// Provider calls need a key; local-only commands do not.
    pub fn validate_for_refresh(&self) -> Result<(), String> {
        self.validate()?;
        if self.provider.api_key.is_empty() {
            return Err("NOSCO_RATES_API_KEY must be set to refresh rates".to_string());
        }
        Ok(())
    }
}

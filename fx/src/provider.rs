//! Rate provider traits and implementations.

use std::collections::HashMap;

use async_trait::async_trait;
use nosco_common::Currency;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::config::ProviderConfig;
use crate::error::ProviderError;

/// Rates quoted by a provider: units of each currency per one unit of the
/// requested base.
pub type QuotedRates = HashMap<Currency, f64>;

/// Trait for FX rate providers.
///
/// Implementations are stateless request/response clients: no caching and
/// no retries.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Fetch the latest rates for every currency the provider supports.
    async fn fetch_rates(&self, base: &Currency) -> Result<QuotedRates, ProviderError>;
}

/// Body of `GET /<key>/latest/<base>`.
#[derive(Debug, Deserialize)]
struct LatestRatesResponse {
    result: Option<String>,
    #[serde(rename = "error-type")]
    error_type: Option<String>,
    conversion_rates: Option<HashMap<String, f64>>,
}

/// Client for the exchangerate-api.com v6 `latest` endpoint.
pub struct ExchangeRateApiProvider {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ExchangeRateApiProvider {
    /// Create a new provider client.
    pub fn new(config: &ProviderConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("nosco-rates/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();

        Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    fn latest_url(&self, base: &Currency) -> String {
        format!("{}/{}/latest/{}", self.base_url, self.api_key, base.code())
    }
}

#[async_trait]
impl RateProvider for ExchangeRateApiProvider {
    fn name(&self) -> &str {
        "exchangerate-api"
    }

    #[instrument(skip(self), fields(base = %base))]
    async fn fetch_rates(&self, base: &Currency) -> Result<QuotedRates, ProviderError> {
        let response = self
            .http_client
            .get(self.latest_url(base))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| ProviderError::Unreachable(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Rate provider returned error status");
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
            });
        }

        let body: LatestRatesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.without_url().to_string()))?;

        if body.result.as_deref() != Some("success") {
            let reason = body
                .error_type
                .unwrap_or_else(|| "missing result field".to_string());
            return Err(ProviderError::InvalidResponse(reason));
        }

        let rates = body.conversion_rates.ok_or_else(|| {
            ProviderError::InvalidResponse("missing conversion_rates".to_string())
        })?;

        debug!(count = rates.len(), "Fetched rates from provider");

        Ok(rates
            .into_iter()
            .map(|(code, rate)| (Currency::new(code), rate))
            .collect())
    }
}

/// Mock rate provider for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockRateProvider {
    name: String,
    rates: dashmap::DashMap<Currency, f64>,
    failure: parking_lot::Mutex<Option<ProviderError>>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockRateProvider {
    /// Create a new mock provider.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rates: dashmap::DashMap::new(),
            failure: parking_lot::Mutex::new(None),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Set the quoted rate for a currency.
    pub fn set_rate(&self, currency: Currency, rate: f64) {
        self.rates.insert(currency, rate);
    }

    /// Make every following fetch fail with `error`, or succeed again with `None`.
    pub fn set_failure(&self, error: Option<ProviderError>) {
        *self.failure.lock() = error;
    }

    /// Number of `fetch_rates` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateProvider for MockRateProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_rates(&self, _base: &Currency) -> Result<QuotedRates, ProviderError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if let Some(error) = self.failure.lock().clone() {
            return Err(error);
        }
        Ok(self
            .rates
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server_uri: &str) -> ExchangeRateApiProvider {
        ExchangeRateApiProvider::new(&ProviderConfig {
            base_url: server_uri.to_string(),
            api_key: "test-key".to_string(),
            request_timeout: Duration::from_secs(2),
        })
    }

    #[tokio::test]
    async fn test_mock_provider_counts_calls() {
        let provider = MockRateProvider::new("test");
        provider.set_rate(Currency::gbp(), 0.8);

        let rates = provider.fetch_rates(&Currency::usd()).await.unwrap();
        assert_eq!(rates.get(&Currency::gbp()), Some(&0.8));

        provider.set_failure(Some(ProviderError::Rejected { status: 500 }));
        assert!(provider.fetch_rates(&Currency::usd()).await.is_err());
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/test-key/latest/USD"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": "success",
                "base_code": "USD",
                "conversion_rates": { "USD": 1, "GBP": 0.8, "MYR": 4.4 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let rates = provider_for(&server.uri())
            .fetch_rates(&Currency::usd())
            .await
            .unwrap();

        assert_eq!(rates.len(), 3);
        assert_eq!(rates.get(&Currency::myr()), Some(&4.4));
        assert_eq!(rates.get(&Currency::usd()), Some(&1.0));
    }

    #[tokio::test]
    async fn test_non_success_status_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = provider_for(&server.uri())
            .fetch_rates(&Currency::usd())
            .await
            .unwrap_err();

        assert_eq!(err, ProviderError::Rejected { status: 503 });
    }

    #[tokio::test]
    async fn test_error_result_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": "error",
                "error-type": "invalid-key"
            })))
            .mount(&server)
            .await;

        let err = provider_for(&server.uri())
            .fetch_rates(&Currency::usd())
            .await
            .unwrap_err();

        assert_eq!(err, ProviderError::InvalidResponse("invalid-key".to_string()));
    }

    #[tokio::test]
    async fn test_missing_rates_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": "success" })))
            .mount(&server)
            .await;

        let err = provider_for(&server.uri())
            .fetch_rates(&Currency::usd())
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_garbage_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = provider_for(&server.uri())
            .fetch_rates(&Currency::usd())
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_timeout_is_unreachable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "result": "success", "conversion_rates": {} }))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let provider = ExchangeRateApiProvider::new(&ProviderConfig {
            base_url: server.uri(),
            api_key: "test-key".to_string(),
            request_timeout: Duration::from_millis(200),
        });
        let err = provider.fetch_rates(&Currency::usd()).await.unwrap_err();

        assert!(matches!(err, ProviderError::Unreachable(_)));
        assert!(!err.to_string().contains("test-key"));
    }

    #[tokio::test]
    async fn test_connection_failure_is_unreachable() {
        // Nothing listens on port 9 on loopback in test environments.
        let err = provider_for("http://127.0.0.1:9")
            .fetch_rates(&Currency::usd())
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Unreachable(_)));
    }
}

//! Nosco FX
//!
//! Exchange-rate bookkeeping for expense claims and payments.
//!
//! # Features
//!
//! - Persisted rate snapshot over a pluggable document store
//! - Scheduled refresh policy against an external rate provider
//! - Conversion pivoting through a base currency, with lenient fallback
//! - Display formatting and advisory expense policy checks
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use nosco_common::Currency;
//! use nosco_fx::{CurrencyService, InMemoryDocumentStore, RateStore};
//!
//! let store = Arc::new(RateStore::new(Arc::new(InMemoryDocumentStore::new())));
//! let service = CurrencyService::new(store);
//! service.initialize().await?;
//!
//! let usd = service.convert(100.0, &Currency::gbp(), &Currency::usd());
//! println!("{}", service.format(usd, &Currency::usd()));
//! ```

pub mod config;
pub mod conversion;
pub mod error;
pub mod format;
pub mod policy;
pub mod provider;
pub mod refresh;
pub mod snapshot;
pub mod store;

pub use config::{FxConfig, ProviderConfig};
pub use conversion::{convert, try_convert, ConvertedAmount, CurrencyService};
pub use error::{FxError, FxResult, ProviderError, StoreError};
pub use format::format_currency;
pub use policy::{PolicyCeiling, PolicyCheck, PolicyValidator};
pub use provider::{ExchangeRateApiProvider, QuotedRates, RateProvider};
pub use refresh::{RefreshEngine, RefreshOutcome, SettingsUpdate, SkipReason};
pub use snapshot::RateSnapshot;
pub use store::{
    AdminPreferences, DocumentStore, FileDocumentStore, InMemoryDocumentStore, RateStore,
    SetOptions,
};

#[cfg(any(test, feature = "test-utils"))]
pub use provider::MockRateProvider;

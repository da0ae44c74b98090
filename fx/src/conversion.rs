//! Currency conversion against the last loaded rate snapshot.

use std::sync::Arc;

use nosco_common::Currency;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::{FxError, FxResult, StoreError};
use crate::format::format_currency;
use crate::snapshot::RateSnapshot;
use crate::store::RateStore;

/// Convert `amount` from `from` to `to`, pivoting through the base currency.
///
/// Fails with [`FxError::RateUnavailable`] when either side has no usable
/// rate. No rounding is applied.
pub fn try_convert(
    amount: f64,
    from: &Currency,
    to: &Currency,
    snapshot: &RateSnapshot,
) -> FxResult<f64> {
    if from == to {
        return Ok(amount);
    }

    let from_rate = snapshot
        .usable_rate(from)
        .ok_or_else(|| FxError::RateUnavailable(from.clone()))?;
    let to_rate = snapshot
        .usable_rate(to)
        .ok_or_else(|| FxError::RateUnavailable(to.clone()))?;

    let in_base = amount / from_rate;
    if *to == snapshot.base_currency {
        return Ok(in_base);
    }

    Ok(in_base * to_rate)
}

/// Convert `amount`, returning it unchanged when a rate is missing.
///
/// The missing rate is reported through a warning only; callers that need
/// to know should use [`try_convert`].
pub fn convert(amount: f64, from: &Currency, to: &Currency, snapshot: &RateSnapshot) -> f64 {
    match try_convert(amount, from, to, snapshot) {
        Ok(converted) => converted,
        Err(e) => {
            warn!(from = %from, to = %to, error = %e, "Rate unavailable, amount left unconverted");
            amount
        }
    }
}

/// A claimed amount alongside its base-currency equivalent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertedAmount {
    /// Amount as entered.
    pub amount: f64,
    /// Currency the amount was entered in.
    pub currency: Currency,
    /// Amount expressed in the base currency.
    pub converted_amount: f64,
}

/// Conversion and formatting over the last loaded snapshot.
///
/// Created once at startup around the shared [`RateStore`]. Only
/// [`initialize`](Self::initialize) and [`reload`](Self::reload) touch
/// storage; every other method is synchronous and works from memory.
pub struct CurrencyService {
    store: Arc<RateStore>,
    snapshot: RwLock<RateSnapshot>,
    default_currency: RwLock<Currency>,
}

impl CurrencyService {
    /// Create a service holding the default snapshot until initialized.
    pub fn new(store: Arc<RateStore>) -> Self {
        let base = store.base_currency().clone();
        Self {
            snapshot: RwLock::new(RateSnapshot::with_base(base.clone())),
            default_currency: RwLock::new(base),
            store,
        }
    }

    /// Load rates and display preferences from the store.
    ///
    /// A preferences read failure keeps the current default currency.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<RateSnapshot, StoreError> {
        let snapshot = self.store.load().await?;
        debug!(currencies = snapshot.tracked_currencies.len(), "Loaded exchange rates");
        *self.snapshot.write() = snapshot.clone();

        match self.store.load_preferences().await {
            Ok(prefs) => *self.default_currency.write() = prefs.default_currency,
            Err(e) => warn!(error = %e, "Failed to load admin preferences, keeping default currency"),
        }

        Ok(snapshot)
    }

    /// Re-read the snapshot from the store, e.g. after another process
    /// refreshed it. The current snapshot is kept if the read fails.
    #[instrument(skip(self))]
    pub async fn reload(&self) -> Result<RateSnapshot, StoreError> {
        let snapshot = self.store.load().await?;
        debug!(currencies = snapshot.tracked_currencies.len(), "Reloaded exchange rates");
        *self.snapshot.write() = snapshot.clone();
        Ok(snapshot)
    }

    /// Swap in a snapshot obtained elsewhere, e.g. right after a refresh.
    pub fn replace_snapshot(&self, snapshot: RateSnapshot) {
        *self.snapshot.write() = snapshot;
    }

    /// Copy of the current snapshot.
    pub fn snapshot(&self) -> RateSnapshot {
        self.snapshot.read().clone()
    }

    /// Currencies offered for selection.
    pub fn currencies(&self) -> Vec<Currency> {
        self.snapshot.read().currencies()
    }

    /// Currency amounts are displayed in by default.
    pub fn default_currency(&self) -> Currency {
        self.default_currency.read().clone()
    }

    /// See [`convert`].
    pub fn convert(&self, amount: f64, from: &Currency, to: &Currency) -> f64 {
        convert(amount, from, to, &self.snapshot.read())
    }

    /// See [`try_convert`].
    pub fn try_convert(&self, amount: f64, from: &Currency, to: &Currency) -> FxResult<f64> {
        try_convert(amount, from, to, &self.snapshot.read())
    }

    /// Pair an entered amount with its base-currency value.
    pub fn convert_to_base(&self, amount: f64, currency: &Currency) -> ConvertedAmount {
        let snapshot = self.snapshot.read();
        let base = snapshot.base_currency.clone();
        ConvertedAmount {
            amount,
            currency: currency.clone(),
            converted_amount: convert(amount, currency, &base, &snapshot),
        }
    }

    /// See [`format_currency`].
    pub fn format(&self, amount: f64, currency: &Currency) -> String {
        format_currency(amount, currency)
    }

    /// Convert into the default display currency and format.
    pub fn format_in_default(&self, amount: f64, currency: &Currency) -> String {
        let target = self.default_currency();
        format_currency(self.convert(amount, currency, &target), &target)
    }
}

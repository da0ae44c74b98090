//! The persisted exchange-rate snapshot.
//!
//! Rate convention: `rates[c]` is the number of units of `c` worth one
//! unit of the base currency, so `amount_in_base = amount_in_c / rates[c]`
//! and `amount_in_c = amount_in_base * rates[c]`. This is the direction the
//! rate provider quotes in, so provider values are stored as-is.

use std::collections::{BTreeMap, BTreeSet};

use nosco_common::{constants::DEFAULT_REFRESH_INTERVAL_DAYS, Currency, Timestamp};
use serde::{Deserialize, Serialize};

use crate::error::{FxError, FxResult};

fn default_refresh_interval_days() -> u32 {
    DEFAULT_REFRESH_INTERVAL_DAYS
}

/// Tracked currencies, their latest rates and refresh metadata.
///
/// Field names on the wire match the `settings/exchangeRates` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateSnapshot {
    /// Pivot currency; always priced at exactly 1.0.
    #[serde(default = "Currency::base")]
    pub base_currency: Currency,
    /// Currencies rates are maintained for.
    #[serde(rename = "selectedCurrencies", default)]
    pub tracked_currencies: BTreeSet<Currency>,
    /// Units of each currency per one unit of the base currency.
    #[serde(default)]
    pub rates: BTreeMap<Currency, f64>,
    /// Last successful provider refresh; `None` before the first one.
    #[serde(rename = "lastUpdated", default)]
    pub last_refreshed_at: Option<Timestamp>,
    #[serde(rename = "autoUpdateEnabled", default)]
    pub auto_refresh_enabled: bool,
    /// Minimum whole days between automatic refreshes.
    #[serde(rename = "refreshPeriodDays", default = "default_refresh_interval_days")]
    pub refresh_interval_days: u32,
    /// Last manual edit by an administrator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Timestamp>,
}

impl Default for RateSnapshot {
    fn default() -> Self {
        Self::with_base(Currency::base())
    }
}

impl RateSnapshot {
    /// Default snapshot pivoting on `base`: only the base tracked, at 1.0.
    pub fn with_base(base: Currency) -> Self {
        Self {
            tracked_currencies: BTreeSet::from([base.clone()]),
            rates: BTreeMap::from([(base.clone(), 1.0)]),
            base_currency: base,
            last_refreshed_at: None,
            auto_refresh_enabled: false,
            refresh_interval_days: DEFAULT_REFRESH_INTERVAL_DAYS,
            updated_at: None,
        }
    }

    /// Stored rate for a currency. The base is always 1.0.
    pub fn rate(&self, currency: &Currency) -> Option<f64> {
        if *currency == self.base_currency {
            return Some(1.0);
        }
        self.rates.get(currency).copied()
    }

    /// Stored rate, only if it is usable for arithmetic.
    pub fn usable_rate(&self, currency: &Currency) -> Option<f64> {
        self.rate(currency).filter(|r| r.is_finite() && *r > 0.0)
    }

    /// Check if a currency is tracked.
    pub fn is_tracked(&self, currency: &Currency) -> bool {
        self.tracked_currencies.contains(currency)
    }

    /// Start tracking a currency. Returns `false` if it already was.
    pub fn track(&mut self, currency: Currency) -> bool {
        self.tracked_currencies.insert(currency)
    }

    /// Stop tracking a currency and drop its rate. The base cannot be untracked.
    pub fn untrack(&mut self, currency: &Currency) -> bool {
        if *currency == self.base_currency {
            return false;
        }
        self.rates.remove(currency);
        self.tracked_currencies.remove(currency)
    }

    /// Tracked currencies in code order, for selection lists.
    pub fn currencies(&self) -> Vec<Currency> {
        self.tracked_currencies.iter().cloned().collect()
    }

    /// Tracked currencies other than the base.
    pub fn foreign_currencies(&self) -> impl Iterator<Item = &Currency> {
        self.tracked_currencies
            .iter()
            .filter(move |c| **c != self.base_currency)
    }

    /// Restore the structural invariants after reading an older document:
    /// base tracked at exactly 1.0, no rates for untracked currencies.
    pub fn normalize(&mut self) {
        self.tracked_currencies.insert(self.base_currency.clone());
        self.rates.insert(self.base_currency.clone(), 1.0);
        let tracked = &self.tracked_currencies;
        self.rates.retain(|c, _| tracked.contains(c));
    }

    /// Verify every documented invariant holds.
    pub fn check_invariants(&self) -> FxResult<()> {
        if self.rates.get(&self.base_currency) != Some(&1.0) {
            return Err(FxError::InvalidRate {
                currency: self.base_currency.clone(),
                rate: self.rates.get(&self.base_currency).copied().unwrap_or(f64::NAN),
            });
        }

        for (currency, rate) in &self.rates {
            if !self.is_tracked(currency) {
                return Err(FxError::UntrackedCurrency(currency.clone()));
            }
            if !rate.is_finite() || *rate <= 0.0 {
                return Err(FxError::InvalidRate {
                    currency: currency.clone(),
                    rate: *rate,
                });
            }
        }

        if self.refresh_interval_days == 0 {
            return Err(FxError::InvalidRefreshInterval(0));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_snapshot() {
        let snapshot = RateSnapshot::default();

        assert_eq!(snapshot.base_currency, Currency::usd());
        assert_eq!(snapshot.currencies(), vec![Currency::usd()]);
        assert_eq!(snapshot.rate(&Currency::usd()), Some(1.0));
        assert!(!snapshot.auto_refresh_enabled);
        assert_eq!(snapshot.refresh_interval_days, 7);
        assert!(snapshot.last_refreshed_at.is_none());
        assert!(snapshot.check_invariants().is_ok());
    }

    #[test]
    fn test_untrack_drops_rate_but_keeps_base() {
        let mut snapshot = RateSnapshot::default();
        snapshot.track(Currency::gbp());
        snapshot.rates.insert(Currency::gbp(), 0.8);

        assert!(snapshot.untrack(&Currency::gbp()));
        assert!(snapshot.rate(&Currency::gbp()).is_none());
        assert!(!snapshot.untrack(&Currency::usd()));
        assert!(snapshot.is_tracked(&Currency::usd()));
    }

    #[test]
    fn test_normalize_restores_invariants() {
        let mut snapshot = RateSnapshot::default();
        snapshot.tracked_currencies.clear();
        snapshot.rates.clear();
        snapshot.rates.insert(Currency::eur(), 0.92);

        assert!(snapshot.check_invariants().is_err());
        snapshot.normalize();

        assert!(snapshot.check_invariants().is_ok());
        assert!(snapshot.rates.get(&Currency::eur()).is_none());
    }

    #[test]
    fn test_check_invariants_rejects_non_positive_rate() {
        let mut snapshot = RateSnapshot::default();
        snapshot.track(Currency::gbp());
        snapshot.rates.insert(Currency::gbp(), 0.0);

        assert!(matches!(
            snapshot.check_invariants(),
            Err(FxError::InvalidRate { .. })
        ));
        assert!(snapshot.usable_rate(&Currency::gbp()).is_none());
    }

    #[test]
    fn test_document_field_names() {
        let json = serde_json::json!({
            "selectedCurrencies": ["USD", "GBP"],
            "rates": { "USD": 1.0, "GBP": 0.8 },
            "lastUpdated": null,
            "autoUpdateEnabled": true,
            "refreshPeriodDays": 3
        });

        let snapshot: RateSnapshot = serde_json::from_value(json).unwrap();

        assert_eq!(snapshot.base_currency, Currency::usd());
        assert!(snapshot.auto_refresh_enabled);
        assert_eq!(snapshot.refresh_interval_days, 3);
        assert_eq!(snapshot.rate(&Currency::gbp()), Some(0.8));

        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["selectedCurrencies"], serde_json::json!(["GBP", "USD"]));
        assert!(value.get("updatedAt").is_none());
    }
}

//! Refresh policy: when to pull new rates, and how provider quotes are
//! reconciled into the stored snapshot.

use std::collections::BTreeMap;
use std::sync::Arc;

use nosco_common::{elapsed_days, Currency, CurrencyCodeError, Timestamp};
use tracing::{debug, info, instrument, warn};

use crate::error::{FxError, FxResult};
use crate::provider::{QuotedRates, RateProvider};
use crate::snapshot::RateSnapshot;
use crate::store::RateStore;

/// Rate assigned to a tracked currency the provider did not quote.
pub const FALLBACK_RATE: f64 = 1.0;

/// Why a policy check did not refresh.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Auto-refresh is switched off.
    Disabled,
    /// The refresh interval has not elapsed yet.
    NotDue { days_since_refresh: f64 },
}

/// Result of [`RefreshEngine::refresh_if_due`].
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Skipped(SkipReason),
    Refreshed(RateSnapshot),
}

impl RefreshOutcome {
    pub fn is_refreshed(&self) -> bool {
        matches!(self, RefreshOutcome::Refreshed(_))
    }
}

/// Administrative changes to refresh settings. `None` fields are left as-is.
#[derive(Debug, Clone, Default)]
pub struct SettingsUpdate {
    pub auto_refresh_enabled: Option<bool>,
    pub refresh_interval_days: Option<u32>,
    /// Currencies to start tracking; they get the fallback rate until the next refresh.
    pub track: Vec<Currency>,
    /// Currencies to stop tracking; their rates are dropped.
    pub untrack: Vec<Currency>,
}

/// Days since the last refresh, `None` if there never was one.
pub fn days_since_refresh(snapshot: &RateSnapshot, now: Timestamp) -> Option<f64> {
    snapshot
        .last_refreshed_at
        .map(|last| elapsed_days(last, now))
}

/// Whether an automatic refresh is due at `now`. The boundary is inclusive.
pub fn is_refresh_due(snapshot: &RateSnapshot, now: Timestamp) -> bool {
    match days_since_refresh(snapshot, now) {
        Some(days) => days >= f64::from(snapshot.refresh_interval_days),
        None => true,
    }
}

/// Build the refreshed snapshot from provider quotes.
///
/// Every tracked currency gets a rate: the quoted one if it is positive and
/// finite, [`FALLBACK_RATE`] otherwise. The base is always 1.0 and is never
/// taken from the quote.
pub fn reconcile(mut snapshot: RateSnapshot, quoted: &QuotedRates, now: Timestamp) -> RateSnapshot {
    let mut rates = BTreeMap::from([(snapshot.base_currency.clone(), 1.0)]);

    for currency in snapshot.foreign_currencies() {
        let rate = match quoted.get(currency) {
            Some(rate) if rate.is_finite() && *rate > 0.0 => *rate,
            Some(rate) => {
                warn!(currency = %currency, rate, "Provider quoted unusable rate, using fallback");
                FALLBACK_RATE
            }
            None => {
                warn!(currency = %currency, "Provider did not quote currency, using fallback");
                FALLBACK_RATE
            }
        };
        rates.insert(currency.clone(), rate);
    }

    snapshot.rates = rates;
    snapshot.last_refreshed_at = Some(match snapshot.last_refreshed_at {
        Some(previous) if previous > now => previous,
        _ => now,
    });
    snapshot
}

/// Decides when to refresh and applies administrative edits.
///
/// Each operation reads the snapshot, optionally calls the provider, then
/// writes the whole snapshot back. Nothing is written when a step fails.
/// Concurrent invocations are not serialized.
pub struct RefreshEngine {
    store: Arc<RateStore>,
    provider: Arc<dyn RateProvider>,
}

impl RefreshEngine {
    /// Create a new refresh engine.
    pub fn new(store: Arc<RateStore>, provider: Arc<dyn RateProvider>) -> Self {
        Self { store, provider }
    }

    /// Refresh if auto-refresh is enabled and the interval has elapsed.
    #[instrument(skip(self))]
    pub async fn refresh_if_due(&self, now: Timestamp) -> FxResult<RefreshOutcome> {
        let snapshot = self.store.load().await?;

        if !snapshot.auto_refresh_enabled {
            debug!("Auto-refresh disabled, skipping");
            return Ok(RefreshOutcome::Skipped(SkipReason::Disabled));
        }

        if !is_refresh_due(&snapshot, now) {
            let days_since_refresh = days_since_refresh(&snapshot, now).unwrap_or(f64::INFINITY);
            debug!(
                days_since_refresh,
                interval_days = snapshot.refresh_interval_days,
                "Refresh not due"
            );
            return Ok(RefreshOutcome::Skipped(SkipReason::NotDue { days_since_refresh }));
        }

        match self.refresh(snapshot, now).await {
            Ok(refreshed) => Ok(RefreshOutcome::Refreshed(refreshed)),
            Err(e) => {
                warn!(error = %e, "Automatic rate refresh failed");
                Err(e)
            }
        }
    }

    /// Refresh now, ignoring the auto-refresh switch and the interval.
    pub async fn force_refresh(&self) -> FxResult<RateSnapshot> {
        self.force_refresh_at(nosco_common::now()).await
    }

    /// [`force_refresh`](Self::force_refresh) with an explicit clock.
    #[instrument(skip(self))]
    pub async fn force_refresh_at(&self, now: Timestamp) -> FxResult<RateSnapshot> {
        let snapshot = self.store.load().await?;
        self.refresh(snapshot, now).await
    }

    async fn refresh(&self, snapshot: RateSnapshot, now: Timestamp) -> FxResult<RateSnapshot> {
        let quoted = if snapshot.foreign_currencies().next().is_none() {
            QuotedRates::new()
        } else {
            self.provider.fetch_rates(&snapshot.base_currency).await?
        };

        let refreshed = reconcile(snapshot, &quoted, now);
        self.store.save(&refreshed).await?;

        info!(
            provider = self.provider.name(),
            currencies = refreshed.rates.len(),
            "Exchange rates refreshed"
        );

        Ok(refreshed)
    }

    /// Manually set rates. Only allowed while auto-refresh is off.
    ///
    /// Currencies not mentioned keep their rates; the base stays at 1.0.
    #[instrument(skip(self, rates), fields(count = rates.len()))]
    pub async fn override_rates(
        &self,
        rates: BTreeMap<Currency, f64>,
        now: Timestamp,
    ) -> FxResult<RateSnapshot> {
        let mut snapshot = self.store.load().await?;

        if snapshot.auto_refresh_enabled {
            return Err(FxError::AutoRefreshEnabled);
        }

        for (currency, rate) in &rates {
            if !snapshot.is_tracked(currency) {
                return Err(FxError::UntrackedCurrency(currency.clone()));
            }
            if !rate.is_finite() || *rate <= 0.0 {
                return Err(FxError::InvalidRate {
                    currency: currency.clone(),
                    rate: *rate,
                });
            }
        }

        for (currency, rate) in rates {
            if currency != snapshot.base_currency {
                snapshot.rates.insert(currency, rate);
            }
        }
        snapshot.updated_at = Some(now);

        self.store.save(&snapshot).await?;
        info!("Exchange rates manually updated");
        Ok(snapshot)
    }

    /// Change refresh settings and the tracked currency set.
    #[instrument(skip(self, update))]
    pub async fn update_settings(
        &self,
        update: SettingsUpdate,
        now: Timestamp,
    ) -> FxResult<RateSnapshot> {
        if update.refresh_interval_days == Some(0) {
            return Err(FxError::InvalidRefreshInterval(0));
        }
        if let Some(bad) = update.track.iter().find(|c| !c.is_well_formed()) {
            return Err(CurrencyCodeError::Malformed(bad.code().to_string()).into());
        }

        let mut snapshot = self.store.load().await?;

        if let Some(enabled) = update.auto_refresh_enabled {
            snapshot.auto_refresh_enabled = enabled;
        }
        if let Some(days) = update.refresh_interval_days {
            snapshot.refresh_interval_days = days;
        }
        for currency in update.track {
            if snapshot.track(currency.clone()) {
                snapshot.rates.entry(currency).or_insert(FALLBACK_RATE);
            }
        }
        for currency in &update.untrack {
            snapshot.untrack(currency);
        }
        snapshot.updated_at = Some(now);

        self.store.save(&snapshot).await?;
        info!(
            auto_refresh = snapshot.auto_refresh_enabled,
            interval_days = snapshot.refresh_interval_days,
            currencies = snapshot.tracked_currencies.len(),
            "Exchange rate settings updated"
        );
        Ok(snapshot)
    }
}

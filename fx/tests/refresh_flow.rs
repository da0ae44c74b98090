//! End-to-end flow: settings edit, refresh, conversion and policy check
//! through the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use nosco_common::Currency;
use nosco_fx::{
    CurrencyService, FxError, InMemoryDocumentStore, PolicyCeiling, PolicyValidator,
    ProviderError, QuotedRates, RateProvider, RateStore, RefreshEngine, RefreshOutcome,
    SettingsUpdate, SkipReason,
};

struct FixedProvider {
    rates: QuotedRates,
    fail: bool,
    calls: AtomicUsize,
}

impl FixedProvider {
    fn new(rates: &[(&str, f64)]) -> Self {
        Self {
            rates: rates.iter().map(|(c, r)| (Currency::new(*c), *r)).collect(),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(&[])
        }
    }
}

#[async_trait]
impl RateProvider for FixedProvider {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn fetch_rates(&self, _base: &Currency) -> Result<QuotedRates, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ProviderError::Rejected { status: 401 });
        }
        Ok(self.rates.clone())
    }
}

fn new_store() -> Arc<RateStore> {
    Arc::new(RateStore::new(Arc::new(InMemoryDocumentStore::new())))
}

#[tokio::test]
async fn test_settings_refresh_convert_validate() {
    let store = new_store();
    let provider = Arc::new(FixedProvider::new(&[("GBP", 0.80), ("MYR", 4.40), ("EUR", 0.92)]));
    let engine = RefreshEngine::new(store.clone(), provider.clone());
    let now = nosco_common::now();

    engine
        .update_settings(
            SettingsUpdate {
                auto_refresh_enabled: Some(true),
                track: vec![Currency::gbp(), Currency::myr()],
                ..Default::default()
            },
            now,
        )
        .await
        .unwrap();

    let outcome = engine.refresh_if_due(now).await.unwrap();
    let RefreshOutcome::Refreshed(snapshot) = outcome else {
        panic!("expected a refresh");
    };
    assert!(snapshot.rate(&Currency::eur()).is_none());

    let outcome = engine.refresh_if_due(now + Duration::days(1)).await.unwrap();
    assert!(matches!(
        outcome,
        RefreshOutcome::Skipped(SkipReason::NotDue { .. })
    ));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

    let service = CurrencyService::new(store.clone());
    service.initialize().await.unwrap();

    let myr = service.convert(100.0, &Currency::gbp(), &Currency::myr());
    assert!((myr - 550.0).abs() < 1e-9);
    assert_eq!(service.format(myr, &Currency::myr()), "MYR 550.00");

    let ceiling = PolicyCeiling::new("meals", 100.0, Currency::usd());
    let check = PolicyValidator::validate(
        Some(440.0),
        Some(&Currency::myr()),
        Some(&ceiling),
        &service.snapshot(),
    );
    assert!(check.is_valid());

    let check = PolicyValidator::validate(
        Some(441.0),
        Some(&Currency::myr()),
        Some(&ceiling),
        &service.snapshot(),
    );
    assert!(check.message().unwrap().contains("meals"));
}

#[tokio::test]
async fn test_failed_manual_refresh_keeps_previous_rates() {
    let store = new_store();
    let good = RefreshEngine::new(store.clone(), Arc::new(FixedProvider::new(&[("GBP", 0.80)])));
    good.update_settings(
        SettingsUpdate {
            track: vec![Currency::gbp()],
            ..Default::default()
        },
        nosco_common::now(),
    )
    .await
    .unwrap();
    let before = good.force_refresh().await.unwrap();

    let bad = RefreshEngine::new(store.clone(), Arc::new(FixedProvider::failing()));
    let err = bad.force_refresh().await.unwrap_err();

    assert!(matches!(
        err,
        FxError::Provider(ProviderError::Rejected { status: 401 })
    ));
    assert_eq!(store.load().await.unwrap(), before);
}

//! Subcommand implementations.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{anyhow, Context as _};
use nosco_common::Currency;
use nosco_fx::{
    AdminPreferences, CurrencyService, ExchangeRateApiProvider, FileDocumentStore, FxConfig,
    PolicyCeiling, PolicyCheck, PolicyValidator, RateSnapshot, RateStore, RefreshEngine,
    RefreshOutcome, SettingsUpdate, SkipReason,
};
use tracing::{info, warn};

use crate::Command;

/// Shared state for one CLI invocation.
pub struct Context {
    config: FxConfig,
    store: Arc<RateStore>,
}

impl Context {
    pub fn new(config: FxConfig) -> Self {
        let documents = Arc::new(FileDocumentStore::new(config.store_path.clone()));
        let store = Arc::new(RateStore::with_base(documents, config.base_currency.clone()));
        Self { config, store }
    }

    fn engine(&self) -> RefreshEngine {
        let provider = Arc::new(ExchangeRateApiProvider::new(&self.config.provider));
        RefreshEngine::new(self.store.clone(), provider)
    }

    async fn service(&self) -> anyhow::Result<CurrencyService> {
        let service = CurrencyService::new(self.store.clone());
        service
            .initialize()
            .await
            .context("Failed to load exchange rates")?;
        Ok(service)
    }
}

pub(crate) async fn run(ctx: &Context, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Show => {
            let service = ctx.service().await?;
            print_snapshot(&service.snapshot(), &service.default_currency());
        }

        Command::Refresh => {
            ctx.config.validate_for_refresh().map_err(|e| anyhow!(e))?;
            // A failed automatic check is only logged.
            match ctx.engine().refresh_if_due(nosco_common::now()).await {
                Ok(RefreshOutcome::Refreshed(snapshot)) => {
                    println!("Rates refreshed.");
                    print_snapshot(&snapshot, &ctx.store.load_preferences().await?.default_currency);
                }
                Ok(RefreshOutcome::Skipped(SkipReason::Disabled)) => {
                    println!("Auto-refresh is disabled; nothing to do.");
                }
                Ok(RefreshOutcome::Skipped(SkipReason::NotDue { days_since_refresh })) => {
                    println!(
                        "Last refresh was {:.1} days ago; not due yet.",
                        days_since_refresh
                    );
                }
                Err(e) => warn!(error = %e, code = e.error_code(), "Automatic refresh check failed"),
            }
        }

        Command::ForceRefresh => {
            ctx.config.validate_for_refresh().map_err(|e| anyhow!(e))?;
            let snapshot = ctx
                .engine()
                .force_refresh()
                .await
                .context("Refresh failed; stored rates are unchanged")?;
            println!("Rates refreshed.");
            print_snapshot(&snapshot, &ctx.store.load_preferences().await?.default_currency);
        }

        Command::Convert { amount, from, to } => {
            let from = Currency::parse(&from)?;
            let to = Currency::parse(&to)?;
            let service = ctx.service().await?;
            let converted = service.convert(amount, &from, &to);
            println!(
                "{} = {}",
                service.format(amount, &from),
                service.format(converted, &to)
            );
        }

        Command::Format { amount, currency } => {
            println!("{}", nosco_fx::format_currency(amount, &Currency::new(currency)));
        }

        Command::Validate {
            amount,
            currency,
            category,
            limit,
            limit_currency,
        } => {
            let currency = Currency::parse(&currency)?;
            let ceiling = PolicyCeiling::new(category, limit, Currency::parse(&limit_currency)?);
            let service = ctx.service().await?;
            match PolicyValidator::validate(
                Some(amount),
                Some(&currency),
                Some(&ceiling),
                &service.snapshot(),
            ) {
                PolicyCheck::Valid => println!("Within policy."),
                PolicyCheck::Invalid { message } => println!("Warning: {}", message),
            }
        }

        Command::SetRate { rates } => {
            let rates = rates
                .iter()
                .map(|assignment| parse_rate_assignment(assignment))
                .collect::<anyhow::Result<BTreeMap<_, _>>>()?;
            let snapshot = ctx
                .engine()
                .override_rates(rates, nosco_common::now())
                .await?;
            print_snapshot(&snapshot, &ctx.store.load_preferences().await?.default_currency);
        }

        Command::Settings {
            auto_refresh,
            interval_days,
            track,
            untrack,
        } => {
            let update = SettingsUpdate {
                auto_refresh_enabled: auto_refresh,
                refresh_interval_days: interval_days,
                track: parse_codes(&track)?,
                untrack: parse_codes(&untrack)?,
            };
            let snapshot = ctx
                .engine()
                .update_settings(update, nosco_common::now())
                .await?;
            print_snapshot(&snapshot, &ctx.store.load_preferences().await?.default_currency);
        }

        Command::DefaultCurrency { currency } => {
            let preferences = AdminPreferences {
                default_currency: Currency::parse(&currency)?,
                updated_at: Some(nosco_common::now()),
            };
            ctx.store.save_preferences(&preferences).await?;
            info!(currency = %preferences.default_currency, "Default currency updated");
        }
    }

    Ok(())
}

/// Parse `CODE=RATE`.
fn parse_rate_assignment(assignment: &str) -> anyhow::Result<(Currency, f64)> {
    let (code, rate) = assignment
        .split_once('=')
        .ok_or_else(|| anyhow!("Expected CODE=RATE, got {:?}", assignment))?;
    let currency = Currency::parse(code)?;
    let rate = rate
        .trim()
        .parse::<f64>()
        .with_context(|| format!("Invalid rate for {}", currency))?;
    Ok((currency, rate))
}

fn parse_codes(codes: &[String]) -> anyhow::Result<Vec<Currency>> {
    codes
        .iter()
        .map(|code| Currency::parse(code).map_err(Into::into))
        .collect()
}

fn print_snapshot(snapshot: &RateSnapshot, default_currency: &Currency) {
    println!("Base currency:     {}", snapshot.base_currency);
    println!("Default currency:  {}", default_currency);
    println!(
        "Auto-refresh:      {} (every {} days)",
        if snapshot.auto_refresh_enabled { "on" } else { "off" },
        snapshot.refresh_interval_days
    );
    match snapshot.last_refreshed_at {
        Some(at) => println!("Last refreshed:    {}", at.to_rfc3339()),
        None => println!("Last refreshed:    never"),
    }
    println!();
    for currency in snapshot.currencies() {
        match snapshot.rate(&currency) {
            Some(rate) => println!("  {}  {:>14.6}", currency, rate),
            None => println!("  {}  {:>14}", currency, "-"),
        }
    }
}

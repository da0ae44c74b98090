//! Nosco Rates CLI
//!
//! Inspect and maintain exchange-rate settings from the command line.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nosco_fx::FxConfig;

mod commands;

/// Nosco exchange-rate CLI
#[derive(Parser, Debug)]
#[command(name = "nosco-rates")]
#[command(about = "Maintain Nosco exchange rates and check expense policies")]
struct Args {
    /// JSON file backing the settings store
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Rate provider endpoint root
    #[arg(long, global = true)]
    provider_url: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print tracked currencies, rates and refresh settings
    Show,

    /// Refresh rates if auto-refresh is on and the interval has elapsed
    Refresh,

    /// Refresh rates now regardless of settings
    ForceRefresh,

    /// Convert an amount between two currencies
    Convert {
        amount: f64,
        from: String,
        to: String,
    },

    /// Format an amount for display
    Format { amount: f64, currency: String },

    /// Check a claimed amount against a category ceiling
    Validate {
        amount: f64,
        currency: String,
        /// Expense category name
        #[arg(long)]
        category: String,
        /// Ceiling amount; 0 means no limit
        #[arg(long)]
        limit: f64,
        /// Currency the ceiling is expressed in
        #[arg(long, default_value = "USD")]
        limit_currency: String,
    },

    /// Manually set rates, e.g. `set-rate GBP=0.79 MYR=4.41`
    SetRate {
        #[arg(required = true)]
        rates: Vec<String>,
    },

    /// Change refresh settings and tracked currencies
    Settings {
        /// Turn automatic refresh on or off
        #[arg(long)]
        auto_refresh: Option<bool>,
        /// Days between automatic refreshes
        #[arg(long)]
        interval_days: Option<u32>,
        /// Start tracking a currency
        #[arg(long)]
        track: Vec<String>,
        /// Stop tracking a currency
        #[arg(long)]
        untrack: Vec<String>,
    },

    /// Set the default display currency
    DefaultCurrency { currency: String },
}

fn init_logging(config: &FxConfig) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone()),
    );
    let registry = tracing_subscriber::registry().with(filter);

    if config.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = FxConfig::from_env();
    if let Some(store) = args.store {
        config.store_path = store;
    }
    if let Some(url) = args.provider_url {
        config.provider.base_url = url;
    }
    config.log_json |= args.json_logs;

    init_logging(&config);

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let ctx = commands::Context::new(config);
    commands::run(&ctx, args.command).await
}

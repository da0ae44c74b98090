//! Display formatting for currency amounts.

use nosco_common::Currency;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::warn;

/// Render `amount` with exactly two fractional digits in en-US style:
/// `$1,234.50`, `-€12.00`, `MYR 1,000.00`.
///
/// Halves round away from zero. Malformed codes and non-finite amounts
/// fall back to `"<amount> <code>"`.
pub fn format_currency(amount: f64, currency: &Currency) -> String {
    match render(amount, currency) {
        Some(text) => text,
        None => {
            warn!(amount, currency = %currency, "Cannot format amount, using plain text");
            format!("{} {}", amount, currency.code())
        }
    }
}

fn render(amount: f64, currency: &Currency) -> Option<String> {
    if !currency.is_well_formed() {
        return None;
    }

    let rounded = Decimal::from_f64(amount)?
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    // Negatives keep their sign even when they round to zero: -0.001 is "-$0.00".
    let sign = if amount.is_sign_negative() { "-" } else { "" };

    let digits = format!("{:.2}", rounded.abs());
    let (whole, fraction) = digits.split_once('.')?;

    let prefix = match currency.symbol() {
        Some(symbol) => symbol.to_string(),
        None => format!("{} ", currency.code()),
    };

    Some(format!("{}{}{}.{}", sign, prefix, group_thousands(whole), fraction))
}

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

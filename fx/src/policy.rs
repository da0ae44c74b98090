//! Expense policy ceilings.
//!
//! Checks are advisory: a failed check produces a message for the caller
//! to show, it never blocks anything by itself.

use nosco_common::Currency;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::conversion::try_convert;
use crate::format::format_currency;
use crate::snapshot::RateSnapshot;

/// Maximum claimable amount for an expense category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyCeiling {
    pub category: String,
    /// Zero means no limit.
    pub ceiling_amount: f64,
    pub ceiling_currency: Currency,
}

impl PolicyCeiling {
    pub fn new(category: impl Into<String>, ceiling_amount: f64, ceiling_currency: Currency) -> Self {
        Self {
            category: category.into(),
            ceiling_amount,
            ceiling_currency,
        }
    }

    /// Whether this ceiling limits anything.
    pub fn is_limited(&self) -> bool {
        self.ceiling_amount.is_finite() && self.ceiling_amount > 0.0
    }
}

/// Outcome of a policy check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyCheck {
    Valid,
    Invalid { message: String },
}

impl PolicyCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, PolicyCheck::Valid)
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            PolicyCheck::Valid => None,
            PolicyCheck::Invalid { message } => Some(message),
        }
    }
}

/// Compares claimed amounts against category ceilings.
pub struct PolicyValidator;

impl PolicyValidator {
    /// Check a claim against `ceiling`.
    ///
    /// Missing inputs, an unlimited ceiling, or a claim that cannot be
    /// converted all count as valid.
    pub fn validate(
        amount: Option<f64>,
        currency: Option<&Currency>,
        ceiling: Option<&PolicyCeiling>,
        snapshot: &RateSnapshot,
    ) -> PolicyCheck {
        let (Some(amount), Some(currency), Some(ceiling)) = (amount, currency, ceiling) else {
            return PolicyCheck::Valid;
        };
        if !ceiling.is_limited() {
            return PolicyCheck::Valid;
        }

        let converted = match try_convert(amount, currency, &ceiling.ceiling_currency, snapshot) {
            Ok(converted) => converted,
            Err(e) => {
                debug!(category = %ceiling.category, error = %e, "Skipping policy check");
                return PolicyCheck::Valid;
            }
        };

        if converted > ceiling.ceiling_amount {
            return PolicyCheck::Invalid {
                message: format!(
                    "{} exceeds the {} policy limit of {}. Please attach a justification or reduce the claimed amount.",
                    format_currency(converted, &ceiling.ceiling_currency),
                    ceiling.category,
                    format_currency(ceiling.ceiling_amount, &ceiling.ceiling_currency),
                ),
            };
        }

        PolicyCheck::Valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> RateSnapshot {
        let mut snapshot = RateSnapshot::default();
        snapshot.track(Currency::gbp());
        snapshot.rates.insert(Currency::gbp(), 0.80);
        snapshot
    }

    fn meals() -> PolicyCeiling {
        PolicyCeiling::new("meals", 100.0, Currency::usd())
    }

    #[test]
    fn test_over_ceiling_is_invalid() {
        let check = PolicyValidator::validate(
            Some(150.0),
            Some(&Currency::usd()),
            Some(&meals()),
            &snapshot(),
        );

        assert!(!check.is_valid());
        let message = check.message().unwrap();
        assert!(message.contains("meals"));
        assert!(message.starts_with("$150.00 exceeds"));
        assert!(message.contains("$100.00"));
    }

    #[test]
    fn test_validation_has_no_side_effects() {
        let snapshot = snapshot();
        let before = snapshot.clone();

        let first = PolicyValidator::validate(Some(150.0), Some(&Currency::usd()), Some(&meals()), &snapshot);
        let second = PolicyValidator::validate(Some(150.0), Some(&Currency::usd()), Some(&meals()), &snapshot);

        assert_eq!(first, second);
        assert_eq!(snapshot, before);
    }

    #[test]
    fn test_converts_before_comparing() {
        // 100 GBP = 125 USD
        let check = PolicyValidator::validate(
            Some(100.0),
            Some(&Currency::gbp()),
            Some(&meals()),
            &snapshot(),
        );
        assert!(!check.is_valid());

        // 75 GBP = 93.75 USD
        let check = PolicyValidator::validate(
            Some(75.0),
            Some(&Currency::gbp()),
            Some(&meals()),
            &snapshot(),
        );
        assert!(check.is_valid());
    }

    #[test]
    fn test_exactly_at_ceiling_is_valid() {
        let check = PolicyValidator::validate(
            Some(100.0),
            Some(&Currency::usd()),
            Some(&meals()),
            &snapshot(),
        );
        assert_eq!(check, PolicyCheck::Valid);
    }

    #[test]
    fn test_zero_ceiling_disables_check() {
        let ceiling = PolicyCeiling::new("travel", 0.0, Currency::usd());
        for amount in [0.0, 1.0, 1.0e12] {
            let check =
                PolicyValidator::validate(Some(amount), Some(&Currency::usd()), Some(&ceiling), &snapshot());
            assert!(check.is_valid());
        }
    }

    #[test]
    fn test_missing_inputs_are_valid() {
        let snapshot = snapshot();
        assert!(PolicyValidator::validate(None, Some(&Currency::usd()), Some(&meals()), &snapshot).is_valid());
        assert!(PolicyValidator::validate(Some(500.0), None, Some(&meals()), &snapshot).is_valid());
        assert!(PolicyValidator::validate(Some(500.0), Some(&Currency::usd()), None, &snapshot).is_valid());
    }

    #[test]
    fn test_unavailable_rate_is_valid() {
        let check = PolicyValidator::validate(
            Some(10_000.0),
            Some(&Currency::new("XYZ")),
            Some(&meals()),
            &snapshot(),
        );
        assert!(check.is_valid());
    }
}

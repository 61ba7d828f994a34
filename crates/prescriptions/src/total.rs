//! Header total versus line sum.

use serde::{Deserialize, Serialize};

use clinicdesk_core::{DomainError, DomainResult};

/// Round a currency amount to whole cents.
pub fn to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// How a mismatch between the declared header total and the line sum is
/// handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TotalPolicy {
    /// Accept the order; the caller logs the mismatch.
    #[default]
    WarnOnly,
    /// Reject the order with a validation error.
    Enforce,
}

/// Outcome of a total comparison that did not reject the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TotalCheck {
    Consistent,
    Mismatch { declared_cents: i64, computed_cents: i64 },
}

impl TotalPolicy {
    pub fn from_enforce_flag(enforce: bool) -> Self {
        if enforce {
            TotalPolicy::Enforce
        } else {
            TotalPolicy::WarnOnly
        }
    }

    /// Compare at cent precision.
    pub fn check(self, declared: f64, computed: f64) -> DomainResult<TotalCheck> {
        let declared_cents = to_cents(declared);
        let computed_cents = to_cents(computed);
        if declared_cents == computed_cents {
            return Ok(TotalCheck::Consistent);
        }
        match self {
            TotalPolicy::WarnOnly => Ok(TotalCheck::Mismatch {
                declared_cents,
                computed_cents,
            }),
            TotalPolicy::Enforce => Err(DomainError::validation(format!(
                "total_amount {declared:.2} does not match line total {computed:.2}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cents_rounding() {
        assert_eq!(to_cents(15.5), 1550);
        assert_eq!(to_cents(0.1 + 0.2), 30);
        assert_eq!(to_cents(8.8), 880);
    }

    #[test]
    fn float_noise_is_consistent() {
        let computed = 0.1 + 0.2;
        assert_eq!(
            TotalPolicy::Enforce.check(0.3, computed).unwrap(),
            TotalCheck::Consistent
        );
    }

    #[test]
    fn warn_only_reports_mismatch() {
        assert_eq!(
            TotalPolicy::WarnOnly.check(10.0, 9.99).unwrap(),
            TotalCheck::Mismatch {
                declared_cents: 1000,
                computed_cents: 999
            }
        );
    }

    #[test]
    fn enforce_rejects_mismatch() {
        assert!(matches!(
            TotalPolicy::Enforce.check(10.0, 9.99),
            Err(DomainError::Validation(_))
        ));
        assert_eq!(TotalPolicy::from_enforce_flag(true), TotalPolicy::Enforce);
        assert_eq!(TotalPolicy::from_enforce_flag(false), TotalPolicy::WarnOnly);
    }
}

//! Order status values and the transition policy.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use clinicdesk_core::{DomainError, DomainResult};

/// Known order status values.
///
/// The stored status column is free text; these are the values the system
/// itself writes and the only ones the forward-only policy accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Draft,
    Completed,
    Printed,
}

impl OrderStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Draft => "draft",
            OrderStatus::Completed => "completed",
            OrderStatus::Printed => "printed",
        }
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "draft" => Ok(OrderStatus::Draft),
            "completed" => Ok(OrderStatus::Completed),
            "printed" => Ok(OrderStatus::Printed),
            other => Err(DomainError::validation(format!("unknown order status: {other:?}"))),
        }
    }
}

/// Whether status updates are validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusPolicy {
    /// Any non-empty status string is accepted.
    #[default]
    Permissive,
    /// Only `draft -> completed -> printed`; staying put is allowed.
    ForwardOnly,
}

impl StatusPolicy {
    /// Whether the current stored status must be read before writing.
    pub fn requires_current(self) -> bool {
        matches!(self, StatusPolicy::ForwardOnly)
    }

    /// Normalize a requested status value.
    pub fn normalize_target(self, raw: &str) -> DomainResult<String> {
        let target = raw.trim();
        if target.is_empty() {
            return Err(DomainError::validation("status cannot be empty"));
        }
        match self {
            StatusPolicy::Permissive => Ok(target.to_string()),
            StatusPolicy::ForwardOnly => Ok(target.parse::<OrderStatus>()?.as_str().to_string()),
        }
    }

    pub fn check_transition(self, current: &str, target: &str) -> DomainResult<()> {
        match self {
            StatusPolicy::Permissive => Ok(()),
            StatusPolicy::ForwardOnly => {
                let from: OrderStatus = current.parse()?;
                let to: OrderStatus = target.parse()?;
                if to < from {
                    return Err(DomainError::validation(format!(
                        "status transition {from} -> {to} is not allowed"
                    )));
                }
                Ok(())
            }
        }
    }
}

impl FromStr for StatusPolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "permissive" => Ok(StatusPolicy::Permissive),
            "forward-only" | "forward_only" => Ok(StatusPolicy::ForwardOnly),
            other => Err(DomainError::validation(format!("unknown status policy: {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permissive_accepts_free_text_but_not_blank() {
        let p = StatusPolicy::Permissive;
        assert_eq!(p.normalize_target(" archived ").unwrap(), "archived");
        assert!(p.normalize_target("  ").is_err());
        assert!(p.check_transition("printed", "draft").is_ok());
        assert!(!p.requires_current());
    }

    #[test]
    fn forward_only_allows_forward_and_stay() {
        let p = StatusPolicy::ForwardOnly;
        assert!(p.check_transition("draft", "completed").is_ok());
        assert!(p.check_transition("completed", "printed").is_ok());
        assert!(p.check_transition("draft", "printed").is_ok());
        assert!(p.check_transition("completed", "completed").is_ok());
    }

    #[test]
    fn forward_only_rejects_backwards_and_unknown() {
        let p = StatusPolicy::ForwardOnly;
        assert!(matches!(
            p.check_transition("printed", "draft"),
            Err(DomainError::Validation(_))
        ));
        assert!(p.normalize_target("archived").is_err());
        assert!(p.check_transition("archived", "draft").is_err());
        assert!(p.requires_current());
    }

    #[test]
    fn policy_parses_config_spellings() {
        assert_eq!("permissive".parse::<StatusPolicy>().unwrap(), StatusPolicy::Permissive);
        assert_eq!("Forward-Only".parse::<StatusPolicy>().unwrap(), StatusPolicy::ForwardOnly);
        assert_eq!("forward_only".parse::<StatusPolicy>().unwrap(), StatusPolicy::ForwardOnly);
        assert!("strict".parse::<StatusPolicy>().is_err());
    }
}

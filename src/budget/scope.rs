//! Budget scope identity and calendar-month keys.

use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};

/// What kind of entity a budget policy/usage row governs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScopeKind {
    Organization,
    Workspace,
    ProviderCredential,
}

impl ScopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::Organization => "ORGANIZATION",
            ScopeKind::Workspace => "WORKSPACE",
            ScopeKind::ProviderCredential => "PROVIDER_CREDENTIAL",
        }
    }
}

impl std::fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of what a policy/usage row applies to. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BudgetScope {
    pub kind: ScopeKind,
    pub id: String,
}

impl BudgetScope {
    pub fn new(kind: ScopeKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn organization(id: impl Into<String>) -> Self {
        Self::new(ScopeKind::Organization, id)
    }

    pub fn workspace(id: impl Into<String>) -> Self {
        Self::new(ScopeKind::Workspace, id)
    }

    pub fn provider_credential(id: impl Into<String>) -> Self {
        Self::new(ScopeKind::ProviderCredential, id)
    }
}

impl std::fmt::Display for BudgetScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// A UTC calendar month.
///
/// [`YearMonth::current_utc`] is the single source of truth for "what month
/// is it" across the budget subsystem. It is always derived from UTC so that
/// exactly one usage row exists per calendar month regardless of the caller's
/// time zone.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Self {
        debug_assert!((1..=12).contains(&month), "month out of range: {month}");
        Self { year, month }
    }

    pub fn current_utc() -> Self {
        let now = Utc::now();
        Self {
            year: now.year(),
            month: now.month(),
        }
    }
}

impl std::fmt::Display for YearMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_display() {
        let scope = BudgetScope::workspace("ws-42");
        assert_eq!(scope.to_string(), "WORKSPACE:ws-42");
        assert_eq!(
            BudgetScope::provider_credential("cred-1").to_string(),
            "PROVIDER_CREDENTIAL:cred-1"
        );
    }

    #[test]
    fn test_scope_equality_is_kind_and_id() {
        assert_eq!(BudgetScope::workspace("a"), BudgetScope::workspace("a"));
        assert_ne!(BudgetScope::workspace("a"), BudgetScope::organization("a"));
    }

    #[test]
    fn test_year_month_formats_with_padding() {
        assert_eq!(YearMonth::new(2026, 8).to_string(), "2026-08");
        assert_eq!(YearMonth::new(2026, 11).to_string(), "2026-11");
    }

    #[test]
    fn test_year_month_ordering() {
        assert!(YearMonth::new(2025, 12) < YearMonth::new(2026, 1));
        assert!(YearMonth::new(2026, 1) < YearMonth::new(2026, 2));
    }

    #[test]
    fn test_current_utc_is_valid() {
        let now = YearMonth::current_utc();
        assert!((1..=12).contains(&now.month));
        assert!(now.year >= 2024);
    }
}

//! Core types for declarative reconciliation

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Free-form item metadata.
///
/// Values are owned strings; a cloned map shares no storage with the map
/// it was cloned from.
pub type Metadata = BTreeMap<String, String>;

/// The domain an item belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    /// Packages installed through a package manager
    Package,
    /// Files deployed into the home directory
    Dotfile,
}

impl Domain {
    /// Every domain, in reconciliation order
    pub const ALL: [Domain; 2] = [Domain::Package, Domain::Dotfile];

    /// Stable lowercase name, also used as the ledger `type`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Package => "package",
            Self::Dotfile => "dotfile",
        }
    }

    /// Parse a domain name as written in the ledger
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "package" => Some(Self::Package),
            "dotfile" => Some(Self::Dotfile),
            _ => None,
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An item the user declared
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigItem {
    pub name: String,
    pub domain: Domain,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager: Option<String>,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl ConfigItem {
    pub fn new(domain: Domain, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            domain,
            manager: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_manager(mut self, manager: impl Into<String>) -> Self {
        self.manager = Some(manager.into());
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// An item observed in the live environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActualItem {
    pub name: String,
    pub domain: Domain,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager: Option<String>,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl ActualItem {
    pub fn new(domain: Domain, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            domain,
            manager: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_manager(mut self, manager: impl Into<String>) -> Self {
        self.manager = Some(manager.into());
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Reconciliation state of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    /// Declared and present
    Managed,
    /// Declared but absent
    Missing,
    /// Present but not declared
    Untracked,
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Managed => "managed",
            Self::Missing => "missing",
            Self::Untracked => "untracked",
        })
    }
}

/// A reconciled item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    pub domain: Domain,
    pub state: ItemState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager: Option<String>,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
    /// Managed, but the live copy differs from the declared one
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub drifted: bool,
}

impl Item {
    /// `manager:name` for packages, the bare name otherwise
    pub fn qualified_name(&self) -> String {
        match &self.manager {
            Some(manager) => format!("{manager}:{}", self.name),
            None => self.name.clone(),
        }
    }
}

/// Reconciliation output for one domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainResult {
    pub domain: Domain,
    pub managed: Vec<Item>,
    pub missing: Vec<Item>,
    pub untracked: Vec<Item>,
}

impl DomainResult {
    pub fn empty(domain: Domain) -> Self {
        Self {
            domain,
            managed: Vec::new(),
            missing: Vec::new(),
            untracked: Vec::new(),
        }
    }

    /// Managed items whose live copy differs from the declared one
    pub fn drifted(&self) -> impl Iterator<Item = &Item> {
        self.managed.iter().filter(|i| i.drifted)
    }

    pub fn is_converged(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn total(&self) -> usize {
        self.managed.len() + self.missing.len() + self.untracked.len()
    }
}

/// What happened when an item was handed to its provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum OutcomeStatus {
    /// The corrective action succeeded
    Applied,
    /// The corrective action failed
    Failed { error: String },
    /// The item was not changed (dry run, cancellation)
    Skipped { reason: String },
}

/// Outcome for a single Missing item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub domain: Domain,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager: Option<String>,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

impl ItemOutcome {
    pub fn new(item: &Item, status: OutcomeStatus) -> Self {
        Self {
            domain: item.domain,
            name: item.name.clone(),
            manager: item.manager.clone(),
            status,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self.status, OutcomeStatus::Applied)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, OutcomeStatus::Failed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, OutcomeStatus::Skipped { .. })
    }
}

/// Aggregated result of the apply phase
///
/// `success` and `changed` are independent: an already converged
/// environment is `success = true, changed = false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyResult {
    pub success: bool,
    pub changed: bool,
    pub outcomes: Vec<ItemOutcome>,
    /// Provider-level and per-item error messages
    pub errors: Vec<String>,
}

impl Default for ApplyResult {
    fn default() -> Self {
        Self {
            success: true,
            changed: false,
            outcomes: Vec::new(),
            errors: Vec::new(),
        }
    }
}

impl ApplyResult {
    /// Build the result from per-item outcomes plus provider-level errors
    ///
    /// A failed outcome's error already names its item and is carried over
    /// as is.
    pub fn from_outcomes(outcomes: Vec<ItemOutcome>, mut errors: Vec<String>) -> Self {
        for outcome in &outcomes {
            if let OutcomeStatus::Failed { error } = &outcome.status {
                errors.push(error.clone());
            }
        }
        let success = !outcomes.iter().any(ItemOutcome::is_failed);
        let changed = outcomes.iter().any(ItemOutcome::is_applied);
        Self {
            success,
            changed,
            outcomes,
            errors,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_applied()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failed()).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_skipped()).count()
    }

    /// Process exit code derived from this result alone
    pub fn exit_code(&self) -> i32 {
        if self.success { 0 } else { 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn missing(name: &str) -> Item {
        Item {
            name: name.to_string(),
            domain: Domain::Package,
            state: ItemState::Missing,
            manager: Some("brew".to_string()),
            metadata: Metadata::new(),
            drifted: false,
        }
    }

    #[test]
    fn test_empty_apply_result_is_success_without_change() {
        let result = ApplyResult::from_outcomes(Vec::new(), Vec::new());
        assert!(result.success);
        assert!(!result.changed);
        assert_eq!(result.exit_code(), 0);
    }

    #[test]
    fn test_success_and_changed_are_independent() {
        let outcomes = vec![
            ItemOutcome::new(&missing("a"), OutcomeStatus::Applied),
            ItemOutcome::new(
                &missing("b"),
                OutcomeStatus::Failed {
                    error: "failed to apply package brew:b: boom".into(),
                },
            ),
        ];
        let result = ApplyResult::from_outcomes(outcomes, Vec::new());
        assert!(!result.success);
        assert!(result.changed);
        assert_eq!(result.succeeded(), 1);
        assert_eq!(result.failed(), 1);
        assert_eq!(
            result.errors,
            vec!["failed to apply package brew:b: boom".to_string()]
        );
        assert_eq!(result.exit_code(), 1);
    }

    #[test]
    fn test_skipped_only_is_not_a_change() {
        let outcomes = vec![ItemOutcome::new(
            &missing("a"),
            OutcomeStatus::Skipped {
                reason: "dry run".into(),
            },
        )];
        let result = ApplyResult::from_outcomes(outcomes, Vec::new());
        assert!(result.success);
        assert!(!result.changed);
        assert_eq!(result.skipped(), 1);
    }

    #[test]
    fn test_qualified_name() {
        let mut item = missing("jq");
        assert_eq!(item.qualified_name(), "brew:jq");
        item.manager = None;
        assert_eq!(item.qualified_name(), "jq");
    }

    #[test]
    fn test_domain_round_trip_names() {
        for domain in Domain::ALL {
            assert_eq!(Domain::parse(domain.as_str()), Some(domain));
        }
        assert_eq!(Domain::parse("service"), None);
    }
}

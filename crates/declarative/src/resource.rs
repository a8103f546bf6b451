//! Provider trait for declarative state management
//!
//! A Provider owns one [`Domain`]: it knows what the user declared, what
//! currently exists, and how to correct a single missing item.

use crate::context::Env;
use crate::types::{ActualItem, ConfigItem, Domain, Item};
use anyhow::Result;

/// Core trait every domain implements
///
/// Optional capabilities are exposed through probe methods returning
/// `Option<&dyn ...>`; callers must handle `None`.
///
/// # Example
///
/// ```ignore
/// use declarative::{ActualItem, ConfigItem, Domain, Env, Item, Provider};
///
/// struct Fixed;
///
/// impl Provider for Fixed {
///     fn domain(&self) -> Domain { Domain::Package }
///
///     fn configured(&self, _env: &Env) -> anyhow::Result<Vec<ConfigItem>> {
///         Ok(vec![ConfigItem::new(Domain::Package, "jq").with_manager("brew")])
///     }
///
///     fn actual(&self, _env: &Env) -> anyhow::Result<Vec<ActualItem>> {
///         Ok(Vec::new())
///     }
///
///     fn apply(&self, _env: &Env, item: &Item, dry_run: bool) -> anyhow::Result<()> {
///         if !dry_run {
///             println!("installing {}", item.name);
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Provider: Send + Sync {
    /// The domain this provider answers for
    fn domain(&self) -> Domain;

    /// Items the user declared
    ///
    /// An error here means the provider is unavailable; only this
    /// domain's reconciliation is abandoned.
    fn configured(&self, env: &Env) -> Result<Vec<ConfigItem>>;

    /// Items observed in the live environment
    fn actual(&self, env: &Env) -> Result<Vec<ActualItem>>;

    /// Perform the corrective action for one Missing item
    ///
    /// With `dry_run` the provider must not mutate anything, but may still
    /// return a validation error (e.g. an unknown manager).
    fn apply(&self, env: &Env, item: &Item, dry_run: bool) -> Result<()>;

    /// Drift detection for Managed items, if the domain supports it
    fn drift_comparator(&self) -> Option<&dyn DriftComparator> {
        None
    }

    /// Health reporting, if the domain supports it
    fn health(&self) -> Option<&dyn HealthCheck> {
        None
    }
}

/// Decides whether a Managed item's live copy differs from the declared one
pub trait DriftComparator {
    /// Compare the item using its merged metadata
    fn is_drifted(&self, item: &Item) -> Result<bool>;
}

/// Severity of a health finding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Ok,
    Warning,
    Error,
}

/// A single health finding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub name: String,
    pub status: HealthStatus,
    pub detail: String,
    /// Suggested fix, if any
    pub fix: Option<String>,
}

impl HealthReport {
    pub fn ok(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Ok,
            detail: detail.into(),
            fix: None,
        }
    }

    pub fn warning(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Warning,
            detail: detail.into(),
            fix: None,
        }
    }

    pub fn error(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Error,
            detail: detail.into(),
            fix: None,
        }
    }

    pub fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.fix = Some(fix.into());
        self
    }
}

/// Reports whether a provider can operate
pub trait HealthCheck {
    fn check(&self, env: &Env) -> Vec<HealthReport>;
}

/// A boxed provider for type-erased storage
pub type BoxedProvider = Box<dyn Provider>;

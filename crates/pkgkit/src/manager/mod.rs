//! Package-manager abstraction.
//!
//! The [`PackageManager`] trait is the mandatory contract every manager
//! fulfils. Everything else a manager may or may not support is exposed
//! through capability probes returning `Option<&dyn Trait>`, so callers
//! never assume an operation exists.

pub mod builtin;
pub mod command;

use crate::error::Result;
use crate::types::{InstalledPackage, PackageInfo};
use declarative::{Env, HealthReport};

/// Mandatory contract for a package manager.
pub trait PackageManager: Send + Sync {
    /// Canonical manager name (e.g. `brew`, `npm`).
    fn name(&self) -> &str;

    /// Whether the manager can be used in this environment.
    fn is_available(&self, env: &Env) -> Result<bool>;

    /// List installed packages, with versions when the manager reports them.
    fn list_packages(&self, env: &Env) -> Result<Vec<InstalledPackage>>;

    /// List installed package names.
    fn list_installed(&self, env: &Env) -> Result<Vec<String>> {
        Ok(self
            .list_packages(env)?
            .into_iter()
            .map(|p| p.name)
            .collect())
    }

    /// Install a package. Installing an installed package succeeds.
    fn install(&self, env: &Env, name: &str) -> Result<()>;

    /// Uninstall a package. Removing an absent package succeeds.
    fn uninstall(&self, env: &Env, name: &str) -> Result<()>;

    /// Search capability, if supported.
    fn searcher(&self) -> Option<&dyn Search> {
        None
    }

    /// Package info capability, if supported.
    fn info_provider(&self) -> Option<&dyn Info> {
        None
    }

    /// Upgrade capability, if supported.
    fn upgrader(&self) -> Option<&dyn Upgrade> {
        None
    }

    /// Health check capability, if supported.
    fn health_checker(&self) -> Option<&dyn CheckHealth> {
        None
    }

    /// Self-install capability, if supported.
    fn self_installer(&self) -> Option<&dyn SelfInstall> {
        None
    }
}

/// Search the manager's registry.
pub trait Search {
    /// Names matching `query`.
    fn search(&self, env: &Env, query: &str) -> Result<Vec<String>>;
}

/// Describe a single package.
pub trait Info {
    /// Details for `name`.
    fn info(&self, env: &Env, name: &str) -> Result<PackageInfo>;
}

/// Upgrade installed packages.
pub trait Upgrade {
    /// Upgrade `names`, or everything when `names` is empty.
    fn upgrade(&self, env: &Env, names: &[String]) -> Result<()>;
}

/// Report whether the manager is usable.
pub trait CheckHealth {
    /// Findings about the manager's installation.
    fn check_health(&self, env: &Env) -> HealthReport;
}

/// Install the manager itself.
pub trait SelfInstall {
    /// Install the manager if it is missing.
    fn self_install(&self, env: &Env) -> Result<()>;
}

/// A boxed manager for type-erased storage.
pub type BoxedManager = Box<dyn PackageManager>;

//! Package provider over the package-manager registry

use anyhow::{Context, Result, anyhow};
use declarative::{
    ActualItem, ConfigItem, Domain, Env, HealthCheck, HealthReport, HealthStatus, Item, Provider,
};
use pkgkit::{ManagerRegistry, PackageManager};
use std::collections::BTreeSet;

use crate::config::PackageSpec;

/// Declared packages reconciled against every registered manager
///
/// Managers with configured packages must be able to list; a listing
/// failure there makes the whole domain unavailable. Managers nobody
/// configured only contribute untracked packages, so their failures are
/// logged and skipped.
pub struct PackageProvider {
    packages: Vec<PackageSpec>,
    registry: ManagerRegistry,
}

impl PackageProvider {
    pub fn new(packages: Vec<PackageSpec>, registry: ManagerRegistry) -> Self {
        Self { packages, registry }
    }

    fn configured_managers(&self) -> BTreeSet<&str> {
        self.packages.iter().map(|p| p.manager.as_str()).collect()
    }

    fn list(&self, env: &Env, manager: &dyn PackageManager, used: bool) -> Result<Vec<ActualItem>> {
        let name = manager.name();
        if !manager.is_available(env)? {
            if used {
                log::warn!("{name} is not installed; its packages are reported missing");
            } else {
                log::debug!("{name} is not installed, skipping");
            }
            return Ok(Vec::new());
        }

        let packages = manager.list_packages(env)?;
        log::debug!("{name}: {} installed", packages.len());
        Ok(packages
            .into_iter()
            .map(|pkg| {
                let item = ActualItem::new(Domain::Package, pkg.name).with_manager(name);
                match pkg.version {
                    Some(version) => item.with_meta("version", version),
                    None => item,
                }
            })
            .collect())
    }
}

impl Provider for PackageProvider {
    fn domain(&self) -> Domain {
        Domain::Package
    }

    fn configured(&self, _env: &Env) -> Result<Vec<ConfigItem>> {
        Ok(self
            .packages
            .iter()
            .map(|p| ConfigItem::new(Domain::Package, &p.name).with_manager(&p.manager))
            .collect())
    }

    fn actual(&self, env: &Env) -> Result<Vec<ActualItem>> {
        let used = self.configured_managers();
        let mut actual = Vec::new();

        for manager in self.registry.iter() {
            let name = manager.name();
            let is_used = used.contains(name);
            match self.list(env, manager, is_used) {
                Ok(items) => actual.extend(items),
                Err(e) if env.cancel.is_cancelled() => return Err(e),
                Err(e) if is_used => {
                    return Err(e.context(format!("listing {name} packages")));
                }
                Err(e) => log::warn!("skipping {name}: {e:#}"),
            }
        }

        Ok(actual)
    }

    fn apply(&self, env: &Env, item: &Item, dry_run: bool) -> Result<()> {
        let manager_name = item
            .manager
            .as_deref()
            .ok_or_else(|| anyhow!("package {} has no manager", item.name))?;
        let manager = self
            .registry
            .get(manager_name)
            .ok_or_else(|| anyhow!("unknown package manager `{manager_name}`"))?;

        if dry_run {
            log::debug!("would install {} with {}", item.name, manager.name());
            return Ok(());
        }

        manager
            .install(env, &item.name)
            .with_context(|| format!("installing {}", item.qualified_name()))
    }

    fn health(&self) -> Option<&dyn HealthCheck> {
        Some(self)
    }
}

impl HealthCheck for PackageProvider {
    fn check(&self, env: &Env) -> Vec<HealthReport> {
        let used = self.configured_managers();
        self.registry
            .iter()
            .map(|manager| {
                let Some(checker) = manager.health_checker() else {
                    return HealthReport::warning(manager.name(), "no health check available");
                };
                let mut report = checker.check_health(env);
                // A missing manager only matters when packages depend on it
                if report.status == HealthStatus::Error && !used.contains(manager.name()) {
                    report.status = HealthStatus::Warning;
                }
                report
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{ItemState, ScriptedRunner, reconcile};
    use std::sync::Arc;

    fn spec(manager: &str, name: &str) -> PackageSpec {
        PackageSpec {
            manager: manager.to_string(),
            name: name.to_string(),
        }
    }

    fn env_with(runner: ScriptedRunner) -> (Env, Arc<ScriptedRunner>) {
        let runner = Arc::new(runner);
        let env = Env::new("/home/test", "/home/test/.config/driftless").with_runner(runner.clone());
        (env, runner)
    }

    fn provider(packages: Vec<PackageSpec>) -> PackageProvider {
        PackageProvider::new(packages, ManagerRegistry::builtin())
    }

    #[test]
    fn test_configured_items_carry_manager() {
        let (env, _) = env_with(ScriptedRunner::new());
        let items = provider(vec![spec("brew", "jq"), spec("npm", "prettier")])
            .configured(&env)
            .unwrap();
        assert_eq!(items[0].manager.as_deref(), Some("brew"));
        assert_eq!(items[1].name, "prettier");
    }

    #[test]
    fn test_reconcile_against_brew_listing() {
        let (env, _) = env_with(
            ScriptedRunner::new()
                .with_program("brew")
                .on("brew list --formula --versions", 0, "tree 2.1.1\nhtop 3.3.0\n", ""),
        );
        let p = provider(vec![spec("brew", "jq"), spec("brew", "tree")]);
        let result = reconcile(
            Domain::Package,
            &p.configured(&env).unwrap(),
            &p.actual(&env).unwrap(),
        );

        let names = |items: &[Item]| items.iter().map(|i| i.name.clone()).collect::<Vec<_>>();
        assert_eq!(names(&result.managed), vec!["tree"]);
        assert_eq!(names(&result.missing), vec!["jq"]);
        assert_eq!(names(&result.untracked), vec!["htop"]);
        assert_eq!(result.managed[0].metadata.get("version").map(String::as_str), Some("2.1.1"));
    }

    #[test]
    fn test_missing_manager_reports_packages_missing() {
        let (env, runner) = env_with(ScriptedRunner::new());
        let p = provider(vec![spec("npm", "prettier")]);
        assert!(p.actual(&env).unwrap().is_empty());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_listing_failure_for_used_manager_is_an_error() {
        let (env, _) = env_with(
            ScriptedRunner::new()
                .with_program("brew")
                .on("brew list --formula --versions", 1, "", "Error: boom"),
        );
        let err = provider(vec![spec("brew", "jq")]).actual(&env).unwrap_err();
        assert!(format!("{err:#}").contains("listing brew packages"));
    }

    #[test]
    fn test_listing_failure_for_unused_manager_is_skipped() {
        let (env, _) = env_with(
            ScriptedRunner::new()
                .with_program("gem")
                .on("gem list --local", 1, "", "Error: boom"),
        );
        assert!(provider(vec![spec("brew", "jq")]).actual(&env).unwrap().is_empty());
    }

    #[test]
    fn test_apply_installs_with_item_manager() {
        let (env, runner) = env_with(
            ScriptedRunner::new()
                .with_program("npm")
                .on("npm install -g prettier", 0, "added 1 package", ""),
        );
        let item = Item {
            name: "prettier".into(),
            domain: Domain::Package,
            state: ItemState::Missing,
            manager: Some("npm".into()),
            metadata: Default::default(),
            drifted: false,
        };
        provider(Vec::new()).apply(&env, &item, false).unwrap();
        assert_eq!(runner.calls(), vec!["npm install -g prettier"]);
    }

    #[test]
    fn test_dry_run_validates_manager_without_running() {
        let (env, runner) = env_with(ScriptedRunner::new().with_program("brew"));
        let mut item = Item {
            name: "jq".into(),
            domain: Domain::Package,
            state: ItemState::Missing,
            manager: Some("homebrew".into()),
            metadata: Default::default(),
            drifted: false,
        };
        let p = provider(Vec::new());
        p.apply(&env, &item, true).unwrap();
        assert!(runner.calls().is_empty());

        item.manager = Some("apt".into());
        assert!(p.apply(&env, &item, true).is_err());
    }

    #[test]
    fn test_health_downgrades_unused_missing_managers() {
        let (env, _) = env_with(ScriptedRunner::new());
        let reports = provider(vec![spec("cargo", "ripgrep")]).check(&env);
        let status = |name: &str| reports.iter().find(|r| r.name == name).map(|r| r.status);
        assert_eq!(status("cargo"), Some(HealthStatus::Error));
        assert_eq!(status("brew"), Some(HealthStatus::Warning));
    }
}

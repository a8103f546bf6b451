//! `driftless upgrade`: bring recorded packages to their latest versions
//!
//! Only packages in the lock file are upgraded unless `--all` is given,
//! in which case every package of the managers driftless uses is.

use anyhow::{Result, bail};
use declarative::{Domain, Env, LockFile, OutcomeStatus, canonical_manager};
use pkgkit::{ErrorCategory, InstalledPackage, ManagerRegistry};
use std::collections::{BTreeMap, BTreeSet};

use crate::Context;
use crate::cli::UpgradeArgs;
use crate::commands::packages::{self, Target};
use crate::commands::Session;
use crate::config::PackageSpec;
use crate::ui;

/// Packages to upgrade per manager; an empty list means everything the
/// manager has installed
pub type Plan = BTreeMap<String, Vec<String>>;

/// What happened to one manager's share of the plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upgraded {
    pub manager: String,
    pub names: Vec<String>,
    pub status: OutcomeStatus,
}

impl Upgraded {
    fn label(&self) -> String {
        if self.names.is_empty() {
            format!("{} (everything)", self.manager)
        } else {
            format!("{}: {}", self.manager, self.names.join(", "))
        }
    }
}

/// Resolve command-line targets against the lock file
///
/// A bare argument naming a manager selects every package recorded for it.
pub fn plan(
    lock: &LockFile,
    declared: &[PackageSpec],
    registry: &ManagerRegistry,
    targets: &[String],
    all: bool,
) -> Result<Plan> {
    let recorded = lock.legacy_packages();
    if all {
        let managers: BTreeSet<String> = recorded
            .keys()
            .cloned()
            .chain(declared.iter().map(|p| p.manager.clone()))
            .collect();
        return Ok(managers.into_iter().map(|m| (m, Vec::new())).collect());
    }
    if targets.is_empty() {
        return Ok(recorded);
    }

    let mut picked: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for arg in targets {
        let target = Target::parse(arg)?;
        if target.manager.is_none() && registry.contains(&target.name) {
            let manager = canonical_manager(&target.name);
            let Some(names) = recorded.get(&manager) else {
                bail!("no {manager} packages are recorded in the lock file");
            };
            picked.entry(manager).or_default().extend(names.iter().cloned());
            continue;
        }
        let matches = packages::recorded(lock, &target);
        if matches.is_empty() {
            bail!("{arg} is not recorded in the lock file; only packages driftless installed are upgraded");
        }
        for (manager, name) in matches {
            picked.entry(manager).or_default().insert(name);
        }
    }
    Ok(picked
        .into_iter()
        .map(|(manager, names)| (manager, names.into_iter().collect()))
        .collect())
}

/// Run the plan manager by manager; a failing manager does not stop the rest
pub fn execute(
    registry: &ManagerRegistry,
    env: &Env,
    plan: &Plan,
    dry_run: bool,
) -> Result<Vec<Upgraded>> {
    let mut results = Vec::new();
    for (manager, names) in plan {
        if env.cancel.is_cancelled() {
            return Err(declarative::Error::Cancelled.into());
        }
        let m = packages::manager(registry, manager)?;
        let status = match m.upgrader() {
            None => OutcomeStatus::Skipped {
                reason: "upgrade is unsupported".to_string(),
            },
            Some(_) if dry_run => OutcomeStatus::Skipped {
                reason: "dry run".to_string(),
            },
            Some(upgrader) => match upgrader.upgrade(env, names) {
                Ok(()) => OutcomeStatus::Applied,
                Err(_) if env.cancel.is_cancelled() => {
                    return Err(declarative::Error::Cancelled.into());
                }
                Err(e) if e.category() == ErrorCategory::Unsupported => OutcomeStatus::Skipped {
                    reason: e.to_string(),
                },
                Err(e) => OutcomeStatus::Failed {
                    error: e.to_string(),
                },
            },
        };
        results.push(Upgraded {
            manager: manager.clone(),
            names: names.clone(),
            status,
        });
    }
    Ok(results)
}

/// Copy new versions into recorded entries; returns how many changed
pub fn refresh_versions(lock: &mut LockFile, manager: &str, installed: &[InstalledPackage]) -> usize {
    let versions: BTreeMap<&str, &str> = installed
        .iter()
        .filter_map(|p| p.version.as_deref().map(|v| (p.name.as_str(), v)))
        .collect();
    let mut changed = 0;
    for entry in lock.resources.iter_mut().filter(|e| e.kind == Domain::Package) {
        let Some((entry_manager, name)) = entry.package_parts() else {
            continue;
        };
        if entry_manager != manager {
            continue;
        }
        let Some(version) = versions.get(name.as_str()) else {
            continue;
        };
        if entry.version.as_deref() != Some(*version) {
            entry.version = Some((*version).to_string());
            entry.metadata.insert("version".to_string(), (*version).to_string());
            changed += 1;
        }
    }
    changed
}

fn print(result: &Upgraded) {
    let label = result.label();
    match &result.status {
        OutcomeStatus::Applied => ui::success(&label),
        OutcomeStatus::Failed { error } => ui::error(&format!("{label}: {error}")),
        OutcomeStatus::Skipped { reason } => ui::pending(&format!("{label} ({reason})")),
    }
}

/// Upgrade and record the new versions; exit code 1 when a manager failed
pub fn run(ctx: &Context, args: &UpgradeArgs) -> Result<i32> {
    let session = Session::open(ctx)?;
    let store = session.lock_store();
    let mut lock = store.load()?;
    let registry = ManagerRegistry::builtin();

    let plan = plan(
        &lock,
        &session.config.package_specs(),
        &registry,
        &args.targets,
        args.all,
    )?;
    if plan.is_empty() {
        ui::info("Nothing recorded to upgrade");
        return Ok(0);
    }
    if args.dry_run && !ctx.quiet {
        ui::info("Dry run: nothing will be changed");
    }

    let results = execute(&registry, &session.env, &plan, args.dry_run)?;
    for result in &results {
        print(result);
    }

    let mut changed = 0;
    for result in results.iter().filter(|r| r.status == OutcomeStatus::Applied) {
        let Some(m) = registry.get(&result.manager) else {
            continue;
        };
        match m.list_packages(&session.env) {
            Ok(installed) => changed += refresh_versions(&mut lock, &result.manager, &installed),
            Err(e) => log::warn!("could not read new {} versions: {e}", result.manager),
        }
    }
    if changed > 0 {
        store.save(&lock)?;
        ui::dim(&format!(
            "lock file updated: {} ({})",
            session.display(store.path()),
            ui::plural(changed, "version")
        ));
    }

    let count = |f: fn(&OutcomeStatus) -> bool| results.iter().filter(|r| f(&r.status)).count();
    let failed = count(|s| matches!(s, OutcomeStatus::Failed { .. }));
    println!();
    let line = ui::summary(
        count(|s| *s == OutcomeStatus::Applied),
        failed,
        count(|s| matches!(s, OutcomeStatus::Skipped { .. })),
    );
    if failed > 0 { ui::error(&line) } else { ui::success(&line) }
    Ok(i32::from(failed > 0))
}

use anyhow::Result;
use declarative::{Env, LockFile};
use pkgkit::{ErrorCategory, ManagerRegistry, PackageInfo, PackageManager};

use crate::Context;
use crate::cli::InfoArgs;
use crate::commands::packages::{self, Target};
use crate::commands::Session;
use crate::config::PackageSpec;
use crate::ui;

/// How driftless relates to a package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Management {
    Recorded,
    Declared,
    Unmanaged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Details {
    pub manager: String,
    pub info: PackageInfo,
    pub management: Management,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(Details),
    /// The named manager has no info command
    Unsupported(String),
    NotFound,
}

fn management(lock: &LockFile, declared: &[PackageSpec], manager: &str, name: &str) -> Management {
    let target = Target {
        manager: Some(manager.to_string()),
        name: name.to_string(),
    };
    if !packages::recorded(lock, &target).is_empty() {
        Management::Recorded
    } else if declared.iter().any(|p| p.manager == manager && p.name == name) {
        Management::Declared
    } else {
        Management::Unmanaged
    }
}

/// Ask the named manager, or else the managers that already know the
/// package first and then the rest of the registry.
pub fn lookup(
    registry: &ManagerRegistry,
    env: &Env,
    lock: &LockFile,
    declared: &[PackageSpec],
    target: &Target,
) -> Result<Lookup> {
    let candidates: Vec<&dyn PackageManager> = match &target.manager {
        Some(name) => {
            let m = packages::manager(registry, name)?;
            if m.info_provider().is_none() {
                return Ok(Lookup::Unsupported(m.name().to_string()));
            }
            vec![m]
        }
        None => {
            let mut preferred: Vec<String> = packages::recorded(lock, target)
                .into_iter()
                .map(|(manager, _)| manager)
                .collect();
            preferred.extend(
                declared
                    .iter()
                    .filter(|p| p.name == target.name)
                    .map(|p| p.manager.clone()),
            );
            let mut ordered: Vec<&dyn PackageManager> =
                preferred.iter().filter_map(|m| registry.get(m)).collect();
            ordered.extend(registry.iter());
            let mut seen = std::collections::BTreeSet::new();
            ordered.retain(|m| seen.insert(m.name().to_string()));
            ordered
        }
    };

    for m in candidates {
        let Some(provider) = m.info_provider() else {
            continue;
        };
        if !m.is_available(env)? {
            log::debug!("info: {} is not installed", m.name());
            continue;
        }
        match provider.info(env, &target.name) {
            Ok(info) => {
                return Ok(Lookup::Found(Details {
                    management: management(lock, declared, m.name(), &target.name),
                    manager: m.name().to_string(),
                    info,
                }));
            }
            Err(e) if e.category() == ErrorCategory::NotFound => {
                log::debug!("info: {e}");
            }
            Err(e) if target.manager.is_some() => return Err(e.into()),
            Err(e) => log::warn!("{}: {e}", m.name()),
        }
    }
    Ok(Lookup::NotFound)
}

/// Print package details; exit code 1 when nothing was found
pub fn run(ctx: &Context, args: &InfoArgs) -> Result<i32> {
    let session = Session::open(ctx)?;
    let target = Target::parse(&args.package)?;
    let lock = session.lock_store().load()?;
    let declared = session.config.package_specs();

    match lookup(&ManagerRegistry::builtin(), &session.env, &lock, &declared, &target)? {
        Lookup::Found(details) => {
            let info = &details.info;
            ui::header(&info.name);
            ui::kv("manager", &details.manager);
            if let Some(version) = &info.version {
                ui::kv("version", version);
            }
            if let Some(description) = &info.description {
                ui::kv("description", description);
            }
            if let Some(homepage) = &info.homepage {
                ui::kv("homepage", homepage);
            }
            let status = match details.management {
                Management::Recorded => "installed by driftless",
                Management::Declared => "declared, not applied yet",
                Management::Unmanaged => "not managed",
            };
            ui::kv("status", status);
            Ok(0)
        }
        Lookup::Unsupported(manager) => {
            ui::warn(&format!("{manager}: info is unsupported"));
            Ok(1)
        }
        Lookup::NotFound => {
            ui::error(&format!("No package manager knows {}", args.package));
            Ok(1)
        }
    }
}

use anyhow::Result;
use declarative::{Domain, Env, LockFile, OutcomeStatus};
use pkgkit::ManagerRegistry;

use crate::Context;
use crate::cli::UninstallArgs;
use crate::commands::packages::{self, Target};
use crate::commands::Session;
use crate::config::PackageSpec;
use crate::ui;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    /// `manager:name`, or the argument as typed when it could not be resolved
    pub id: String,
    pub status: OutcomeStatus,
    /// Still listed in driftless.yaml, so the next apply reinstalls it
    pub declared: bool,
}

fn failed(id: impl Into<String>, error: impl Into<String>) -> Removal {
    Removal {
        id: id.into(),
        status: OutcomeStatus::Failed {
            error: error.into(),
        },
        declared: false,
    }
}

/// Resolve a target to `(manager, name)`, preferring what the lock file
/// recorded
fn resolve(lock: &LockFile, target: &Target) -> std::result::Result<(String, String), String> {
    let matches = packages::recorded(lock, target);
    match (matches.as_slice(), &target.manager) {
        ([only], _) => Ok(only.clone()),
        ([], Some(manager)) => Ok((manager.clone(), target.name.clone())),
        ([], None) => Err(format!(
            "not recorded in the lock file; name the manager as manager:{}",
            target.name
        )),
        (many, _) => {
            let ids: Vec<_> = many.iter().map(|(m, n)| Target::id(m, n)).collect();
            Err(format!("recorded more than once ({}), pick one", ids.join(", ")))
        }
    }
}

/// Uninstall each target and drop its ledger entry; one failure does not
/// stop the rest
pub fn uninstall(
    registry: &ManagerRegistry,
    env: &Env,
    lock: &mut LockFile,
    declared: &[PackageSpec],
    args: &[String],
    dry_run: bool,
) -> Result<Vec<Removal>> {
    let mut removals = Vec::new();
    for arg in args {
        if env.cancel.is_cancelled() {
            return Err(declarative::Error::Cancelled.into());
        }
        let target = match Target::parse(arg) {
            Ok(target) => target,
            Err(e) => {
                removals.push(failed(arg.as_str(), e.to_string()));
                continue;
            }
        };
        let (manager, name) = match resolve(lock, &target) {
            Ok(resolved) => resolved,
            Err(reason) => {
                removals.push(failed(arg.as_str(), reason));
                continue;
            }
        };
        let id = Target::id(&manager, &name);
        let Some(m) = registry.get(&manager) else {
            removals.push(failed(id, format!("unknown package manager `{manager}`")));
            continue;
        };

        let status = if dry_run {
            OutcomeStatus::Skipped {
                reason: "dry run".to_string(),
            }
        } else {
            match m.uninstall(env, &name) {
                Ok(()) => {
                    if lock.remove(Domain::Package, &id).is_none() {
                        log::info!("{id} was not recorded in the lock file");
                    }
                    OutcomeStatus::Applied
                }
                Err(_) if env.cancel.is_cancelled() => {
                    return Err(declarative::Error::Cancelled.into());
                }
                Err(e) => OutcomeStatus::Failed {
                    error: e.to_string(),
                },
            }
        };
        removals.push(Removal {
            declared: declared.iter().any(|p| p.manager == manager && p.name == name),
            id,
            status,
        });
    }
    Ok(removals)
}

/// Uninstall packages; exit code 1 when any removal failed
pub fn run(ctx: &Context, args: &UninstallArgs) -> Result<i32> {
    let session = Session::open(ctx)?;
    let store = session.lock_store();
    let mut lock = store.load()?;
    let before = lock.resources.len();

    if args.dry_run && !ctx.quiet {
        ui::info("Dry run: nothing will be changed");
    }
    let removals = uninstall(
        &ManagerRegistry::builtin(),
        &session.env,
        &mut lock,
        &session.config.package_specs(),
        &args.packages,
        args.dry_run,
    )?;

    for removal in &removals {
        match &removal.status {
            OutcomeStatus::Applied => ui::success(&format!("removed {}", removal.id)),
            OutcomeStatus::Failed { error } => ui::error(&format!("{}: {error}", removal.id)),
            OutcomeStatus::Skipped { reason } => {
                ui::pending(&format!("{} ({reason})", removal.id));
            }
        }
        if removal.declared && !matches!(removal.status, OutcomeStatus::Failed { .. }) {
            ui::warn(&format!(
                "{} is still declared in driftless.yaml; the next apply reinstalls it",
                removal.id
            ));
        }
    }

    if lock.resources.len() != before {
        store.save(&lock)?;
        ui::dim(&format!("lock file updated: {}", session.display(store.path())));
    }

    let failures = removals
        .iter()
        .filter(|r| matches!(r.status, OutcomeStatus::Failed { .. }))
        .count();
    Ok(i32::from(failures > 0))
}

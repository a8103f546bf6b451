use anyhow::Result;
use colored::Colorize;
use declarative::{Env, HealthReport, HealthStatus, OutcomeStatus};
use pkgkit::ManagerRegistry;
use std::collections::BTreeSet;

use crate::Context;
use crate::cli::DoctorArgs;
use crate::commands::Session;
use crate::config::Config;
use crate::ui;

fn print_report(report: &HealthReport) {
    let line = format!("{}: {}", report.name.bold(), report.detail);
    match report.status {
        HealthStatus::Ok => ui::success(&line),
        HealthStatus::Warning => ui::warn(&line),
        HealthStatus::Error => println!("{} {}", "✗".red(), line),
    }
    if let Some(fix) = &report.fix
        && report.status != HealthStatus::Ok
    {
        println!("    {} {}", "$".dimmed(), fix.bold());
    }
}

fn config_reports(session: &Session) -> Vec<HealthReport> {
    let mut reports = Vec::new();

    let path = Config::path(&session.env.config_dir);
    reports.push(if path.is_file() {
        HealthReport::ok("config", session.display(&path))
    } else {
        HealthReport::warning("config", format!("{} not found, using defaults", session.display(&path)))
    });

    let store = session.lock_store();
    reports.push(match store.load() {
        Ok(lock) if lock.was_migrated() => HealthReport::warning(
            "lock",
            format!("{} uses the v1 layout", session.display(store.path())),
        )
        .with_fix("driftless lock migrate"),
        Ok(lock) => HealthReport::ok(
            "lock",
            format!("{} resource(s) recorded", lock.resources.len()),
        ),
        Err(e) => HealthReport::error("lock", e.to_string()).with_fix(e.advice()),
    });

    reports
}

/// Install each missing manager that knows how to install itself
pub fn install_missing_managers(
    registry: &ManagerRegistry,
    env: &Env,
    managers: &BTreeSet<String>,
) -> Result<Vec<(String, OutcomeStatus)>> {
    let mut results = Vec::new();
    for name in managers {
        let Some(manager) = registry.get(name) else {
            continue;
        };
        if manager.is_available(env)? {
            continue;
        }
        if env.cancel.is_cancelled() {
            return Err(declarative::Error::Cancelled.into());
        }
        let status = match manager.self_installer() {
            None => OutcomeStatus::Skipped {
                reason: "self-install is unsupported".to_string(),
            },
            Some(installer) => match installer.self_install(env) {
                Ok(()) => OutcomeStatus::Applied,
                Err(e) => OutcomeStatus::Failed {
                    error: e.to_string(),
                },
            },
        };
        results.push((name.clone(), status));
    }
    Ok(results)
}

fn fix(session: &Session) -> Result<usize> {
    let managers: BTreeSet<String> = session
        .config
        .package_specs()
        .into_iter()
        .map(|p| p.manager)
        .collect();
    let results = install_missing_managers(&ManagerRegistry::builtin(), &session.env, &managers)?;

    println!();
    if results.is_empty() {
        ui::success("Every configured package manager is installed");
        return Ok(0);
    }
    let mut failures = 0;
    for (manager, status) in &results {
        match status {
            OutcomeStatus::Applied => ui::success(&format!("installed {manager}")),
            OutcomeStatus::Failed { error } => {
                failures += 1;
                ui::error(&format!("{manager}: {error}"));
            }
            OutcomeStatus::Skipped { reason } => ui::warn(&format!("{manager}: {reason}")),
        }
    }
    Ok(failures)
}

/// Run every health check; exit code 1 when any check errors
///
/// With `--fix`, missing managers are installed afterwards and the exit
/// code reflects whether that worked.
pub fn run(ctx: &Context, args: &DoctorArgs) -> Result<i32> {
    let session = Session::open(ctx)?;
    let orchestrator = session.orchestrator()?;

    ui::header("Health Check");

    let mut reports = config_reports(&session);
    for domain in declarative::Domain::ALL {
        if let Some(check) = orchestrator.provider(domain).and_then(|p| p.health()) {
            reports.extend(check.check(&session.env));
        }
    }

    for report in &reports {
        print_report(report);
    }

    let errors = reports.iter().filter(|r| r.status == HealthStatus::Error).count();
    let warnings = reports.iter().filter(|r| r.status == HealthStatus::Warning).count();
    println!();
    if errors == 0 && warnings == 0 {
        ui::success("All checks passed");
    } else {
        let line = format!(
            "{}, {}",
            ui::plural(errors, "error"),
            ui::plural(warnings, "warning")
        );
        if errors > 0 { ui::error(&line) } else { ui::warn(&line) }
    }

    if args.fix {
        let failures = fix(&session)?;
        return Ok(i32::from(failures > 0));
    }
    Ok(i32::from(errors > 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::ScriptedRunner;
    use std::sync::Arc;

    fn env_with(runner: ScriptedRunner) -> (Env, Arc<ScriptedRunner>) {
        let runner = Arc::new(runner);
        let env = Env::new("/home/test", "/home/test/.config/driftless").with_runner(runner.clone());
        (env, runner)
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_installs_only_missing_managers() {
        let (env, runner) = env_with(
            ScriptedRunner::new()
                .with_program("brew")
                .on("brew install pipx", 0, "", ""),
        );
        let results =
            install_missing_managers(&ManagerRegistry::builtin(), &env, &set(&["brew", "pipx"]))
                .unwrap();
        assert_eq!(results, vec![("pipx".to_string(), OutcomeStatus::Applied)]);
        assert_eq!(runner.calls(), vec!["brew install pipx"]);
    }

    #[test]
    fn test_failed_self_install_is_reported() {
        let (env, _) = env_with(
            ScriptedRunner::new()
                .with_program("brew")
                .on("brew install node", 1, "", "Error: permission denied"),
        );
        let results =
            install_missing_managers(&ManagerRegistry::builtin(), &env, &set(&["npm"])).unwrap();
        assert_eq!(results[0].0, "npm");
        assert!(matches!(results[0].1, OutcomeStatus::Failed { .. }));
    }
}

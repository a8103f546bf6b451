//! `driftless search`: query package registries
//!
//! Works without a `driftless.yaml`; it only talks to the managers.

use anyhow::Result;
use declarative::Env;
use pkgkit::{ManagerRegistry, PackageManager};

use crate::Context;
use crate::cli::SearchArgs;
use crate::commands::{self, packages};
use crate::ui;

/// What one manager answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hits {
    Found(Vec<String>),
    Unsupported,
    Unavailable,
    Failed(String),
}

/// Search `manager`, or every manager that is installed and can search
pub fn search(
    registry: &ManagerRegistry,
    env: &Env,
    query: &str,
    manager: Option<&str>,
) -> Result<Vec<(String, Hits)>> {
    let managers: Vec<&dyn PackageManager> = match manager {
        Some(name) => vec![packages::manager(registry, name)?],
        None => registry.iter().collect(),
    };

    let mut results = Vec::new();
    for m in managers {
        if env.cancel.is_cancelled() {
            return Err(declarative::Error::Cancelled.into());
        }
        let hits = match m.searcher() {
            None => Hits::Unsupported,
            Some(_) if !m.is_available(env)? => Hits::Unavailable,
            Some(searcher) => match searcher.search(env, query) {
                Ok(names) => Hits::Found(names),
                Err(e) => Hits::Failed(e.to_string()),
            },
        };
        if manager.is_none() && matches!(hits, Hits::Unsupported | Hits::Unavailable) {
            log::debug!("search: skipping {} ({hits:?})", m.name());
            continue;
        }
        results.push((m.name().to_string(), hits));
    }
    Ok(results)
}

pub fn run(ctx: &Context, args: &SearchArgs) -> Result<()> {
    let env = commands::env(ctx)?;
    let registry = ManagerRegistry::builtin();
    let results = search(&registry, &env, &args.query, args.manager.as_deref())?;

    if results.is_empty() {
        ui::warn("No installed package manager supports search");
        return Ok(());
    }
    for (manager, hits) in &results {
        match hits {
            Hits::Found(names) if names.is_empty() => {
                ui::pending(&format!("{manager}: no matches for {}", args.query));
            }
            Hits::Found(names) => {
                ui::section(&format!("{manager} ({})", names.len()));
                for name in names {
                    println!("  {name}");
                }
            }
            Hits::Unsupported => ui::warn(&format!("{manager}: search is unsupported")),
            Hits::Unavailable => ui::warn(&format!("{manager}: not installed")),
            Hits::Failed(error) => ui::error(&format!("{manager}: {error}")),
        }
    }
    Ok(())
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

    #[test]
    fn test_searches_installed_managers_only() {
        let (env, runner) = env_with(
            ScriptedRunner::new()
                .with_program("brew")
                .with_program("gem")
                .with_program("pipx")
                .on("brew search jq", 0, "==> Formulae\njq\njql\n", "")
                .on("gem search jq", 0, "", ""),
        );
        let results = search(&ManagerRegistry::builtin(), &env, "jq", None).unwrap();
        assert_eq!(
            results,
            vec![
                ("brew".to_string(), Hits::Found(vec!["jq".into(), "jql".into()])),
                ("gem".to_string(), Hits::Found(Vec::new())),
            ]
        );
        assert_eq!(runner.calls(), vec!["brew search jq", "gem search jq"]);
    }

    #[test]
    fn test_named_manager_reports_unsupported() {
        let (env, runner) = env_with(ScriptedRunner::new().with_program("pipx"));
        let results = search(&ManagerRegistry::builtin(), &env, "black", Some("pipx")).unwrap();
        assert_eq!(results, vec![("pipx".to_string(), Hits::Unsupported)]);
        assert!(runner.calls().is_empty());

        let results = search(&ManagerRegistry::builtin(), &env, "jq", Some("homebrew")).unwrap();
        assert_eq!(results, vec![("brew".to_string(), Hits::Unavailable)]);
    }

    #[test]
    fn test_unknown_manager_is_an_error() {
        let (env, _) = env_with(ScriptedRunner::new());
        assert!(search(&ManagerRegistry::builtin(), &env, "jq", Some("apt")).is_err());
    }
}

use anyhow::{Context as _, Result, bail};
use colored::Colorize;
use declarative::{Domain, Item, RunOptions};
use similar::TextDiff;
use std::collections::BTreeSet;
use std::fs;

use crate::Context;
use crate::cli::DiffArgs;
use crate::commands::Session;
use crate::resource::dotfile::item_paths;
use crate::ui;

/// Unified diff from the declared source to the live target
///
/// `None` when the contents are equal; a one-line note for binary files.
pub fn unified(item: &Item, source_label: &str, target_label: &str) -> Result<Option<String>> {
    let (source, target) = item_paths(item)?;
    let old = fs::read(&source).with_context(|| format!("Failed to read {}", source.display()))?;
    let new = fs::read(&target).with_context(|| format!("Failed to read {}", target.display()))?;
    if old == new {
        return Ok(None);
    }

    let (Ok(old), Ok(new)) = (std::str::from_utf8(&old), std::str::from_utf8(&new)) else {
        return Ok(Some(format!("Binary files {source_label} and {target_label} differ\n")));
    };

    let diff = TextDiff::from_lines(old, new);
    Ok(Some(
        diff.unified_diff()
            .context_radius(3)
            .header(source_label, target_label)
            .to_string(),
    ))
}

fn print_colored(diff: &str) {
    for line in diff.lines() {
        if line.starts_with("+++") || line.starts_with("---") {
            println!("{}", line.bold());
        } else if line.starts_with("@@") {
            println!("{}", line.cyan());
        } else if line.starts_with('+') {
            println!("{}", line.green());
        } else if line.starts_with('-') {
            println!("{}", line.red());
        } else {
            println!("{line}");
        }
    }
}

pub fn run(ctx: &Context, args: &DiffArgs) -> Result<()> {
    let session = Session::open(ctx)?;
    let orchestrator = session.orchestrator()?;
    let options = RunOptions {
        dry_run: true,
        domains: Some(BTreeSet::from([Domain::Dotfile])),
    };
    let report = orchestrator.status(&options);
    if let Some(reason) = report.domain_errors.get(&Domain::Dotfile) {
        bail!("dotfiles unavailable: {reason}");
    }
    let Some(result) = report.results.get(&Domain::Dotfile) else {
        return Ok(());
    };

    let selected: Vec<&Item> = match &args.name {
        Some(name) => {
            let wanted = name.trim_start_matches("~/");
            if let Some(item) = result.managed.iter().find(|i| i.name == wanted) {
                vec![item]
            } else if result.missing.iter().any(|i| i.name == wanted) {
                ui::info(&format!("{wanted} is not deployed yet; `driftless apply` will create it"));
                return Ok(());
            } else {
                bail!("{wanted} is not a managed dotfile");
            }
        }
        None => result.drifted().collect(),
    };

    let mut shown = 0;
    for item in selected {
        let (source, target) = item_paths(item)?;
        let diff = unified(item, &session.display(&source), &session.display(&target))?;
        match diff {
            Some(diff) => {
                shown += 1;
                print_colored(&diff);
            }
            None if args.name.is_some() => ui::success(&format!("{} matches its source", item.name)),
            None => {}
        }
    }

    if shown == 0 && args.name.is_none() && !ctx.quiet {
        ui::success("No drifted dotfiles");
    }
    Ok(())
}

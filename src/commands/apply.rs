use anyhow::Result;
use declarative::{ErrorKind, RunOptions, RunReport};

use crate::Context;
use crate::cli::ApplyArgs;
use crate::commands::Session;
use crate::progress::ApplyProgress;
use crate::resource;
use crate::ui;

/// Apply missing items; returns the process exit code
pub fn run(ctx: &Context, args: &ApplyArgs) -> Result<i32> {
    let session = Session::open(ctx)?;
    let orchestrator = session.orchestrator()?;
    let options = RunOptions {
        dry_run: args.dry_run,
        domains: resource::domain_filter(args.domains.packages, args.domains.dotfiles),
    };

    if args.dry_run && !ctx.quiet {
        ui::info("Dry run: nothing will be changed");
    }

    let mut progress = ApplyProgress::new(ctx.quiet);
    let report = orchestrator.run(&options, &mut progress)?;

    print_report(ctx, &session, &report);
    Ok(report.apply.exit_code())
}

fn print_report(ctx: &Context, session: &Session, report: &RunReport) {
    for (domain, reason) in &report.status.domain_errors {
        ui::error(&format!("{domain}: {reason}"));
    }
    if ctx.quiet {
        return;
    }

    let drifted: Vec<_> = report
        .status
        .results
        .values()
        .flat_map(|r| r.drifted())
        .collect();
    if !drifted.is_empty() {
        println!();
        for item in &drifted {
            ui::warn(&format!("{} differs from its source", item.qualified_name()));
        }
        ui::dim("Run `driftless diff` to see the changes");
    }

    let apply = &report.apply;
    println!();
    if apply.outcomes.is_empty() && apply.errors.is_empty() {
        ui::success("Everything is in sync");
        return;
    }

    let line = ui::summary(apply.succeeded(), apply.failed(), apply.skipped());
    if !apply.success {
        ui::error(&line);
        ui::dim(ErrorKind::ItemApplyFailed.advice());
    } else if !report.status.domain_errors.is_empty() {
        ui::warn(&format!("{line} (some domains were unavailable)"));
    } else if report.dry_run {
        ui::info(&format!("Would apply {}", ui::plural(apply.skipped(), "item")));
    } else {
        ui::success(&line);
    }

    if report.lock_saved {
        ui::dim(&format!(
            "lock file updated: {}",
            session.display(session.lock_store().path())
        ));
    }
}

use anyhow::{Context as _, Result};
use colored::Colorize;
use declarative::{Domain, DomainResult, Item, ItemState, RunOptions, StatusReport};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::Context;
use crate::cli::StatusArgs;
use crate::commands::Session;
use crate::resource;
use crate::ui;

/// Which buckets to list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Show {
    All,
    Missing,
    Untracked,
}

impl Show {
    fn from_args(args: &StatusArgs) -> Self {
        if args.missing {
            Self::Missing
        } else if args.untracked {
            Self::Untracked
        } else {
            Self::All
        }
    }
}

#[derive(Debug, Serialize)]
struct DomainView<'a> {
    converged: bool,
    drifted: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    managed: Option<&'a [Item]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    missing: Option<&'a [Item]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    untracked: Option<&'a [Item]>,
}

#[derive(Debug, Serialize)]
struct StatusView<'a> {
    domains: BTreeMap<Domain, DomainView<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<&'a BTreeMap<Domain, String>>,
}

fn pick(show: Show, bucket: ItemState, items: &[Item]) -> Option<&[Item]> {
    let wanted = match show {
        Show::All => true,
        Show::Missing => bucket == ItemState::Missing,
        Show::Untracked => bucket == ItemState::Untracked,
    };
    wanted.then_some(items)
}

fn view(report: &StatusReport, show: Show) -> StatusView<'_> {
    let domains = report
        .results
        .iter()
        .map(|(domain, result)| {
            (
                *domain,
                DomainView {
                    converged: result.is_converged(),
                    drifted: result.drifted().count(),
                    managed: pick(show, ItemState::Managed, &result.managed),
                    missing: pick(show, ItemState::Missing, &result.missing),
                    untracked: pick(show, ItemState::Untracked, &result.untracked),
                },
            )
        })
        .collect();
    StatusView {
        domains,
        errors: (!report.domain_errors.is_empty()).then_some(&report.domain_errors),
    }
}

pub fn run(ctx: &Context, args: &StatusArgs) -> Result<()> {
    let session = Session::open(ctx)?;
    let orchestrator = session.orchestrator()?;
    let options = RunOptions {
        dry_run: true,
        domains: resource::domain_filter(args.domains.packages, args.domains.dotfiles),
    };
    let report = orchestrator.status(&options);
    let show = Show::from_args(args);

    if args.json {
        let json = serde_json::to_string_pretty(&view(&report, show))
            .context("Failed to serialize status")?;
        println!("{json}");
        return Ok(());
    }

    ui::header("Environment Status");
    for (domain, result) in &report.results {
        print_domain(*domain, result, show);
    }
    for (domain, reason) in &report.domain_errors {
        ui::section(title(*domain));
        ui::error(&format!("unavailable: {reason}"));
    }

    println!();
    let missing = report.missing_count();
    if missing == 0 && report.domain_errors.is_empty() {
        ui::success("Everything is in sync");
    } else if missing > 0 {
        ui::info(&format!(
            "{} missing; run `driftless apply` to fix",
            ui::plural(missing, "item")
        ));
    }
    Ok(())
}

fn title(domain: Domain) -> &'static str {
    match domain {
        Domain::Package => "Packages",
        Domain::Dotfile => "Dotfiles",
    }
}

fn print_domain(domain: Domain, result: &DomainResult, show: Show) {
    ui::section(&format!(
        "{} ({} managed, {} missing, {} untracked)",
        title(domain),
        result.managed.len(),
        result.missing.len(),
        result.untracked.len()
    ));

    if show == Show::All {
        for item in &result.managed {
            if item.drifted {
                ui::warn(&format!("{} {}", item.qualified_name(), "(drifted)".yellow()));
            } else {
                ui::success(&item.qualified_name());
            }
        }
    }
    if matches!(show, Show::All | Show::Missing) {
        for item in &result.missing {
            ui::pending(&format!("{} {}", item.qualified_name(), "(missing)".red()));
        }
    }
    if matches!(show, Show::All | Show::Untracked) {
        for item in &result.untracked {
            ui::dim(&format!("? {}", item.qualified_name()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{ActualItem, ConfigItem, reconcile};

    fn report() -> StatusReport {
        let configured = [
            ConfigItem::new(Domain::Package, "jq").with_manager("brew"),
            ConfigItem::new(Domain::Package, "tree").with_manager("brew"),
        ];
        let actual = [
            ActualItem::new(Domain::Package, "tree").with_manager("brew"),
            ActualItem::new(Domain::Package, "htop").with_manager("brew"),
        ];
        let mut report = StatusReport::default();
        report
            .results
            .insert(Domain::Package, reconcile(Domain::Package, &configured, &actual));
        report
            .domain_errors
            .insert(Domain::Dotfile, "permission denied".to_string());
        report
    }

    #[test]
    fn test_json_lists_all_buckets() {
        let report = report();
        let json = serde_json::to_value(view(&report, Show::All)).unwrap();
        let packages = &json["domains"]["package"];
        assert_eq!(packages["converged"], false);
        assert_eq!(packages["managed"][0]["name"], "tree");
        assert_eq!(packages["missing"][0]["name"], "jq");
        assert_eq!(packages["untracked"][0]["name"], "htop");
        assert_eq!(json["errors"]["dotfile"], "permission denied");
    }

    #[test]
    fn test_json_filter_keeps_one_bucket() {
        let report = report();
        let json = serde_json::to_value(view(&report, Show::Missing)).unwrap();
        let packages = &json["domains"]["package"];
        assert!(packages.get("managed").is_none());
        assert!(packages.get("untracked").is_none());
        assert_eq!(packages["missing"][0]["manager"], "brew");
    }
}

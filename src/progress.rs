//! Progress display for apply runs

use declarative::{Domain, Item, ItemOutcome, OutcomeStatus, ProgressCallback};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::ui;

const TICK_STRINGS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner} [{pos}/{len}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(TICK_STRINGS);
    pb.set_style(style);
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn domain_title(domain: Domain) -> &'static str {
    match domain {
        Domain::Package => "Packages",
        Domain::Dotfile => "Dotfiles",
    }
}

/// Spinner while an item is applied, one line per finished item
pub struct ApplyProgress {
    bar: Option<ProgressBar>,
    quiet: bool,
}

impl ApplyProgress {
    pub fn new(quiet: bool) -> Self {
        Self { bar: None, quiet }
    }

    fn print(&self, f: impl FnOnce()) {
        if self.quiet {
            return;
        }
        match &self.bar {
            Some(bar) => bar.suspend(f),
            None => f(),
        }
    }
}

impl ProgressCallback for ApplyProgress {
    fn on_domain_start(&mut self, domain: Domain, count: usize) {
        if self.quiet {
            return;
        }
        ui::section(&format!("{} ({} missing)", domain_title(domain), count));
        let bar = spinner();
        bar.set_length(count as u64);
        self.bar = Some(bar);
    }

    fn on_item_start(&mut self, item: &Item) {
        if let Some(bar) = &self.bar {
            bar.set_message(item.qualified_name());
        }
    }

    fn on_item_complete(&mut self, outcome: &ItemOutcome) {
        let name = match &outcome.manager {
            Some(manager) => format!("{manager}:{}", outcome.name),
            None => outcome.name.clone(),
        };
        match &outcome.status {
            OutcomeStatus::Applied => self.print(|| ui::success(&name)),
            // Failures are reported even with --quiet; the error names the item
            OutcomeStatus::Failed { error } => match &self.bar {
                Some(bar) => bar.suspend(|| ui::error(error)),
                None => ui::error(error),
            },
            OutcomeStatus::Skipped { reason } => {
                self.print(|| ui::pending(&format!("{name} ({reason})")));
            }
        }
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
    }

    fn on_domain_complete(&mut self, _domain: Domain) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

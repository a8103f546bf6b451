//! Apply state machine
//!
//! `Init -> PreHook -> Reconcile -> (Report | Apply) -> PostHook -> Finalize`
//!
//! Reconciliation for every selected domain finishes before any item is
//! applied, and the ledger is written once, after the last apply and before
//! the post-apply hooks.

use crate::context::{Env, ProgressCallback};
use crate::error::{Error, Result};
use crate::hooks::{HookPhase, HookRunner, Hooks};
use crate::lock::{LockEntry, LockFile, LockStore};
use crate::reconcile::reconcile_with;
use crate::resource::{BoxedProvider, Provider};
use crate::types::{ApplyResult, Domain, DomainResult, ItemOutcome, OutcomeStatus};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// States of a run, logged as they are entered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    PreHook,
    Reconcile,
    Report,
    Apply,
    PostHook,
    Finalize,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Init => "init",
            Self::PreHook => "pre-hook",
            Self::Reconcile => "reconcile",
            Self::Report => "report",
            Self::Apply => "apply",
            Self::PostHook => "post-hook",
            Self::Finalize => "finalize",
        })
    }
}

/// Options for a single run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Report what would change without mutating anything
    pub dry_run: bool,
    /// Restrict the run to these domains; `None` selects all
    pub domains: Option<BTreeSet<Domain>>,
}

impl RunOptions {
    pub fn selects(&self, domain: Domain) -> bool {
        self.domains.as_ref().is_none_or(|d| d.contains(&domain))
    }
}

/// Reconciliation of every selected domain
#[derive(Debug, Clone, Default)]
pub struct StatusReport {
    pub results: BTreeMap<Domain, DomainResult>,
    /// Domains whose provider could not answer, with the reason
    pub domain_errors: BTreeMap<Domain, String>,
}

impl StatusReport {
    pub fn missing_count(&self) -> usize {
        self.results.values().map(|r| r.missing.len()).sum()
    }
}

/// Everything a finished run produced
#[derive(Debug, Clone)]
pub struct RunReport {
    pub status: StatusReport,
    pub apply: ApplyResult,
    /// Whether the ledger was written
    pub lock_saved: bool,
    pub dry_run: bool,
}

/// Drives providers, the reconciler, the ledger and hooks through one run
pub struct Orchestrator<'a> {
    env: &'a Env,
    providers: BTreeMap<Domain, BoxedProvider>,
    lock: LockStore,
    hooks: Hooks,
}

impl<'a> Orchestrator<'a> {
    pub fn new(env: &'a Env, lock: LockStore) -> Self {
        Self {
            env,
            providers: BTreeMap::new(),
            lock,
            hooks: Hooks::default(),
        }
    }

    /// Register the provider for its domain, replacing any earlier one
    pub fn with_provider(mut self, provider: BoxedProvider) -> Self {
        self.providers.insert(provider.domain(), provider);
        self
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn provider(&self, domain: Domain) -> Option<&dyn Provider> {
        self.providers.get(&domain).map(Box::as_ref)
    }

    pub fn lock_store(&self) -> &LockStore {
        &self.lock
    }

    /// Reconcile the selected domains without hooks or mutation
    pub fn status(&self, options: &RunOptions) -> StatusReport {
        let mut report = StatusReport::default();
        for (domain, provider) in &self.providers {
            if !options.selects(*domain) {
                log::debug!("{domain}: not selected");
                continue;
            }
            match Self::reconcile_domain(self.env, provider.as_ref()) {
                Ok(result) => {
                    report.results.insert(*domain, result);
                }
                Err(e) => {
                    log::warn!("{e}");
                    report.domain_errors.insert(*domain, e.to_string());
                }
            }
        }
        report
    }

    fn reconcile_domain(env: &Env, provider: &dyn Provider) -> Result<DomainResult> {
        let domain = provider.domain();
        let unavailable = |e: anyhow::Error| Error::ProviderUnavailable {
            domain,
            reason: format!("{e:#}"),
        };
        let configured = provider.configured(env).map_err(unavailable)?;
        let actual = provider.actual(env).map_err(unavailable)?;
        Ok(reconcile_with(
            domain,
            &configured,
            &actual,
            provider.drift_comparator(),
        ))
    }

    /// Execute a full run
    ///
    /// Per-item failures are part of the returned report; an `Err` means the
    /// run itself failed (ledger, hooks, cancellation).
    pub fn run(
        &self,
        options: &RunOptions,
        progress: &mut dyn ProgressCallback,
    ) -> Result<RunReport> {
        let runner = HookRunner::new(self.env);

        log::debug!("phase {}", Phase::Init);
        let mut ledger = self.lock.load()?;

        log::debug!("phase {}", Phase::PreHook);
        runner.run_phase(
            HookPhase::PreApply,
            self.hooks.for_phase(HookPhase::PreApply),
            options.dry_run,
        )?;

        log::debug!("phase {}", Phase::Reconcile);
        let status = self.status(options);
        if self.env.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let (outcomes, cancelled) = if status.missing_count() == 0 {
            log::debug!("nothing missing, skipping apply");
            (Vec::new(), false)
        } else {
            log::debug!(
                "phase {}",
                if options.dry_run {
                    Phase::Report
                } else {
                    Phase::Apply
                }
            );
            self.apply_missing(&status, options.dry_run, &mut ledger, progress)
        };

        let applied = outcomes.iter().any(ItemOutcome::is_applied);
        let lock_saved = !options.dry_run && (applied || ledger.was_migrated());
        if lock_saved {
            self.lock.save(&ledger)?;
            if ledger.was_migrated() {
                log::info!("ledger {} written as v2", self.lock.path().display());
            }
        }

        if cancelled {
            log::info!(
                "cancelled after {} applied item(s)",
                outcomes.iter().filter(|o| o.is_applied()).count()
            );
            return Err(Error::Cancelled);
        }

        log::debug!("phase {}", Phase::PostHook);
        runner.run_phase(
            HookPhase::PostApply,
            self.hooks.for_phase(HookPhase::PostApply),
            options.dry_run,
        )?;

        log::debug!("phase {}", Phase::Finalize);
        let errors = status
            .domain_errors
            .values()
            .cloned()
            .collect::<Vec<_>>();
        Ok(RunReport {
            apply: ApplyResult::from_outcomes(outcomes, errors),
            status,
            lock_saved,
            dry_run: options.dry_run,
        })
    }

    /// Apply every Missing item, returning outcomes and whether the run was
    /// cancelled part way.
    fn apply_missing(
        &self,
        status: &StatusReport,
        dry_run: bool,
        ledger: &mut LockFile,
        progress: &mut dyn ProgressCallback,
    ) -> (Vec<ItemOutcome>, bool) {
        let mut outcomes = Vec::new();
        let mut cancelled = false;

        for (domain, result) in &status.results {
            let Some(provider) = self.providers.get(domain) else {
                continue;
            };
            if result.missing.is_empty() {
                continue;
            }
            progress.on_domain_start(*domain, result.missing.len());

            for item in &result.missing {
                if cancelled || self.env.cancel.is_cancelled() {
                    cancelled = true;
                    let outcome = ItemOutcome::new(
                        item,
                        OutcomeStatus::Skipped {
                            reason: "cancelled".to_string(),
                        },
                    );
                    progress.on_item_complete(&outcome);
                    outcomes.push(outcome);
                    continue;
                }

                progress.on_item_start(item);
                let item_status = match provider.apply(self.env, item, dry_run) {
                    Ok(()) if dry_run => OutcomeStatus::Skipped {
                        reason: "dry run".to_string(),
                    },
                    Ok(()) => {
                        ledger.record(LockEntry::from_item(item));
                        OutcomeStatus::Applied
                    }
                    Err(_) if self.env.cancel.is_cancelled() => {
                        cancelled = true;
                        OutcomeStatus::Skipped {
                            reason: "cancelled".to_string(),
                        }
                    }
                    Err(e) => {
                        let err = Error::ItemApplyFailed {
                            domain: *domain,
                            item: item.qualified_name(),
                            reason: format!("{e:#}"),
                        };
                        log::debug!("{err}");
                        OutcomeStatus::Failed {
                            error: err.to_string(),
                        }
                    }
                };
                let outcome = ItemOutcome::new(item, item_status);
                progress.on_item_complete(&outcome);
                outcomes.push(outcome);
            }

            progress.on_domain_complete(*domain);
        }

        (outcomes, cancelled)
    }
}

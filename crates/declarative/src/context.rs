//! Run environment and progress traits
//!
//! Everything a provider needs from the outside world arrives through
//! [`Env`]; there is no global state.

use crate::process::{CommandRunner, SystemRunner};
use crate::types::{Domain, Item, ItemOutcome};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared cancellation flag
///
/// Clones observe the same flag. Set from a signal handler or a deadline
/// and checked by the orchestrator before each item and by the process
/// runner while a command is in flight.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Explicit environment passed into every provider call
#[derive(Clone)]
pub struct Env {
    /// Home directory dotfiles deploy into
    pub home_dir: PathBuf,
    /// Directory holding driftless.yaml, driftless.lock and dotfile sources
    pub config_dir: PathBuf,
    /// Executes external commands
    pub runner: Arc<dyn CommandRunner>,
    /// Cancellation shared by the whole run
    pub cancel: CancelToken,
}

impl Env {
    /// Create an environment backed by real processes
    pub fn new(home_dir: impl Into<PathBuf>, config_dir: impl Into<PathBuf>) -> Self {
        Self {
            home_dir: home_dir.into(),
            config_dir: config_dir.into(),
            runner: Arc::new(SystemRunner),
            cancel: CancelToken::new(),
        }
    }

    /// Replace the command runner
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Replace the cancellation token
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl std::fmt::Debug for Env {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Env")
            .field("home_dir", &self.home_dir)
            .field("config_dir", &self.config_dir)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Progress callback for the apply phase
///
/// Implement this trait to receive progress updates during a run.
pub trait ProgressCallback: Send {
    /// Called before a domain's missing items are applied
    fn on_domain_start(&mut self, domain: Domain, count: usize);

    /// Called when starting to apply a single item
    fn on_item_start(&mut self, item: &Item);

    /// Called when an item's application completes
    fn on_item_complete(&mut self, outcome: &ItemOutcome);

    /// Called when a domain's apply phase completes
    fn on_domain_complete(&mut self, domain: Domain);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_domain_start(&mut self, _domain: Domain, _count: usize) {}
    fn on_item_start(&mut self, _item: &Item) {}
    fn on_item_complete(&mut self, _outcome: &ItemOutcome) {}
    fn on_domain_complete(&mut self, _domain: Domain) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}

//! # Declarative
//!
//! Drift detection and correction for a user's environment.
//!
//! This crate computes the difference between what a user declared and
//! what actually exists, applies corrective actions, and records what it
//! created in a versioned ledger.
//!
//! ## Core Concepts
//!
//! - **Provider**: One domain's view of desired and live state plus a
//!   single-item corrective action
//! - **Reconciler**: Splits items into Managed, Missing and Untracked
//! - **LockStore**: Loads, migrates and atomically persists the ledger
//! - **HookRunner**: Runs pre/post apply shell commands under a timeout
//! - **Orchestrator**: The apply state machine tying the above together
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{Env, LockStore, NoProgress, Orchestrator, RunOptions};
//!
//! let env = Env::new(home, config_dir);
//! let report = Orchestrator::new(&env, LockStore::new(&env.config_dir))
//!     .with_provider(Box::new(my_provider))
//!     .run(&RunOptions::default(), &mut NoProgress)?;
//!
//! std::process::exit(report.apply.exit_code());
//! ```
//!
//! ## Seams
//!
//! - [`CommandRunner`]: executes external commands; swap in a scripted
//!   runner for tests
//! - [`DriftComparator`] / [`HealthCheck`]: optional provider capabilities
//! - [`ProgressCallback`]: receives apply progress

pub mod context;
pub mod error;
pub mod hooks;
pub mod lock;
pub mod names;
pub mod orchestrator;
pub mod process;
pub mod reconcile;
pub mod resource;
pub mod types;

pub use context::{CancelToken, Env, NoProgress, ProgressCallback};
pub use error::{Error, ErrorKind, Result};
pub use hooks::{Hook, HookConfig, HookPhase, HookRunner, Hooks, parse_duration};
pub use lock::{LOCK_FILE_NAME, LockEntry, LockFile, LockStore};
pub use names::canonical_manager;
pub use orchestrator::{Orchestrator, Phase, RunOptions, RunReport, StatusReport};
pub use process::{
    CommandOutput, CommandRunner, CommandSpec, ExecError, ScriptedRunner, SystemRunner,
};
pub use reconcile::{merge_metadata, reconcile, reconcile_with};
pub use resource::{
    BoxedProvider, DriftComparator, HealthCheck, HealthReport, HealthStatus, Provider,
};
pub use types::{
    ActualItem, ApplyResult, ConfigItem, Domain, DomainResult, Item, ItemOutcome, ItemState,
    Metadata, OutcomeStatus,
};

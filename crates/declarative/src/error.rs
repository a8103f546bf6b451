//! Error taxonomy for reconciliation runs.
//!
//! Only ledger, hook, config and cancellation errors abort a run. Provider
//! and per-item failures are captured into the run result instead; the
//! variants for them exist so callers can report those failures with the
//! same advice machinery.

use crate::types::Domain;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Coarse classification of [`Error`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A provider could not answer for its domain
    ProviderUnavailable,
    /// A single item's corrective action failed
    ItemApplyFailed,
    /// The ledger could not be parsed
    LockCorrupt,
    /// A hook exceeded its timeout
    HookTimeout,
    /// A hook exited unsuccessfully
    HookFailure,
    /// Configuration is invalid
    ConfigInvalid,
    /// The run was interrupted
    Cancelled,
    /// Filesystem error
    Io,
}

impl ErrorKind {
    /// Get actionable advice for resolving this kind of error.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::ProviderUnavailable => {
                "Install the missing tool or remove its entries from driftless.yaml"
            }
            Self::ItemApplyFailed => "Re-run with -v to see the failing command's output",
            Self::LockCorrupt => {
                "Fix or remove driftless.lock; it is rebuilt from successful applies"
            }
            Self::HookTimeout => "Raise the hook's timeout or make the command faster",
            Self::HookFailure => "Fix the hook command or set continue_on_error: true",
            Self::ConfigInvalid => "Check driftless.yaml against the documented format",
            Self::Cancelled => "Run apply again to finish the remaining items",
            Self::Io => "Check that the path exists and is writable",
        }
    }
}

/// Errors produced by the reconciliation core.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{domain} provider unavailable: {reason}")]
    ProviderUnavailable { domain: Domain, reason: String },

    #[error("failed to apply {domain} {item}: {reason}")]
    ItemApplyFailed {
        domain: Domain,
        item: String,
        reason: String,
    },

    #[error("lock file {} is corrupt: {reason}", path.display())]
    LockCorrupt { path: PathBuf, reason: String },

    #[error("hook `{command}` timed out after {}", format_duration(*timeout))]
    HookTimeout { command: String, timeout: Duration },

    #[error("hook `{command}` failed: {reason}")]
    HookFailure { command: String, reason: String },

    #[error("invalid configuration: {reason}")]
    ConfigInvalid { reason: String },

    #[error("run cancelled")]
    Cancelled,

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for the reconciliation core.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ProviderUnavailable { .. } => ErrorKind::ProviderUnavailable,
            Self::ItemApplyFailed { .. } => ErrorKind::ItemApplyFailed,
            Self::LockCorrupt { .. } => ErrorKind::LockCorrupt,
            Self::HookTimeout { .. } => ErrorKind::HookTimeout,
            Self::HookFailure { .. } => ErrorKind::HookFailure,
            Self::ConfigInvalid { .. } => ErrorKind::ConfigInvalid,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Io { .. } => ErrorKind::Io,
        }
    }

    /// Whether this error aborts a run when it surfaces.
    ///
    /// Provider and item errors are scoped to their domain or item.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::ProviderUnavailable { .. } | Self::ItemApplyFailed { .. }
        )
    }

    pub fn advice(&self) -> &'static str {
        self.kind().advice()
    }

    pub fn config(reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Render a duration the way hook timeouts are written in config.
pub fn format_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms == 0 {
        return "0s".to_string();
    }
    if ms % 1000 != 0 {
        return format!("{ms}ms");
    }
    let secs = d.as_secs();
    if secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

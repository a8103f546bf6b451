//! Error types for package-manager operations.
//!
//! Errors are categorized to enable retry logic and appropriate user
//! feedback. Classification works on the combined output of the failed
//! command, since managers rarely use distinctive exit codes.

use declarative::ExecError;
use thiserror::Error;

/// Categories of package-manager errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network-related errors (transient, retryable)
    Network,
    /// Package not found in the manager's registry
    NotFound,
    /// Package is already installed
    AlreadyInstalled,
    /// Package is not installed
    NotInstalled,
    /// Permission denied
    Permission,
    /// The manager's binary is not installed
    ManagerNotFound,
    /// The manager does not support the operation
    Unsupported,
    /// The command was cancelled or timed out
    Interrupted,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network)
    }

    /// Whether this error can be safely ignored (operation already done).
    pub fn is_ignorable(&self) -> bool {
        matches!(self, Self::AlreadyInstalled | Self::NotInstalled)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::NotFound => "Package not found",
            Self::AlreadyInstalled => "Already installed",
            Self::NotInstalled => "Not installed",
            Self::Permission => "Permission denied",
            Self::ManagerNotFound => "Package manager not installed",
            Self::Unsupported => "Operation not supported",
            Self::Interrupted => "Interrupted",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network => "Check your internet connection and try again",
            Self::NotFound => "Verify the package name and the manager it belongs to",
            Self::AlreadyInstalled | Self::NotInstalled => "No action needed",
            Self::Permission => "Check directory permissions or run with appropriate access",
            Self::ManagerNotFound => "Install the package manager or run `driftless doctor --fix`",
            Self::Unsupported => "Use the package manager directly for this operation",
            Self::Interrupted => "Run the command again",
            Self::Other => "Check the error details for more information",
        }
    }
}

/// Errors that can occur during package-manager operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Network-related error (connection, timeout, DNS, etc.)
    #[error("{manager}: network error: {message}")]
    Network {
        /// Manager that reported the error
        manager: String,
        /// Output of the failed command
        message: String,
    },

    /// Package not found in the manager's registry
    #[error("{manager}: package not found: {name}")]
    NotFound {
        /// Manager that was asked
        manager: String,
        /// Name of the package that could not be found
        name: String,
    },

    /// Package is already installed
    #[error("{manager}: already installed: {name}")]
    AlreadyInstalled {
        /// Manager that reported it
        manager: String,
        /// Name of the package
        name: String,
    },

    /// Package is not installed
    #[error("{manager}: not installed: {name}")]
    NotInstalled {
        /// Manager that reported it
        manager: String,
        /// Name of the package
        name: String,
    },

    /// Permission denied
    #[error("{manager}: permission denied: {message}")]
    Permission {
        /// Manager that reported the error
        manager: String,
        /// Details about what permission was denied
        message: String,
    },

    /// The manager is unknown or its binary is not on PATH
    #[error("package manager not found: {manager}")]
    ManagerNotFound {
        /// Name of the manager
        manager: String,
    },

    /// Command exited unsuccessfully for an unclassified reason
    #[error("{manager}: `{command}` failed: {stderr}")]
    CommandFailed {
        /// Manager whose command failed
        manager: String,
        /// The command line that failed
        command: String,
        /// Output of the failed command
        stderr: String,
    },

    /// Command output could not be parsed
    #[error("{manager}: could not parse output: {message}")]
    Parse {
        /// Manager whose output was malformed
        manager: String,
        /// Description of the parse failure
        message: String,
    },

    /// The manager has no command for the operation
    #[error("{manager} does not support {operation}")]
    Unsupported {
        /// Name of the manager
        manager: String,
        /// Operation that was requested
        operation: &'static str,
    },

    /// The command could not be run to completion
    #[error(transparent)]
    Exec(#[from] ExecError),
}

impl Error {
    /// Get the error category for retry logic.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Network { .. } => ErrorCategory::Network,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::AlreadyInstalled { .. } => ErrorCategory::AlreadyInstalled,
            Self::NotInstalled { .. } => ErrorCategory::NotInstalled,
            Self::Permission { .. } => ErrorCategory::Permission,
            Self::ManagerNotFound { .. } => ErrorCategory::ManagerNotFound,
            Self::Unsupported { .. } => ErrorCategory::Unsupported,
            Self::Exec(ExecError::Cancelled { .. } | ExecError::Timeout { .. }) => {
                ErrorCategory::Interrupted
            }
            Self::Exec(ExecError::Spawn { .. }) => ErrorCategory::ManagerNotFound,
            Self::CommandFailed { .. } | Self::Parse { .. } | Self::Exec(_) => ErrorCategory::Other,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Whether this error can be safely ignored.
    pub fn is_ignorable(&self) -> bool {
        self.category().is_ignorable()
    }

    /// Whether this error came from cancelling the run.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Exec(ExecError::Cancelled { .. }))
    }

    /// Create an error from a failed command's output.
    ///
    /// Analyzes the output text to categorize the error appropriately.
    pub fn from_output(manager: &str, command: &str, output: &str, package: Option<&str>) -> Self {
        let lower = output.to_lowercase();
        let manager = manager.to_string();
        let name = package.unwrap_or("unknown").to_string();

        // Network errors
        if lower.contains("could not resolve")
            || lower.contains("connection refused")
            || lower.contains("connection reset")
            || lower.contains("timed out")
            || lower.contains("network")
            || lower.contains("econnreset")
            || lower.contains("etimedout")
            || lower.contains("enotfound")
            || lower.contains("ssl")
            || lower.contains("certificate")
            || lower.contains("failed to download")
            || lower.contains("curl: (")
        {
            return Self::Network {
                manager,
                message: output.trim().to_string(),
            };
        }

        // Before not-found: "not installed" would otherwise look like a miss.
        if lower.contains("already installed")
            || lower.contains("is already an installed")
            || lower.contains("already exists")
        {
            return Self::AlreadyInstalled { manager, name };
        }

        if lower.contains("not installed") || lower.contains("is not a dependency") {
            return Self::NotInstalled { manager, name };
        }

        // Not found errors
        if lower.contains("no available formula")
            || lower.contains("no formulae found")
            || lower.contains("no cask with this name")
            || lower.contains("could not find")
            || lower.contains("couldn't find")
            || lower.contains("e404")
            || lower.contains("404 not found")
            || lower.contains("no matching distribution")
        {
            return Self::NotFound { manager, name };
        }

        // Permission errors
        if lower.contains("permission denied")
            || lower.contains("operation not permitted")
            || lower.contains("eacces")
            || lower.contains("cannot write")
        {
            return Self::Permission {
                manager,
                message: output.trim().to_string(),
            };
        }

        Self::CommandFailed {
            manager,
            command: command.to_string(),
            stderr: output.trim().to_string(),
        }
    }
}

/// Result type for package-manager operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(output: &str) -> ErrorCategory {
        Error::from_output("brew", "brew install foo", output, Some("foo")).category()
    }

    #[test]
    fn test_error_category_retryable() {
        assert!(ErrorCategory::Network.is_retryable());
        assert!(!ErrorCategory::NotFound.is_retryable());
        assert!(!ErrorCategory::AlreadyInstalled.is_retryable());
    }

    #[test]
    fn test_error_category_ignorable() {
        assert!(ErrorCategory::AlreadyInstalled.is_ignorable());
        assert!(ErrorCategory::NotInstalled.is_ignorable());
        assert!(!ErrorCategory::Network.is_ignorable());
    }

    #[test]
    fn test_from_output_network() {
        assert_eq!(classify("curl: (6) Could not resolve host"), ErrorCategory::Network);
        assert_eq!(
            classify("npm ERR! code ECONNRESET\nnpm ERR! network aborted"),
            ErrorCategory::Network
        );
    }

    #[test]
    fn test_from_output_not_found() {
        assert_eq!(
            classify("Error: No available formula with the name \"foo\""),
            ErrorCategory::NotFound
        );
        assert_eq!(classify("npm ERR! code E404"), ErrorCategory::NotFound);
    }

    #[test]
    fn test_from_output_idempotent_states() {
        assert_eq!(
            classify("Warning: git is already installed"),
            ErrorCategory::AlreadyInstalled
        );
        assert_eq!(
            classify("Error: No such keg: foo is not installed"),
            ErrorCategory::NotInstalled
        );
    }

    #[test]
    fn test_from_output_permission() {
        assert_eq!(
            classify("Permission denied @ dir_s_mkdir"),
            ErrorCategory::Permission
        );
    }

    #[test]
    fn test_from_output_fallback_keeps_command() {
        let err = Error::from_output("gem", "gem install foo", "boom", Some("foo"));
        assert_eq!(err.category(), ErrorCategory::Other);
        assert_eq!(err.to_string(), "gem: `gem install foo` failed: boom");
    }

    #[test]
    fn test_exec_errors() {
        let err = Error::from(ExecError::Cancelled {
            program: "brew".into(),
        });
        assert!(err.is_cancelled());
        assert_eq!(err.category(), ErrorCategory::Interrupted);
        assert!(!err.is_retryable());
    }
}

//! # pkgkit
//!
//! Uniform access to command-line package managers.
//!
//! This crate provides:
//! - A [`PackageManager`] contract with optional capabilities (search,
//!   info, upgrade, health, self-install) probed at runtime
//! - Table-driven built-in managers for brew, npm, cargo, pipx, uv and gem
//! - Error classification of manager output, so "already installed" is
//!   success and network failures are retried
//!
//! ## Example
//!
//! ```no_run
//! use declarative::Env;
//! use pkgkit::ManagerRegistry;
//!
//! let env = Env::new("/home/me", "/home/me/.config/driftless");
//! let registry = ManagerRegistry::builtin();
//!
//! if let Some(npm) = registry.get("npm") {
//!     for name in npm.list_installed(&env).unwrap_or_default() {
//!         println!("{name}");
//!     }
//! }
//! ```
//!
//! ## Retry Logic
//!
//! Installs that fail with a network error are retried with exponential
//! backoff. Configure it per manager with
//! [`CommandManager::with_retry`](manager::command::CommandManager::with_retry).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod manager;
pub mod registry;
pub mod retry;
pub mod types;

pub use error::{Error, ErrorCategory, Result};
pub use manager::command::{CommandManager, ManagerSpec};
pub use manager::{
    BoxedManager, CheckHealth, Info, PackageManager, Search, SelfInstall, Upgrade,
};
pub use registry::ManagerRegistry;
pub use retry::{LogCallback, RetryCallback, with_retry};
pub use types::{InstalledPackage, PackageInfo, RetryConfig};

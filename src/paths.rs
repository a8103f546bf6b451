//! Centralized path resolution for driftless
//!
//! The config directory holds `driftless.yaml`, `driftless.lock` and the
//! dotfile sources, so pointing it at a dotfiles checkout is all it takes
//! to manage that checkout.
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `--config-dir` on the command line
//! 2. `DRIFTLESS_CONFIG_DIR` environment variable
//! 3. `XDG_CONFIG_HOME/driftless` (if set)
//! 4. `~/.config/driftless`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "DRIFTLESS_CONFIG_DIR";

/// Name of the directory under `~/.config` or `XDG_CONFIG_HOME`
const APP_DIR: &str = "driftless";

/// Get the user's home directory
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("Could not determine home directory")
}

/// Get the driftless config directory path
pub fn config_dir(cli_override: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = cli_override {
        let path = expand(&dir.to_string_lossy());
        log::debug!("Using config dir from --config-dir: {}", path.display());
        return Ok(path);
    }

    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR)
        && !dir.trim().is_empty()
    {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME")
        && !xdg_config.trim().is_empty()
    {
        let path = expand(&xdg_config).join(APP_DIR);
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let path = home_dir()?.join(".config").join(APP_DIR);
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Expand ~ and environment variables in a path string.
///
/// Unknown variables are left as written.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

/// Render a path with the home directory shown as `~`
pub fn display(path: &Path, home: &Path) -> String {
    match path.strip_prefix(home) {
        Ok(rest) if rest.as_os_str().is_empty() => "~".to_string(),
        Ok(rest) => format!("~/{}", rest.display()),
        Err(_) => path.display().to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================

//! `driftless.yaml` loading and validation
//!
//! A missing file is a valid, empty configuration. Everything else that
//! goes wrong here is `ConfigInvalid` and stops the run before any
//! provider is queried.

use declarative::{Error, HookConfig, Hooks, Result, canonical_manager};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Config file name inside the config directory
pub const CONFIG_FILE_NAME: &str = "driftless.yaml";

/// Ignore patterns used when the config does not list its own
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    ".DS_Store",
    ".Trash",
    ".CFUserTextEncoding",
    ".git",
    "*.backup",
    "*.tmp",
    "*.swp",
    "*_history",
    ".lesshst",
    ".viminfo",
    ".cache",
    ".local",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_manager")]
    pub default_manager: String,
    #[serde(default)]
    pub packages: Vec<PackageEntry>,
    #[serde(default)]
    pub dotfiles: DotfilesConfig,
    #[serde(default)]
    pub hooks: HooksConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_manager: default_manager(),
            packages: Vec::new(),
            dotfiles: DotfilesConfig::default(),
            hooks: HooksConfig::default(),
        }
    }
}

fn default_manager() -> String {
    "brew".to_string()
}

/// A package as written: `jq`, `npm:prettier` or `{name, manager}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PackageEntry {
    Short(String),
    Detailed(DetailedPackage),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetailedPackage {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager: Option<String>,
}

/// A package with its manager resolved to a canonical name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PackageSpec {
    pub manager: String,
    pub name: String,
}

impl PackageEntry {
    /// Resolve the manager, falling back to `default_manager`
    pub fn resolve(&self, default_manager: &str) -> PackageSpec {
        let (manager, name) = match self {
            Self::Short(s) => match s.split_once(':') {
                Some((manager, name)) => (manager, name),
                None => (default_manager, s.as_str()),
            },
            Self::Detailed(d) => (d.manager.as_deref().unwrap_or(default_manager), d.name.as_str()),
        };
        PackageSpec {
            manager: canonical_manager(manager),
            name: name.trim().to_string(),
        }
    }
}

/// How dotfiles are deployed into the home directory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployMode {
    #[default]
    Copy,
    Link,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DotfilesConfig {
    #[serde(default)]
    pub mode: DeployMode,
    /// Keep `<target>.backup` before replacing an existing file
    #[serde(default = "default_true")]
    pub backup: bool,
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,
}

impl Default for DotfilesConfig {
    fn default() -> Self {
        Self {
            mode: DeployMode::Copy,
            backup: true,
            ignore_patterns: default_ignore_patterns(),
        }
    }
}

const fn default_true() -> bool {
    true
}

fn default_ignore_patterns() -> Vec<String> {
    DEFAULT_IGNORE_PATTERNS
        .iter()
        .map(ToString::to_string)
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HooksConfig {
    #[serde(default)]
    pub pre_apply: Vec<HookConfig>,
    #[serde(default)]
    pub post_apply: Vec<HookConfig>,
}

impl Config {
    /// Path of the config file inside `config_dir`
    pub fn path(config_dir: &Path) -> PathBuf {
        config_dir.join(CONFIG_FILE_NAME)
    }

    /// Load `driftless.yaml` from `config_dir`
    pub fn load(config_dir: &Path) -> Result<Self> {
        let path = Self::path(config_dir);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("no config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(Error::io(&path, e)),
        };
        Self::parse(&content).map_err(|e| match e {
            Error::ConfigInvalid { reason } => {
                Error::config(format!("{}: {reason}", path.display()))
            }
            other => other,
        })
    }

    /// Parse config text; an empty document is the default config
    pub fn parse(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Option<Self> =
            serde_yaml::from_str(content).map_err(|e| Error::config(e.to_string()))?;
        Ok(config.unwrap_or_default())
    }

    /// Check everything serde cannot: managers, names, duplicates, hooks
    /// and ignore patterns
    pub fn validate(&self, known_manager: impl Fn(&str) -> bool) -> Result<()> {
        let default = canonical_manager(&self.default_manager);
        if !known_manager(&default) {
            return Err(Error::config(format!(
                "unknown default_manager `{}`",
                self.default_manager
            )));
        }

        let mut seen = BTreeSet::new();
        for entry in &self.packages {
            let spec = entry.resolve(&default);
            if spec.name.is_empty() {
                return Err(Error::config("package name must not be empty"));
            }
            if spec.manager.is_empty() || !known_manager(&spec.manager) {
                return Err(Error::config(format!(
                    "package `{}`: unknown manager `{}`",
                    spec.name, spec.manager
                )));
            }
            if !seen.insert((spec.manager.clone(), spec.name.clone())) {
                return Err(Error::config(format!(
                    "package `{}:{}` is listed more than once",
                    spec.manager, spec.name
                )));
            }
        }

        for pattern in &self.dotfiles.ignore_patterns {
            wax::Glob::new(pattern).map_err(|e| {
                Error::config(format!("invalid ignore pattern `{pattern}`: {e}"))
            })?;
        }

        self.hooks()?;
        Ok(())
    }

    /// Packages with managers resolved, in declaration order
    pub fn package_specs(&self) -> Vec<PackageSpec> {
        let default = canonical_manager(&self.default_manager);
        self.packages.iter().map(|p| p.resolve(&default)).collect()
    }

    /// Hooks parsed into runnable form
    pub fn hooks(&self) -> Result<Hooks> {
        let parse = |hooks: &[HookConfig]| hooks.iter().map(HookConfig::parse).collect::<Result<Vec<_>>>();
        Ok(Hooks {
            pre_apply: parse(&self.hooks.pre_apply)?,
            post_apply: parse(&self.hooks.post_apply)?,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

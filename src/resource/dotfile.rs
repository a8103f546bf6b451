//! Dotfile provider: scan, copy or link, and content drift
//!
//! Sources live under the config directory and map onto the home
//! directory by dotting the first path component:
//!
//! - `zshrc` -> `~/.zshrc`
//! - `config/nvim/init.lua` -> `~/.config/nvim/init.lua`
//! - `.gitconfig` -> `~/.gitconfig`

use anyhow::{Context, Result, bail};
use declarative::{
    ActualItem, ConfigItem, Domain, DriftComparator, Env, HealthCheck, HealthReport, Item,
    LOCK_FILE_NAME, Metadata, Provider,
};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;
use wax::{CandidatePath, Glob, Pattern};

use crate::config::{CONFIG_FILE_NAME, DeployMode, DotfilesConfig};

/// Suffix of the copy kept before a target is replaced
const BACKUP_SUFFIX: &str = ".backup";

/// A file found by a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    /// Path relative to home, `/`-separated
    pub name: String,
    pub path: PathBuf,
    pub metadata: Metadata,
}

/// A configured dotfile with both ends resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dotfile {
    pub name: String,
    pub source: PathBuf,
    pub target: PathBuf,
}

impl Dotfile {
    fn to_config_item(&self) -> ConfigItem {
        ConfigItem::new(Domain::Dotfile, &self.name)
            .with_meta("source", self.source.to_string_lossy())
            .with_meta("target", self.target.to_string_lossy())
    }
}

/// Home-relative name for a source path relative to the config directory
///
/// Returns `None` for paths that cannot be deployed (empty, absolute or
/// containing `..`).
pub fn target_name(relative: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return None,
        }
    }
    let first = parts.first_mut()?;
    if !first.starts_with('.') {
        first.insert(0, '.');
    }
    Some(parts.join("/"))
}

/// Source and target paths recorded in an item's metadata
pub fn item_paths(item: &Item) -> Result<(PathBuf, PathBuf)> {
    let get = |key: &str| {
        item.metadata
            .get(key)
            .map(PathBuf::from)
            .with_context(|| format!("dotfile {} has no {key} path", item.name))
    };
    Ok((get("source")?, get("target")?))
}

pub struct DotfileProvider {
    mode: DeployMode,
    backup: bool,
    ignore_patterns: Vec<String>,
}

impl DotfileProvider {
    pub fn new(config: &DotfilesConfig) -> Self {
        Self {
            mode: config.mode,
            backup: config.backup,
            ignore_patterns: config.ignore_patterns.clone(),
        }
    }

    /// Whether a path (or its file name) matches an ignore pattern
    pub fn is_ignored(&self, relative: &str) -> bool {
        let file_name = relative.rsplit('/').next().unwrap_or(relative);
        self.ignore_patterns.iter().any(|pattern| {
            match Glob::new(pattern) {
                Ok(glob) => {
                    glob.matched(&CandidatePath::from(relative)).is_some()
                        || glob.matched(&CandidatePath::from(file_name)).is_some()
                }
                // Invalid patterns are rejected on config load; match literally
                Err(_) => pattern == relative || pattern == file_name,
            }
        })
    }

    /// Every deployable file under the config directory
    pub fn sources(&self, config_dir: &Path, home: &Path) -> Result<Vec<Dotfile>> {
        if !config_dir.is_dir() {
            log::debug!("no dotfile sources: {} does not exist", config_dir.display());
            return Ok(Vec::new());
        }

        let walker = WalkDir::new(config_dir)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                let Ok(relative) = entry.path().strip_prefix(config_dir) else {
                    return false;
                };
                let relative = to_slash(relative);
                if entry.depth() == 1 && (relative == CONFIG_FILE_NAME || relative == LOCK_FILE_NAME) {
                    return false;
                }
                !self.is_ignored(&relative)
            });

        let mut dotfiles = Vec::new();
        let mut claimed: BTreeMap<String, PathBuf> = BTreeMap::new();
        for entry in walker {
            let entry = entry.with_context(|| format!("scanning {}", config_dir.display()))?;
            if !entry.path().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(config_dir)
                .with_context(|| format!("Failed to strip prefix from {}", entry.path().display()))?;
            let Some(name) = target_name(relative) else {
                log::warn!("skipping undeployable source {}", entry.path().display());
                continue;
            };
            // `zshrc` and `.zshrc` share a target; the first in walk order wins.
            if let Some(first) = claimed.get(&name) {
                log::warn!(
                    "skipping {}: ~/{name} is already provided by {}",
                    entry.path().display(),
                    first.display()
                );
                continue;
            }
            claimed.insert(name.clone(), entry.path().to_path_buf());
            dotfiles.push(Dotfile {
                target: home.join(&name),
                source: entry.path().to_path_buf(),
                name,
            });
        }
        Ok(dotfiles)
    }

    /// Top-level dotfiles in the home directory
    pub fn scan(&self, home: &Path) -> Result<Vec<ScannedFile>> {
        let entries = match fs::read_dir(home) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("reading {}", home.display())),
        };

        let mut found = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| format!("reading {}", home.display()))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with('.') || self.is_ignored(&name) {
                continue;
            }
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let mut metadata = Metadata::new();
            metadata.insert("target".to_string(), path.to_string_lossy().into_owned());
            found.push(ScannedFile {
                name,
                path,
                metadata,
            });
        }
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    fn replace_existing(&self, target: &Path) -> Result<()> {
        let meta = match fs::symlink_metadata(target) {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e).with_context(|| format!("inspecting {}", target.display())),
        };

        if meta.file_type().is_symlink() && !target.exists() {
            log::debug!("removing dangling symlink {}", target.display());
            return fs::remove_file(target)
                .with_context(|| format!("removing {}", target.display()));
        }
        if meta.is_dir() {
            bail!("{} is a directory", target.display());
        }

        if self.backup {
            let backup = backup_path(target);
            fs::rename(target, &backup).with_context(|| {
                format!("backing up {} to {}", target.display(), backup.display())
            })?;
            log::info!("backed up {} to {}", target.display(), backup.display());
        } else {
            fs::remove_file(target).with_context(|| format!("removing {}", target.display()))?;
        }
        Ok(())
    }

    /// Put `source` at `target`, replacing whatever is there
    pub fn deploy(&self, source: &Path, target: &Path) -> Result<()> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create parent directory: {}", parent.display())
            })?;
        }
        self.replace_existing(target)?;

        match self.mode {
            DeployMode::Copy => {
                fs::copy(source, target).with_context(|| {
                    format!("copying {} to {}", source.display(), target.display())
                })?;
            }
            DeployMode::Link => link(source, target)?,
        }
        Ok(())
    }
}

#[cfg(unix)]
fn link(source: &Path, target: &Path) -> Result<()> {
    std::os::unix::fs::symlink(source, target).with_context(|| {
        format!(
            "Failed to create symlink: {} -> {}",
            target.display(),
            source.display()
        )
    })
}

#[cfg(windows)]
fn link(source: &Path, target: &Path) -> Result<()> {
    std::os::windows::fs::symlink_file(source, target).with_context(|| {
        format!(
            "Failed to create file symlink: {} -> {}",
            target.display(),
            source.display()
        )
    })
}

#[cfg(not(any(unix, windows)))]
fn link(_source: &Path, _target: &Path) -> Result<()> {
    bail!("Symlinks not supported on this platform")
}

/// `<target>.backup`, or a timestamped name when that is taken
fn backup_path(target: &Path) -> PathBuf {
    let mut plain = target.as_os_str().to_owned();
    plain.push(BACKUP_SUFFIX);
    let plain = PathBuf::from(plain);
    if fs::symlink_metadata(&plain).is_err() {
        return plain;
    }
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let mut stamped = plain.into_os_string();
    stamped.push(format!(".{stamp}"));
    PathBuf::from(stamped)
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn hash_file(path: &Path) -> Result<blake3::Hash> {
    let content = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(blake3::hash(&content))
}

/// Whether `link` (a symlink) points at `source`
fn links_to(link: &Path, source: &Path) -> bool {
    let Ok(dest) = fs::read_link(link) else {
        return false;
    };
    let dest = if dest.is_absolute() {
        dest
    } else {
        link.parent().map_or(dest.clone(), |p| p.join(&dest))
    };
    match (dest.canonicalize(), source.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => dest == source,
    }
}

impl Provider for DotfileProvider {
    fn domain(&self) -> Domain {
        Domain::Dotfile
    }

    fn configured(&self, env: &Env) -> Result<Vec<ConfigItem>> {
        Ok(self
            .sources(&env.config_dir, &env.home_dir)?
            .iter()
            .map(Dotfile::to_config_item)
            .collect())
    }

    fn actual(&self, env: &Env) -> Result<Vec<ActualItem>> {
        let mut seen = BTreeSet::new();
        let mut actual = Vec::new();

        for dotfile in self.sources(&env.config_dir, &env.home_dir)? {
            if dotfile.target.exists() && seen.insert(dotfile.name.clone()) {
                actual.push(
                    ActualItem::new(Domain::Dotfile, &dotfile.name)
                        .with_meta("target", dotfile.target.to_string_lossy()),
                );
            }
        }

        for file in self.scan(&env.home_dir)? {
            if seen.insert(file.name.clone()) {
                log::trace!("untracked candidate {}", file.path.display());
                let mut item = ActualItem::new(Domain::Dotfile, file.name);
                item.metadata = file.metadata;
                actual.push(item);
            }
        }

        Ok(actual)
    }

    fn apply(&self, _env: &Env, item: &Item, dry_run: bool) -> Result<()> {
        let (source, target) = item_paths(item)?;
        if !source.is_file() {
            bail!("source {} does not exist", source.display());
        }
        if dry_run {
            log::debug!("would deploy {} to {}", source.display(), target.display());
            return Ok(());
        }
        self.deploy(&source, &target)
    }

    fn drift_comparator(&self) -> Option<&dyn DriftComparator> {
        Some(self)
    }

    fn health(&self) -> Option<&dyn HealthCheck> {
        Some(self)
    }
}

impl DriftComparator for DotfileProvider {
    fn is_drifted(&self, item: &Item) -> Result<bool> {
        let (source, target) = item_paths(item)?;
        if fs::symlink_metadata(&target).is_ok_and(|m| m.file_type().is_symlink())
            && links_to(&target, &source)
        {
            return Ok(false);
        }
        if !target.is_file() {
            return Ok(true);
        }
        Ok(hash_file(&source)? != hash_file(&target)?)
    }
}

impl HealthCheck for DotfileProvider {
    fn check(&self, env: &Env) -> Vec<HealthReport> {
        let mut reports = Vec::new();

        if !env.config_dir.is_dir() {
            reports.push(
                HealthReport::warning(
                    "dotfiles",
                    format!("config directory {} does not exist", env.config_dir.display()),
                )
                .with_fix(format!("mkdir -p {}", env.config_dir.display())),
            );
            return reports;
        }

        match self.sources(&env.config_dir, &env.home_dir) {
            Ok(sources) => {
                let dangling: Vec<_> = sources
                    .iter()
                    .filter(|d| d.target.is_symlink() && !d.target.exists())
                    .collect();
                reports.push(HealthReport::ok(
                    "dotfiles",
                    format!("{} source file(s) in {}", sources.len(), env.config_dir.display()),
                ));
                for dotfile in dangling {
                    reports.push(
                        HealthReport::warning(
                            dotfile.name.clone(),
                            format!("{} is a broken symlink", dotfile.target.display()),
                        )
                        .with_fix("driftless apply --dotfiles"),
                    );
                }
            }
            Err(e) => reports.push(HealthReport::error("dotfiles", format!("{e:#}"))),
        }

        if self.mode == DeployMode::Link && cfg!(not(any(unix, windows))) {
            reports.push(
                HealthReport::error("dotfiles", "link mode is not supported on this platform")
                    .with_fix("set dotfiles.mode to copy"),
            );
        }

        reports
    }
}

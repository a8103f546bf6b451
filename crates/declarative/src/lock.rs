//! The ledger of resources this tool created.
//!
//! Two on-disk layouts exist:
//!
//! - **v1**: `packages: {manager: [name | {name, version, installed_at}]}`,
//!   with `version` either `1` or absent.
//! - **v2**: `version: 2`, a generic `resources` list, plus the legacy
//!   `packages` section regenerated on every write so older readers keep
//!   working.
//!
//! Loading upgrades v1 in memory; nothing is written until the next save,
//! which always emits v2.

use crate::error::{Error, Result};
use crate::names::canonical_manager;
use crate::types::{Domain, Item, ItemState, Metadata};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Ledger file name inside the config directory
pub const LOCK_FILE_NAME: &str = "driftless.lock";

/// Version written by [`LockStore::save`]
pub const CURRENT_VERSION: u32 = 2;

/// One durable record per resource the tool successfully created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEntry {
    #[serde(rename = "type")]
    pub kind: Domain,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub state: ItemState,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
    pub installed_at: DateTime<Utc>,
}

impl LockEntry {
    /// Entry for a package installed through `manager`
    pub fn package(
        manager: &str,
        name: &str,
        version: Option<String>,
        installed_at: DateTime<Utc>,
    ) -> Self {
        let manager = canonical_manager(manager);
        let mut metadata = Metadata::new();
        metadata.insert("manager".to_string(), manager.clone());
        metadata.insert("name".to_string(), name.to_string());
        if let Some(v) = &version {
            metadata.insert("version".to_string(), v.clone());
        }
        Self {
            kind: Domain::Package,
            id: format!("{manager}:{name}"),
            version,
            state: ItemState::Managed,
            metadata,
            installed_at,
        }
    }

    /// Entry for an item whose corrective action just succeeded
    ///
    /// Packages are keyed `manager:name`, dotfiles by their name, which is
    /// the target path relative to home.
    pub fn from_item(item: &Item) -> Self {
        let now = Utc::now();
        match (item.domain, item.manager.as_deref()) {
            (Domain::Package, Some(manager)) => {
                let mut entry =
                    Self::package(manager, &item.name, item.metadata.get("version").cloned(), now);
                for (k, v) in &item.metadata {
                    entry.metadata.entry(k.clone()).or_insert_with(|| v.clone());
                }
                entry
            }
            _ => Self {
                kind: item.domain,
                id: item.name.clone(),
                version: item.metadata.get("version").cloned(),
                state: ItemState::Managed,
                metadata: item.metadata.clone(),
                installed_at: now,
            },
        }
    }

    /// `(manager, name)` for package entries
    pub fn package_parts(&self) -> Option<(String, String)> {
        if self.kind != Domain::Package {
            return None;
        }
        let (id_manager, id_name) = self.id.split_once(':').unwrap_or(("", self.id.as_str()));
        let manager = self
            .metadata
            .get("manager")
            .map_or(id_manager, String::as_str);
        let name = self.metadata.get("name").map_or(id_name, String::as_str);
        if manager.is_empty() || name.is_empty() {
            return None;
        }
        Some((canonical_manager(manager), name.to_string()))
    }
}

/// In-memory ledger, always in the current layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockFile {
    pub version: u32,
    pub resources: Vec<LockEntry>,
    /// Layout version the file was upgraded from, if it was
    pub migrated_from: Option<u32>,
}

impl Default for LockFile {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            resources: Vec::new(),
            migrated_from: None,
        }
    }
}

impl LockFile {
    /// Insert or replace the entry with the same `(type, id)`
    pub fn record(&mut self, entry: LockEntry) {
        match self
            .resources
            .iter_mut()
            .find(|e| e.kind == entry.kind && e.id == entry.id)
        {
            Some(existing) => *existing = entry,
            None => self.resources.push(entry),
        }
    }

    /// Drop the entry with the given `(type, id)`, returning it
    pub fn remove(&mut self, kind: Domain, id: &str) -> Option<LockEntry> {
        let index = self
            .resources
            .iter()
            .position(|e| e.kind == kind && e.id == id)?;
        Some(self.resources.remove(index))
    }

    pub fn get(&self, kind: Domain, id: &str) -> Option<&LockEntry> {
        self.resources.iter().find(|e| e.kind == kind && e.id == id)
    }

    pub fn entries(&self, kind: Domain) -> impl Iterator<Item = &LockEntry> {
        self.resources.iter().filter(move |e| e.kind == kind)
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn was_migrated(&self) -> bool {
        self.migrated_from.is_some()
    }

    /// The legacy `packages` section: canonical manager to sorted names
    pub fn legacy_packages(&self) -> BTreeMap<String, Vec<String>> {
        let mut grouped: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (manager, name) in self.resources.iter().filter_map(LockEntry::package_parts) {
            grouped.entry(manager).or_default().insert(name);
        }
        grouped
            .into_iter()
            .map(|(manager, names)| (manager, names.into_iter().collect()))
            .collect()
    }

    /// Add legacy package names that have no resource entry yet
    fn fold_legacy(&mut self, packages: BTreeMap<String, Vec<V1Package>>) {
        for (manager, list) in packages {
            for pkg in list {
                let (name, version, installed_at) = pkg.into_parts();
                let entry = LockEntry::package(
                    &manager,
                    &name,
                    version,
                    installed_at.unwrap_or_else(Utc::now),
                );
                if self.get(Domain::Package, &entry.id).is_none() {
                    self.resources.push(entry);
                }
            }
        }
    }
}

/// A v1 package list element
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum V1Package {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        version: Option<String>,
        #[serde(default)]
        installed_at: Option<DateTime<Utc>>,
    },
}

impl V1Package {
    fn into_parts(self) -> (String, Option<String>, Option<DateTime<Utc>>) {
        match self {
            Self::Name(name) => (name, None, None),
            Self::Detailed {
                name,
                version,
                installed_at,
            } => (name, version, installed_at),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawV1 {
    #[serde(default)]
    packages: BTreeMap<String, Vec<V1Package>>,
}

#[derive(Debug, Deserialize)]
struct RawV2 {
    #[serde(default)]
    resources: Vec<LockEntry>,
    #[serde(default)]
    packages: BTreeMap<String, Vec<V1Package>>,
}

#[derive(Debug, Serialize)]
struct WriteV2<'a> {
    version: u32,
    resources: &'a [LockEntry],
    packages: BTreeMap<String, Vec<String>>,
}

/// Loads, migrates and persists the ledger at a fixed path
#[derive(Debug, Clone)]
pub struct LockStore {
    path: PathBuf,
}

impl LockStore {
    /// Ledger inside `config_dir`
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        Self {
            path: config_dir.as_ref().join(LOCK_FILE_NAME),
        }
    }

    /// Ledger at an explicit path
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the ledger, upgrading older layouts in memory.
    ///
    /// A missing file is an empty current-version ledger.
    pub fn load(&self) -> Result<LockFile> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("no ledger at {}", self.path.display());
                return Ok(LockFile::default());
            }
            Err(e) => return Err(Error::io(&self.path, e)),
        };
        self.parse(&content)
    }

    fn corrupt(&self, reason: impl Into<String>) -> Error {
        Error::LockCorrupt {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    fn parse(&self, content: &str) -> Result<LockFile> {
        let value: serde_yaml::Value =
            serde_yaml::from_str(content).map_err(|e| self.corrupt(e.to_string()))?;
        if value.is_null() {
            return Ok(LockFile::default());
        }
        if !value.is_mapping() {
            return Err(self.corrupt("expected a mapping at the top level"));
        }

        let version = match value.get("version") {
            None | Some(serde_yaml::Value::Null) => 1,
            Some(v) => v
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| self.corrupt(format!("invalid version {v:?}")))?,
        };

        match version {
            1 => {
                let raw: RawV1 =
                    serde_yaml::from_value(value).map_err(|e| self.corrupt(e.to_string()))?;
                let mut lock = LockFile {
                    migrated_from: Some(1),
                    ..LockFile::default()
                };
                lock.fold_legacy(raw.packages);
                log::info!(
                    "upgraded v1 ledger {} ({} packages) in memory",
                    self.path.display(),
                    lock.resources.len()
                );
                Ok(lock)
            }
            2 => {
                let raw: RawV2 =
                    serde_yaml::from_value(value).map_err(|e| self.corrupt(e.to_string()))?;
                let mut lock = LockFile {
                    resources: raw.resources,
                    ..LockFile::default()
                };
                lock.fold_legacy(raw.packages);
                Ok(lock)
            }
            v => Err(self.corrupt(format!(
                "unsupported version {v} (this build reads up to {CURRENT_VERSION})"
            ))),
        }
    }

    /// Persist the ledger as the current version.
    ///
    /// The file is written to a temporary sibling, synced, and renamed over
    /// the target, so readers never observe a partial ledger.
    pub fn save(&self, lock: &LockFile) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;

        let doc = WriteV2 {
            version: CURRENT_VERSION,
            resources: &lock.resources,
            packages: lock.legacy_packages(),
        };
        let yaml = serde_yaml::to_string(&doc).map_err(|e| self.corrupt(e.to_string()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| Error::io(&dir, e))?;
        tmp.write_all(yaml.as_bytes())
            .map_err(|e| Error::io(tmp.path(), e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| Error::io(tmp.path(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| Error::io(&self.path, e.error))?;

        log::debug!(
            "saved ledger {} ({} resources)",
            self.path.display(),
            lock.resources.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_with(content: &str) -> (TempDir, LockStore) {
        let dir = TempDir::new().unwrap();
        let store = LockStore::new(dir.path());
        fs::write(store.path(), content).unwrap();
        (dir, store)
    }

    fn raw_packages(store: &LockStore) -> BTreeMap<String, Vec<String>> {
        let value: serde_yaml::Value =
            serde_yaml::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        serde_yaml::from_value(value["packages"].clone()).unwrap()
    }

    #[test]
    fn test_missing_file_is_empty_current_ledger() {
        let dir = TempDir::new().unwrap();
        let lock = LockStore::new(dir.path()).load().unwrap();
        assert_eq!(lock.version, CURRENT_VERSION);
        assert!(lock.is_empty());
        assert!(!lock.was_migrated());
    }

    #[test]
    fn test_v1_upgrades_in_memory_without_writing() {
        let v1 = "packages:\n  brew:\n    - jq\n    - name: tree\n      version: \"2.1\"\n  npm:\n    - prettier\n";
        let (_dir, store) = store_with(v1);
        let lock = store.load().unwrap();

        assert_eq!(lock.migrated_from, Some(1));
        assert_eq!(lock.version, 2);
        assert_eq!(lock.resources.len(), 3);
        let tree = lock.get(Domain::Package, "brew:tree").unwrap();
        assert_eq!(tree.version.as_deref(), Some("2.1"));
        assert_eq!(tree.metadata["manager"], "brew");
        assert_eq!(tree.metadata["name"], "tree");
        assert!(lock.get(Domain::Package, "npm:prettier").is_some());

        assert_eq!(fs::read_to_string(store.path()).unwrap(), v1);
    }

    #[test]
    fn test_v1_round_trip_preserves_legacy_section() {
        let v1 = "version: 1\npackages:\n  npm:\n    - prettier\n  brew:\n    - tree\n    - jq\n";
        let (_dir, store) = store_with(v1);
        let lock = store.load().unwrap();
        store.save(&lock).unwrap();

        let mut expected = BTreeMap::new();
        expected.insert("brew".to_string(), vec!["jq".to_string(), "tree".to_string()]);
        expected.insert("npm".to_string(), vec!["prettier".to_string()]);
        assert_eq!(raw_packages(&store), expected);

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.migrated_from, None);
        assert_eq!(reloaded.resources.len(), 3);
    }

    #[test]
    fn test_v1_manager_aliases_are_canonicalized() {
        let (_dir, store) = store_with("packages:\n  homebrew:\n    - jq\n");
        let lock = store.load().unwrap();
        assert!(lock.get(Domain::Package, "brew:jq").is_some());
    }

    #[test]
    fn test_v2_folds_orphan_legacy_names() {
        let v2 = r"version: 2
resources:
  - type: package
    id: brew:jq
    state: managed
    metadata: { manager: brew, name: jq }
    installed_at: 2024-01-01T00:00:00Z
  - type: dotfile
    id: .zshrc
    state: managed
    metadata: { source: zshrc }
    installed_at: 2024-01-01T00:00:00Z
packages:
  brew: [jq, htop]
";
        let (_dir, store) = store_with(v2);
        let lock = store.load().unwrap();
        assert_eq!(lock.migrated_from, None);
        assert_eq!(lock.resources.len(), 3);
        assert!(lock.get(Domain::Package, "brew:htop").is_some());
        assert!(lock.get(Domain::Dotfile, ".zshrc").is_some());
    }

    #[test]
    fn test_rejects_future_and_malformed_versions() {
        let (_dir, store) = store_with("version: 3\nresources: []\n");
        let err = store.load().unwrap_err();
        assert!(matches!(err, Error::LockCorrupt { .. }));
        assert!(err.to_string().contains("unsupported version 3"));

        let (_dir, store) = store_with("version: two\n");
        assert!(matches!(store.load().unwrap_err(), Error::LockCorrupt { .. }));

        let (_dir, store) = store_with("packages: [\n");
        assert!(matches!(store.load().unwrap_err(), Error::LockCorrupt { .. }));
    }

    #[test]
    fn test_record_upserts_by_type_and_id() {
        let mut lock = LockFile::default();
        let at = Utc::now();
        lock.record(LockEntry::package("brew", "jq", None, at));
        lock.record(LockEntry::package("brew", "jq", Some("1.7".into()), at));
        lock.record(LockEntry::package("npm", "jq", None, at));
        assert_eq!(lock.resources.len(), 2);
        assert_eq!(
            lock.get(Domain::Package, "brew:jq").unwrap().version.as_deref(),
            Some("1.7")
        );
    }

    #[test]
    fn test_remove_drops_entry_and_legacy_name() {
        let mut lock = LockFile::default();
        let at = Utc::now();
        lock.record(LockEntry::package("brew", "jq", None, at));
        lock.record(LockEntry::package("brew", "tree", None, at));

        let removed = lock.remove(Domain::Package, "brew:jq").unwrap();
        assert_eq!(removed.id, "brew:jq");
        assert!(lock.remove(Domain::Package, "brew:jq").is_none());
        assert!(lock.remove(Domain::Dotfile, "brew:tree").is_none());
        assert_eq!(lock.legacy_packages()["brew"], vec!["tree"]);
    }

    #[test]
    fn test_from_item_ids() {
        let item = Item {
            name: "jq".into(),
            domain: Domain::Package,
            state: ItemState::Missing,
            manager: Some("homebrew".into()),
            metadata: Metadata::new(),
            drifted: false,
        };
        assert_eq!(LockEntry::from_item(&item).id, "brew:jq");

        let mut metadata = Metadata::new();
        metadata.insert("source".into(), "zshrc".into());
        let item = Item {
            name: ".zshrc".into(),
            domain: Domain::Dotfile,
            state: ItemState::Missing,
            manager: None,
            metadata,
            drifted: false,
        };
        let entry = LockEntry::from_item(&item);
        assert_eq!(entry.id, ".zshrc");
        assert_eq!(entry.metadata["source"], "zshrc");
    }

    #[test]
    fn test_save_creates_parent_and_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let store = LockStore::new(dir.path().join("nested"));
        let mut lock = LockFile::default();
        lock.record(LockEntry::package("brew", "jq", None, Utc::now()));
        store.save(&lock).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path().join("nested"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from(LOCK_FILE_NAME)]);

        let content = fs::read_to_string(store.path()).unwrap();
        assert!(content.starts_with("version: 2"));
        assert_eq!(store.load().unwrap().resources, lock.resources);
    }
}

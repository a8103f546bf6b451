//! Package targets named on the command line

use anyhow::{Result, anyhow, bail};
use declarative::{Domain, LockEntry, LockFile, canonical_manager};
use pkgkit::{ManagerRegistry, PackageManager};

/// A package as typed: `jq` or `brew:jq`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub manager: Option<String>,
    pub name: String,
}

impl Target {
    pub fn parse(arg: &str) -> Result<Self> {
        let arg = arg.trim();
        match arg.split_once(':') {
            Some((manager, name)) if !manager.is_empty() && !name.is_empty() => Ok(Self {
                manager: Some(canonical_manager(manager)),
                name: name.to_string(),
            }),
            Some(_) => bail!("invalid package `{arg}`, expected manager:name"),
            None if arg.is_empty() => bail!("empty package name"),
            None => Ok(Self {
                manager: None,
                name: arg.to_string(),
            }),
        }
    }

    /// Lock file id once the manager is known
    pub fn id(manager: &str, name: &str) -> String {
        format!("{manager}:{name}")
    }
}

/// Recorded packages matching `target`, as `(manager, name)`
pub fn recorded(lock: &LockFile, target: &Target) -> Vec<(String, String)> {
    lock.entries(Domain::Package)
        .filter_map(LockEntry::package_parts)
        .filter(|(manager, name)| {
            *name == target.name && target.manager.as_ref().is_none_or(|m| m == manager)
        })
        .collect()
}

/// The registered manager called `name`, or an error listing the known ones
pub fn manager<'a>(registry: &'a ManagerRegistry, name: &str) -> Result<&'a dyn PackageManager> {
    registry.get(name).ok_or_else(|| {
        anyhow!(
            "unknown package manager `{name}` (known: {})",
            registry.names().join(", ")
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_parse_targets() {
        assert_eq!(
            Target::parse("homebrew:jq").unwrap(),
            Target {
                manager: Some("brew".into()),
                name: "jq".into()
            }
        );
        assert_eq!(Target::parse(" @vue/cli ").unwrap().name, "@vue/cli");
        assert!(Target::parse("brew:").is_err());
        assert!(Target::parse(":jq").is_err());
        assert!(Target::parse("").is_err());
    }

    #[test]
    fn test_recorded_matches_name_and_manager() {
        let mut lock = LockFile::default();
        let at = Utc::now();
        lock.record(LockEntry::package("brew", "jq", None, at));
        lock.record(LockEntry::package("npm", "jq", None, at));
        lock.record(LockEntry::package("npm", "prettier", None, at));

        let bare = recorded(&lock, &Target::parse("jq").unwrap());
        assert_eq!(bare.len(), 2);
        let scoped = recorded(&lock, &Target::parse("npm:jq").unwrap());
        assert_eq!(scoped, vec![("npm".to_string(), "jq".to_string())]);
        assert!(recorded(&lock, &Target::parse("tree").unwrap()).is_empty());
    }

    #[test]
    fn test_unknown_manager_lists_known_ones() {
        let registry = ManagerRegistry::builtin();
        let err = manager(&registry, "apt").err().unwrap();
        assert!(err.to_string().contains("brew, cargo"));
        assert_eq!(manager(&registry, "homebrew").unwrap().name(), "brew");
    }
}

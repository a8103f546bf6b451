//! Three-way reconciliation of declared and observed items

use crate::names::canonical_manager;
use crate::resource::DriftComparator;
use crate::types::{ActualItem, ConfigItem, Domain, DomainResult, Item, ItemState, Metadata};
use std::collections::HashMap;

/// Matching key: the name, qualified by the canonical manager when set.
fn key(name: &str, manager: Option<&str>) -> String {
    match manager {
        Some(m) => format!("{}:{name}", canonical_manager(m)),
        None => name.to_string(),
    }
}

/// Merge observed and desired metadata into a fresh map.
///
/// Desired values win; observed values fill the gaps.
pub fn merge_metadata(desired: &Metadata, observed: &Metadata) -> Metadata {
    let mut merged = observed.clone();
    merged.extend(desired.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// Split items into Managed, Missing and Untracked.
///
/// Matching is exact and case-sensitive. Each bucket preserves the order
/// of the input slice it was drawn from.
pub fn reconcile(domain: Domain, configured: &[ConfigItem], actual: &[ActualItem]) -> DomainResult {
    reconcile_with(domain, configured, actual, None)
}

/// Like [`reconcile`], additionally marking drifted Managed items.
///
/// A comparator error is logged and the item is treated as not drifted.
pub fn reconcile_with(
    domain: Domain,
    configured: &[ConfigItem],
    actual: &[ActualItem],
    comparator: Option<&dyn DriftComparator>,
) -> DomainResult {
    let mut index: HashMap<String, usize> = HashMap::with_capacity(actual.len());
    for (i, item) in actual.iter().enumerate() {
        // First occurrence wins if a listing repeats a name.
        index
            .entry(key(&item.name, item.manager.as_deref()))
            .or_insert(i);
    }

    let mut matched = vec![false; actual.len()];
    let mut result = DomainResult::empty(domain);

    for desired in configured {
        let manager = desired.manager.as_deref().map(canonical_manager);
        match index.get(&key(&desired.name, desired.manager.as_deref())) {
            Some(&i) => {
                matched[i] = true;
                let observed = &actual[i];
                let mut item = Item {
                    name: desired.name.clone(),
                    domain,
                    state: ItemState::Managed,
                    manager: manager.or_else(|| observed.manager.as_deref().map(canonical_manager)),
                    metadata: merge_metadata(&desired.metadata, &observed.metadata),
                    drifted: false,
                };
                if let Some(cmp) = comparator {
                    item.drifted = match cmp.is_drifted(&item) {
                        Ok(drifted) => drifted,
                        Err(e) => {
                            log::warn!("drift check failed for {}: {e:#}", item.qualified_name());
                            false
                        }
                    };
                }
                result.managed.push(item);
            }
            None => result.missing.push(Item {
                name: desired.name.clone(),
                domain,
                state: ItemState::Missing,
                manager,
                metadata: desired.metadata.clone(),
                drifted: false,
            }),
        }
    }

    for (observed, seen) in actual.iter().zip(&matched) {
        if !seen {
            result.untracked.push(Item {
                name: observed.name.clone(),
                domain,
                state: ItemState::Untracked,
                manager: observed.manager.as_deref().map(canonical_manager),
                metadata: observed.metadata.clone(),
                drifted: false,
            });
        }
    }

    log::debug!(
        "reconciled {domain}: {} managed, {} missing, {} untracked",
        result.managed.len(),
        result.missing.len(),
        result.untracked.len()
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn cfg(name: &str) -> ConfigItem {
        ConfigItem::new(Domain::Package, name).with_manager("brew")
    }

    fn act(name: &str) -> ActualItem {
        ActualItem::new(Domain::Package, name).with_manager("brew")
    }

    fn names(items: &[Item]) -> Vec<&str> {
        items.iter().map(|i| i.name.as_str()).collect()
    }

    #[test]
    fn test_three_way_split() {
        let result = reconcile(
            Domain::Package,
            &[cfg("jq"), cfg("tree")],
            &[act("tree"), act("htop")],
        );
        assert_eq!(names(&result.managed), vec!["tree"]);
        assert_eq!(names(&result.missing), vec!["jq"]);
        assert_eq!(names(&result.untracked), vec!["htop"]);
        assert!(result.managed.iter().all(|i| i.state == ItemState::Managed));
        assert!(result.missing.iter().all(|i| i.state == ItemState::Missing));
        assert!(result.untracked.iter().all(|i| i.state == ItemState::Untracked));
    }

    #[test]
    fn test_empty_inputs() {
        let result = reconcile(Domain::Package, &[], &[act("a")]);
        assert!(result.managed.is_empty() && result.missing.is_empty());
        assert_eq!(names(&result.untracked), vec!["a"]);

        let result = reconcile(Domain::Package, &[cfg("a")], &[]);
        assert_eq!(names(&result.missing), vec!["a"]);
        assert!(result.untracked.is_empty());

        let result = reconcile(Domain::Dotfile, &[], &[]);
        assert_eq!(result.total(), 0);
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        let result = reconcile(Domain::Package, &[cfg("Foo")], &[act("foo")]);
        assert_eq!(names(&result.missing), vec!["Foo"]);
        assert_eq!(names(&result.untracked), vec!["foo"]);
    }

    #[test]
    fn test_managers_partition_the_key_space() {
        let configured = [ConfigItem::new(Domain::Package, "jq").with_manager("npm")];
        let actual = [act("jq")];
        let result = reconcile(Domain::Package, &configured, &actual);
        assert!(result.managed.is_empty());
        assert_eq!(result.missing[0].manager.as_deref(), Some("npm"));
        assert_eq!(result.untracked[0].manager.as_deref(), Some("brew"));
    }

    #[test]
    fn test_manager_aliases_match() {
        let configured = [ConfigItem::new(Domain::Package, "jq").with_manager("homebrew")];
        let result = reconcile(Domain::Package, &configured, &[act("jq")]);
        assert_eq!(result.managed.len(), 1);
        assert_eq!(result.managed[0].manager.as_deref(), Some("brew"));
    }

    #[test]
    fn test_metadata_merge_prefers_desired() {
        let configured = [cfg("jq").with_meta("version", "1.7").with_meta("source", "config")];
        let actual = [act("jq").with_meta("version", "1.6").with_meta("path", "/opt")];
        let result = reconcile(Domain::Package, &configured, &actual);
        let meta = &result.managed[0].metadata;
        assert_eq!(meta["version"], "1.7");
        assert_eq!(meta["source"], "config");
        assert_eq!(meta["path"], "/opt");
        // Inputs are untouched.
        assert_eq!(actual[0].metadata["version"], "1.6");
    }

    #[test]
    fn test_buckets_follow_input_order() {
        let configured = [cfg("c"), cfg("a"), cfg("b")];
        let actual = [act("z"), act("b"), act("y")];
        let result = reconcile(Domain::Package, &configured, &actual);
        assert_eq!(names(&result.missing), vec!["c", "a"]);
        assert_eq!(names(&result.untracked), vec!["z", "y"]);
    }

    struct NamedDrift(&'static str);

    impl DriftComparator for NamedDrift {
        fn is_drifted(&self, item: &Item) -> anyhow::Result<bool> {
            if item.name == "broken" {
                anyhow::bail!("unreadable");
            }
            Ok(item.name == self.0)
        }
    }

    #[test]
    fn test_drift_marks_managed_items_only() {
        let configured = [cfg("a"), cfg("b"), cfg("broken"), cfg("gone")];
        let actual = [act("a"), act("b"), act("broken")];
        let result = reconcile_with(Domain::Package, &configured, &actual, Some(&NamedDrift("b")));
        let drifted: Vec<_> = result.drifted().map(|i| i.name.as_str()).collect();
        assert_eq!(drifted, vec!["b"]);
        // Comparator errors never move an item out of Managed.
        assert_eq!(result.managed.len(), 3);
        assert!(!result.missing[0].drifted);
    }

    fn key_set(items: &[Item]) -> HashSet<String> {
        items.iter().map(|i| i.name.clone()).collect()
    }

    proptest! {
        #[test]
        fn prop_buckets_partition_inputs(
            configured in proptest::collection::hash_set("[a-e]{1,2}", 0..12),
            actual in proptest::collection::hash_set("[a-e]{1,2}", 0..12),
        ) {
            let cfg_items: Vec<_> = configured.iter().map(|n| cfg(n)).collect();
            let act_items: Vec<_> = actual.iter().map(|n| act(n)).collect();
            let result = reconcile(Domain::Package, &cfg_items, &act_items);

            let managed = key_set(&result.managed);
            let missing = key_set(&result.missing);
            let untracked = key_set(&result.untracked);

            let expected_managed: HashSet<String> = configured.intersection(&actual).cloned().collect();
            let expected_missing: HashSet<String> = configured.difference(&actual).cloned().collect();
            let expected_untracked: HashSet<String> = actual.difference(&configured).cloned().collect();

            prop_assert_eq!(&managed, &expected_managed);
            prop_assert_eq!(&missing, &expected_missing);
            prop_assert_eq!(&untracked, &expected_untracked);

            prop_assert_eq!(managed.union(&missing).cloned().collect::<HashSet<_>>(), configured);
            prop_assert_eq!(managed.union(&untracked).cloned().collect::<HashSet<_>>(), actual);
            prop_assert!(managed.is_disjoint(&missing));
            prop_assert!(managed.is_disjoint(&untracked));
            prop_assert!(missing.is_disjoint(&untracked));
        }
    }
}

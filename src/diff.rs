//! Classification of two tree snapshots into delete/add/replace/ignore sets.

use crate::types::{DiffResult, PathMap};
use tracing::debug;

/// Classify `mod_map` (the live tree) against `ref_map` (the reference).
///
/// Three passes, keyed by relative path:
/// 1. keys only in the live tree become deletions (live-side `is_dir`);
/// 2. keys only in the reference become additions (reference-side flag);
/// 3. keys in both: a reference file whose hash differs from the live entry
///    is a replacement; matching types otherwise are ignores; a type
///    mismatch (directory on one side, file on the other) is treated as
///    delete + add so that apply converges the live tree to the reference.
///
/// A live file with no hash (unreadable during scan) never compares equal to
/// a hashed reference file, so it is scheduled for replacement.
pub fn diff(mod_map: &PathMap, ref_map: &PathMap) -> DiffResult {
    let mut result = DiffResult::default();

    for (key, mod_entry) in mod_map {
        if !ref_map.contains_key(key) {
            result.deletions.push(mod_entry.clone());
        }
    }

    for (key, ref_entry) in ref_map {
        if !mod_map.contains_key(key) {
            result.additions.push(ref_entry.clone());
        }
    }

    for (key, ref_entry) in ref_map {
        let Some(mod_entry) = mod_map.get(key) else {
            continue;
        };
        if mod_entry.is_dir != ref_entry.is_dir {
            result.deletions.push(mod_entry.clone());
            result.additions.push(ref_entry.clone());
        } else if !ref_entry.is_dir && ref_entry.content_hash != mod_entry.content_hash {
            result.replacements.push(ref_entry.clone());
        } else {
            result.ignores.push(ref_entry.clone());
        }
    }

    debug!(
        deletions = result.deletions.len(),
        additions = result.additions.len(),
        replacements = result.replacements.len(),
        ignores = result.ignores.len(),
        "diff classified"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PathEntry;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn file(key: &str, hash: &str) -> (String, PathEntry) {
        (
            key.to_string(),
            PathEntry::file(key, Some(hash.to_string())),
        )
    }

    fn dir(key: &str) -> (String, PathEntry) {
        (key.to_string(), PathEntry::dir(key))
    }

    fn map(entries: Vec<(String, PathEntry)>) -> PathMap {
        entries.into_iter().collect()
    }

    #[test]
    fn diff_of_identical_maps_is_all_ignores() {
        let a = map(vec![dir("d"), file("d/f.txt", "h1"), file("g.txt", "h2")]);
        let result = diff(&a, &a);
        assert!(result.is_noop());
        assert_eq!(result.ignores.len(), a.len());
    }

    #[test]
    fn classification_scenario() {
        // live = {a.txt: h1, b.txt: h2}, reference = {a.txt: h1, c.txt: h3}
        let live = map(vec![file("a.txt", "h1"), file("b.txt", "h2")]);
        let reference = map(vec![file("a.txt", "h1"), file("c.txt", "h3")]);

        let result = diff(&live, &reference);
        let names = |entries: &[PathEntry]| -> Vec<String> {
            entries.iter().map(|e| e.rel_path.clone()).collect()
        };
        assert_eq!(names(&result.deletions), vec!["b.txt"]);
        assert_eq!(names(&result.additions), vec!["c.txt"]);
        assert!(result.replacements.is_empty());
        assert_eq!(names(&result.ignores), vec!["a.txt"]);
    }

    #[test]
    fn hash_mismatch_is_replacement_with_reference_entry() {
        let live = map(vec![file("f.txt", "old")]);
        let reference = map(vec![file("f.txt", "new")]);
        let result = diff(&live, &reference);
        assert_eq!(result.replacements.len(), 1);
        assert_eq!(result.replacements[0].content_hash.as_deref(), Some("new"));
    }

    #[test]
    fn unhashable_live_file_is_replaced() {
        let live = map(vec![(
            "f.txt".to_string(),
            PathEntry::file("f.txt", None),
        )]);
        let reference = map(vec![file("f.txt", "h1")]);
        let result = diff(&live, &reference);
        assert_eq!(result.replacements.len(), 1);
    }

    #[test]
    fn type_mismatch_becomes_delete_plus_add() {
        let live = map(vec![dir("node")]);
        let reference = map(vec![file("node", "h1")]);
        let result = diff(&live, &reference);

        assert_eq!(result.deletions.len(), 1);
        assert!(result.deletions[0].is_dir);
        assert_eq!(result.additions.len(), 1);
        assert!(!result.additions[0].is_dir);
        assert!(result.replacements.is_empty());
        assert!(result.ignores.is_empty());
    }

    proptest! {
        /// Bucket algebra: every key of either map lands in exactly one
        /// bucket, except type-mismatch keys which land in deletions and
        /// additions together.
        #[test]
        fn bucket_partition(
            live in proptest::collection::btree_map("[a-d]{1,2}", (any::<bool>(), 0u8..4), 0..8),
            reference in proptest::collection::btree_map("[a-d]{1,2}", (any::<bool>(), 0u8..4), 0..8),
        ) {
            let build = |m: &std::collections::BTreeMap<String, (bool, u8)>| -> PathMap {
                m.iter()
                    .map(|(k, (is_dir, h))| {
                        let entry = if *is_dir {
                            PathEntry::dir(k.clone())
                        } else {
                            PathEntry::file(k.clone(), Some(format!("{h:016x}")))
                        };
                        (k.clone(), entry)
                    })
                    .collect()
            };
            let mod_map = build(&live);
            let ref_map = build(&reference);
            let result = diff(&mod_map, &ref_map);

            let keys = |entries: &[PathEntry]| -> BTreeSet<String> {
                entries.iter().map(|e| e.rel_path.clone()).collect()
            };
            let deletions = keys(&result.deletions);
            let additions = keys(&result.additions);
            let replacements = keys(&result.replacements);
            let ignores = keys(&result.ignores);

            let all_keys: BTreeSet<String> =
                mod_map.keys().chain(ref_map.keys()).cloned().collect();
            for key in &all_keys {
                let in_mod = mod_map.get(key);
                let in_ref = ref_map.get(key);
                match (in_mod, in_ref) {
                    (Some(_), None) => {
                        prop_assert!(deletions.contains(key));
                        prop_assert!(!additions.contains(key));
                        prop_assert!(!replacements.contains(key) && !ignores.contains(key));
                    }
                    (None, Some(_)) => {
                        prop_assert!(additions.contains(key));
                        prop_assert!(!deletions.contains(key));
                        prop_assert!(!replacements.contains(key) && !ignores.contains(key));
                    }
                    (Some(m), Some(r)) if m.is_dir != r.is_dir => {
                        prop_assert!(deletions.contains(key) && additions.contains(key));
                        prop_assert!(!replacements.contains(key) && !ignores.contains(key));
                    }
                    (Some(m), Some(r)) => {
                        let replaced = !r.is_dir && r.content_hash != m.content_hash;
                        prop_assert_eq!(replacements.contains(key), replaced);
                        prop_assert_eq!(ignores.contains(key), !replaced);
                        prop_assert!(!deletions.contains(key) && !additions.contains(key));
                    }
                    (None, None) => unreachable!(),
                }
            }
        }
    }
}

//! Generic association-sync helper, used identically for an image's tags,
//! people and sources, and for a person's sources.
//!
//! Given the desired final set and the existing set, keyed by a natural key
//! (tag UUID; (person UUID, role); source URL), compute what to insert,
//! retain (carrying forward `added_at`) and delete.

use std::collections::HashMap;
use std::hash::Hash;

pub struct AssociationDiff<K, New, Existing> {
    pub to_insert: Vec<(K, New)>,
    pub to_retain: Vec<(K, Existing)>,
    pub to_delete: Vec<K>,
}

/// `desired` carries the caller's target state keyed by natural key;
/// `existing` is what's currently persisted, also keyed by natural key.
pub fn diff<K, New, Existing>(
    desired: Vec<(K, New)>,
    mut existing: HashMap<K, Existing>,
) -> AssociationDiff<K, New, Existing>
where
    K: Eq + Hash + Clone,
{
    let mut to_insert = Vec::new();
    let mut to_retain = Vec::new();

    for (key, value) in desired {
        match existing.remove(&key) {
            Some(existing_value) => to_retain.push((key, existing_value)),
            None => to_insert.push((key, value)),
        }
    }

    let to_delete = existing.into_keys().collect();

    AssociationDiff {
        to_insert,
        to_retain,
        to_delete,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_insert_retain_delete() {
        let mut existing = HashMap::new();
        existing.insert(1, "keep");
        existing.insert(2, "drop");

        let desired = vec![(1, "keep-new"), (3, "new")];
        let result = diff(desired, existing);

        assert_eq!(result.to_insert, vec![(3, "new")]);
        assert_eq!(result.to_retain, vec![(1, "keep")]);
        assert_eq!(result.to_delete, vec![2]);
    }
}

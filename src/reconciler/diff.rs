use std::collections::BTreeSet;

use uuid::Uuid;

/// Operations needed to turn `listed` into `should_list`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingDiff {
    pub to_create: BTreeSet<Uuid>,
    pub to_delete: BTreeSet<Uuid>,
    pub to_sync: BTreeSet<Uuid>,
}

impl ListingDiff {
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_delete.is_empty() && self.to_sync.is_empty()
    }
}

pub fn diff(should_list: &BTreeSet<Uuid>, listed: &BTreeSet<Uuid>) -> ListingDiff {
    ListingDiff {
        to_create: should_list.difference(listed).copied().collect(),
        to_delete: listed.difference(should_list).copied().collect(),
        to_sync: should_list.intersection(listed).copied().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[u128]) -> BTreeSet<Uuid> {
        values.iter().map(|v| Uuid::from_u128(*v)).collect()
    }

    #[test]
    fn splits_into_create_delete_and_sync() {
        let result = diff(&ids(&[1, 2, 3]), &ids(&[2, 3, 4]));

        assert_eq!(result.to_create, ids(&[1]));
        assert_eq!(result.to_delete, ids(&[4]));
        assert_eq!(result.to_sync, ids(&[2, 3]));
    }

    #[test]
    fn input_order_does_not_matter() {
        let forward = diff(&ids(&[1, 2, 3]), &ids(&[2, 3, 4]));
        let reversed = diff(&ids(&[3, 2, 1]), &ids(&[4, 3, 2]));
        assert_eq!(forward, reversed);
    }

    #[test]
    fn identical_sets_only_sync() {
        let result = diff(&ids(&[7, 8]), &ids(&[8, 7]));
        assert!(result.to_create.is_empty());
        assert!(result.to_delete.is_empty());
        assert_eq!(result.to_sync, ids(&[7, 8]));
        assert!(!result.is_empty());
        assert!(diff(&ids(&[]), &ids(&[])).is_empty());
    }
}

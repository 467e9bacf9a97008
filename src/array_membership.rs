//! Array position tracking for flattened event fields.
//!
//! A field that comes out of one or more JSON arrays remembers, for each of
//! those arrays, which element it came from. Two fields may only satisfy the
//! same rule together when they agree on every array they share; otherwise a
//! rule like `a=1 AND b=20` could be satisfied by `a` from one element and `b`
//! from another.

use smallvec::SmallVec;

/// A compact map from `u32` keys to `u32` values.
///
/// Entries are kept sorted by key in an inline buffer. Events rarely nest
/// arrays more than a few levels deep, so lookups are a short binary search
/// and most maps never touch the heap.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub(crate) struct IntIntMap {
    entries: SmallVec<[(u32, u32); 4]>,
}

impl IntIntMap {
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn get(&self, key: u32) -> Option<u32> {
        self.entries
            .binary_search_by_key(&key, |&(k, _)| k)
            .ok()
            .map(|i| self.entries[i].1)
    }

    /// Insert or overwrite. Returns the previous value for `key`.
    pub fn put(&mut self, key: u32, value: u32) -> Option<u32> {
        match self.entries.binary_search_by_key(&key, |&(k, _)| k) {
            Ok(i) => Some(std::mem::replace(&mut self.entries[i].1, value)),
            Err(i) => {
                self.entries.insert(i, (key, value));
                None
            }
        }
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.entries.iter().copied()
    }
}

/// Which element index, per array id, a field value came from.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ArrayMembership {
    membership: IntIntMap,
}

impl ArrayMembership {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, array_id: u32, index: u32) {
        self.membership.put(array_id, index);
    }

    pub fn get(&self, array_id: u32) -> Option<u32> {
        self.membership.get(array_id)
    }

    pub fn is_empty(&self) -> bool {
        self.membership.is_empty()
    }

    pub fn len(&self) -> usize {
        self.membership.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.membership.iter()
    }

    /// True when no array appears in both with different indexes.
    pub fn is_consistent_with(&self, other: &ArrayMembership) -> bool {
        // Both sides are sorted, so walk them together.
        let mut a = self.membership.entries.iter().peekable();
        let mut b = other.membership.entries.iter().peekable();
        while let (Some(&&(ka, va)), Some(&&(kb, vb))) = (a.peek(), b.peek()) {
            if ka == kb {
                if va != vb {
                    return false;
                }
                a.next();
                b.next();
            } else if ka < kb {
                a.next();
            } else {
                b.next();
            }
        }
        true
    }

    /// Merge two memberships, or `None` when they disagree on some array.
    ///
    /// An empty membership places no constraint, so merging with it returns
    /// the other side unchanged.
    pub fn check_consistency(&self, other: &ArrayMembership) -> Option<ArrayMembership> {
        if other.is_empty() {
            return Some(self.clone());
        }
        if self.is_empty() {
            return Some(other.clone());
        }
        if !self.is_consistent_with(other) {
            return None;
        }
        let mut merged = self.clone();
        for (array_id, index) in other.iter() {
            merged.put(array_id, index);
        }
        Some(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn membership(pairs: &[(u32, u32)]) -> ArrayMembership {
        let mut m = ArrayMembership::new();
        for &(a, i) in pairs {
            m.put(a, i);
        }
        m
    }

    #[test]
    fn test_int_int_map() {
        let mut map = IntIntMap::default();
        assert!(map.is_empty());
        assert_eq!(map.put(7, 1), None);
        assert_eq!(map.put(3, 2), None);
        assert_eq!(map.put(7, 5), Some(1));
        assert_eq!(map.get(7), Some(5));
        assert_eq!(map.get(4), None);
        assert_eq!(map.iter().collect::<Vec<_>>(), vec![(3, 2), (7, 5)]);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_empty_membership_is_universal() {
        let a = membership(&[(1, 0)]);
        let empty = ArrayMembership::new();
        assert_eq!(a.check_consistency(&empty), Some(a.clone()));
        assert_eq!(empty.check_consistency(&a), Some(a));
    }

    #[test]
    fn test_disagreement_is_inconsistent() {
        let a = membership(&[(1, 0), (2, 3)]);
        let b = membership(&[(2, 4)]);
        assert!(!a.is_consistent_with(&b));
        assert_eq!(a.check_consistency(&b), None);
    }

    #[test]
    fn test_merge_unions_arrays() {
        let a = membership(&[(1, 0)]);
        let b = membership(&[(1, 0), (5, 2)]);
        let merged = a.check_consistency(&b).unwrap();
        assert_eq!(merged, membership(&[(1, 0), (5, 2)]));
    }
}

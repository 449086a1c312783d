//! Keyed accumulation maps and the lookup / merge traits built on them.

use auto_impl::auto_impl;
use std::{borrow::Borrow, hash::Hash};

mod imps;
pub use hashbrown;
pub use imps::null;

/// HashMap
pub type HashMap<K, V, S = rustc_hash::FxBuildHasher> = hashbrown::HashMap<K, V, S>;
/// HashSet
pub type HashSet<K, S = rustc_hash::FxBuildHasher> = hashbrown::HashSet<K, S>;

/// Read-only key-value lookup.
#[auto_impl(&, &mut, Box, Rc, Arc)]
pub trait KeyValueStoreGet<K: Ord + Hash + Eq, V> {
    /// Get value by key
    fn get<Q>(&self, k: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + Hash + Eq + ?Sized;
}

/// Merge another partial accumulation into `self`.
///
/// Implementations must be commutative and associative: merging the partial
/// results of several workers yields the same value whatever order the
/// partials arrive in.
pub trait Merge {
    /// Fold `other` into `self`.
    fn merge(&mut self, other: Self);
}

impl<K: Hash + Eq> Merge for HashSet<K> {
    fn merge(&mut self, other: Self) {
        self.extend(other);
    }
}

impl<K: Hash + Eq, V: Merge> Merge for HashMap<K, V> {
    fn merge(&mut self, other: Self) {
        for (k, v) in other {
            match self.entry(k) {
                hashbrown::hash_map::Entry::Occupied(mut entry) => entry.get_mut().merge(v),
                hashbrown::hash_map::Entry::Vacant(entry) => {
                    entry.insert(v);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Sum(u64);

    impl Merge for Sum {
        fn merge(&mut self, other: Self) {
            self.0 += other.0;
        }
    }

    #[test]
    fn merge_is_order_independent() {
        let parts = || {
            let mut a: HashMap<u8, Sum> = HashMap::default();
            a.insert(1, Sum(1));
            a.insert(2, Sum(10));
            let mut b: HashMap<u8, Sum> = HashMap::default();
            b.insert(2, Sum(5));
            b.insert(3, Sum(7));
            (a, b)
        };

        let (mut ab, b) = parts();
        ab.merge(b);
        let (a, mut ba) = parts();
        ba.merge(a);

        assert_eq!(ab, ba);
        assert_eq!(ab.get(&2), Some(&Sum(15)));
    }

    #[test]
    fn set_merge_is_union() {
        let mut a: HashSet<u8> = [1, 2].into_iter().collect();
        let b: HashSet<u8> = [2, 3, 4].into_iter().collect();
        a.merge(b);
        let mut all: Vec<_> = a.into_iter().collect();
        all.sort_unstable();
        assert_eq!(all, vec![1, 2, 3, 4]);
    }
}

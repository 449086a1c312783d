use crate::KeyValueStoreGet;
use std::{
    borrow::Borrow,
    collections::{BTreeMap, HashMap},
    hash::{BuildHasher, Hash},
};

pub mod null;

impl<K: Ord + Hash + Eq, V, S: BuildHasher> KeyValueStoreGet<K, V> for HashMap<K, V, S> {
    fn get<Q>(&self, k: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + Hash + Eq + ?Sized,
    {
        HashMap::get(self, k)
    }
}

impl<K: Ord + Hash + Eq, V, S: BuildHasher> KeyValueStoreGet<K, V> for hashbrown::HashMap<K, V, S> {
    fn get<Q>(&self, k: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + Hash + Eq + ?Sized,
    {
        hashbrown::HashMap::get(self, k)
    }
}

impl<K: Ord + Hash + Eq, V> KeyValueStoreGet<K, V> for BTreeMap<K, V> {
    fn get<Q>(&self, k: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + Hash + Eq + ?Sized,
    {
        BTreeMap::get(self, k)
    }
}

//! A provider that knows nothing.
use crate::KeyValueStoreGet;
use std::{borrow::Borrow, hash::Hash};

/// A provider that answers every lookup with `None`.
#[derive(Debug, Default, Copy, Clone)]
pub struct NullProvider;

impl<K: Ord + Hash + Eq, V> KeyValueStoreGet<K, V> for NullProvider {
    fn get<Q>(&self, _k: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + Hash + Eq + ?Sized,
    {
        None
    }
}

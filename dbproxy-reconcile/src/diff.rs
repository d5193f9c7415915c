//! Add/remove sets between a previous and a desired collection.
//!
//! Tags are compared by key and value, so a changed value shows up as a
//! removal of the old pair plus an addition of the new one. The tagging and
//! registration calls have no update primitive, which makes this two-phase
//! replace the only way to change a value. Targets are compared by id.

use std::collections::BTreeMap;

use crate::model::{Tag, Target};

/// Identity used when comparing two collections.
pub trait DiffKey {
    type Key: Ord;

    fn diff_key(&self) -> Self::Key;
}

impl DiffKey for Tag {
    type Key = (String, String);

    fn diff_key(&self) -> Self::Key {
        (self.key.clone(), self.value.clone())
    }
}

impl DiffKey for Target {
    type Key = String;

    fn diff_key(&self) -> Self::Key {
        self.id.clone()
    }
}

/// Items to add and items to remove, each sorted by diff key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff<T> {
    pub to_add: Vec<T>,
    pub to_remove: Vec<T>,
}

/// Compute what turns `old` into `new`. Duplicate keys collapse to one item.
pub fn diff<T: DiffKey + Clone>(old: &[T], new: &[T]) -> Diff<T> {
    let old = keyed(old);
    let new = keyed(new);

    let to_remove = old
        .iter()
        .filter(|(key, _)| !new.contains_key(*key))
        .map(|(_, item)| (*item).clone())
        .collect();
    let to_add = new
        .iter()
        .filter(|(key, _)| !old.contains_key(*key))
        .map(|(_, item)| (*item).clone())
        .collect();

    Diff { to_add, to_remove }
}

fn keyed<T: DiffKey>(items: &[T]) -> BTreeMap<T::Key, &T> {
    items.iter().map(|item| (item.diff_key(), item)).collect()
}

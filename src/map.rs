use alloc::boxed::Box;
use core::{borrow::Borrow, cmp::Ordering, marker::PhantomPinned, mem, ops::Bound, ptr::NonNull};

use cordyceps::Linked;

use crate::{AvlTree, KeyedNode, Links, TreeNode};

/// An ordered map based on an [AVL tree].
///
/// Each entry is boxed and linked into an [`AvlTree`]. Keys are unique: inserting an existing key
/// replaces its value.
///
/// [AVL tree]: https://en.wikipedia.org/wiki/AVL_tree
pub struct AvlMap<K: Ord, V> {
    tree: AvlTree<MapNode<K, V>>,
}

struct MapNode<K, V> {
    links: Links<MapNode<K, V>>,
    key: K,
    value: V,
    _unpin: PhantomPinned,
}

unsafe impl<K, V> Linked<Links<MapNode<K, V>>> for MapNode<K, V> {
    type Handle = Box<Self>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        Box::leak(r).into()
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<MapNode<K, V>>> {
        let ptr = ptr.as_ptr();
        unsafe { NonNull::new_unchecked(core::ptr::addr_of_mut!((*ptr).links)) }
    }
}

impl<K: Ord, V> TreeNode<Links<MapNode<K, V>>> for MapNode<K, V> {
    fn cmp_node(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl<K, V, Q> KeyedNode<Links<MapNode<K, V>>, Q> for MapNode<K, V>
where
    K: Borrow<Q> + Ord,
    Q: Ord + ?Sized,
{
    fn cmp_key(&self, key: &Q) -> Ordering {
        self.key.borrow().cmp(key)
    }
}

impl<K, V> MapNode<K, V> {
    fn into_entry(self: Box<Self>) -> (K, V) {
        let MapNode { key, value, .. } = *self;
        (key, value)
    }
}

impl<K: Ord, V> AvlMap<K, V> {
    /// Creates a new, empty `AvlMap`.
    pub const fn new() -> Self {
        Self {
            tree: AvlTree::new(),
        }
    }

    /// Returns `true` if the map contains no elements.
    pub const fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Returns the number of elements in the map.
    pub const fn len(&self) -> usize {
        self.tree.len()
    }

    /// Inserts a key-value pair into the map.
    ///
    /// If the key was already present, its value is replaced and the old value is returned.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        if let Some(node) = self.tree.lookup_key_mut(&key) {
            // SAFETY: Pinning is not structural for `node.value`.
            let slot = unsafe { &mut node.get_unchecked_mut().value };
            return Some(mem::replace(slot, value));
        }

        self.tree.insert(Box::new(MapNode {
            links: Links::new(),
            key,
            value,
            _unpin: PhantomPinned,
        }));

        None
    }

    /// Returns `true` if the map contains a value associated with `key`.
    #[inline]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.lookup_key(key).is_some()
    }

    /// Returns a reference to the value associated with `key`.
    #[inline]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.lookup_key(key).map(|node| &node.get_ref().value)
    }

    /// Returns a mutable reference to the value associated with `key`.
    #[inline]
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree
            .lookup_key_mut(key)
            // SAFETY: Pinning is not structural for `node.value`.
            .map(|node| unsafe { &mut node.get_unchecked_mut().value })
    }

    /// Returns the first key-value pair in the map.
    ///
    /// The returned key is the minimum key in the map.
    #[inline]
    pub fn first_key_value(&self) -> Option<(&K, &V)> {
        self.tree
            .first()
            .map(|node| (&node.get_ref().key, &node.get_ref().value))
    }

    /// Removes and returns the first key-value pair in the map.
    ///
    /// The returned key is the minimum key in the map.
    #[inline]
    pub fn pop_first(&mut self) -> Option<(K, V)> {
        let first = self.tree.first_raw()?;
        unsafe { self.tree.remove(first) }.map(MapNode::into_entry)
    }

    /// Returns the last key-value pair in the map.
    ///
    /// The returned key is the maximum key in the map.
    #[inline]
    pub fn last_key_value(&self) -> Option<(&K, &V)> {
        self.tree
            .last()
            .map(|node| (&node.get_ref().key, &node.get_ref().value))
    }

    /// Removes and returns the last key-value pair in the map.
    ///
    /// The returned key is the maximum key in the map.
    #[inline]
    pub fn pop_last(&mut self) -> Option<(K, V)> {
        let last = self.tree.last_raw()?;
        unsafe { self.tree.remove(last) }.map(MapNode::into_entry)
    }

    /// Removes the value associated with `key` from the map.
    #[inline]
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.remove_key(key).map(|node| node.into_entry().1)
    }

    /// Returns an iterator over the entries whose keys lie between `start` and `end`.
    ///
    /// Unlike `BTreeMap::range`, a `start` greater than `end` yields the entries in descending
    /// order rather than panicking.
    pub fn range<Q>(&self, start: Bound<&Q>, end: Bound<&Q>) -> impl Iterator<Item = (&K, &V)>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree
            .range_by_key(start, end)
            .map(|node| (&node.key, &node.value))
    }

    /// Returns an iterator over the entries of the map, sorted by key.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.tree.iter().map(|node| (&node.key, &node.value))
    }

    /// Clears the map, removing all elements.
    #[inline]
    pub fn clear(&mut self) {
        self.tree.clear();
    }
}

impl<K: Ord, V> Default for AvlMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::vec::Vec;

    use super::*;

    #[test]
    fn insert_replaces_existing_values() {
        let mut map = AvlMap::new();

        assert_eq!(map.insert(3, "three"), None);
        assert_eq!(map.insert(1, "one"), None);
        assert_eq!(map.insert(3, "THREE"), Some("three"));

        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&3), Some(&"THREE"));
        assert!(map.contains_key(&1));
        assert!(!map.contains_key(&2));
    }

    #[test]
    fn matches_btree_map() {
        let mut map = AvlMap::new();
        let mut model = BTreeMap::new();

        for i in 0..500u32 {
            let key = (i * 7919) % 331;
            assert_eq!(map.insert(key, i), model.insert(key, i));
        }

        for key in (0..331).step_by(3) {
            assert_eq!(map.remove(&key), model.remove(&key));
        }

        if let Some(value) = map.get_mut(&10) {
            *value += 1;
        }
        if let Some(value) = model.get_mut(&10) {
            *value += 1;
        }

        assert!(map.iter().eq(model.iter()));
        assert!(map
            .range(Bound::Included(&100), Bound::Excluded(&200))
            .eq(model.range(100..200)));

        assert_eq!(map.first_key_value(), model.first_key_value());
        assert_eq!(map.pop_first(), model.pop_first());
        assert_eq!(map.last_key_value(), model.last_key_value());
        assert_eq!(map.pop_last(), model.pop_last());
        assert_eq!(map.len(), model.len());

        map.clear();
        assert!(map.is_empty());
        assert_eq!(map.pop_first(), None);
    }
    #[test]
    fn range_descends_between_missing_keys() {
        let mut map = AvlMap::new();

        for key in [1, 3, 5] {
            map.insert(key, key * 10);
        }

        let descending: Vec<_> = map
            .range(Bound::Included(&4), Bound::Included(&0))
            .map(|(&k, &v)| (k, v))
            .collect();
        assert_eq!(descending, [(3, 30), (1, 10)]);

        let ascending: Vec<_> = map
            .range(Bound::Included(&0), Bound::Included(&4))
            .map(|(&k, _)| k)
            .collect();
        assert_eq!(ascending, [1, 3]);
    }
}

//! An intrusive AVL tree.
//!
//! The linkage of each element (two child pointers and a cached subtree height) lives in a
//! [`Links`] field embedded in the element itself, so membership in the tree costs no allocation
//! and comparisons are statically dispatched through the [`TreeNode`] and [`KeyedNode`] traits.
//! Ownership moves in and out of the tree through [`cordyceps::Linked::Handle`]: use `Box<T>` to
//! let the tree own its elements, or `NonNull<T>` when the elements live somewhere else (an arena,
//! a slab, `static`s).
//!
//! A record may be a member of several trees at once. Give it one `Links<T, Tag>` field per tree,
//! each with its own `Tag` type, and one `Linked` and `TreeNode` impl per tag.
//!
//! Elements that compare equal are permitted and are all kept. Callers that want set or map
//! semantics must check for an existing element before inserting, as [`AvlMap`] does.
//!
//! ```
//! use core::{cmp::Ordering, ops::Bound, ptr::{self, NonNull}};
//!
//! use cordyceps::Linked;
//! use cordyceps_avl::{AvlTree, KeyedNode, Links, TreeNode};
//!
//! struct Entry {
//!     links: Links<Entry>,
//!     key: u32,
//! }
//!
//! unsafe impl Linked<Links<Entry>> for Entry {
//!     type Handle = Box<Entry>;
//!
//!     fn into_ptr(r: Self::Handle) -> NonNull<Self> {
//!         NonNull::from(Box::leak(r))
//!     }
//!
//!     unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
//!         Box::from_raw(ptr.as_ptr())
//!     }
//!
//!     unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<Entry>> {
//!         NonNull::new_unchecked(ptr::addr_of_mut!((*ptr.as_ptr()).links))
//!     }
//! }
//!
//! impl TreeNode<Links<Entry>> for Entry {
//!     fn cmp_node(&self, other: &Self) -> Ordering {
//!         self.key.cmp(&other.key)
//!     }
//! }
//!
//! impl KeyedNode<Links<Entry>, u32> for Entry {
//!     fn cmp_key(&self, key: &u32) -> Ordering {
//!         self.key.cmp(key)
//!     }
//! }
//!
//! let mut tree: AvlTree<Entry> = AvlTree::new();
//! for key in [5, 1, 9, 3] {
//!     tree.insert(Box::new(Entry { links: Links::new(), key }));
//! }
//!
//! assert_eq!(tree.search_geq(&4).map(|e| e.key), Some(5));
//! assert_eq!(tree.search_leq(&4).map(|e| e.key), Some(3));
//!
//! let keys: Vec<u32> = tree
//!     .range_by_key(Bound::Included(&9), Bound::Excluded(&1))
//!     .map(|e| e.key)
//!     .collect();
//! assert_eq!(keys, [9, 5, 3]);
//! ```
#![no_std]

extern crate alloc;
#[cfg(any(test, feature = "model"))]
extern crate std;

mod check;
mod debug;
mod iter;
pub mod map;
#[cfg(any(test, feature = "model"))]
pub mod model;
mod path;

use core::{
    cell::UnsafeCell,
    cmp::{self, Ordering},
    fmt,
    marker::{PhantomData, PhantomPinned},
    ops::{Bound, Not},
    pin::Pin,
    ptr::{self, NonNull},
};

use cordyceps::Linked;

pub use check::{CheckError, Violation};
pub use iter::Range;
pub use map::AvlMap;

use path::Path;

/// An element of an [`AvlTree`] whose links are stored in an `L`.
pub trait TreeNode<L>: Linked<L> {
    /// Compares two elements of the tree.
    ///
    /// This must be a total order, and the result for any pair of elements must not change while
    /// both are linked into a tree.
    fn cmp_node(&self, other: &Self) -> Ordering;
}

/// An element of an [`AvlTree`] that can be compared against a key of type `K`.
///
/// This enables lookups by key without constructing a placeholder element.
pub trait KeyedNode<L, K: ?Sized>: TreeNode<L> {
    /// Returns the ordering of `self` relative to `key`.
    ///
    /// The order must agree with [`TreeNode::cmp_node`].
    fn cmp_key(&self, key: &K) -> Ordering;
}

/// Hooks called by [`AvlTree::walk`].
///
/// All hooks default to doing nothing.
pub trait Visitor<'tree, T: ?Sized> {
    /// Called when `node` is reached, before its low subtree is walked.
    fn before(&mut self, node: &'tree T) {
        let _ = node;
    }

    /// Called between the low and high subtrees of `node`, in tree order.
    fn during(&mut self, node: &'tree T) {
        let _ = node;
    }

    /// Called after both subtrees of `node` have been walked.
    fn after(&mut self, node: &'tree T) {
        let _ = node;
    }
}

/// An intrusive AVL tree.
///
/// `Tag` distinguishes the links of different trees embedded in the same element type.
pub struct AvlTree<T, Tag = ()>
where
    T: TreeNode<Links<T, Tag>> + ?Sized,
{
    root: Link<T>,
    len: usize,
    _tag: PhantomData<fn() -> Tag>,
}

/// The links embedded in every element of an [`AvlTree`].
pub struct Links<T: ?Sized, Tag = ()> {
    inner: UnsafeCell<LinksInner<T>>,
    _tag: PhantomData<fn() -> Tag>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Dir {
    Left = 0,
    Right = 1,
}

impl Not for Dir {
    type Output = Dir;

    fn not(self) -> Self::Output {
        match self {
            Dir::Left => Dir::Right,
            Dir::Right => Dir::Left,
        }
    }
}

#[repr(C)]
struct LinksInner<T: ?Sized> {
    children: [Link<T>; 2],
    // 0 while unlinked; leaves have height 1.
    height: u8,
    _unpin: PhantomPinned,
}

type Link<T> = Option<NonNull<T>>;

impl<T, Tag> AvlTree<T, Tag>
where
    T: TreeNode<Links<T, Tag>> + ?Sized,
{
    /// Returns a new empty tree.
    pub const fn new() -> AvlTree<T, Tag> {
        AvlTree {
            root: None,
            len: 0,
            _tag: PhantomData,
        }
    }

    /// Returns `true` if the tree contains no elements.
    pub const fn is_empty(&self) -> bool {
        let empty = self.len() == 0;

        if cfg!(debug_assertions) {
            // Can't use assert_eq!() in const fn.
            assert!(empty == self.root.is_none());
        }

        empty
    }

    /// Returns the number of elements in the tree.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns the height of the tree. An empty tree has height 0.
    pub fn height(&self) -> usize {
        usize::from(unsafe { Self::height_of(self.root) })
    }

    /// Inserts an item into the tree and returns a pointer to it.
    ///
    /// Items that compare equal to an element already in the tree are inserted alongside it.
    ///
    /// This operation completes in _O(log(n))_ time.
    pub fn insert(&mut self, item: T::Handle) -> NonNull<T> {
        let ptr = T::into_ptr(item);

        unsafe {
            let ptr_links = Self::links(ptr);
            debug_assert!(
                !ptr_links.is_linked(),
                "element is already linked into a tree"
            );
            ptr_links.reset_leaf();

            let mut path = Path::new();
            let mut dir = Dir::Left;
            let mut opt_cur = self.root;

            // Descend to an empty slot. Equal items go to the high side.
            while let Some(cur) = opt_cur {
                path.push(cur);
                dir = match ptr.as_ref().cmp_node(cur.as_ref()) {
                    Ordering::Less => Dir::Left,
                    Ordering::Equal | Ordering::Greater => Dir::Right,
                };
                opt_cur = Self::links(cur).child(dir);
            }

            match path.last() {
                Some(parent) => {
                    Self::links(parent).set_child(dir, Some(ptr));
                }
                None => self.root = Some(ptr),
            }

            self.rebalance_path(path.as_slice());
        }

        self.len += 1;
        log::trace!("inserted element, len = {}", self.len);

        ptr
    }

    /// Returns a reference to an element comparing equal to `probe`.
    ///
    /// `probe` does not need to be linked into the tree.
    pub fn lookup(&self, probe: &T) -> Option<Pin<&T>> {
        let ptr = self.find_raw(|node| probe.cmp_node(node))?;
        unsafe { Some(Pin::new_unchecked(ptr.as_ref())) }
    }

    /// Returns a reference to an element comparing equal to `key`.
    pub fn lookup_key<K>(&self, key: &K) -> Option<Pin<&T>>
    where
        T: KeyedNode<Links<T, Tag>, K>,
        K: ?Sized,
    {
        let ptr = self.find_raw(|node| node.cmp_key(key).reverse())?;
        unsafe { Some(Pin::new_unchecked(ptr.as_ref())) }
    }

    /// Returns a pinned mutable reference to an element comparing equal to `key`.
    ///
    /// The caller must not change the ordering of the element through the returned reference.
    pub fn lookup_key_mut<K>(&mut self, key: &K) -> Option<Pin<&mut T>>
    where
        T: KeyedNode<Links<T, Tag>, K>,
        K: ?Sized,
    {
        let mut ptr = self.find_raw(|node| node.cmp_key(key).reverse())?;
        // SAFETY: `self` is mutably borrowed for the lifetime of the returned reference, and
        // elements are pinned by contract with `Linked`.
        unsafe { Some(Pin::new_unchecked(ptr.as_mut())) }
    }

    // Descends from the root, steering by `target_cmp`, which orders the target relative to the
    // visited node.
    fn find_raw(&self, mut target_cmp: impl FnMut(&T) -> Ordering) -> Link<T> {
        let mut opt_cur = self.root;

        loop {
            let cur = opt_cur?;

            unsafe {
                opt_cur = match target_cmp(cur.as_ref()) {
                    Ordering::Less => Self::links(cur).left(),
                    Ordering::Equal => return Some(cur),
                    Ordering::Greater => Self::links(cur).right(),
                };
            }
        }
    }

    /// Returns the minimum element of the tree.
    pub fn first(&self) -> Option<Pin<&T>> {
        self.first_raw()
            .map(|first| unsafe { Pin::new_unchecked(first.as_ref()) })
    }

    /// Returns the maximum element of the tree.
    pub fn last(&self) -> Option<Pin<&T>> {
        self.last_raw()
            .map(|last| unsafe { Pin::new_unchecked(last.as_ref()) })
    }

    fn first_raw(&self) -> Link<T> {
        self.root
            .map(|root| unsafe { Self::extreme(root, Dir::Left) })
    }

    fn last_raw(&self) -> Link<T> {
        self.root
            .map(|root| unsafe { Self::extreme(root, Dir::Right) })
    }

    // Follows `dir` children from `node` as far as possible.
    unsafe fn extreme(mut node: NonNull<T>, dir: Dir) -> NonNull<T> {
        while let Some(child) = unsafe { Self::links(node).child(dir) } {
            node = child;
        }

        node
    }

    /// Returns the element equal to `key` if there is one, and otherwise the smallest element
    /// greater than `key`.
    pub fn search_geq<K>(&self, key: &K) -> Option<Pin<&T>>
    where
        T: KeyedNode<Links<T, Tag>, K>,
        K: ?Sized,
    {
        let ptr = unsafe { Self::search_geq_at(self.root, key) }?;
        unsafe { Some(Pin::new_unchecked(ptr.as_ref())) }
    }

    /// Returns the element equal to `key` if there is one, and otherwise the largest element less
    /// than `key`.
    pub fn search_leq<K>(&self, key: &K) -> Option<Pin<&T>>
    where
        T: KeyedNode<Links<T, Tag>, K>,
        K: ?Sized,
    {
        let ptr = unsafe { Self::search_leq_at(self.root, key) }?;
        unsafe { Some(Pin::new_unchecked(ptr.as_ref())) }
    }

    // The subtree result only bounds `key`; it is compared against `node` with the node
    // comparator to pick the tighter of the two.
    unsafe fn search_geq_at<K>(link: Link<T>, key: &K) -> Link<T>
    where
        T: KeyedNode<Links<T, Tag>, K>,
        K: ?Sized,
    {
        let node = link?;

        unsafe {
            match node.as_ref().cmp_key(key) {
                Ordering::Equal => Some(node),
                Ordering::Less => Self::search_geq_at(Self::links(node).right(), key),
                Ordering::Greater => match Self::search_geq_at(Self::links(node).left(), key) {
                    Some(found) if found.as_ref().cmp_node(node.as_ref()) == Ordering::Less => {
                        Some(found)
                    }
                    _ => Some(node),
                },
            }
        }
    }

    unsafe fn search_leq_at<K>(link: Link<T>, key: &K) -> Link<T>
    where
        T: KeyedNode<Links<T, Tag>, K>,
        K: ?Sized,
    {
        let node = link?;

        unsafe {
            match node.as_ref().cmp_key(key) {
                Ordering::Equal => Some(node),
                Ordering::Greater => Self::search_leq_at(Self::links(node).left(), key),
                Ordering::Less => match Self::search_leq_at(Self::links(node).right(), key) {
                    Some(found)
                        if found.as_ref().cmp_node(node.as_ref()) == Ordering::Greater =>
                    {
                        Some(found)
                    }
                    _ => Some(node),
                },
            }
        }
    }

    /// Removes `node` from the tree, returning its handle.
    ///
    /// The element is located by identity, not by comparison. If `node` is not linked into this
    /// tree, nothing happens and `None` is returned.
    ///
    /// This operation completes in _O(log(n))_ time.
    ///
    /// # Safety
    ///
    /// `node` must point to a live `T`. It need not be an element of this tree.
    pub unsafe fn remove(&mut self, node: NonNull<T>) -> Option<T::Handle> {
        let mut path = Path::new();

        if !unsafe { self.path_to(node, &mut path) } {
            log::trace!("remove: element is not linked into this tree");
            return None;
        }

        Some(unsafe { self.unlink_last(&mut path) })
    }

    /// Removes an element comparing equal to `key`, returning its handle.
    ///
    /// If no element matches, the tree is left unchanged and `None` is returned.
    pub fn remove_key<K>(&mut self, key: &K) -> Option<T::Handle>
    where
        T: KeyedNode<Links<T, Tag>, K>,
        K: ?Sized,
    {
        let mut path = Path::new();
        let mut opt_cur = self.root;

        loop {
            let Some(cur) = opt_cur else {
                log::trace!("remove_key: no element matches the key");
                return None;
            };

            path.push(cur);

            unsafe {
                opt_cur = match cur.as_ref().cmp_key(key) {
                    Ordering::Equal => break,
                    Ordering::Less => Self::links(cur).right(),
                    Ordering::Greater => Self::links(cur).left(),
                };
            }
        }

        Some(unsafe { self.unlink_last(&mut path) })
    }

    // Records the path from the root to `target`, which is located by identity. Descent follows
    // the node comparator; both subtrees are searched below elements equal to `target`.
    //
    // Returns `false`, leaving `path` as it was, if `target` is not in this tree.
    unsafe fn path_to(&self, target: NonNull<T>, path: &mut Path<T>) -> bool {
        unsafe {
            if !Self::links(target).is_linked() {
                return false;
            }

            Self::path_to_at(self.root, target, path)
        }
    }

    unsafe fn path_to_at(link: Link<T>, target: NonNull<T>, path: &mut Path<T>) -> bool {
        let Some(node) = link else {
            return false;
        };

        path.push(node);

        if same_node(node, target) {
            return true;
        }

        let found = unsafe {
            let links = Self::links(node);

            match target.as_ref().cmp_node(node.as_ref()) {
                Ordering::Less => Self::path_to_at(links.left(), target, path),
                Ordering::Greater => Self::path_to_at(links.right(), target, path),
                Ordering::Equal => {
                    Self::path_to_at(links.left(), target, path)
                        || Self::path_to_at(links.right(), target, path)
                }
            }
        };

        if !found {
            path.pop();
        }

        found
    }

    // Unlinks the last node of `path`, which must run from the root to that node, and rebalances
    // its ancestors.
    unsafe fn unlink_last(&mut self, path: &mut Path<T>) -> T::Handle {
        unsafe {
            let node = path.pop().expect("path must end at the node to unlink");
            let parent = path.last();
            let links = Self::links(node);

            match (links.left(), links.right()) {
                (Some(left), Some(right)) => {
                    // The in-order predecessor is spliced out of the low subtree and takes over
                    // the position, children and height of `node`.
                    let depth = path.len();
                    path.push(node);

                    let mut pred_parent = None;
                    let mut pred = left;
                    while let Some(next) = Self::links(pred).right() {
                        path.push(pred);
                        pred_parent = Some(pred);
                        pred = next;
                    }

                    let pred_links = Self::links(pred);
                    match pred_parent {
                        Some(p) => {
                            Self::links(p).set_child(Dir::Right, pred_links.left());
                        }
                        None => {
                            links.set_child(Dir::Left, pred_links.left());
                        }
                    }

                    pred_links.set_child(Dir::Left, links.left());
                    pred_links.set_child(Dir::Right, Some(right));
                    pred_links.set_height(links.height());

                    path.set(depth, pred);
                    self.replace_child_or_set_root(parent, node, Some(pred));
                }

                (left, right) => {
                    self.replace_child_or_set_root(parent, node, left.or(right));
                }
            }

            self.rebalance_path(path.as_slice());

            links.unlink();
            self.len -= 1;
            log::trace!("removed element, len = {}", self.len);

            T::from_ptr(node)
        }
    }

    /// Clears the tree, removing all elements.
    pub fn clear(&mut self) {
        let cleared = self.len;

        while let Some(root) = self.root {
            unsafe {
                let links = Self::links(root);

                match links.left() {
                    // Rotate until the root has no low child. Heights are not maintained since
                    // every node is about to be unlinked.
                    Some(left) => {
                        let left_links = Self::links(left);
                        links.set_child(Dir::Left, left_links.right());
                        left_links.set_child(Dir::Right, Some(root));
                        self.root = Some(left);
                    }

                    None => {
                        self.root = links.right();
                        links.unlink();
                        drop(T::from_ptr(root));
                        self.len -= 1;
                    }
                }
            }
        }

        debug_assert_eq!(self.len(), 0);
        log::trace!("cleared {cleared} elements");
    }

    /// Walks the whole tree, calling the hooks of `visitor` on every element.
    pub fn walk<'tree, V>(&'tree self, visitor: &mut V)
    where
        T: 'tree,
        V: Visitor<'tree, T> + ?Sized,
    {
        unsafe { Self::walk_at(self.root, visitor) }
    }

    unsafe fn walk_at<'tree, V>(link: Link<T>, visitor: &mut V)
    where
        T: 'tree,
        V: Visitor<'tree, T> + ?Sized,
    {
        let Some(node) = link else {
            return;
        };

        unsafe {
            let links = Self::links(node);
            let node: &'tree T = node.as_ref();

            visitor.before(node);
            Self::walk_at(links.left(), visitor);
            visitor.during(node);
            Self::walk_at(links.right(), visitor);
            visitor.after(node);
        }
    }

    /// Calls `f` on every element in tree order.
    pub fn for_each<'tree, F>(&'tree self, f: F)
    where
        T: 'tree,
        F: FnMut(&'tree T),
    {
        struct InOrder<F>(F);

        impl<'tree, T: ?Sized + 'tree, F: FnMut(&'tree T)> Visitor<'tree, T> for InOrder<F> {
            fn during(&mut self, node: &'tree T) {
                (self.0)(node)
            }
        }

        self.walk(&mut InOrder(f));
    }

    /// Returns an iterator over all elements in ascending order.
    pub fn iter(&self) -> Range<'_, T, Tag> {
        self.range(Bound::Unbounded, Bound::Unbounded)
    }

    /// Returns an iterator over the elements between `start` and `end`.
    ///
    /// `Unbounded` stands for the first element as `start` and the last element as `end`, both
    /// included. If `end` comes before `start` the elements are produced in descending order.
    /// If both bounds are the same element, it is produced only when both bounds are inclusive.
    /// Distinct bounds that compare equal are ordered by their position in the tree.
    ///
    /// # Panics
    ///
    /// Panics if a bound is not an element of this tree.
    pub fn range(&self, start: Bound<&T>, end: Bound<&T>) -> Range<'_, T, Tag> {
        let (Some(first), Some(last)) = (self.first_raw(), self.last_raw()) else {
            return Range::empty();
        };

        let (start, include_start) = match start {
            Bound::Included(node) => (NonNull::from(node), true),
            Bound::Excluded(node) => (NonNull::from(node), false),
            Bound::Unbounded => (first, true),
        };

        let (end, include_end) = match end {
            Bound::Included(node) => (NonNull::from(node), true),
            Bound::Excluded(node) => (NonNull::from(node), false),
            Bound::Unbounded => (last, true),
        };

        Range::new(self, start, include_start, end, include_end)
    }

    /// Returns an iterator over the elements between the keys `start` and `end`.
    ///
    /// If `start` is greater than `end` the elements are produced in descending order. Each key
    /// resolves to its nearest element on the side facing the other key, and that element is
    /// excluded unless it equals an inclusive key. `Unbounded`, or a key with no element on that
    /// side, resolves to the edge of the tree.
    pub fn range_by_key<K>(&self, start: Bound<&K>, end: Bound<&K>) -> Range<'_, T, Tag>
    where
        T: KeyedNode<Links<T, Tag>, K>,
        K: Ord + ?Sized,
    {
        let (Some(first), Some(last)) = (self.first_raw(), self.last_raw()) else {
            return Range::empty();
        };

        let descending = match (start, end) {
            (
                Bound::Included(start) | Bound::Excluded(start),
                Bound::Included(end) | Bound::Excluded(end),
            ) => start > end,
            _ => false,
        };

        let root = self.root;
        let geq = |key: &K| unsafe { Self::search_geq_at(root, key) };
        let leq = |key: &K| unsafe { Self::search_leq_at(root, key) };

        let ((start, include_start), (end, include_end)) = if descending {
            (
                Self::resolve_key_bound(start, last, geq),
                Self::resolve_key_bound(end, first, leq),
            )
        } else {
            (
                Self::resolve_key_bound(start, first, leq),
                Self::resolve_key_bound(end, last, geq),
            )
        };

        Range::new(self, start, include_start, end, include_end)
    }

    // Returns the element a key bound starts or stops at, and whether it is included. `edge` is
    // used when there is no key or no element near it.
    fn resolve_key_bound<K>(
        bound: Bound<&K>,
        edge: NonNull<T>,
        nearest: impl FnOnce(&K) -> Link<T>,
    ) -> (NonNull<T>, bool)
    where
        T: KeyedNode<Links<T, Tag>, K>,
        K: ?Sized,
    {
        let (key, inclusive) = match bound {
            Bound::Included(key) => (key, true),
            Bound::Excluded(key) => (key, false),
            Bound::Unbounded => return (edge, true),
        };

        match nearest(key) {
            Some(node) => {
                let exact = unsafe { node.as_ref().cmp_key(key) } == Ordering::Equal;
                (node, inclusive && exact)
            }
            None => (edge, true),
        }
    }

    // Balance engine =========================================================

    /// Returns the links of the pointed-to node.
    #[inline]
    unsafe fn links<'a>(node: NonNull<T>) -> &'a Links<T, Tag> {
        unsafe { T::links(node).as_ref() }
    }

    #[inline]
    unsafe fn height_of(link: Link<T>) -> u8 {
        link.map_or(0, |node| unsafe { Self::links(node).height() })
    }

    #[inline]
    unsafe fn reheight(node: NonNull<T>) {
        unsafe {
            let links = Self::links(node);
            let tallest = cmp::max(
                Self::height_of(links.left()),
                Self::height_of(links.right()),
            );
            links.set_height(tallest.checked_add(1).unwrap());
        }
    }

    #[inline]
    unsafe fn balance(node: NonNull<T>) -> i16 {
        unsafe {
            let links = Self::links(node);
            i16::from(Self::height_of(links.left())) - i16::from(Self::height_of(links.right()))
        }
    }

    // Promotes the `!dir` child of `node` into its place; `node` becomes the `dir` child of the
    // promoted pivot. Returns the pivot, which the caller must link into `node`'s old slot.
    unsafe fn rotate(node: NonNull<T>, dir: Dir) -> NonNull<T> {
        unsafe {
            let node_links = Self::links(node);
            let pivot = node_links
                .child(!dir)
                .expect("rotation pivot must not be empty");
            let pivot_links = Self::links(pivot);

            node_links.set_child(!dir, pivot_links.child(dir));
            pivot_links.set_child(dir, Some(node));

            Self::reheight(node);
            Self::reheight(pivot);

            log::trace!("rotated subtree {dir:?}");

            pivot
        }
    }

    // Restores the height and balance of `node`, whose subtrees must already be balanced.
    // Returns the new root of the subtree.
    unsafe fn rebalance(node: NonNull<T>) -> NonNull<T> {
        unsafe {
            Self::reheight(node);

            let balance = Self::balance(node);
            let heavy = if balance > 1 {
                Dir::Left
            } else if balance < -1 {
                Dir::Right
            } else {
                return node;
            };

            let node_links = Self::links(node);
            let child = node_links
                .child(heavy)
                .expect("heavy side must not be empty");

            // A heavy child leaning inward needs a double rotation.
            let child_balance = Self::balance(child);
            let leans_inward = match heavy {
                Dir::Left => child_balance < 0,
                Dir::Right => child_balance > 0,
            };

            if leans_inward {
                node_links.set_child(heavy, Some(Self::rotate(child, heavy)));
            }

            Self::rotate(node, !heavy)
        }
    }

    // Rebalances every node of `path`, deepest first, relinking rotated subtrees into their
    // parents.
    unsafe fn rebalance_path(&mut self, path: &[NonNull<T>]) {
        for (depth, &node) in path.iter().enumerate().rev() {
            let subtree = unsafe { Self::rebalance(node) };

            if !same_node(subtree, node) {
                let parent = depth.checked_sub(1).map(|d| path[d]);
                unsafe { self.replace_child_or_set_root(parent, node, Some(subtree)) };
            }
        }
    }

    // Points the child slot of `parent` holding `old` at `new`, or makes `new` the root if there
    // is no parent.
    #[inline]
    unsafe fn replace_child_or_set_root(&mut self, parent: Link<T>, old: NonNull<T>, new: Link<T>) {
        match parent {
            Some(parent) => unsafe {
                let dir = Self::which_child(parent, old);
                Self::links(parent).set_child(dir, new);
            },
            None => self.root = new,
        }
    }

    unsafe fn which_child(parent: NonNull<T>, child: NonNull<T>) -> Dir {
        let links = unsafe { Self::links(parent) };

        if is_link_to(links.left(), child) {
            Dir::Left
        } else {
            debug_assert!(
                is_link_to(links.right(), child),
                "`child` must be a child of `parent`"
            );
            Dir::Right
        }
    }
}

// Nodes are identified by address.
#[inline]
pub(crate) fn same_node<T: ?Sized>(a: NonNull<T>, b: NonNull<T>) -> bool {
    ptr::addr_eq(a.as_ptr(), b.as_ptr())
}

#[inline]
pub(crate) fn is_link_to<T: ?Sized>(link: Link<T>, node: NonNull<T>) -> bool {
    link.is_some_and(|link| same_node(link, node))
}

impl<T, Tag> Drop for AvlTree<T, Tag>
where
    T: TreeNode<Links<T, Tag>> + ?Sized,
{
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T, Tag> Default for AvlTree<T, Tag>
where
    T: TreeNode<Links<T, Tag>> + ?Sized,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, Tag> fmt::Debug for AvlTree<T, Tag>
where
    T: TreeNode<Links<T, Tag>> + fmt::Debug + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T: ?Sized, Tag> Links<T, Tag> {
    /// Returns new, unlinked links.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: UnsafeCell::new(LinksInner {
                children: [None; 2],
                height: 0,
                _unpin: PhantomPinned,
            }),
            _tag: PhantomData,
        }
    }

    /// Returns `true` if the element owning these links is linked into a tree.
    #[inline]
    pub fn is_linked(&self) -> bool {
        self.height() != 0
    }

    #[inline]
    fn height(&self) -> u8 {
        unsafe { (*self.inner.get()).height }
    }

    #[inline]
    fn child(&self, dir: Dir) -> Link<T> {
        unsafe { (*self.inner.get()).children[dir as usize] }
    }

    #[inline]
    fn left(&self) -> Link<T> {
        self.child(Dir::Left)
    }

    #[inline]
    fn right(&self) -> Link<T> {
        self.child(Dir::Right)
    }

    // The setters write through the `UnsafeCell`; no reference into `inner` outlives a call.
    #[inline]
    fn set_child(&self, dir: Dir, child: Link<T>) {
        unsafe { (*self.inner.get()).children[dir as usize] = child };
    }

    #[inline]
    fn set_height(&self, height: u8) {
        unsafe { (*self.inner.get()).height = height };
    }

    #[inline]
    fn reset_leaf(&self) {
        self.set_child(Dir::Left, None);
        self.set_child(Dir::Right, None);
        self.set_height(1);
    }

    #[inline]
    fn unlink(&self) {
        self.set_child(Dir::Left, None);
        self.set_child(Dir::Right, None);
        self.set_height(0);
    }
}

impl<T: ?Sized, Tag> Default for Links<T, Tag> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized, Tag> fmt::Debug for Links<T, Tag> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Links")
            .field("left", &self.left())
            .field("right", &self.right())
            .field("height", &self.height())
            .finish()
    }
}

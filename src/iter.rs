use core::{cmp::Ordering, iter::FusedIterator, marker::PhantomData, ptr::NonNull};

use crate::{is_link_to, path::Path, same_node, AvlTree, Dir, Link, Links, TreeNode};

/// An iterator over a range of elements of an [`AvlTree`].
///
/// Created by [`AvlTree::range`], [`AvlTree::range_by_key`] and [`AvlTree::iter`]. The tree
/// stays borrowed while the iterator is alive.
pub struct Range<'tree, T, Tag = ()>
where
    T: TreeNode<Links<T, Tag>> + ?Sized,
{
    // Ancestors of the next element to be yielded, ending with that element.
    path: Path<T>,
    next: Link<T>,
    end: Link<T>,
    include_end: bool,
    dir: Dir,

    _tree: PhantomData<&'tree AvlTree<T, Tag>>,
}

impl<'tree, T, Tag> Range<'tree, T, Tag>
where
    T: TreeNode<Links<T, Tag>> + ?Sized,
{
    pub(crate) fn empty() -> Self {
        Range {
            path: Path::new(),
            next: None,
            end: None,
            include_end: false,
            dir: Dir::Right,
            _tree: PhantomData,
        }
    }

    pub(crate) fn new(
        tree: &'tree AvlTree<T, Tag>,
        start: NonNull<T>,
        include_start: bool,
        end: NonNull<T>,
        include_end: bool,
    ) -> Self {
        let mut path = Path::new();
        let mut end_path = Path::new();

        unsafe {
            assert!(
                tree.path_to(start, &mut path),
                "range start is not an element of this tree"
            );
            assert!(
                tree.path_to(end, &mut end_path),
                "range end is not an element of this tree"
            );
        }

        let (dir, include_start, include_end) = if same_node(start, end) {
            // A single element is produced only if both bounds include it.
            let include = include_start && include_end;
            (Dir::Right, include, include)
        } else {
            let dir = match unsafe { end.as_ref().cmp_node(start.as_ref()) } {
                Ordering::Greater => Dir::Right,
                Ordering::Less => Dir::Left,
                Ordering::Equal => unsafe { Self::travel_dir(&path, &end_path) },
            };
            (dir, include_start, include_end)
        };

        let mut range = Range {
            path,
            next: Some(start),
            end: Some(end),
            include_end,
            dir,
            _tree: PhantomData,
        };

        if !include_start {
            range.next = if same_node(start, end) {
                None
            } else {
                Some(range.advance())
            };
        }

        range
    }

    // Direction from the end of `from` to the distinct end of `to`, by in-order position.
    unsafe fn travel_dir(from: &Path<T>, to: &Path<T>) -> Dir {
        let (from, to) = (from.as_slice(), to.as_slice());
        let common = from
            .iter()
            .zip(to)
            .take_while(|&(&a, &b)| same_node(a, b))
            .count();
        let ancestor = from[common - 1];

        // Which subtree of the deepest common ancestor each path continues into, if any.
        let side = |path: &[NonNull<T>]| {
            path.get(common)
                .map(|&child| unsafe { AvlTree::<T, Tag>::which_child(ancestor, child) })
        };

        match (side(from), side(to)) {
            (Some(from_side), _) => !from_side,
            (None, Some(to_side)) => to_side,
            (None, None) => unreachable!("range bounds are distinct elements"),
        }
    }

    // Moves to the neighbor of the last node of the path in the direction of travel.
    fn advance(&mut self) -> NonNull<T> {
        let dir = self.dir;
        let cur = self
            .path
            .last()
            .expect("range iterator advanced past the root");

        unsafe {
            if let Some(child) = AvlTree::<T, Tag>::links(cur).child(dir) {
                self.path.push(child);

                let mut node = child;
                while let Some(next) = AvlTree::<T, Tag>::links(node).child(!dir) {
                    self.path.push(next);
                    node = next;
                }

                return node;
            }

            // Climb until arriving from the side opposite to the direction of travel.
            let mut child = cur;
            loop {
                self.path.pop();

                let Some(parent) = self.path.last() else {
                    panic!("range end is not reachable from the range start");
                };

                if is_link_to(AvlTree::<T, Tag>::links(parent).child(!dir), child) {
                    return parent;
                }

                child = parent;
            }
        }
    }
}

impl<'tree, T, Tag> Iterator for Range<'tree, T, Tag>
where
    T: TreeNode<Links<T, Tag>> + ?Sized + 'tree,
{
    type Item = &'tree T;

    fn next(&mut self) -> Option<Self::Item> {
        let cur = self.next?;

        if self.end.is_some_and(|end| same_node(cur, end)) {
            self.next = None;

            if !self.include_end {
                return None;
            }
        } else {
            self.next = Some(self.advance());
        }

        Some(unsafe { cur.as_ref() })
    }
}

impl<'tree, T, Tag> FusedIterator for Range<'tree, T, Tag> where
    T: TreeNode<Links<T, Tag>> + ?Sized + 'tree
{
}

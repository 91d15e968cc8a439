use core::ptr::NonNull;

use smallvec::SmallVec;

/// Number of ancestors stored inline before the path spills to the heap.
///
/// An AVL tree of height 64 holds more than 10^13 elements.
pub(crate) const INLINE_DEPTH: usize = 64;

/// The chain of nodes from the root down to some node of a tree.
///
/// `nodes[0]` is the root and every following entry is a child of the entry before it.
pub(crate) struct Path<T: ?Sized> {
    nodes: SmallVec<[NonNull<T>; INLINE_DEPTH]>,
}

impl<T: ?Sized> Path<T> {
    pub(crate) fn new() -> Path<T> {
        Path {
            nodes: SmallVec::new(),
        }
    }

    #[inline]
    pub(crate) fn push(&mut self, node: NonNull<T>) {
        self.nodes.push(node);
    }

    #[inline]
    pub(crate) fn pop(&mut self) -> Option<NonNull<T>> {
        self.nodes.pop()
    }

    #[inline]
    pub(crate) fn last(&self) -> Option<NonNull<T>> {
        self.nodes.last().copied()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub(crate) fn set(&mut self, depth: usize, node: NonNull<T>) {
        self.nodes[depth] = node;
    }

    #[inline]
    pub(crate) fn as_slice(&self) -> &[NonNull<T>] {
        &self.nodes
    }

    #[inline]
    pub(crate) fn spilled(&self) -> bool {
        self.nodes.spilled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_stays_inline_for_realistic_depths() {
        let mut slots = [0u32; INLINE_DEPTH + 1];
        let mut path: Path<u32> = Path::new();

        for slot in slots.iter_mut().take(INLINE_DEPTH) {
            path.push(NonNull::from(slot));
        }
        assert!(!path.spilled());
        assert_eq!(path.len(), INLINE_DEPTH);

        path.push(NonNull::from(&mut slots[INLINE_DEPTH]));
        assert!(path.spilled());

        let top = path.pop().unwrap();
        assert_eq!(top, NonNull::from(&mut slots[INLINE_DEPTH]));
        assert_eq!(path.last(), Some(NonNull::from(&mut slots[INLINE_DEPTH - 1])));
    }
}

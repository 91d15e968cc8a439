use core::{cmp::Ordering, fmt, ptr::NonNull};

use alloc::vec::Vec;

use crate::{AvlTree, Links, TreeNode};

/// A broken invariant found by [`AvlTree::check`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Violation {
    /// The cached height does not match the height computed from the children.
    Height {
        /// The height stored in the node's links.
        cached: u8,
        /// One more than the greater height of the node's subtrees.
        computed: u8,
    },
    /// The subtree heights differ by more than one.
    Balance {
        /// Height of the low subtree.
        left: u8,
        /// Height of the high subtree.
        right: u8,
    },
    /// The low child compares greater than the node.
    LowChildGreater,
    /// The high child compares less than the node.
    HighChildLess,
}

/// The error returned by [`AvlTree::check`].
#[derive(Debug)]
pub struct CheckError<'tree, T: ?Sized> {
    node: &'tree T,
    child: Option<&'tree T>,
    violation: Violation,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::Height { cached, computed } => {
                write!(f, "cached height {cached} does not match computed height {computed}")
            }
            Violation::Balance { left, right } => {
                write!(f, "subtree heights {left} and {right} differ by more than one")
            }
            Violation::LowChildGreater => f.write_str("low child compares greater than its parent"),
            Violation::HighChildLess => f.write_str("high child compares less than its parent"),
        }
    }
}

impl<'tree, T: ?Sized> CheckError<'tree, T> {
    /// Returns the node at which the violation was found.
    pub fn node(&self) -> &'tree T {
        self.node
    }

    /// Returns the child involved in an ordering violation.
    pub fn child(&self) -> Option<&'tree T> {
        self.child
    }

    /// Returns which invariant is broken.
    pub fn violation(&self) -> Violation {
        self.violation
    }
}

impl<T: fmt::Debug + ?Sized> fmt::Display for CheckError<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {:?}", self.violation, self.node)?;

        if let Some(child) = self.child {
            write!(f, " (child {child:?})")?;
        }

        Ok(())
    }
}

impl<T: fmt::Debug + ?Sized> core::error::Error for CheckError<'_, T> {}

impl<T, Tag> AvlTree<T, Tag>
where
    T: TreeNode<Links<T, Tag>> + ?Sized,
{
    /// Checks the local invariants at `node`, an element of this tree.
    ///
    /// The cached height must be one more than the taller subtree, the subtree heights must differ
    /// by at most one, the low child must not compare greater than `node` and the high child must
    /// not compare less than it. Children comparing equal are accepted on either side, since
    /// rotations move equal elements across each other.
    pub fn check<'tree>(&'tree self, node: &'tree T) -> Result<(), CheckError<'tree, T>> {
        let fail = |violation, child| {
            Err(CheckError {
                node,
                child,
                violation,
            })
        };

        unsafe {
            let links = Self::links(NonNull::from(node));
            let (left, right) = (links.left(), links.right());
            let (left_height, right_height) = (Self::height_of(left), Self::height_of(right));

            let computed = left_height.max(right_height).saturating_add(1);
            if links.height() != computed {
                return fail(
                    Violation::Height {
                        cached: links.height(),
                        computed,
                    },
                    None,
                );
            }

            if left_height.abs_diff(right_height) > 1 {
                return fail(
                    Violation::Balance {
                        left: left_height,
                        right: right_height,
                    },
                    None,
                );
            }

            if let Some(left) = left {
                let left = left.as_ref();
                if left.cmp_node(node) == Ordering::Greater {
                    return fail(Violation::LowChildGreater, Some(left));
                }
            }

            if let Some(right) = right {
                let right = right.as_ref();
                if right.cmp_node(node) == Ordering::Less {
                    return fail(Violation::HighChildLess, Some(right));
                }
            }
        }

        Ok(())
    }

    /// Checks every element of the tree, returning all violations found.
    pub fn check_all(&self) -> Vec<CheckError<'_, T>> {
        let mut errors = Vec::new();

        self.for_each(|node| {
            if let Err(error) = self.check(node) {
                errors.push(error);
            }
        });

        if !errors.is_empty() {
            log::debug!("tree check found {} violations", errors.len());
        }

        errors
    }

    #[doc(hidden)]
    #[track_caller]
    pub fn assert_invariants(&self)
    where
        T: fmt::Debug,
    {
        let mut count = 0;
        let mut prev: Option<&T> = None;

        self.for_each(|node| {
            if let Err(error) = self.check(node) {
                panic!("invariant violated: {error}");
            }

            if let Some(prev) = prev {
                assert_ne!(
                    prev.cmp_node(node),
                    Ordering::Greater,
                    "elements out of order: {prev:?} before {node:?}"
                );
            }

            prev = Some(node);
            count += 1;
        });

        assert_eq!(count, self.len(), "length does not match the linked elements");
    }
}

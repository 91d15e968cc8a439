use std::{cmp::Ordering, ops::Bound, ptr::NonNull};

use cordyceps::Linked;
use cordyceps_avl::{AvlTree, KeyedNode, Links, TreeNode};

#[derive(Debug)]
#[repr(C)]
struct TestNode {
    links: Links<TestNode>,
    key: u32,
}

impl TestNode {
    fn new(key: u32) -> Box<TestNode> {
        Box::new(TestNode {
            links: Links::new(),
            key,
        })
    }
}

unsafe impl Linked<Links<TestNode>> for TestNode {
    type Handle = Box<TestNode>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        NonNull::from(Box::leak(r))
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<TestNode>> {
        // SAFETY: Self is #[repr(C)] and `links` is first field
        ptr.cast()
    }
}

impl TreeNode<Links<TestNode>> for TestNode {
    fn cmp_node(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl KeyedNode<Links<TestNode>, u32> for TestNode {
    fn cmp_key(&self, key: &u32) -> Ordering {
        self.key.cmp(key)
    }
}

fn main() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    for key in [2, 0, 3, 4, 5, 1, 6] {
        tree.insert(TestNode::new(key));
        tree.assert_invariants();
        println!(
            "height {}: {:?}",
            tree.height(),
            tree.iter().map(|node| node.key).collect::<Vec<_>>()
        );
    }

    let descending: Vec<u32> = tree
        .range_by_key(Bound::Included(&5), Bound::Excluded(&1))
        .map(|node| node.key)
        .collect();
    println!("5 down to 1: {descending:?}");

    let zero = tree.remove_key(&0).unwrap().key;
    assert_eq!(zero, 0);
    tree.assert_invariants();

    drop(tree);
}

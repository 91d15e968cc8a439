use std::{cmp::Ordering, hint::black_box, ptr::NonNull};

use cordyceps::Linked;
use cordyceps_avl::{AvlTree, KeyedNode, Links, TreeNode};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

const N: u64 = 10_000;

#[derive(Debug)]
#[repr(C)]
struct Entry {
    links: Links<Entry>,
    key: u64,
}

impl Entry {
    fn new(key: u64) -> Box<Entry> {
        Box::new(Entry {
            links: Links::new(),
            key,
        })
    }
}

unsafe impl Linked<Links<Entry>> for Entry {
    type Handle = Box<Entry>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        NonNull::from(Box::leak(r))
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        Box::from_raw(ptr.as_ptr())
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<Entry>> {
        // SAFETY: Self is #[repr(C)] and `links` is first field
        ptr.cast()
    }
}

impl TreeNode<Links<Entry>> for Entry {
    fn cmp_node(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl KeyedNode<Links<Entry>, u64> for Entry {
    fn cmp_key(&self, key: &u64) -> Ordering {
        self.key.cmp(key)
    }
}

fn filled() -> AvlTree<Entry> {
    let mut tree = AvlTree::new();
    for key in 0..N {
        tree.insert(Entry::new(key));
    }
    tree
}

fn bench_linear(c: &mut Criterion) {
    c.bench_function("linear insert", |b| b.iter(filled));

    let tree = filled();
    let probes: Vec<Box<Entry>> = (0..N).map(Entry::new).collect();

    c.bench_function("linear lookup", |b| {
        b.iter(|| {
            for probe in &probes {
                black_box(tree.lookup(probe));
            }
        })
    });

    c.bench_function("linear lookup_key", |b| {
        b.iter(|| {
            for key in 0..N {
                black_box(tree.lookup_key(&key));
            }
        })
    });

    c.bench_function("linear remove", |b| {
        b.iter_batched(
            filled,
            |mut tree| {
                for key in 0..N {
                    let node = NonNull::from(tree.lookup_key(&key).unwrap().get_ref());
                    black_box(unsafe { tree.remove(node) });
                }
            },
            BatchSize::LargeInput,
        )
    });

    c.bench_function("linear remove_key", |b| {
        b.iter_batched(
            filled,
            |mut tree| {
                for key in 0..N {
                    black_box(tree.remove_key(&key));
                }
            },
            BatchSize::LargeInput,
        )
    });

    c.bench_function("linear range", |b| {
        b.iter(|| tree.iter().map(|entry| entry.key).sum::<u64>())
    });
}

criterion_group!(benches, bench_linear);
criterion_main!(benches);

use std::{collections::BTreeMap, fmt, ops::Bound, prelude::v1::*, ptr::NonNull};

use arbitrary::Arbitrary;
use cordyceps::Linked;
use proptest::strategy::{Just, Strategy};

use crate::{AvlTree, KeyedNode, Links, TreeNode};

#[derive(Debug)]
#[repr(C)]
pub struct TestNode {
    pub links: Links<TestNode>,
    pub key: u32,
}

impl TestNode {
    pub fn new(key: u32) -> Box<TestNode> {
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
    fn cmp_node(&self, other: &Self) -> core::cmp::Ordering {
        self.key.cmp(&other.key)
    }
}

impl KeyedNode<Links<TestNode>, u32> for TestNode {
    fn cmp_key(&self, key: &u32) -> core::cmp::Ordering {
        self.key.cmp(key)
    }
}

impl fmt::Display for TestNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)
    }
}

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum ItemValue {
    Index(usize),
    Random(u32),
}

proptest::prop_compose! {
    fn index_strategy()(
        index in 0usize..1000,
    ) -> ItemValue {
        ItemValue::Index(index)
    }
}

proptest::prop_compose! {
    fn random_strategy()(
        random in 0u32..1000,
    ) -> ItemValue {
        ItemValue::Random(random)
    }
}

fn value_strategy() -> impl Strategy<Value = ItemValue> {
    proptest::prop_oneof![index_strategy(), random_strategy()]
}

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum Op {
    Insert(ItemValue),
    Lookup(ItemValue),
    RemoveKey(ItemValue),
    RemoveNode(ItemValue),
    First,
    PopFirst,
    Last,
    PopLast,
    SearchGeq(ItemValue),
    SearchLeq(ItemValue),
    Range {
        start: ItemValue,
        start_inclusive: bool,
        end: ItemValue,
        end_inclusive: bool,
    },
}

impl Op {
    fn finalize(self, distinct: &[u32]) -> FinalOp {
        fn get_value(v: &[u32], i: ItemValue) -> u32 {
            match i {
                ItemValue::Index(idx) => {
                    if v.is_empty() {
                        idx as u32
                    } else {
                        v[idx % v.len()]
                    }
                }
                ItemValue::Random(v) => v,
            }
        }

        match self {
            Op::Insert(item) => FinalOp::Insert(get_value(distinct, item)),
            Op::Lookup(item) => FinalOp::Lookup(get_value(distinct, item)),
            Op::RemoveKey(item) => FinalOp::RemoveKey(get_value(distinct, item)),
            Op::RemoveNode(item) => FinalOp::RemoveNode(get_value(distinct, item)),
            Op::First => FinalOp::First,
            Op::PopFirst => FinalOp::PopFirst,
            Op::Last => FinalOp::Last,
            Op::PopLast => FinalOp::PopLast,
            Op::SearchGeq(item) => FinalOp::SearchGeq(get_value(distinct, item)),
            Op::SearchLeq(item) => FinalOp::SearchLeq(get_value(distinct, item)),
            Op::Range {
                start,
                start_inclusive,
                end,
                end_inclusive,
            } => {
                let (start, end) = (get_value(distinct, start), get_value(distinct, end));
                FinalOp::Range(
                    bound(start, start_inclusive),
                    bound(end, end_inclusive),
                )
            }
        }
    }
}

fn bound(value: u32, inclusive: bool) -> Bound<u32> {
    if inclusive {
        Bound::Included(value)
    } else {
        Bound::Excluded(value)
    }
}

#[derive(Copy, Clone, Debug)]
enum FinalOp {
    Insert(u32),
    Lookup(u32),
    RemoveKey(u32),
    RemoveNode(u32),
    First,
    PopFirst,
    Last,
    PopLast,
    SearchGeq(u32),
    SearchLeq(u32),
    Range(Bound<u32>, Bound<u32>),
}

pub fn op_strategy() -> impl Strategy<Value = Op> {
    proptest::prop_oneof![
        value_strategy().prop_map(Op::Insert),
        value_strategy().prop_map(Op::Lookup),
        value_strategy().prop_map(Op::RemoveKey),
        value_strategy().prop_map(Op::RemoveNode),
        Just(Op::First),
        Just(Op::PopFirst),
        Just(Op::Last),
        Just(Op::PopLast),
        value_strategy().prop_map(Op::SearchGeq),
        value_strategy().prop_map(Op::SearchLeq),
        (
            value_strategy(),
            proptest::bool::ANY,
            value_strategy(),
            proptest::bool::ANY
        )
            .prop_map(|(start, start_inclusive, end, end_inclusive)| Op::Range {
                start,
                start_inclusive,
                end,
                end_inclusive,
            }),
    ]
}

/// A multiset of keys, the reference for an [`AvlTree`] holding duplicates.
#[derive(Default)]
struct Multiset {
    counts: BTreeMap<u32, usize>,
    len: usize,
}

impl Multiset {
    fn insert(&mut self, key: u32) {
        *self.counts.entry(key).or_default() += 1;
        self.len += 1;
    }

    fn remove(&mut self, key: u32) -> Option<u32> {
        let count = self.counts.get_mut(&key)?;
        *count -= 1;
        if *count == 0 {
            self.counts.remove(&key);
        }
        self.len -= 1;
        Some(key)
    }

    fn count(&self, key: u32) -> usize {
        self.counts.get(&key).copied().unwrap_or(0)
    }

    fn expand(&self, range: (Bound<u32>, Bound<u32>)) -> Vec<u32> {
        self.counts
            .range(range)
            .flat_map(|(&key, &count)| core::iter::repeat(key).take(count))
            .collect()
    }
}

pub fn run_btree_equivalence(ops: Vec<Op>) {
    let mut model = Multiset::default();
    let mut avl: AvlTree<TestNode> = AvlTree::new();

    #[inline]
    #[allow(clippy::boxed_local)]
    fn node_key(node: Box<TestNode>) -> u32 {
        node.key
    }

    for (op_id, op) in ops.into_iter().enumerate() {
        let distinct: Vec<u32> = model.counts.keys().copied().collect();
        let final_op = op.finalize(&distinct);

        match final_op {
            FinalOp::Insert(value) => {
                model.insert(value);
                let ptr = avl.insert(TestNode::new(value));

                assert_eq!(unsafe { ptr.as_ref().key }, value, "Op #{op_id}: {final_op:?}");
            }

            FinalOp::Lookup(value) => {
                let from_model = (model.count(value) > 0).then_some(value);
                let from_avl = avl.lookup_key(&value).map(|node| node.key);

                assert_eq!(from_model, from_avl, "Op #{op_id}: {final_op:?}");
            }

            FinalOp::RemoveKey(value) => {
                let from_model = model.remove(value);
                let from_avl = avl.remove_key(&value).map(node_key);

                assert_eq!(from_model, from_avl, "Op #{op_id}: {final_op:?}");
            }

            FinalOp::RemoveNode(value) => {
                let found = avl.lookup_key(&value).map(|node| NonNull::from(node.get_ref()));

                match found {
                    Some(ptr) => {
                        let removed = unsafe { avl.remove(ptr) }.map(node_key);
                        assert_eq!(model.remove(value), removed, "Op #{op_id}: {final_op:?}");
                    }
                    None => {
                        // An element that was never linked is not found by identity.
                        let stray = TestNode::new(value);
                        let removed = unsafe { avl.remove(NonNull::from(&*stray)) };
                        assert!(removed.is_none(), "Op #{op_id}: {final_op:?}");
                        assert_eq!(model.count(value), 0);
                    }
                }
            }

            FinalOp::First => {
                let from_model = model.counts.keys().next().copied();
                let from_avl = avl.first().map(|node| node.key);

                assert_eq!(from_model, from_avl, "Op #{op_id}: {final_op:?}");
            }

            FinalOp::PopFirst => {
                let from_model = model.counts.keys().next().copied();
                let from_model = from_model.and_then(|key| model.remove(key));

                let first = avl.first().map(|node| NonNull::from(node.get_ref()));
                let from_avl = first.and_then(|ptr| unsafe { avl.remove(ptr) }.map(node_key));

                assert_eq!(from_model, from_avl, "Op #{op_id}: {final_op:?}");
            }

            FinalOp::Last => {
                let from_model = model.counts.keys().next_back().copied();
                let from_avl = avl.last().map(|node| node.key);

                assert_eq!(from_model, from_avl, "Op #{op_id}: {final_op:?}");
            }

            FinalOp::PopLast => {
                let from_model = model.counts.keys().next_back().copied();
                let from_model = from_model.and_then(|key| model.remove(key));

                let last = avl.last().map(|node| NonNull::from(node.get_ref()));
                let from_avl = last.and_then(|ptr| unsafe { avl.remove(ptr) }.map(node_key));

                assert_eq!(from_model, from_avl, "Op #{op_id}: {final_op:?}");
            }

            FinalOp::SearchGeq(value) => {
                let from_model = model.counts.range(value..).next().map(|(&k, _)| k);
                let from_avl = avl.search_geq(&value).map(|node| node.key);

                assert_eq!(from_model, from_avl, "Op #{op_id}: {final_op:?}");
            }

            FinalOp::SearchLeq(value) => {
                let from_model = model.counts.range(..=value).next_back().map(|(&k, _)| k);
                let from_avl = avl.search_leq(&value).map(|node| node.key);

                assert_eq!(from_model, from_avl, "Op #{op_id}: {final_op:?}");
            }

            FinalOp::Range(start, end) => {
                let from_avl: Vec<u32> = avl
                    .range_by_key(start.as_ref(), end.as_ref())
                    .map(|node| node.key)
                    .collect();

                let (Bound::Included(from) | Bound::Excluded(from)) = start else {
                    unreachable!()
                };
                let (Bound::Included(to) | Bound::Excluded(to)) = end else {
                    unreachable!()
                };

                let descending = from > to;
                let (lo, hi) = (from.min(to), from.max(to));
                let (lo_bound, hi_bound) = if descending { (end, start) } else { (start, end) };

                // A bound resolved to one of several equal elements may cover only some of them.
                let resolved_unique = [
                    model.counts.range(..=lo).next_back(),
                    model.counts.range(hi..).next(),
                ]
                .into_iter()
                .flatten()
                .all(|(_, &count)| count == 1);

                if resolved_unique {
                    let mut expected = match (start, end) {
                        _ if lo < hi => model.expand((lo_bound, hi_bound)),
                        (Bound::Included(_), Bound::Included(_)) => model.expand((start, end)),
                        // Equal keys with an exclusive side.
                        _ => Vec::new(),
                    };
                    if descending {
                        expected.reverse();
                    }

                    assert_eq!(expected, from_avl, "Op #{op_id}: {final_op:?}");
                } else if descending {
                    assert!(
                        from_avl.windows(2).all(|w| w[0] >= w[1]),
                        "Op #{op_id}: {final_op:?}"
                    );
                } else {
                    assert!(
                        from_avl.windows(2).all(|w| w[0] <= w[1]),
                        "Op #{op_id}: {final_op:?}"
                    );
                }
            }
        }

        avl.assert_invariants();
        assert_eq!(model.len, avl.len());
        assert!(model.expand((Bound::Unbounded, Bound::Unbounded))
            .into_iter()
            .eq(avl.iter().map(|node| node.key)));
    }
}

/// A range over elements of the tree, given as indices into its sorted contents.
#[derive(Copy, Clone, Debug, Arbitrary)]
pub struct RangeQuery {
    pub start: Option<usize>,
    pub start_inclusive: bool,
    pub end: Option<usize>,
    pub end_inclusive: bool,
}

pub fn range_query_strategy() -> impl Strategy<Value = RangeQuery> {
    (
        proptest::option::of(0usize..200),
        proptest::bool::ANY,
        proptest::option::of(0usize..200),
        proptest::bool::ANY,
    )
        .prop_map(
            |(start, start_inclusive, end, end_inclusive)| RangeQuery {
                start,
                start_inclusive,
                end,
                end_inclusive,
            },
        )
}

#[derive(Clone, Debug)]
pub struct RangeEquivalenceInput {
    pub values: Vec<u32>,
    pub queries: Vec<RangeQuery>,
}

impl<'a> arbitrary::Arbitrary<'a> for RangeEquivalenceInput {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        fn value(u: &mut arbitrary::Unstructured<'_>) -> u32 {
            u32::arbitrary(u).unwrap_or(0)
        }

        fn query(u: &mut arbitrary::Unstructured<'_>) -> RangeQuery {
            RangeQuery::arbitrary(u).unwrap_or(RangeQuery {
                start: None,
                start_inclusive: true,
                end: None,
                end_inclusive: true,
            })
        }

        let num_values = u8::arbitrary(u)? % 100;
        let num_queries = u8::arbitrary(u)? % 100;

        let values = core::iter::repeat_with(|| value(u))
            .take(num_values.into())
            .collect();

        let queries = core::iter::repeat_with(|| query(u))
            .take(num_queries.into())
            .collect();

        Ok(RangeEquivalenceInput { values, queries })
    }
}

/// Checks element ranges, in both directions, against slices of a sorted `Vec`.
pub fn run_range_equivalence(mut values: Vec<u32>, queries: Vec<RangeQuery>) {
    values.sort_unstable();
    values.dedup();

    let mut avl: AvlTree<TestNode> = AvlTree::new();
    for &value in &values {
        avl.insert(TestNode::new(value));
    }
    avl.assert_invariants();

    for query in queries {
        let from_avl: Vec<u32>;
        let expected: Vec<u32>;

        if values.is_empty() {
            from_avl = avl.iter().map(|node| node.key).collect();
            expected = Vec::new();
        } else {
            let last = values.len() - 1;
            let start = query.start.map(|i| i % values.len());
            let end = query.end.map(|i| i % values.len());

            let element = |idx: usize| {
                avl.lookup_key(&values[idx])
                    .map(|node| node.get_ref())
                    .expect("value was inserted")
            };
            let to_bound = |idx: Option<usize>, inclusive: bool| match idx {
                Some(idx) if inclusive => Bound::Included(element(idx)),
                Some(idx) => Bound::Excluded(element(idx)),
                None => Bound::Unbounded,
            };

            from_avl = avl
                .range(
                    to_bound(start, query.start_inclusive),
                    to_bound(end, query.end_inclusive),
                )
                .map(|node| node.key)
                .collect();

            let (s, s_inc) = (start.unwrap_or(0), start.is_none() || query.start_inclusive);
            let (e, e_inc) = (end.unwrap_or(last), end.is_none() || query.end_inclusive);

            expected = if s == e {
                if s_inc && e_inc {
                    std::vec![values[s]]
                } else {
                    Vec::new()
                }
            } else if s < e {
                let lo = if s_inc { s } else { s + 1 };
                let hi = if e_inc { e + 1 } else { e };
                values[lo..hi.max(lo)].to_vec()
            } else {
                let hi = if s_inc { s + 1 } else { s };
                let lo = if e_inc { e } else { e + 1 };
                values[lo..hi.max(lo)].iter().rev().copied().collect()
            };
        }

        assert_eq!(expected, from_avl, "{query:?} over {values:?}");
    }
}

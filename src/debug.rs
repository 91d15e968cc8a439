use alloc::{collections::VecDeque, string::String};
use core::{fmt, ptr::NonNull};

use crate::{AvlTree, Links, TreeNode};

impl<T, Tag> AvlTree<T, Tag>
where
    T: TreeNode<Links<T, Tag>> + fmt::Display + ?Sized,
{
    /// Writes the tree as a Graphviz `digraph`, one rank per level.
    ///
    /// Nodes are labelled `element:height`. Empty child slots are drawn as points.
    pub fn dotgraph<W>(&self, name: &str, mut w: W) -> fmt::Result
    where
        W: fmt::Write,
    {
        let root = match self.root {
            Some(r) => r,
            None => return write!(w, "digraph \"graph-{name}\" {{}}"),
        };

        enum Item<T: ?Sized> {
            Node(NonNull<T>),
            Missing(u32),
        }

        let mut queue = VecDeque::new();
        queue.push_back(Item::Node(root));

        write!(
            w,
            "digraph \"graph-{name}\" {{\n subgraph \"subgraph-{name}\" {{"
        )?;

        let mut missing = 0;
        let mut edges = String::new();

        while !queue.is_empty() {
            use fmt::Write;

            write!(w, "{{rank=same; ")?;

            for _ in 0..queue.len() {
                let node = match queue.pop_front() {
                    Some(Item::Node(node)) => node,
                    Some(Item::Missing(id)) => {
                        write!(w, "\"graph{name}-missing{id}\" [shape=point]; ")?;
                        continue;
                    }
                    None => break,
                };

                // Elements may compare equal, so nodes are identified by address.
                let id = node.as_ptr() as *const () as usize;
                let links = unsafe { Self::links(node) };
                let label = unsafe { node.as_ref() };
                write!(
                    w,
                    "\"graph{name}-{id:x}\" [label=\"{label}:{}\"]; ",
                    links.height()
                )?;

                for child in [links.left(), links.right()] {
                    match child {
                        Some(child) => {
                            let child_id = child.as_ptr() as *const () as usize;
                            queue.push_back(Item::Node(child));
                            writeln!(
                                edges,
                                "\"graph{name}-{id:x}\" -> \"graph{name}-{child_id:x}\";"
                            )?;
                        }
                        None => {
                            queue.push_back(Item::Missing(missing));
                            writeln!(
                                edges,
                                "\"graph{name}-{id:x}\" -> \"graph{name}-missing{missing}\";"
                            )?;
                            missing += 1;
                        }
                    }
                }
            }

            writeln!(w, "}}")?;
        }

        w.write_str(&edges)?;

        w.write_str(" }\n}")
    }
}

//! Alias analysis over a graph snapshot.
//!
//! [`AliasDb`] partitions the values of a graph into alias classes. Two values in the same class
//! may refer to the same memory; values in different classes never do. A class is *written* if
//! any node writes into the memory of one of its members.
//!
//! # Rules
//!
//! - The output of a node whose kind has [`OpEffects::ALIASES_SELF`] joins the class of the
//!   node's first input (views, in-place writes and list appends).
//! - Each output of a `prim::If` joins the values returned at the same position by both branches.
//! - Graph inputs of the same mutable type family may alias each other, since the caller can
//!   pass the same tensor (or list) twice.
//! - The first input of a node whose kind has [`OpEffects::WRITES_SELF`] marks its class
//!   written.
//!
//! List elements are not tracked separately: the only operations reading list contents
//! consume the list as a whole at the point of use.
//!
//! # Snapshot Semantics
//!
//! The database reflects the graph at construction time. Values created afterwards form
//! singleton classes without writers. Passes build one database, use it for the whole
//! traversal, and discard it with the pass.
//!
//! # Examples
//!
//! ```rust
//! use catopt::{analysis::AliasDb, ir::{GraphBuilder, Type}};
//!
//! let graph = GraphBuilder::new().build_with(|g| {
//!     let x = g.input(Type::tensor_of([4]));
//!     let view = g.slice_const(x, 0, 0, 2);
//!     let fresh = g.relu(x);
//!     let one = g.add_(view, fresh);
//!     g.ret(&[one, fresh]);
//! });
//! let aliases = AliasDb::new(&graph);
//!
//! let x = graph.inputs()[0];
//! let fresh = graph.outputs()[1];
//! assert!(aliases.has_writers(x));
//! assert!(!aliases.has_writers(fresh));
//! ```

use std::collections::HashSet;

use crate::ir::{Graph, NodeId, NodeKind, OpEffects, Type, ValueId};

/// Union-find with path halving.
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[rb] = ra;
        }
    }
}

/// Alias classes and written classes of a graph snapshot.
#[derive(Debug, Clone)]
pub struct AliasDb {
    class: Vec<Option<usize>>,
    written: Vec<bool>,
}

impl AliasDb {
    /// Analyzes `graph` and returns the alias database for its current state.
    #[must_use]
    pub fn new(graph: &Graph) -> Self {
        let len = graph.value_capacity();
        let mut sets = UnionFind::new(len);
        let order = graph.nodes_in_program_order();

        let mut first_tensor = None;
        let mut first_list = None;
        for &input in graph.inputs() {
            let family = match graph.value(input).ty() {
                Type::Tensor(_) => &mut first_tensor,
                Type::List(_) => &mut first_list,
                _ => continue,
            };
            match *family {
                Some(first) => sets.union(first, input.index()),
                None => *family = Some(input.index()),
            }
        }

        for &node in &order {
            let data = graph.node(node);
            let effects = data.kind().effects();
            if effects.contains(OpEffects::ALIASES_SELF) {
                if let (Some(&input), Some(&output)) = (data.inputs().first(), data.outputs().first())
                {
                    sets.union(input.index(), output.index());
                }
            }
            if data.kind() == NodeKind::If {
                for &block in data.blocks() {
                    for (&output, &yielded) in data.outputs().iter().zip(graph.block_outputs(block))
                    {
                        sets.union(output.index(), yielded.index());
                    }
                }
            }
        }

        let class: Vec<Option<usize>> = (0..len)
            .map(|i| graph.contains_value(ValueId::new(i)).then(|| sets.find(i)))
            .collect();

        let mut written = vec![false; len];
        for &node in &order {
            let data = graph.node(node);
            if data.kind().effects().contains(OpEffects::WRITES_SELF) {
                if let Some(Some(root)) = data.inputs().first().map(|v| class[v.index()]) {
                    written[root] = true;
                }
            }
        }

        let db = Self { class, written };
        log::debug!(
            "alias analysis: {} values, {} written classes",
            len,
            db.written.iter().filter(|&&w| w).count()
        );
        db
    }

    fn class_of(&self, value: ValueId) -> Option<usize> {
        self.class.get(value.index()).copied().flatten()
    }

    /// Returns `true` if any node writes to memory `value` may refer to.
    #[must_use]
    pub fn has_writers(&self, value: ValueId) -> bool {
        self.class_of(value).is_some_and(|c| self.written[c])
    }

    /// Returns `true` if `a` and `b` may refer to the same memory.
    #[must_use]
    pub fn may_alias(&self, a: ValueId, b: ValueId) -> bool {
        if a == b {
            return true;
        }
        matches!((self.class_of(a), self.class_of(b)), (Some(ca), Some(cb)) if ca == cb)
    }

    /// Returns `true` if `node`, or any node nested in its blocks, writes to memory `value` may
    /// refer to.
    #[must_use]
    pub fn writes_to_alias_of(&self, graph: &Graph, node: NodeId, value: ValueId) -> bool {
        let data = graph.node(node);
        if data.kind().effects().contains(OpEffects::WRITES_SELF)
            && data.inputs().first().is_some_and(|&t| self.may_alias(t, value))
        {
            return true;
        }
        data.blocks().iter().any(|&block| {
            graph
                .block(block)
                .nodes()
                .iter()
                .any(|&inner| self.writes_to_alias_of(graph, inner, value))
        })
    }

    /// Returns `true` if `node` can be moved to immediately before `before` without changing
    /// the meaning of the program.
    ///
    /// Both nodes must be placed in the same block. A node can always stay where it is. Moving
    /// a node across others requires that the node neither writes memory nor transfers
    /// control, and that none of the nodes it crosses (or any node nested in them):
    ///
    /// - uses one of its outputs, when moving later
    /// - produces one of its inputs, when moving earlier
    /// - writes to memory its inputs or outputs may refer to
    #[must_use]
    pub fn could_move_before_topologically(
        &self,
        graph: &Graph,
        node: NodeId,
        before: NodeId,
    ) -> bool {
        let block = graph.node(node).owning_block();
        if block.is_none() || block != graph.node(before).owning_block() || node == before {
            return false;
        }
        let (Some(pos), Some(target)) = (graph.position(node), graph.position(before)) else {
            return false;
        };
        if pos + 1 == target {
            return true;
        }

        let data = graph.node(node);
        if !data.kind().is_movable() || !data.blocks().is_empty() {
            return false;
        }

        let Some(block) = block else { return false };
        let nodes = graph.block(block).nodes();
        let crossed = if pos < target {
            &nodes[pos + 1..target]
        } else {
            &nodes[target..pos]
        };

        let memory: Vec<ValueId> = data
            .inputs()
            .iter()
            .chain(data.outputs())
            .copied()
            .filter(|&v| graph.value(v).ty().is_mutable_type())
            .collect();
        let clobbered = crossed.iter().any(|&crossed_node| {
            memory
                .iter()
                .any(|&m| self.writes_to_alias_of(graph, crossed_node, m))
        });
        if clobbered {
            return false;
        }

        let mut region = Vec::new();
        for &crossed_node in crossed {
            collect_nested(graph, crossed_node, &mut region);
        }

        let outputs: HashSet<ValueId> = data.outputs().iter().copied().collect();
        let inputs: HashSet<ValueId> = data.inputs().iter().copied().collect();
        region.iter().all(|&other| {
            let other_data = graph.node(other);
            if pos < target {
                !other_data.inputs().iter().any(|v| outputs.contains(v))
            } else {
                !other_data.outputs().iter().any(|v| inputs.contains(v))
            }
        })
    }
}

fn collect_nested(graph: &Graph, node: NodeId, out: &mut Vec<NodeId>) {
    out.push(node);
    for &block in graph.node(node).blocks() {
        for &inner in graph.block(block).nodes() {
            collect_nested(graph, inner, out);
        }
    }
}

//! The program graph: an arena of blocks, nodes and values.
//!
//! A [`Graph`] owns every entity of a program for its whole lifetime. Entities are addressed
//! through [`NodeId`], [`ValueId`] and [`BlockId`] handles. Destroying a node removes it from
//! the arena and invalidates its handle and the handles of its outputs.
//!
//! # Structure
//!
//! ```text
//! Graph
//! ├── root block
//! │   ├── params         // graph inputs
//! │   ├── nodes          // program order, terminated by a prim::Return node
//! │   │   └── prim::If   // nodes may own nested blocks
//! │   │       ├── block0
//! │   │       └── block1
//! │   └── prim::Return   // graph outputs
//! └── detached nodes     // created but not yet inserted
//! ```
//!
//! Every node input registers a [`Use`] on the consumed value, also for detached nodes. This
//! lets rewrites create replacement nodes up front and have them participate in later
//! [`Graph::replace_all_uses_with`] calls before they are inserted.
//!
//! # Dominance
//!
//! Dominance is structural. A node `A` dominates node `B` if `A` precedes `B` in the same
//! block, or if `A` dominates the node that (transitively) owns the block of `B`.

use crate::{
    ir::{BlockId, Constant, NodeId, NodeKind, Type, ValueId},
    Error, Result,
};

/// A single use of a value: input `offset` of node `user`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Use {
    /// The consuming node.
    pub user: NodeId,
    /// The input position at which the value is consumed.
    pub offset: usize,
}

/// Where a value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Producer {
    /// Output `offset` of a node.
    Node {
        /// The producing node.
        node: NodeId,
        /// Output position.
        offset: usize,
    },
    /// Parameter `offset` of a block.
    Param {
        /// The block declaring the parameter.
        block: BlockId,
        /// Parameter position.
        offset: usize,
    },
}

/// A typed value in the graph.
#[derive(Debug, Clone)]
pub struct Value {
    ty: Type,
    producer: Producer,
    uses: Vec<Use>,
    name: Option<String>,
}

impl Value {
    /// Returns the value's type.
    #[must_use]
    pub fn ty(&self) -> &Type {
        &self.ty
    }

    /// Returns the producer of this value.
    #[must_use]
    pub const fn producer(&self) -> Producer {
        self.producer
    }

    /// Returns all uses of this value.
    #[must_use]
    pub fn uses(&self) -> &[Use] {
        &self.uses
    }

    /// Returns `true` if at least one node consumes this value.
    #[must_use]
    pub fn has_uses(&self) -> bool {
        !self.uses.is_empty()
    }

    /// Returns the debug name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// An operation in the graph.
#[derive(Debug, Clone)]
pub struct Node {
    kind: NodeKind,
    inputs: Vec<ValueId>,
    outputs: Vec<ValueId>,
    blocks: Vec<BlockId>,
    owner: Option<BlockId>,
    constant: Option<Constant>,
}

impl Node {
    /// Returns the node kind.
    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Returns the ordered inputs.
    #[must_use]
    pub fn inputs(&self) -> &[ValueId] {
        &self.inputs
    }

    /// Returns input `index`.
    ///
    /// # Panics
    ///
    /// Panics if the node has fewer than `index + 1` inputs.
    #[must_use]
    pub fn input(&self, index: usize) -> ValueId {
        self.inputs[index]
    }

    /// Returns the ordered outputs.
    #[must_use]
    pub fn outputs(&self) -> &[ValueId] {
        &self.outputs
    }

    /// Returns the single output of a single-output node.
    ///
    /// # Panics
    ///
    /// Panics if the node has no outputs.
    #[must_use]
    pub fn output(&self) -> ValueId {
        self.outputs[0]
    }

    /// Returns the nested blocks.
    #[must_use]
    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    /// Returns the block this node is placed in, or `None` for detached nodes.
    #[must_use]
    pub const fn owning_block(&self) -> Option<BlockId> {
        self.owner
    }

    /// Returns the constant payload of a [`NodeKind::Constant`] node.
    #[must_use]
    pub fn constant(&self) -> Option<&Constant> {
        self.constant.as_ref()
    }
}

/// An ordered sequence of nodes, terminated by a [`NodeKind::Return`] node.
#[derive(Debug, Clone)]
pub struct Block {
    params: Vec<ValueId>,
    nodes: Vec<NodeId>,
    owner: Option<NodeId>,
}

impl Block {
    /// Returns the block parameters.
    #[must_use]
    pub fn params(&self) -> &[ValueId] {
        &self.params
    }

    /// Returns all nodes in program order, including the terminating return node.
    #[must_use]
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Returns the node owning this block, or `None` for the root block.
    #[must_use]
    pub const fn owning_node(&self) -> Option<NodeId> {
        self.owner
    }

    /// Returns the terminating return node.
    ///
    /// # Panics
    ///
    /// Panics if the block has lost its return node, which only happens on corrupted graphs.
    #[must_use]
    pub fn return_node(&self) -> NodeId {
        *self.nodes.last().expect("block without return node")
    }
}

/// A program in graph form.
///
/// # Examples
///
/// ```rust
/// use catopt::ir::{Graph, NodeKind, Type};
///
/// let mut graph = Graph::new();
/// let x = graph.add_input(Type::tensor_of([2, 3]));
/// let relu = graph.create_node(NodeKind::Relu, &[x], vec![Type::tensor_of([2, 3])]);
/// graph.append_to_block(relu, graph.root());
/// graph.set_outputs(&[graph.node(relu).output()]);
///
/// assert_eq!(graph.count_kind(NodeKind::Relu), 1);
/// assert!(graph.lint().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<Option<Node>>,
    values: Vec<Option<Value>>,
    blocks: Vec<Option<Block>>,
    root: BlockId,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    /// Creates an empty graph with a root block that returns nothing.
    #[must_use]
    pub fn new() -> Self {
        let mut graph = Self {
            nodes: Vec::new(),
            values: Vec::new(),
            blocks: Vec::new(),
            root: BlockId(0),
        };
        graph.root = graph.new_block(None);
        graph
    }

    fn new_block(&mut self, owner: Option<NodeId>) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.blocks.push(Some(Block {
            params: Vec::new(),
            nodes: Vec::new(),
            owner,
        }));
        let ret = self.create_node(NodeKind::Return, &[], Vec::new());
        self.node_mut(ret).owner = Some(id);
        self.block_mut(id).nodes.push(ret);
        id
    }

    /// Returns the root block.
    #[must_use]
    pub const fn root(&self) -> BlockId {
        self.root
    }

    /// Adds a graph input of the given type.
    pub fn add_input(&mut self, ty: Type) -> ValueId {
        self.add_block_param(self.root, ty)
    }

    /// Adds a parameter to `block`.
    pub fn add_block_param(&mut self, block: BlockId, ty: Type) -> ValueId {
        let offset = self.block(block).params.len();
        let value = self.new_value(ty, Producer::Param { block, offset });
        self.block_mut(block).params.push(value);
        value
    }

    /// Returns the graph inputs.
    #[must_use]
    pub fn inputs(&self) -> &[ValueId] {
        &self.block(self.root).params
    }

    /// Returns the graph outputs.
    #[must_use]
    pub fn outputs(&self) -> &[ValueId] {
        let ret = self.block(self.root).return_node();
        &self.node(ret).inputs
    }

    /// Replaces the graph outputs.
    pub fn set_outputs(&mut self, outputs: &[ValueId]) {
        self.set_block_outputs(self.root, outputs);
    }

    /// Replaces the values yielded by `block`.
    pub fn set_block_outputs(&mut self, block: BlockId, outputs: &[ValueId]) {
        let ret = self.block(block).return_node();
        self.set_inputs(ret, outputs);
    }

    /// Returns the values yielded by `block`.
    #[must_use]
    pub fn block_outputs(&self, block: BlockId) -> &[ValueId] {
        let ret = self.block(block).return_node();
        &self.node(ret).inputs
    }

    fn new_value(&mut self, ty: Type, producer: Producer) -> ValueId {
        let id = ValueId(self.values.len());
        self.values.push(Some(Value {
            ty,
            producer,
            uses: Vec::new(),
            name: None,
        }));
        id
    }

    /// Creates a detached node.
    ///
    /// The node registers uses on all of its inputs immediately and gets one output value per
    /// entry of `output_types`. It must be placed with [`Graph::insert_before`] or
    /// [`Graph::append_to_block`] before the graph is well-formed again.
    pub fn create_node(
        &mut self,
        kind: NodeKind,
        inputs: &[ValueId],
        output_types: Vec<Type>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(Node {
            kind,
            inputs: Vec::new(),
            outputs: Vec::new(),
            blocks: Vec::new(),
            owner: None,
            constant: None,
        }));
        for (offset, ty) in output_types.into_iter().enumerate() {
            let value = self.new_value(ty, Producer::Node { node: id, offset });
            self.node_mut(id).outputs.push(value);
        }
        self.set_inputs(id, inputs);
        id
    }

    /// Creates a detached constant node.
    pub fn create_constant(&mut self, constant: Constant) -> NodeId {
        let node = self.create_node(NodeKind::Constant, &[], vec![constant.ty()]);
        self.node_mut(node).constant = Some(constant);
        node
    }

    /// Creates a constant immediately before `before` and returns its value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Detached`] if `before` is not placed in a block.
    pub fn insert_constant(&mut self, constant: Constant, before: NodeId) -> Result<ValueId> {
        let node = self.create_constant(constant);
        self.insert_before(node, before)?;
        Ok(self.node(node).output())
    }

    /// Adds a new nested block to `node` and returns it.
    pub fn add_block(&mut self, node: NodeId) -> BlockId {
        let block = self.new_block(Some(node));
        self.node_mut(node).blocks.push(block);
        block
    }

    fn set_inputs(&mut self, node: NodeId, inputs: &[ValueId]) {
        let old = std::mem::take(&mut self.node_mut(node).inputs);
        for (offset, value) in old.into_iter().enumerate() {
            self.remove_use(value, Use { user: node, offset });
        }
        for &value in inputs {
            self.push_input(node, value);
        }
    }

    /// Appends `value` as a trailing input of `node`.
    pub fn add_node_input(&mut self, node: NodeId, value: ValueId) {
        self.push_input(node, value);
    }

    fn push_input(&mut self, node: NodeId, value: ValueId) {
        let offset = self.node(node).inputs.len();
        self.node_mut(node).inputs.push(value);
        self.value_mut(value).uses.push(Use { user: node, offset });
    }

    fn remove_use(&mut self, value: ValueId, use_: Use) {
        if let Some(Some(data)) = self.values.get_mut(value.0) {
            if let Some(pos) = data.uses.iter().position(|u| *u == use_) {
                data.uses.remove(pos);
            }
        }
    }

    /// Rewires input `offset` of `node` to `value`.
    pub fn replace_input(&mut self, node: NodeId, offset: usize, value: ValueId) {
        let old = self.node(node).inputs[offset];
        self.remove_use(old, Use { user: node, offset });
        self.node_mut(node).inputs[offset] = value;
        self.value_mut(value).uses.push(Use { user: node, offset });
    }

    /// Redirects every use of `from` to `to` and returns the number of rewired uses.
    pub fn replace_all_uses_with(&mut self, from: ValueId, to: ValueId) -> usize {
        if from == to {
            return 0;
        }
        let uses = std::mem::take(&mut self.value_mut(from).uses);
        let count = uses.len();
        for use_ in uses {
            self.node_mut(use_.user).inputs[use_.offset] = to;
            self.value_mut(to).uses.push(use_);
        }
        count
    }

    fn detach(&mut self, node: NodeId) {
        if let Some(block) = self.node_mut(node).owner.take() {
            let nodes = &mut self.block_mut(block).nodes;
            if let Some(pos) = nodes.iter().position(|&n| n == node) {
                nodes.remove(pos);
            }
        }
    }

    /// Places `node` immediately before `before`.
    ///
    /// A node that is already placed is moved; this does not check that the node's inputs
    /// remain available at the new position.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Detached`] if `before` is not placed in a block.
    pub fn insert_before(&mut self, node: NodeId, before: NodeId) -> Result<()> {
        let block = self.node(before).owner.ok_or(Error::Detached(before))?;
        self.detach(node);
        let nodes = &mut self.block_mut(block).nodes;
        let pos = nodes
            .iter()
            .position(|&n| n == before)
            .ok_or_else(|| malformed_error!("node {} missing from its block {}", before, block))?;
        nodes.insert(pos, node);
        self.node_mut(node).owner = Some(block);
        Ok(())
    }

    /// Moves `node` immediately before `before`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Detached`] if `before` is not placed in a block.
    pub fn move_before(&mut self, node: NodeId, before: NodeId) -> Result<()> {
        self.insert_before(node, before)
    }

    /// Appends `node` at the end of `block`, right before its return node.
    pub fn append_to_block(&mut self, node: NodeId, block: BlockId) {
        self.detach(node);
        let nodes = &mut self.block_mut(block).nodes;
        let pos = nodes.len().saturating_sub(1);
        nodes.insert(pos, node);
        self.node_mut(node).owner = Some(block);
    }

    /// Destroys `node`, its nested blocks and its outputs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LiveUses`] if any output of the node (or of a node nested in one of
    /// its blocks) still has uses outside the destroyed region.
    pub fn destroy_node(&mut self, node: NodeId) -> Result<()> {
        if self.node(node).outputs.iter().any(|&v| self.value(v).has_uses()) {
            return Err(Error::LiveUses(node));
        }

        for block in self.node(node).blocks.clone().into_iter().rev() {
            for inner in self.block(block).nodes.clone().into_iter().rev() {
                self.destroy_node(inner)?;
            }
            for param in self.block(block).params.clone() {
                self.values[param.0] = None;
            }
            self.blocks[block.0] = None;
        }

        self.set_inputs(node, &[]);
        self.detach(node);
        for output in self.node(node).outputs.clone() {
            self.values[output.0] = None;
        }
        self.nodes[node.0] = None;
        Ok(())
    }

    /// Returns the node behind `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` refers to a destroyed node.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        match self.nodes.get(id.0) {
            Some(Some(node)) => node,
            _ => panic!("stale node handle {id}"),
        }
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        match self.nodes.get_mut(id.0) {
            Some(Some(node)) => node,
            _ => panic!("stale node handle {id}"),
        }
    }

    /// Returns `true` if `id` refers to a node that has not been destroyed.
    #[must_use]
    pub fn contains_node(&self, id: NodeId) -> bool {
        matches!(self.nodes.get(id.0), Some(Some(_)))
    }

    /// Returns the value behind `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` refers to a destroyed value.
    #[must_use]
    pub fn value(&self, id: ValueId) -> &Value {
        match self.values.get(id.0) {
            Some(Some(value)) => value,
            _ => panic!("stale value handle {id}"),
        }
    }

    fn value_mut(&mut self, id: ValueId) -> &mut Value {
        match self.values.get_mut(id.0) {
            Some(Some(value)) => value,
            _ => panic!("stale value handle {id}"),
        }
    }

    /// Returns `true` if `id` refers to a value that has not been destroyed.
    #[must_use]
    pub fn contains_value(&self, id: ValueId) -> bool {
        matches!(self.values.get(id.0), Some(Some(_)))
    }

    /// Returns the block behind `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` refers to a destroyed block.
    #[must_use]
    pub fn block(&self, id: BlockId) -> &Block {
        match self.blocks.get(id.0) {
            Some(Some(block)) => block,
            _ => panic!("stale block handle {id}"),
        }
    }

    fn block_mut(&mut self, id: BlockId) -> &mut Block {
        match self.blocks.get_mut(id.0) {
            Some(Some(block)) => block,
            _ => panic!("stale block handle {id}"),
        }
    }

    /// Upper bound (exclusive) of all value indices ever handed out.
    #[must_use]
    pub fn value_capacity(&self) -> usize {
        self.values.len()
    }

    /// Sets the debug name of `value`, used by the printer.
    pub fn set_name(&mut self, value: ValueId, name: impl Into<String>) {
        self.value_mut(value).name = Some(name.into());
    }

    /// Returns the node producing `value`, or `None` for block parameters.
    #[must_use]
    pub fn producer_node(&self, value: ValueId) -> Option<NodeId> {
        match self.value(value).producer {
            Producer::Node { node, .. } => Some(node),
            Producer::Param { .. } => None,
        }
    }

    /// Returns the kind of the node producing `value`, or `None` for block parameters.
    #[must_use]
    pub fn producer_kind(&self, value: ValueId) -> Option<NodeKind> {
        self.producer_node(value).map(|n| self.node(n).kind)
    }

    /// Returns the integer held by `value` if it is produced by an integer constant.
    #[must_use]
    pub fn constant_int(&self, value: ValueId) -> Option<i64> {
        let node = self.node(self.producer_node(value)?);
        node.constant.as_ref().and_then(Constant::as_int)
    }

    /// Returns the index of `node` within its block.
    #[must_use]
    pub fn position(&self, node: NodeId) -> Option<usize> {
        let block = self.node(node).owner?;
        self.block(block).nodes.iter().position(|&n| n == node)
    }

    /// Returns `true` if `a` and `b` live in the same block and `a` comes first.
    #[must_use]
    pub fn is_before(&self, a: NodeId, b: NodeId) -> bool {
        if self.node(a).owner.is_none() || self.node(a).owner != self.node(b).owner {
            return false;
        }
        matches!((self.position(a), self.position(b)), (Some(pa), Some(pb)) if pa < pb)
    }

    /// Returns `true` if `dominator` dominates `node`.
    ///
    /// Every placed node dominates itself. A node never dominates the contents of its own
    /// nested blocks, since its outputs only exist after the blocks ran.
    #[must_use]
    pub fn is_dominated_by(&self, node: NodeId, dominator: NodeId) -> bool {
        let Some(dom_block) = self.node(dominator).owner else {
            return false;
        };
        if node == dominator {
            return true;
        }

        let mut current = node;
        loop {
            let Some(block) = self.node(current).owner else {
                return false;
            };
            if block == dom_block {
                return current != dominator && self.is_before(dominator, current);
            }
            match self.block(block).owner {
                Some(owner) => current = owner,
                None => return false,
            }
        }
    }

    /// Returns `true` if `value` is available at `node`.
    #[must_use]
    pub fn value_dominates(&self, value: ValueId, node: NodeId) -> bool {
        match self.value(value).producer {
            Producer::Node { node: producer, .. } => {
                producer != node && self.is_dominated_by(node, producer)
            }
            Producer::Param { block, .. } => self.is_within_block(node, block),
        }
    }

    /// Returns `true` if `node` is placed in `block` or in a block nested inside it.
    #[must_use]
    pub fn is_within_block(&self, node: NodeId, block: BlockId) -> bool {
        let mut current = node;
        loop {
            let Some(owner) = self.node(current).owner else {
                return false;
            };
            if owner == block {
                return true;
            }
            match self.block(owner).owner {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Returns the ancestor of `node` (or `node` itself) that is placed directly in `block`.
    #[must_use]
    pub fn ancestor_in_block(&self, node: NodeId, block: BlockId) -> Option<NodeId> {
        let mut current = node;
        loop {
            let owner = self.node(current).owner?;
            if owner == block {
                return Some(current);
            }
            current = self.block(owner).owner?;
        }
    }

    /// Returns every placed node in program order.
    ///
    /// The traversal is pre-order: a node is listed before the contents of its nested blocks.
    /// Return nodes are included.
    #[must_use]
    pub fn nodes_in_program_order(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_nodes(self.root, &mut out);
        out
    }

    fn collect_nodes(&self, block: BlockId, out: &mut Vec<NodeId>) {
        for &node in &self.block(block).nodes {
            out.push(node);
            for &inner in &self.node(node).blocks {
                self.collect_nodes(inner, out);
            }
        }
    }

    /// Returns every placed node of the given kind in program order.
    #[must_use]
    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<NodeId> {
        self.nodes_in_program_order()
            .into_iter()
            .filter(|&n| self.node(n).kind == kind)
            .collect()
    }

    /// Counts placed nodes of the given kind.
    #[must_use]
    pub fn count_kind(&self, kind: NodeKind) -> usize {
        self.nodes_of_kind(kind).len()
    }

    /// Counts placed nodes, excluding return nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes_in_program_order()
            .into_iter()
            .filter(|&n| self.node(n).kind != NodeKind::Return)
            .count()
    }

    /// Checks the structural invariants of the graph.
    ///
    /// Verified invariants:
    /// - every block ends with exactly one return node and node owners match their blocks
    /// - every input refers to a live value that is available at the consuming node
    /// - use lists and node inputs agree in both directions
    /// - output values point back at their producer
    /// - no live node is left detached
    /// - every node has the inputs, outputs and nested blocks its kind's [`Arity`](crate::ir::Arity) requires,
    ///   and every block of a `prim::If` yields one result per output
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] describing the first violation found.
    pub fn lint(&self) -> Result<()> {
        for (index, block) in self.blocks.iter().enumerate() {
            let Some(block) = block else { continue };
            let id = BlockId(index);
            let Some(&last) = block.nodes.last() else {
                return Err(malformed_error!("block {} has no return node", id));
            };
            for &node in &block.nodes {
                if !self.contains_node(node) {
                    return Err(malformed_error!("block {} lists destroyed node {}", id, node));
                }
                let data = self.node(node);
                if data.owner != Some(id) {
                    return Err(malformed_error!("node {} has wrong owner block", node));
                }
                if (data.kind == NodeKind::Return) != (node == last) {
                    return Err(malformed_error!("return node misplaced in block {}", id));
                }
            }
        }

        for (index, node) in self.nodes.iter().enumerate() {
            let Some(data) = node else { continue };
            let id = NodeId(index);
            if data.owner.is_none() {
                return Err(malformed_error!("node {} ({}) is detached", id, data.kind));
            }
            let arity = data.kind.arity();
            if !arity.accepts_inputs(data.inputs.len())
                || !arity.accepts_outputs(data.outputs.len())
                || data.blocks.len() != arity.blocks
            {
                return Err(malformed_error!(
                    "node {} ({}) expects {}, found {} input(s), {} output(s), {} block(s)",
                    id,
                    data.kind,
                    arity,
                    data.inputs.len(),
                    data.outputs.len(),
                    data.blocks.len()
                ));
            }
            for &block in &data.blocks {
                let results = match self.blocks.get(block.0) {
                    Some(Some(nested)) => nested
                        .nodes
                        .last()
                        .map(|&ret| self.node(ret).inputs.len()),
                    _ => None,
                };
                if results != Some(data.outputs.len()) {
                    return Err(malformed_error!(
                        "block {} of {} does not yield one result per output",
                        block,
                        id
                    ));
                }
            }
            for (offset, &input) in data.inputs.iter().enumerate() {
                if !self.contains_value(input) {
                    return Err(malformed_error!("node {} uses destroyed value {}", id, input));
                }
                if !self.value(input).uses.contains(&Use { user: id, offset }) {
                    return Err(malformed_error!("use of {} by {} not recorded", input, id));
                }
                if !self.value_dominates(input, id) {
                    return Err(malformed_error!(
                        "value {} is not available at its use by {} ({})",
                        input,
                        id,
                        data.kind
                    ));
                }
            }
            for (offset, &output) in data.outputs.iter().enumerate() {
                if !self.contains_value(output)
                    || self.value(output).producer != (Producer::Node { node: id, offset })
                {
                    return Err(malformed_error!("output {} of {} is inconsistent", output, id));
                }
            }
        }

        for (index, value) in self.values.iter().enumerate() {
            let Some(data) = value else { continue };
            for use_ in &data.uses {
                let consistent = self.contains_node(use_.user)
                    && self.node(use_.user).inputs.get(use_.offset) == Some(&ValueId(index));
                if !consistent {
                    return Err(malformed_error!("stale use recorded on value %{}", index));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relu(graph: &mut Graph, input: ValueId, block: BlockId) -> NodeId {
        let node = graph.create_node(NodeKind::Relu, &[input], vec![Type::tensor()]);
        graph.append_to_block(node, block);
        node
    }

    #[test]
    fn test_graph_creation() {
        let graph = Graph::new();
        assert!(graph.inputs().is_empty());
        assert!(graph.outputs().is_empty());
        assert_eq!(graph.node_count(), 0);
        assert!(graph.lint().is_ok());
    }

    #[test]
    fn test_uses_are_tracked() {
        let mut graph = Graph::new();
        let root = graph.root();
        let x = graph.add_input(Type::tensor());
        let a = relu(&mut graph, x, root);
        let b = relu(&mut graph, x, root);
        assert_eq!(graph.value(x).uses().len(), 2);

        let a_out = graph.node(a).output();
        graph.set_outputs(&[a_out]);
        assert_eq!(graph.value(a_out).uses().len(), 1);

        let b_out = graph.node(b).output();
        assert_eq!(graph.replace_all_uses_with(a_out, b_out), 1);
        assert_eq!(graph.outputs(), &[b_out]);
        assert!(!graph.value(a_out).has_uses());
        assert!(graph.lint().is_ok());
    }

    #[test]
    fn test_destroy_with_live_uses_fails() {
        let mut graph = Graph::new();
        let root = graph.root();
        let x = graph.add_input(Type::tensor());
        let a = relu(&mut graph, x, root);
        graph.set_outputs(&[graph.node(a).output()]);

        assert!(matches!(graph.destroy_node(a), Err(Error::LiveUses(n)) if n == a));
        assert!(graph.contains_node(a));

        graph.set_outputs(&[x]);
        graph.destroy_node(a).unwrap();
        assert!(!graph.contains_node(a));
        assert_eq!(graph.value(x).uses().len(), 1);
        assert!(graph.lint().is_ok());
    }

    #[test]
    fn test_insert_and_move_before() {
        let mut graph = Graph::new();
        let root = graph.root();
        let x = graph.add_input(Type::tensor());
        let a = relu(&mut graph, x, root);
        let b = relu(&mut graph, x, root);
        assert!(graph.is_before(a, b));

        graph.move_before(b, a).unwrap();
        assert!(graph.is_before(b, a));
        assert_eq!(graph.position(b), Some(0));

        let detached = graph.create_node(NodeKind::Relu, &[x], vec![Type::tensor()]);
        assert!(matches!(
            graph.insert_before(a, detached),
            Err(Error::Detached(_))
        ));
        graph.insert_before(detached, a).unwrap();
        assert_eq!(graph.position(detached), Some(1));
    }

    #[test]
    fn test_structural_dominance() {
        let mut graph = Graph::new();
        let root = graph.root();
        let x = graph.add_input(Type::tensor());
        let cond = graph.add_input(Type::Bool);
        let before = relu(&mut graph, x, root);

        let if_node = graph.create_node(NodeKind::If, &[cond], Vec::new());
        graph.append_to_block(if_node, root);
        let then_block = graph.add_block(if_node);
        let else_block = graph.add_block(if_node);
        let in_then = relu(&mut graph, x, then_block);
        let in_else = relu(&mut graph, x, else_block);
        let after = relu(&mut graph, x, root);

        assert!(graph.is_dominated_by(in_then, before));
        assert!(graph.is_dominated_by(after, before));
        assert!(graph.is_dominated_by(before, before));
        assert!(!graph.is_dominated_by(before, after));
        assert!(!graph.is_dominated_by(in_else, in_then));
        assert!(!graph.is_dominated_by(after, in_then));
        assert!(!graph.is_dominated_by(in_then, if_node));
        assert!(graph.is_dominated_by(after, if_node));

        assert_eq!(graph.ancestor_in_block(in_then, root), Some(if_node));
        assert!(graph.is_within_block(in_else, root));
        assert!(!graph.is_within_block(in_else, then_block));
    }

    #[test]
    fn test_program_order_is_preorder() {
        let mut graph = Graph::new();
        let root = graph.root();
        let x = graph.add_input(Type::tensor());
        let cond = graph.add_input(Type::Bool);
        let if_node = graph.create_node(NodeKind::If, &[cond], Vec::new());
        graph.append_to_block(if_node, root);
        let then_block = graph.add_block(if_node);
        let _else_block = graph.add_block(if_node);
        let inner = relu(&mut graph, x, then_block);
        let after = relu(&mut graph, x, root);

        let order = graph.nodes_in_program_order();
        let pos = |n| order.iter().position(|&m| m == n).unwrap();
        assert!(pos(if_node) < pos(inner));
        assert!(pos(inner) < pos(after));
        assert_eq!(graph.count_kind(NodeKind::Relu), 2);
    }

    #[test]
    fn test_destroy_if_destroys_nested_blocks() {
        let mut graph = Graph::new();
        let root = graph.root();
        let x = graph.add_input(Type::tensor());
        let cond = graph.add_input(Type::Bool);
        let if_node = graph.create_node(NodeKind::If, &[cond], vec![Type::tensor()]);
        graph.append_to_block(if_node, root);
        let then_block = graph.add_block(if_node);
        let else_block = graph.add_block(if_node);
        let inner = relu(&mut graph, x, then_block);
        graph.set_block_outputs(then_block, &[graph.node(inner).output()]);
        graph.set_block_outputs(else_block, &[x]);
        assert!(graph.lint().is_ok());

        graph.destroy_node(if_node).unwrap();
        assert!(!graph.contains_node(inner));
        assert_eq!(graph.value(x).uses().len(), 0);
        assert!(graph.lint().is_ok());
    }

    #[test]
    fn test_lint_detects_unavailable_value() {
        let mut graph = Graph::new();
        let root = graph.root();
        let x = graph.add_input(Type::tensor());
        let a = relu(&mut graph, x, root);
        let a_out = graph.node(a).output();
        let b = relu(&mut graph, a_out, root);
        assert!(graph.lint().is_ok());

        graph.move_before(b, a).unwrap();
        assert!(matches!(graph.lint(), Err(Error::Malformed { .. })));
    }

    #[test]
    fn test_lint_checks_arity() {
        let mut graph = Graph::new();
        let root = graph.root();
        let list = graph.add_input(Type::list_of(Type::tensor()));
        let cat = graph.create_node(NodeKind::Cat, &[list], vec![Type::tensor()]);
        graph.append_to_block(cat, root);
        graph.set_outputs(&[graph.node(cat).output()]);
        match graph.lint() {
            Err(Error::Malformed { message, .. }) => assert!(message.contains("aten::cat")),
            other => panic!("unexpected result: {other:?}"),
        }

        let mut graph = Graph::new();
        let root = graph.root();
        let var_concat = graph.create_node(NodeKind::VarConcat, &[], vec![Type::tensor()]);
        graph.append_to_block(var_concat, root);
        assert!(matches!(graph.lint(), Err(Error::Malformed { .. })));
    }

    #[test]
    fn test_lint_checks_if_blocks() {
        let mut graph = Graph::new();
        let root = graph.root();
        let x = graph.add_input(Type::tensor());
        let cond = graph.add_input(Type::Bool);
        let if_node = graph.create_node(NodeKind::If, &[cond], vec![Type::tensor()]);
        graph.append_to_block(if_node, root);
        let then_block = graph.add_block(if_node);
        graph.set_block_outputs(then_block, &[x]);
        assert!(matches!(graph.lint(), Err(Error::Malformed { .. })));

        let else_block = graph.add_block(if_node);
        assert!(matches!(graph.lint(), Err(Error::Malformed { .. })));

        graph.set_block_outputs(else_block, &[x]);
        assert!(graph.lint().is_ok());
    }

    #[test]
    fn test_lint_detects_detached_node() {
        let mut graph = Graph::new();
        let x = graph.add_input(Type::tensor());
        let _ = graph.create_node(NodeKind::Relu, &[x], vec![Type::tensor()]);
        assert!(graph.lint().is_err());
    }

    #[test]
    fn test_constant_int() {
        let mut graph = Graph::new();
        let root = graph.root();
        let c = graph.create_constant(Constant::Int(7));
        graph.append_to_block(c, root);
        let b = graph.create_constant(Constant::Bool(true));
        graph.append_to_block(b, root);
        let x = graph.add_input(Type::Int);

        assert_eq!(graph.constant_int(graph.node(c).output()), Some(7));
        assert_eq!(graph.constant_int(graph.node(b).output()), None);
        assert_eq!(graph.constant_int(x), None);
        assert_eq!(graph.producer_kind(graph.node(c).output()), Some(NodeKind::Constant));
    }

    #[test]
    #[should_panic(expected = "stale node handle")]
    fn test_stale_handle_panics() {
        let mut graph = Graph::new();
        let root = graph.root();
        let c = graph.create_constant(Constant::Int(1));
        graph.append_to_block(c, root);
        graph.destroy_node(c).unwrap();
        let _ = graph.node(c);
    }
}

//! Closure-based builder for constructing graphs programmatically.
//!
//! The builder is mainly used by tests and benchmarks. All blocks are defined inside a single
//! expression so the nesting of the program is visible in the source:
//!
//! ```rust
//! use catopt::ir::{GraphBuilder, NodeKind, Type};
//!
//! let graph = GraphBuilder::new().build_with(|g| {
//!     let x = g.input(Type::tensor_of([2, 3]));
//!     let y = g.input(Type::tensor_of([2, 3]));
//!     let dim = g.const_int(0);
//!     let list = g.list(&[x, y]);
//!     let out = g.cat(list, dim);
//!     g.ret(&[out]);
//! });
//!
//! assert_eq!(graph.count_kind(NodeKind::Cat), 1);
//! assert_eq!(graph.value(graph.outputs()[0]).ty(), &Type::tensor_of([4, 3]));
//! ```
//!
//! # Shape Propagation
//!
//! Operations that produce tensors compute the output type from their inputs where the inputs
//! are statically known. Concatenations sum the extent of the concatenated axis, slices clamp
//! their bounds like the runtime does, and element-wise operations keep the shape of their first
//! operand. Anything that cannot be derived falls back to a tensor of unknown shape.

use crate::ir::{BlockId, Constant, Graph, NodeId, NodeKind, TensorType, Type, ValueId};

/// Builder for constructing a [`Graph`].
#[derive(Debug, Default)]
pub struct GraphBuilder {
    graph: Graph,
}

impl GraphBuilder {
    /// Creates a builder for an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: Graph::new(),
        }
    }

    /// Builds the graph by running `f` on the root block.
    pub fn build_with<F>(mut self, f: F) -> Graph
    where
        F: FnOnce(&mut BlockBuilder<'_>),
    {
        let root = self.graph.root();
        let mut builder = BlockBuilder {
            graph: &mut self.graph,
            block: root,
        };
        f(&mut builder);
        self.graph
    }
}

/// Appends nodes to one block of a graph under construction.
///
/// Every method that creates a node appends it at the end of the block, before the return node,
/// and returns its (first) output.
pub struct BlockBuilder<'a> {
    graph: &'a mut Graph,
    block: BlockId,
}

impl BlockBuilder<'_> {
    /// Returns the block being built.
    #[must_use]
    pub fn block_id(&self) -> BlockId {
        self.block
    }

    /// Gives access to the underlying graph.
    pub fn graph(&mut self) -> &mut Graph {
        &mut *self.graph
    }

    /// Adds a parameter to the block. On the root block this is a graph input.
    pub fn input(&mut self, ty: Type) -> ValueId {
        self.graph.add_block_param(self.block, ty)
    }

    /// Appends a node of any kind and returns its id.
    pub fn node(&mut self, kind: NodeKind, inputs: &[ValueId], outputs: Vec<Type>) -> NodeId {
        let node = self.graph.create_node(kind, inputs, outputs);
        self.graph.append_to_block(node, self.block);
        node
    }

    fn op(&mut self, kind: NodeKind, inputs: &[ValueId], output: Type) -> ValueId {
        let node = self.node(kind, inputs, vec![output]);
        self.graph.node(node).output()
    }

    fn ty(&self, value: ValueId) -> Type {
        self.graph.value(value).ty().clone()
    }

    /// Adds an integer constant.
    pub fn const_int(&mut self, value: i64) -> ValueId {
        self.constant(Constant::Int(value))
    }

    /// Adds a boolean constant.
    pub fn const_bool(&mut self, value: bool) -> ValueId {
        self.constant(Constant::Bool(value))
    }

    /// Adds the `None` constant.
    pub fn const_none(&mut self) -> ValueId {
        self.constant(Constant::None)
    }

    fn constant(&mut self, constant: Constant) -> ValueId {
        let node = self.graph.create_constant(constant);
        self.graph.append_to_block(node, self.block);
        self.graph.node(node).output()
    }

    /// Adds a `prim::ListConstruct` of `elements`.
    ///
    /// The element type is taken from the first element; an empty list is a tensor list.
    pub fn list(&mut self, elements: &[ValueId]) -> ValueId {
        let elem = elements.first().map_or_else(Type::tensor, |&e| match self.ty(e) {
            Type::Tensor(_) => Type::tensor(),
            other => other,
        });
        self.op(NodeKind::ListConstruct, elements, Type::list_of(elem))
    }

    /// Adds an `int[]` list of fresh integer constants.
    pub fn int_list(&mut self, values: &[i64]) -> ValueId {
        let elements: Vec<ValueId> = values.iter().map(|&v| self.const_int(v)).collect();
        self.op(NodeKind::ListConstruct, &elements, Type::list_of(Type::Int))
    }

    /// Adds an in-place `aten::append` of `element` to `list`.
    pub fn append(&mut self, list: ValueId, element: ValueId) -> ValueId {
        let ty = self.ty(list);
        self.op(NodeKind::ListAppend, &[list, element], ty)
    }

    /// Adds an `aten::cat` of the tensors in `list` along `dim`.
    pub fn cat(&mut self, list: ValueId, dim: ValueId) -> ValueId {
        let elements = self.list_elements(list);
        let ty = elements.map_or_else(Type::tensor, |elements| {
            self.concat_type(&elements, dim)
        });
        self.op(NodeKind::Cat, &[list, dim], ty)
    }

    /// Adds a `prim::VarConcat` of `tensors` along `dim`.
    pub fn var_concat(&mut self, tensors: &[ValueId], dim: ValueId) -> ValueId {
        let ty = self.concat_type(tensors, dim);
        let mut inputs = tensors.to_vec();
        inputs.push(dim);
        self.op(NodeKind::VarConcat, &inputs, ty)
    }

    /// Adds an `aten::empty` allocation with sizes taken from the `sizes` list.
    pub fn empty(&mut self, sizes: ValueId) -> ValueId {
        let ty = self
            .list_elements(sizes)
            .and_then(|elements| {
                elements
                    .iter()
                    .map(|&e| self.graph.constant_int(e))
                    .collect::<Option<Vec<_>>>()
            })
            .map_or_else(Type::tensor, Type::tensor_of);
        self.op(NodeKind::Empty, &[sizes], ty)
    }

    /// Adds an `aten::slice` view.
    pub fn slice(
        &mut self,
        tensor: ValueId,
        dim: ValueId,
        start: ValueId,
        end: ValueId,
        step: ValueId,
    ) -> ValueId {
        let ty = self.slice_type(tensor, dim, start, end, step);
        self.op(NodeKind::Slice, &[tensor, dim, start, end, step], ty)
    }

    /// Adds an `aten::slice` view with constant bounds and unit step.
    pub fn slice_const(&mut self, tensor: ValueId, dim: i64, start: i64, end: i64) -> ValueId {
        let dim = self.const_int(dim);
        let start = self.const_int(start);
        let end = self.const_int(end);
        let step = self.const_int(1);
        self.slice(tensor, dim, start, end, step)
    }

    /// Adds an in-place `aten::copy_` of `src` into `dst`.
    pub fn copy_(&mut self, dst: ValueId, src: ValueId) -> ValueId {
        let ty = self.ty(dst);
        self.op(NodeKind::Copy, &[dst, src], ty)
    }

    /// Adds an element-wise `aten::add`.
    pub fn add(&mut self, a: ValueId, b: ValueId) -> ValueId {
        let ty = self.ty(a);
        self.op(NodeKind::Add, &[a, b], ty)
    }

    /// Adds an in-place `aten::add_`.
    pub fn add_(&mut self, a: ValueId, b: ValueId) -> ValueId {
        let ty = self.ty(a);
        self.op(NodeKind::AddInPlace, &[a, b], ty)
    }

    /// Adds an element-wise `aten::relu`.
    pub fn relu(&mut self, a: ValueId) -> ValueId {
        let ty = self.ty(a);
        self.op(NodeKind::Relu, &[a], ty)
    }

    /// Adds a `prim::If` with two branches.
    ///
    /// Each branch closure returns the values its block yields; they must match `outputs` in
    /// number. Returns the outputs of the `If` node.
    pub fn if_else<T, E>(
        &mut self,
        cond: ValueId,
        outputs: Vec<Type>,
        then_branch: T,
        else_branch: E,
    ) -> Vec<ValueId>
    where
        T: FnOnce(&mut BlockBuilder<'_>) -> Vec<ValueId>,
        E: FnOnce(&mut BlockBuilder<'_>) -> Vec<ValueId>,
    {
        let node = self.node(NodeKind::If, &[cond], outputs);
        let then_block = self.graph.add_block(node);
        let else_block = self.graph.add_block(node);

        let mut then_builder = BlockBuilder {
            graph: &mut *self.graph,
            block: then_block,
        };
        let yielded = then_branch(&mut then_builder);
        self.graph.set_block_outputs(then_block, &yielded);

        let mut else_builder = BlockBuilder {
            graph: &mut *self.graph,
            block: else_block,
        };
        let yielded = else_branch(&mut else_builder);
        self.graph.set_block_outputs(else_block, &yielded);

        self.graph.node(node).outputs().to_vec()
    }

    /// Sets the values yielded by this block.
    pub fn ret(&mut self, values: &[ValueId]) {
        self.graph.set_block_outputs(self.block, values);
    }

    fn list_elements(&self, list: ValueId) -> Option<Vec<ValueId>> {
        let producer = self.graph.producer_node(list)?;
        let node = self.graph.node(producer);
        (node.kind() == NodeKind::ListConstruct).then(|| node.inputs().to_vec())
    }

    fn concat_type(&self, tensors: &[ValueId], dim: ValueId) -> Type {
        let shapes: Option<Vec<Vec<i64>>> = tensors
            .iter()
            .map(|&t| self.graph.value(t).ty().as_tensor()?.concrete_sizes())
            .collect();
        let (Some(shapes), Some(dim)) = (shapes, self.graph.constant_int(dim)) else {
            return Type::tensor();
        };
        concat_shape(&shapes, dim).map_or_else(Type::tensor, Type::tensor_of)
    }

    fn slice_type(
        &self,
        tensor: ValueId,
        dim: ValueId,
        start: ValueId,
        end: ValueId,
        step: ValueId,
    ) -> Type {
        let Some(tensor_ty) = self.graph.value(tensor).ty().as_tensor() else {
            return Type::tensor();
        };
        let bounds = (
            self.graph.constant_int(dim),
            self.graph.constant_int(start),
            self.graph.constant_int(end),
            self.graph.constant_int(step),
        );
        let (Some(dim), Some(start), Some(end), Some(step)) = bounds else {
            return Type::tensor();
        };
        slice_shape(tensor_ty, dim, start, end, step).map_or_else(Type::tensor, Type::Tensor)
    }
}

/// Computes the shape of a concatenation of `shapes` along `dim`.
///
/// Returns `None` for an empty operand list, mismatching ranks, mismatching non-concatenated
/// extents or an out-of-range axis.
#[must_use]
pub fn concat_shape(shapes: &[Vec<i64>], dim: i64) -> Option<Vec<i64>> {
    let first = shapes.first()?;
    let axis = TensorType::with_sizes(first.iter().copied()).normalize_axis(dim)?;
    let mut out = first.clone();
    out[axis] = 0;
    for shape in shapes {
        if shape.len() != out.len() {
            return None;
        }
        for (i, (&a, &b)) in shape.iter().zip(first).enumerate() {
            if i != axis && a != b {
                return None;
            }
        }
        out[axis] += shape[axis];
    }
    Some(out)
}

/// Computes the type of `tensor[start:end:step]` along `dim`, clamping bounds like the runtime.
#[must_use]
pub fn slice_shape(
    tensor: &TensorType,
    dim: i64,
    start: i64,
    end: i64,
    step: i64,
) -> Option<TensorType> {
    let axis = tensor.normalize_axis(dim)?;
    let mut sizes = tensor.sizes()?.to_vec();
    if step <= 0 {
        return None;
    }
    if let Some(extent) = sizes[axis] {
        let (start, end) = clamp_slice_bounds(extent, start, end);
        sizes[axis] = Some((end - start + step - 1) / step);
    }
    Some(TensorType::with_partial_sizes(sizes))
}

/// Resolves negative bounds and clamps `start..end` into `0..=extent`, with `end >= start`.
#[must_use]
pub fn clamp_slice_bounds(extent: i64, start: i64, end: i64) -> (i64, i64) {
    let resolve = |v: i64| if v < 0 { (v + extent).max(0) } else { v.min(extent) };
    let start = resolve(start);
    let end = resolve(end).max(start);
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_cat() {
        let graph = GraphBuilder::new().build_with(|g| {
            let x = g.input(Type::tensor_of([2, 3]));
            let y = g.input(Type::tensor_of([2, 5]));
            let dim = g.const_int(-1);
            let list = g.list(&[x, y]);
            let out = g.cat(list, dim);
            g.ret(&[out]);
        });

        assert_eq!(graph.inputs().len(), 2);
        assert_eq!(graph.value(graph.outputs()[0]).ty(), &Type::tensor_of([2, 8]));
        assert!(graph.lint().is_ok());
    }

    #[test]
    fn test_build_var_concat_unknown_axis() {
        let graph = GraphBuilder::new().build_with(|g| {
            let x = g.input(Type::tensor_of([2, 3]));
            let dim = g.input(Type::Int);
            let out = g.var_concat(&[x, x], dim);
            g.ret(&[out]);
        });
        assert_eq!(graph.value(graph.outputs()[0]).ty(), &Type::tensor());
    }

    #[test]
    fn test_build_empty_and_slice() {
        let graph = GraphBuilder::new().build_with(|g| {
            let sizes = g.int_list(&[6, 4]);
            let buf = g.empty(sizes);
            let view = g.slice_const(buf, 0, 2, 100);
            let tail = g.slice_const(buf, 0, -1, 6);
            g.ret(&[view, tail]);
        });
        let outputs = graph.outputs();
        assert_eq!(graph.value(outputs[0]).ty(), &Type::tensor_of([4, 4]));
        assert_eq!(graph.value(outputs[1]).ty(), &Type::tensor_of([1, 4]));
    }

    #[test]
    fn test_build_if() {
        let graph = GraphBuilder::new().build_with(|g| {
            let x = g.input(Type::tensor_of([2]));
            let c = g.input(Type::Bool);
            let out = g.if_else(
                c,
                vec![Type::tensor_of([2])],
                |t| vec![t.relu(x)],
                |_| vec![x],
            );
            g.ret(&out);
        });
        assert_eq!(graph.count_kind(NodeKind::If), 1);
        assert_eq!(graph.count_kind(NodeKind::Return), 3);
        assert!(graph.lint().is_ok());
    }

    #[test]
    fn test_concat_shape() {
        assert_eq!(concat_shape(&[vec![1, 2], vec![3, 2]], 0), Some(vec![4, 2]));
        assert_eq!(concat_shape(&[vec![1, 2], vec![3, 3]], 0), None);
        assert_eq!(concat_shape(&[vec![1, 2]], 2), None);
        assert_eq!(concat_shape(&[], 0), None);
    }

    #[test]
    fn test_clamp_slice_bounds() {
        assert_eq!(clamp_slice_bounds(5, 0, 10), (0, 5));
        assert_eq!(clamp_slice_bounds(5, -2, 5), (3, 5));
        assert_eq!(clamp_slice_bounds(5, 4, 2), (4, 4));
    }
}

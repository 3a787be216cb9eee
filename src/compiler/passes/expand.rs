//! Expansion of list concatenations into explicit buffer writes.
//!
//! ```text
//! %l = prim::ListConstruct(%a, %b)           %s = prim::ListConstruct(<sizes>)
//! %r = aten::cat(%l, %d)              =>     %r = aten::empty(%s)
//!                                            %v0 = aten::slice(%r, %d, 0, <len a>, 1)
//!                                            %c0 = aten::copy_(%v0, %a)
//!                                            %v1 = aten::slice(%r, %d, <len a>, <len a + len b>, 1)
//!                                            %c1 = aten::copy_(%v1, %b)
//! ```
//!
//! After all concatenations are expanded, nested concatenations leave a copy whose source is
//! itself a freshly allocated buffer. Such a buffer is replaced by the view of the outer buffer
//! it would have been copied into, so the inner operands are written to their final location
//! directly and one allocation and one copy disappear.

use std::collections::HashSet;

use crate::{
    analysis::AliasDb,
    compiler::{
        passes::utils::{dump_graph, GraphEditor},
        EventKind, EventLog, GraphPass,
    },
    ir::{Graph, NodeId, NodeKind, Producer, Type, Use, ValueId},
    Result,
};

/// Expands `aten::cat` nodes with statically known shapes and fuses nested buffers.
#[derive(Debug, Default)]
pub struct ExpandPass {
    aliases: Option<AliasDb>,
    replace_uses_with: Vec<(ValueId, ValueId)>,
    nodes_to_remove: Vec<NodeId>,
    copies_added: Vec<NodeId>,
    slices_added: HashSet<NodeId>,
}

/// Shape facts of an expandable concatenation.
struct Expansion {
    axis: usize,
    out_sizes: Vec<i64>,
    operands: Vec<(ValueId, Vec<i64>)>,
}

impl ExpandPass {
    /// Pass name used in logs and events.
    pub const NAME: &'static str = "expand-concat";

    /// Creates a new pass instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn aliases(&mut self, graph: &Graph) -> &AliasDb {
        self.aliases.get_or_insert_with(|| AliasDb::new(graph))
    }

    /// Checks whether `node` can be expanded and collects the shapes needed to do so.
    fn analyze(&mut self, graph: &Graph, node: NodeId) -> Option<Expansion> {
        let data = graph.node(node);
        let list = data.input(0);
        if self.aliases(graph).has_writers(list) {
            return None;
        }
        let list_node = graph.producer_node(list)?;
        if graph.node(list_node).kind() != NodeKind::ListConstruct {
            return None;
        }

        let known = |v: &ValueId| graph.value(*v).ty().shape_is_known();
        if !data.inputs().iter().all(known) || !data.outputs().iter().all(known) {
            return None;
        }
        let elements = graph.node(list_node).inputs();
        if !elements.iter().all(known) {
            return None;
        }

        let dim = graph.constant_int(data.input(1))?;
        let out_ty = graph.value(data.output()).ty().as_tensor()?;
        let axis = out_ty.normalize_axis(dim)?;
        let out_sizes = out_ty.concrete_sizes()?;
        if out_sizes.iter().any(|&s| s < 0) {
            return None;
        }

        let mut operands = Vec::with_capacity(elements.len());
        let mut extent = 0;
        for &element in elements {
            let sizes = graph.value(element).ty().as_tensor()?.concrete_sizes()?;
            let fits = sizes.len() == out_sizes.len()
                && sizes.iter().zip(&out_sizes).enumerate().all(|(i, (&size, &out))| {
                    size >= 0 && (i == axis || size == out)
                });
            if !fits {
                log::debug!(
                    "{}: {} operand {} does not fit the output shape",
                    Self::NAME,
                    node,
                    element
                );
                return None;
            }
            extent += sizes[axis];
            operands.push((element, sizes));
        }
        if extent != out_sizes[axis] {
            log::debug!(
                "{}: {} has inconsistent extents ({} != {})",
                Self::NAME,
                node,
                extent,
                out_sizes[axis]
            );
            return None;
        }

        Some(Expansion {
            axis,
            out_sizes,
            operands,
        })
    }

    fn expand_cat(&mut self, editor: &mut GraphEditor<'_>, node: NodeId) -> Result<bool> {
        log::debug!("{}: considering {} for expansion", Self::NAME, node);
        let Some(expansion) = self.analyze(editor.graph, node) else {
            return Ok(false);
        };

        let dim = editor.graph.node(node).input(1);
        let output = editor.graph.node(node).output();
        let out_ty = editor.graph.value(output).ty().clone();

        let one = editor.insert_int(1, node)?;
        let mut sizes = Vec::with_capacity(expansion.out_sizes.len());
        for &size in &expansion.out_sizes {
            sizes.push(editor.insert_int(size, node)?);
        }
        let (_, size_list) =
            editor.insert_node(NodeKind::ListConstruct, &sizes, Type::list_of(Type::Int), node)?;
        let (_, buffer) = editor.insert_node(NodeKind::Empty, &[size_list], out_ty, node)?;

        let operand_count = expansion.operands.len();
        let mut offset = 0;
        let mut start = editor.insert_int(offset, node)?;
        for (operand, operand_sizes) in expansion.operands {
            let end_offset = offset + operand_sizes[expansion.axis];
            let end = editor.insert_int(end_offset, node)?;

            let (slice, view) = editor.insert_node(
                NodeKind::Slice,
                &[buffer, dim, start, end, one],
                Type::tensor_of(operand_sizes.iter().copied()),
                node,
            )?;
            self.slices_added.insert(slice);

            let (copy, _) = editor.insert_node(
                NodeKind::Copy,
                &[view, operand],
                Type::tensor_of(operand_sizes),
                node,
            )?;
            self.copies_added.push(copy);

            offset = end_offset;
            start = end;
        }

        self.replace_uses_with.push((output, buffer));
        self.nodes_to_remove.push(node);
        editor.record(
            EventKind::ConcatRewritten,
            node,
            format!("{node} expanded into {operand_count} copies"),
        );
        Ok(true)
    }

    /// Redirects every expanded concatenation to its buffer and deletes the concatenation and,
    /// if no longer used, its list.
    fn cleanup_expanded_cats(&mut self, editor: &mut GraphEditor<'_>) -> Result<()> {
        for (from, to) in std::mem::take(&mut self.replace_uses_with) {
            editor.replace_all_uses_with(from, to);
        }
        for node in std::mem::take(&mut self.nodes_to_remove) {
            let list = editor.graph.node(node).input(0);
            editor.destroy(node)?;
            if !editor.graph.value(list).has_uses() {
                if let Some(list_node) = editor.graph.producer_node(list) {
                    editor.destroy(list_node)?;
                }
            }
        }
        Ok(())
    }

    /// Returns `true` if the only use of `buffer` besides the views emitted on it is `copy`.
    fn is_single_remaining_use(&self, graph: &Graph, buffer: ValueId, copy: NodeId) -> bool {
        let mut remaining = graph
            .value(buffer)
            .uses()
            .iter()
            .filter(|u| !(u.offset == 0 && self.slices_added.contains(&u.user)));
        remaining.next() == Some(&Use { user: copy, offset: 1 }) && remaining.next().is_none()
    }

    /// Replaces buffers that are only copied into a view of another buffer by that view.
    fn reuse_buffers_in_copies(&mut self, editor: &mut GraphEditor<'_>) -> Result<usize> {
        let mut fused = 0;
        for copy in std::mem::take(&mut self.copies_added) {
            if !editor.graph.contains_node(copy) {
                continue;
            }
            let dst = editor.graph.node(copy).input(0);
            let src = editor.graph.node(copy).input(1);
            let Some(inner) = editor.graph.producer_node(src) else {
                continue;
            };
            if editor.graph.node(inner).kind() != NodeKind::Empty {
                continue;
            }
            if !self.is_single_remaining_use(editor.graph, src, copy) {
                log::debug!("{}: {} has other consumers, not fused", Self::NAME, src);
                continue;
            }
            if !can_hoist(editor.graph, dst, inner) {
                log::debug!("{}: {} cannot be hoisted above {}", Self::NAME, dst, inner);
                continue;
            }

            let mut positioned = HashSet::new();
            if let Some(view) = editor.graph.producer_node(dst) {
                hoist(editor, view, inner, &mut positioned)?;
            }

            editor.destroy(copy)?;
            editor.replace_all_uses_with(src, dst);
            let sizes = editor.graph.node(inner).input(0);
            editor.destroy(inner)?;
            if !editor.graph.value(sizes).has_uses() {
                if let Some(sizes_node) = editor.graph.producer_node(sizes) {
                    editor.destroy(sizes_node)?;
                }
            }
            editor.record(
                EventKind::BufferFused,
                inner,
                format!("{src} replaced by view {dst}"),
            );
            fused += 1;
        }
        Ok(fused)
    }
}

/// Returns `true` if `value` is, or can be made, available immediately before `before`.
///
/// Only nodes that neither read tensor contents nor write memory are moved: constants, list
/// constructions, allocations and views.
fn can_hoist(graph: &Graph, value: ValueId, before: NodeId) -> bool {
    let node = match graph.value(value).producer() {
        Producer::Param { .. } => return graph.value_dominates(value, before),
        Producer::Node { node, .. } => node,
    };
    if node == before {
        return false;
    }
    if graph.is_dominated_by(before, node) {
        return true;
    }
    let data = graph.node(node);
    let hoistable = matches!(
        data.kind(),
        NodeKind::Constant | NodeKind::ListConstruct | NodeKind::Empty | NodeKind::Slice
    );
    hoistable
        && data.owning_block() == graph.node(before).owning_block()
        && data.inputs().iter().all(|&input| can_hoist(graph, input, before))
}

/// Moves `node` before `before`, moving its not yet dominating dependencies first.
fn hoist(
    editor: &mut GraphEditor<'_>,
    node: NodeId,
    before: NodeId,
    positioned: &mut HashSet<NodeId>,
) -> Result<()> {
    if positioned.contains(&node) || editor.graph.is_dominated_by(before, node) {
        return Ok(());
    }
    for input in editor.graph.node(node).inputs().to_vec() {
        if let Some(producer) = editor.graph.producer_node(input) {
            hoist(editor, producer, before, positioned)?;
        }
    }
    editor.move_before(node, before)?;
    positioned.insert(node);
    Ok(())
}

impl GraphPass for ExpandPass {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        "Expands list concatenations into allocate/slice/copy and fuses nested buffers"
    }

    fn run(&mut self, graph: &mut Graph, events: &EventLog) -> Result<bool> {
        self.aliases = None;
        self.slices_added.clear();
        let mut editor = GraphEditor::new(graph, events, Self::NAME);
        let mut expanded = false;
        for node in editor.graph.nodes_of_kind(NodeKind::Cat) {
            expanded |= self.expand_cat(&mut editor, node)?;
        }
        self.cleanup_expanded_cats(&mut editor)?;
        dump_graph("Before reusing copy buffers", editor.graph);
        self.reuse_buffers_in_copies(&mut editor)?;

        dump_graph("After expanding concat and eliminating redundancy", graph);
        Ok(expanded)
    }
}

/// Expands every eligible `aten::cat` into an explicit output buffer written through one view
/// and copy per operand, then fuses buffers of nested concatenations.
///
/// A concatenation is eligible when its list is built by `prim::ListConstruct` and never
/// written, its axis is a constant, and every involved tensor has a complete shape of rank one
/// or more. Ineligible concatenations are left unchanged.
///
/// # Errors
///
/// Returns an error if a graph edit fails, which indicates a malformed input graph.
///
/// # Examples
///
/// ```rust
/// use catopt::{
///     compiler::expand_concat_and_fuse,
///     ir::{GraphBuilder, NodeKind, Type},
/// };
///
/// let mut graph = GraphBuilder::new().build_with(|g| {
///     let x = g.input(Type::tensor_of([2, 3]));
///     let y = g.input(Type::tensor_of([4, 3]));
///     let dim = g.const_int(0);
///     let list = g.list(&[x, y]);
///     let out = g.cat(list, dim);
///     g.ret(&[out]);
/// });
///
/// expand_concat_and_fuse(&mut graph)?;
/// assert_eq!(graph.count_kind(NodeKind::Cat), 0);
/// assert_eq!(graph.count_kind(NodeKind::Empty), 1);
/// assert_eq!(graph.count_kind(NodeKind::Copy), 2);
/// # Ok::<(), catopt::Error>(())
/// ```
pub fn expand_concat_and_fuse(graph: &mut Graph) -> Result<()> {
    ExpandPass::new().run(graph, &EventLog::new())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::GraphBuilder;

    #[test]
    fn test_negative_axis_is_normalized() {
        let mut graph = GraphBuilder::new().build_with(|g| {
            let x = g.input(Type::tensor_of([2, 3]));
            let y = g.input(Type::tensor_of([2, 1]));
            let dim = g.const_int(-1);
            let list = g.list(&[x, y]);
            let out = g.cat(list, dim);
            g.ret(&[out]);
        });
        expand_concat_and_fuse(&mut graph).unwrap();
        assert_eq!(graph.count_kind(NodeKind::Slice), 2);

        let ends: Vec<i64> = graph
            .nodes_of_kind(NodeKind::Slice)
            .into_iter()
            .filter_map(|s| graph.constant_int(graph.node(s).input(3)))
            .collect();
        assert_eq!(ends, vec![3, 4]);
        assert!(graph.lint().is_ok());
    }

    #[test]
    fn test_inconsistent_extents_are_skipped() {
        let mut graph = GraphBuilder::new().build_with(|g| {
            let x = g.input(Type::tensor_of([2, 3]));
            let dim = g.const_int(0);
            let list = g.list(&[x, x]);
            let cat = g.node(NodeKind::Cat, &[list, dim], vec![Type::tensor_of([5, 3])]);
            let out = g.graph().node(cat).output();
            g.ret(&[out]);
        });
        let events = EventLog::new();
        assert!(!ExpandPass::new().run(&mut graph, &events).unwrap());
        assert_eq!(graph.count_kind(NodeKind::Cat), 1);
        assert!(events.is_empty());
    }

    #[test]
    fn test_mismatched_or_negative_sizes_are_skipped() {
        let cat_of = |x: Type, y: Type, out: Type| {
            GraphBuilder::new().build_with(|g| {
                let x = g.input(x);
                let y = g.input(y);
                let dim = g.const_int(0);
                let list = g.list(&[x, y]);
                let cat = g.node(NodeKind::Cat, &[list, dim], vec![out]);
                let out = g.graph().node(cat).output();
                g.ret(&[out]);
            })
        };
        let mismatched = cat_of(
            Type::tensor_of([2, 3]),
            Type::tensor_of([2, 4]),
            Type::tensor_of([4, 3]),
        );
        let negative = cat_of(
            Type::tensor_of([-2, 3]),
            Type::tensor_of([-2, 3]),
            Type::tensor_of([-4, 3]),
        );
        let negative_output = cat_of(
            Type::tensor_of([2, 3]),
            Type::tensor_of([2, 3]),
            Type::tensor_of([4, -3]),
        );

        for mut graph in [mismatched, negative, negative_output] {
            let events = EventLog::new();
            assert!(!ExpandPass::new().run(&mut graph, &events).unwrap());
            assert_eq!(graph.count_kind(NodeKind::Cat), 1);
            assert_eq!(graph.count_kind(NodeKind::Empty), 0);
            assert!(events.is_empty());
        }
    }

    #[test]
    fn test_single_remaining_use_ignores_emitted_views() {
        let mut graph = GraphBuilder::new().build_with(|g| {
            let x = g.input(Type::tensor_of([1]));
            let dim = g.const_int(0);
            let inner_list = g.list(&[x, x]);
            let inner = g.cat(inner_list, dim);
            let outer_list = g.list(&[inner, x]);
            let outer = g.cat(outer_list, dim);
            g.ret(&[outer]);
        });
        let events = EventLog::new();
        assert!(ExpandPass::new().run(&mut graph, &events).unwrap());
        assert_eq!(events.count_kind(EventKind::BufferFused), 1);
        assert_eq!(graph.count_kind(NodeKind::Empty), 1);
        assert!(graph.lint().is_ok());
    }
}

//! Common-input elimination across variadic concatenations.
//!
//! A concatenation whose operands extend an earlier concatenation by one tensor can reuse the
//! earlier result as a partial result:
//!
//! ```text
//! %a = prim::VarConcat(%x, %y, %d)
//! %b = prim::VarConcat(%x, %y, %z, %d)      // prefix (%x, %y) already concatenated
//! ```
//!
//! becomes
//!
//! ```text
//! %a = prim::VarConcat(%x, %y, %d)
//! %c = prim::VarConcat(%a, %z, %d)
//! ```
//!
//! Suffix matches (`%z, %x, %y`) are rewritten symmetrically. Only full prefix or suffix
//! matches of length N-1 are considered; the first dominating candidate wins.

use crate::{
    analysis::AliasDb,
    compiler::{
        passes::utils::{dump_graph, GraphEditor},
        EventKind, EventLog, GraphPass,
    },
    ir::{Graph, NodeId, NodeKind, ValueId},
    Result,
};

/// The operands and axis of one variadic concatenation.
///
/// Two records are equal if they concatenate the same values in the same order along the same
/// axis value, regardless of which node they were taken from.
#[derive(Debug, Clone)]
struct ConcatRecord {
    node: NodeId,
    output: ValueId,
    tensors: Vec<ValueId>,
    dim: ValueId,
}

impl ConcatRecord {
    /// # Panics
    ///
    /// Panics if `node` is not a `prim::VarConcat`.
    fn from_node(graph: &Graph, node: NodeId) -> Self {
        let data = graph.node(node);
        assert_eq!(
            data.kind(),
            NodeKind::VarConcat,
            "concatenation record built from {}",
            data.kind()
        );
        let (&dim, tensors) = data
            .inputs()
            .split_last()
            .unwrap_or_else(|| panic!("{node} has no axis input"));
        Self {
            node,
            output: data.output(),
            tensors: tensors.to_vec(),
            dim,
        }
    }

    fn concatenates(&self, tensors: &[ValueId], dim: ValueId) -> bool {
        self.dim == dim && self.tensors == tensors
    }
}

impl PartialEq for ConcatRecord {
    fn eq(&self, other: &Self) -> bool {
        other.concatenates(&self.tensors, self.dim)
    }
}

/// Replaces concatenations that extend an earlier one by a single operand.
#[derive(Debug, Default)]
pub struct CommonInputsPass {
    aliases: Option<AliasDb>,
}

impl CommonInputsPass {
    /// Pass name used in logs and events.
    pub const NAME: &'static str = "eliminate-common-inputs";

    /// Creates a new pass instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn aliases(&mut self, graph: &Graph) -> &AliasDb {
        self.aliases.get_or_insert_with(|| AliasDb::new(graph))
    }

    /// Finds a dominating candidate covering all operands but the last (prefix) or all but the
    /// first (suffix) and creates the detached replacement node.
    fn find_replacement(
        graph: &mut Graph,
        candidates: &[ConcatRecord],
        current: &ConcatRecord,
    ) -> Option<NodeId> {
        let (first, rest) = current.tensors.split_first()?;
        let (last, init) = current.tensors.split_last()?;
        let ty = graph.value(current.output).ty().clone();

        let dominating = |graph: &Graph, tensors: &[ValueId]| {
            candidates
                .iter()
                .find(|prev| {
                    prev.concatenates(tensors, current.dim)
                        && graph.is_dominated_by(current.node, prev.node)
                })
                .map(|prev| prev.output)
        };

        if let Some(prefix) = dominating(graph, init) {
            log::debug!("{}: {} reuses prefix {}", Self::NAME, current.node, prefix);
            let inputs = [prefix, *last, current.dim];
            return Some(graph.create_node(NodeKind::VarConcat, &inputs, vec![ty]));
        }
        if let Some(suffix) = dominating(graph, rest) {
            log::debug!("{}: {} reuses suffix {}", Self::NAME, current.node, suffix);
            let inputs = [*first, suffix, current.dim];
            return Some(graph.create_node(NodeKind::VarConcat, &inputs, vec![ty]));
        }
        None
    }
}

impl GraphPass for CommonInputsPass {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        "Reuses earlier variadic concatenations sharing all but one operand"
    }

    fn run(&mut self, graph: &mut Graph, events: &EventLog) -> Result<bool> {
        dump_graph("Before eliminating concat common inputs", graph);
        self.aliases = None;

        let mut candidates: Vec<ConcatRecord> = Vec::new();
        let mut replacements: Vec<(NodeId, NodeId)> = Vec::new();

        for node in graph.nodes_of_kind(NodeKind::VarConcat) {
            log::debug!("{}: considering {}", Self::NAME, node);
            let record = ConcatRecord::from_node(graph, node);

            let aliases = self.aliases(graph);
            let unwritten = !aliases.has_writers(record.output)
                && !record.tensors.iter().any(|&t| aliases.has_writers(t));
            if unwritten {
                candidates.push(record.clone());
            }

            if record.tensors.len() <= 2 {
                continue;
            }
            if let Some(replacement) = Self::find_replacement(graph, &candidates, &record) {
                replacements.push((node, replacement));
            }
        }

        let changed = !replacements.is_empty();
        let mut editor = GraphEditor::new(graph, events, Self::NAME);
        for (old, new) in replacements {
            editor.insert_before(new, old)?;
            let old_out = editor.graph.node(old).output();
            let new_out = editor.graph.node(new).output();
            editor.replace_all_uses_with(old_out, new_out);
            editor.destroy(old)?;
            editor.record(
                EventKind::ConcatRewritten,
                new,
                format!("{old} replaced by two-operand {new}"),
            );
        }

        if changed {
            dump_graph("After eliminating concat common inputs", graph);
        }
        Ok(changed)
    }
}

/// Rewrites variadic concatenations to reuse an earlier concatenation of all but their last
/// (or first) operand.
///
/// Returns `true` if any concatenation was rewritten.
///
/// # Errors
///
/// Returns an error if a graph edit fails, which indicates a malformed input graph.
///
/// # Examples
///
/// ```rust
/// use catopt::{
///     compiler::eliminate_common_concat_inputs,
///     ir::{GraphBuilder, NodeKind, Type},
/// };
///
/// let mut graph = GraphBuilder::new().build_with(|g| {
///     let (x, y, z) = (
///         g.input(Type::tensor_of([1])),
///         g.input(Type::tensor_of([1])),
///         g.input(Type::tensor_of([1])),
///     );
///     let dim = g.const_int(0);
///     let xy = g.var_concat(&[x, y], dim);
///     let xyz = g.var_concat(&[x, y, z], dim);
///     g.ret(&[xy, xyz]);
/// });
///
/// assert!(eliminate_common_concat_inputs(&mut graph)?);
/// let last = graph.producer_node(graph.outputs()[1]).unwrap();
/// assert_eq!(graph.node(last).inputs().len(), 3);
/// # Ok::<(), catopt::Error>(())
/// ```
pub fn eliminate_common_concat_inputs(graph: &mut Graph) -> Result<bool> {
    CommonInputsPass::new().run(graph, &EventLog::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{GraphBuilder, Type};

    #[test]
    fn test_record_equality_ignores_node() {
        let graph = GraphBuilder::new().build_with(|g| {
            let x = g.input(Type::tensor_of([2]));
            let dim = g.const_int(0);
            let a = g.var_concat(&[x, x], dim);
            let b = g.var_concat(&[x, x], dim);
            g.ret(&[a, b]);
        });
        let nodes = graph.nodes_of_kind(NodeKind::VarConcat);
        let a = ConcatRecord::from_node(&graph, nodes[0]);
        let b = ConcatRecord::from_node(&graph, nodes[1]);
        assert_eq!(a, b);
        assert_eq!(a.tensors.len(), 2);
    }

    #[test]
    #[should_panic(expected = "concatenation record built from aten::relu")]
    fn test_record_from_other_kind_panics() {
        let graph = GraphBuilder::new().build_with(|g| {
            let x = g.input(Type::tensor_of([2]));
            let r = g.relu(x);
            g.ret(&[r]);
        });
        let relu = graph.nodes_of_kind(NodeKind::Relu)[0];
        let _ = ConcatRecord::from_node(&graph, relu);
    }

    #[test]
    fn test_events_recorded() {
        let mut graph = GraphBuilder::new().build_with(|g| {
            let (x, y, z) = (
                g.input(Type::tensor_of([1])),
                g.input(Type::tensor_of([1])),
                g.input(Type::tensor_of([1])),
            );
            let dim = g.const_int(0);
            let yz = g.var_concat(&[y, z], dim);
            let xyz = g.var_concat(&[x, y, z], dim);
            g.ret(&[yz, xyz]);
        });
        let events = EventLog::new();
        assert!(CommonInputsPass::new().run(&mut graph, &events).unwrap());
        assert_eq!(events.count_kind(EventKind::ConcatRewritten), 1);
        assert_eq!(events.count_kind(EventKind::NodeInserted), 1);
        assert_eq!(events.count_kind(EventKind::NodeDestroyed), 1);
        assert!(graph.lint().is_ok());
    }
}

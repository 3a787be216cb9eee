//! Promotion of list concatenations to variadic concatenations.
//!
//! `aten::cat` consumes a list, which hides the individual operands from other passes.
//! `prim::VarConcat` takes the tensors directly, followed by the axis:
//!
//! ```text
//! %l = prim::ListConstruct(%a, %b)
//! %r = aten::cat(%l, %d)              =>      %r = prim::VarConcat(%a, %b, %d)
//! ```
//!
//! The rewrite is only valid if the list still holds exactly its constructed elements when the
//! concatenation runs. Appends that would prevent this are removed first by
//! [`ListMutationPass`](super::ListMutationPass); [`VariadicFixpoint`] alternates both passes
//! until neither changes the graph.

use crate::{
    analysis::AliasDb,
    compiler::{
        passes::{
            utils::{dump_graph, GraphEditor},
            ListMutationPass,
        },
        EventKind, EventLog, GraphPass,
    },
    ir::{Graph, NodeId, NodeKind, ValueId},
    Result,
};

/// Replaces `aten::cat` over an unmodified `prim::ListConstruct` with `prim::VarConcat`.
#[derive(Debug, Default)]
pub struct VariadicPass {
    aliases: Option<AliasDb>,
}

impl VariadicPass {
    /// Pass name used in logs and events.
    pub const NAME: &'static str = "promote-to-variadic";

    /// Creates a new pass instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn aliases(&mut self, graph: &Graph) -> &AliasDb {
        self.aliases.get_or_insert_with(|| AliasDb::new(graph))
    }

    /// Returns the operands of `cat` if its list can be read at the concatenation as built.
    fn promotable_operands(&mut self, graph: &Graph, cat: NodeId) -> Option<Vec<ValueId>> {
        let list = graph.node(cat).input(0);
        let construct = graph.producer_node(list)?;
        if graph.node(construct).kind() != NodeKind::ListConstruct {
            return None;
        }
        if !self
            .aliases(graph)
            .could_move_before_topologically(graph, construct, cat)
        {
            log::debug!("{}: {} may be modified before {}", Self::NAME, list, cat);
            return None;
        }
        Some(graph.node(construct).inputs().to_vec())
    }

    fn promote(editor: &mut GraphEditor<'_>, cat: NodeId, mut operands: Vec<ValueId>) -> Result<()> {
        let list = editor.graph.node(cat).input(0);
        let output = editor.graph.node(cat).output();
        let ty = editor.graph.value(output).ty().clone();
        operands.push(editor.graph.node(cat).input(1));

        let (var_concat, var_output) =
            editor.insert_node(NodeKind::VarConcat, &operands, ty, cat)?;
        editor.replace_all_uses_with(output, var_output);
        editor.destroy(cat)?;
        if !editor.graph.value(list).has_uses() {
            if let Some(construct) = editor.graph.producer_node(list) {
                editor.destroy(construct)?;
            }
        }
        editor.record(
            EventKind::ConcatRewritten,
            var_concat,
            format!("{cat} promoted to variadic {var_concat}"),
        );
        Ok(())
    }
}

impl GraphPass for VariadicPass {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        "Promotes list concatenations to variadic concatenations"
    }

    fn run(&mut self, graph: &mut Graph, events: &EventLog) -> Result<bool> {
        let mut changed = false;
        self.aliases = None;
        let mut editor = GraphEditor::new(graph, events, Self::NAME);
        for cat in editor.graph.nodes_of_kind(NodeKind::Cat) {
            log::debug!("{}: considering {}", Self::NAME, cat);
            if let Some(operands) = self.promotable_operands(editor.graph, cat) {
                Self::promote(&mut editor, cat, operands)?;
                changed = true;
            }
        }
        if changed {
            dump_graph("After promoting concatenations to variadic", graph);
        }
        Ok(changed)
    }
}

/// Alternates list-mutation removal and variadic promotion until neither changes the graph.
///
/// Both passes run in every round, each with a fresh alias analysis. The loop stops after
/// `max_iterations` rounds even if the graph keeps changing; this is reported as a warning.
#[derive(Debug, Clone)]
pub struct VariadicFixpoint {
    max_iterations: usize,
    iterations: usize,
}

impl Default for VariadicFixpoint {
    fn default() -> Self {
        Self::new(100)
    }
}

impl VariadicFixpoint {
    /// Pass name used in logs and events.
    pub const NAME: &'static str = "variadic-fixpoint";

    /// Creates a driver that runs at most `max_iterations` rounds (at least one).
    #[must_use]
    pub fn new(max_iterations: usize) -> Self {
        Self {
            max_iterations: max_iterations.max(1),
            iterations: 0,
        }
    }

    /// Returns the number of rounds the last run performed.
    #[must_use]
    pub const fn iterations(&self) -> usize {
        self.iterations
    }
}

impl GraphPass for VariadicFixpoint {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        "Removes list mutation and promotes concatenations until nothing changes"
    }

    fn run(&mut self, graph: &mut Graph, events: &EventLog) -> Result<bool> {
        let mut any_changed = false;
        self.iterations = 0;
        loop {
            if self.iterations == self.max_iterations {
                log::warn!(
                    "{}: stopped after {} rounds without reaching a fixpoint",
                    Self::NAME,
                    self.iterations
                );
                events.warn(format!(
                    "variadic fixpoint stopped after {} rounds",
                    self.iterations
                ));
                break;
            }
            self.iterations += 1;

            let removed = ListMutationPass::new().run(graph, events)?;
            let promoted = VariadicPass::new().run(graph, events)?;
            log::debug!(
                "{}: round {} (list mutation removed: {}, promoted: {})",
                Self::NAME,
                self.iterations,
                removed,
                promoted
            );
            if !removed && !promoted {
                break;
            }
            any_changed = true;
        }
        Ok(any_changed)
    }
}

/// Replaces every `aten::cat` whose list is built by an unmodified `prim::ListConstruct` with a
/// `prim::VarConcat` over the list elements.
///
/// Every concatenation is attempted, regardless of earlier rewrites. Returns `true` if any
/// concatenation was promoted.
///
/// # Errors
///
/// Returns an error if a graph edit fails, which indicates a malformed input graph.
///
/// # Examples
///
/// ```rust
/// use catopt::{
///     compiler::promote_to_variadic,
///     ir::{GraphBuilder, NodeKind, Type},
/// };
///
/// let mut graph = GraphBuilder::new().build_with(|g| {
///     let x = g.input(Type::tensor_of([2]));
///     let y = g.input(Type::tensor_of([3]));
///     let dim = g.const_int(0);
///     let list = g.list(&[x, y]);
///     let out = g.cat(list, dim);
///     g.ret(&[out]);
/// });
///
/// assert!(promote_to_variadic(&mut graph)?);
/// assert_eq!(graph.count_kind(NodeKind::VarConcat), 1);
/// assert_eq!(graph.count_kind(NodeKind::ListConstruct), 0);
/// # Ok::<(), catopt::Error>(())
/// ```
pub fn promote_to_variadic(graph: &mut Graph) -> Result<bool> {
    VariadicPass::new().run(graph, &EventLog::new())
}

/// Repeats [`remove_list_mutation`](super::remove_list_mutation) and [`promote_to_variadic`]
/// until a round changes nothing.
///
/// Returns `true` if any round changed the graph.
///
/// # Errors
///
/// Returns an error if a graph edit fails, which indicates a malformed input graph.
pub fn remove_list_mutation_and_promote_to_variadic(graph: &mut Graph) -> Result<bool> {
    VariadicFixpoint::default().run(graph, &EventLog::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{GraphBuilder, Type};

    fn appended_cat() -> Graph {
        GraphBuilder::new().build_with(|g| {
            let x = g.input(Type::tensor_of([1]));
            let y = g.input(Type::tensor_of([1]));
            let dim = g.const_int(0);
            let list = g.list(&[x]);
            let appended = g.append(list, y);
            let out = g.cat(appended, dim);
            g.ret(&[out]);
        })
    }

    #[test]
    fn test_mutated_list_is_not_promoted() {
        let mut graph = appended_cat();
        assert!(!promote_to_variadic(&mut graph).unwrap());
        assert_eq!(graph.count_kind(NodeKind::Cat), 1);
    }

    #[test]
    fn test_fixpoint_removes_mutation_then_promotes() {
        let mut graph = appended_cat();
        let events = EventLog::new();
        let mut fixpoint = VariadicFixpoint::default();
        assert!(fixpoint.run(&mut graph, &events).unwrap());
        assert_eq!(fixpoint.iterations(), 2);
        assert_eq!(graph.count_kind(NodeKind::Cat), 0);
        assert_eq!(graph.count_kind(NodeKind::ListAppend), 0);

        let var_concat = graph.nodes_of_kind(NodeKind::VarConcat)[0];
        assert_eq!(graph.node(var_concat).inputs().len(), 3);
        assert_eq!(events.count_kind(EventKind::ListMutationRemoved), 1);
        assert!(graph.lint().is_ok());

        assert!(!remove_list_mutation_and_promote_to_variadic(&mut graph).unwrap());
    }

    #[test]
    fn test_fixpoint_ceiling_warns() {
        let mut graph = appended_cat();
        let events = EventLog::new();
        let mut fixpoint = VariadicFixpoint::new(1);
        assert!(fixpoint.run(&mut graph, &events).unwrap());
        assert_eq!(fixpoint.iterations(), 1);
        assert!(events.has(EventKind::Warning));
    }

    #[test]
    fn test_shared_list_kept_while_used() {
        let mut graph = GraphBuilder::new().build_with(|g| {
            let x = g.input(Type::tensor_of([1]));
            let dim = g.const_int(0);
            let list = g.list(&[x, x]);
            let out = g.cat(list, dim);
            g.ret(&[out, list]);
        });
        assert!(promote_to_variadic(&mut graph).unwrap());
        assert_eq!(graph.count_kind(NodeKind::ListConstruct), 1);
        assert!(graph.lint().is_ok());
    }
}

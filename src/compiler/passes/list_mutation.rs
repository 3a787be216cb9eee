//! Removal of list appends that directly follow the list's construction.
//!
//! ```text
//! %l = prim::ListConstruct(%a)
//! %m = aten::append(%l, %b)          =>      %l = prim::ListConstruct(%a, %b)
//! %r = aten::cat(%m, %d)                     %r = aten::cat(%l, %d)
//! ```
//!
//! Once the append is folded into the construction, the list is no longer written and the
//! concatenation becomes a candidate for variadic promotion.

use crate::{
    compiler::{
        passes::utils::{dump_graph, GraphEditor},
        EventKind, EventLog, GraphPass,
    },
    ir::{Graph, NodeId, NodeKind, Use},
    Result,
};

/// Folds `aten::append` calls into the `prim::ListConstruct` that created the list.
#[derive(Debug, Default)]
pub struct ListMutationPass;

impl ListMutationPass {
    /// Pass name used in logs and events.
    pub const NAME: &'static str = "remove-list-mutation";

    /// Creates a new pass instance.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Returns the construct an append can be folded into.
    ///
    /// The construct must be in the append's block and no other node, at any nesting depth, may
    /// observe the list between the construction and the append.
    fn foldable_construct(graph: &Graph, append: NodeId) -> Option<NodeId> {
        let list = graph.node(append).input(0);
        let construct = graph.producer_node(list)?;
        let block = graph.node(append).owning_block()?;
        if graph.node(construct).kind() != NodeKind::ListConstruct
            || graph.node(construct).owning_block() != Some(block)
        {
            return None;
        }

        let append_pos = graph.position(append)?;
        let observed_before = graph.value(list).uses().iter().any(|u| {
            if *u == (Use { user: append, offset: 0 }) {
                return false;
            }
            match graph.ancestor_in_block(u.user, block) {
                Some(ancestor) => !matches!(graph.position(ancestor), Some(p) if p > append_pos),
                None => true,
            }
        });
        (!observed_before).then_some(construct)
    }

    fn fold(editor: &mut GraphEditor<'_>, append: NodeId, construct: NodeId) -> Result<()> {
        let list = editor.graph.node(append).input(0);
        let element = editor.graph.node(append).input(1);
        let appended = editor.graph.node(append).output();

        editor.move_before(construct, append)?;
        editor.graph.add_node_input(construct, element);
        editor.replace_all_uses_with(appended, list);
        editor.destroy(append)?;
        editor.record(
            EventKind::ListMutationRemoved,
            construct,
            format!("{element} appended to {list} at construction"),
        );
        Ok(())
    }
}

impl GraphPass for ListMutationPass {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        "Folds list appends into the preceding list construction"
    }

    fn run(&mut self, graph: &mut Graph, events: &EventLog) -> Result<bool> {
        let mut changed = false;
        let mut editor = GraphEditor::new(graph, events, Self::NAME);
        for append in editor.graph.nodes_of_kind(NodeKind::ListAppend) {
            log::debug!("{}: considering {}", Self::NAME, append);
            if let Some(construct) = Self::foldable_construct(editor.graph, append) {
                Self::fold(&mut editor, append, construct)?;
                changed = true;
            }
        }
        if changed {
            dump_graph("After removing list mutation", graph);
        }
        Ok(changed)
    }
}

/// Folds every `aten::append` on a freshly constructed, not yet observed list into the
/// list's construction.
///
/// Returns `true` if any append was removed.
///
/// # Errors
///
/// Returns an error if a graph edit fails, which indicates a malformed input graph.
pub fn remove_list_mutation(graph: &mut Graph) -> Result<bool> {
    ListMutationPass::new().run(graph, &EventLog::new())
}

//! Shared helpers for the rewrite passes.
//!
//! [`GraphEditor`] wraps the structural edits of [`Graph`] so that every update a pass makes is
//! logged at debug level and recorded in the [`EventLog`].

use crate::{
    compiler::{EventKind, EventLog},
    ir::{Constant, Graph, NodeId, NodeKind, Type, ValueId},
    Result,
};

/// Logs the whole graph at trace level.
pub(crate) fn dump_graph(title: &str, graph: &Graph) {
    if log::log_enabled!(log::Level::Trace) {
        log::trace!("{title}:\n{graph}");
    }
}

/// Applies graph edits on behalf of one pass, logging and recording each of them.
pub(crate) struct GraphEditor<'a> {
    pub graph: &'a mut Graph,
    events: &'a EventLog,
    pass: &'static str,
}

impl<'a> GraphEditor<'a> {
    pub fn new(graph: &'a mut Graph, events: &'a EventLog, pass: &'static str) -> Self {
        Self {
            graph,
            events,
            pass,
        }
    }

    fn describe(&self, node: NodeId) -> String {
        format!("{} ({})", node, self.graph.node(node).kind())
    }

    /// Places a detached node before `before`.
    pub fn insert_before(&mut self, node: NodeId, before: NodeId) -> Result<()> {
        let message = format!("{} before {}", self.describe(node), self.describe(before));
        log::debug!("{}: inserting {}", self.pass, message);
        self.graph.insert_before(node, before)?;
        self.events
            .record(EventKind::NodeInserted)
            .pass(self.pass)
            .node(node)
            .message(message);
        Ok(())
    }

    /// Creates a node and places it before `before`, returning its first output.
    pub fn insert_node(
        &mut self,
        kind: NodeKind,
        inputs: &[ValueId],
        output: Type,
        before: NodeId,
    ) -> Result<(NodeId, ValueId)> {
        let node = self.graph.create_node(kind, inputs, vec![output]);
        self.insert_before(node, before)?;
        Ok((node, self.graph.node(node).output()))
    }

    /// Inserts an integer constant before `before`.
    pub fn insert_int(&mut self, value: i64, before: NodeId) -> Result<ValueId> {
        let node = self.graph.create_constant(Constant::Int(value));
        self.insert_before(node, before)?;
        Ok(self.graph.node(node).output())
    }

    /// Moves a placed node before `before`.
    pub fn move_before(&mut self, node: NodeId, before: NodeId) -> Result<()> {
        let message = format!("{} before {}", self.describe(node), self.describe(before));
        log::debug!("{}: moving {}", self.pass, message);
        self.graph.move_before(node, before)?;
        self.events
            .record(EventKind::NodeMoved)
            .pass(self.pass)
            .node(node)
            .message(message);
        Ok(())
    }

    /// Redirects all uses of `from` to `to`.
    pub fn replace_all_uses_with(&mut self, from: ValueId, to: ValueId) {
        let count = self.graph.replace_all_uses_with(from, to);
        log::debug!("{}: replacing {} uses of {} with {}", self.pass, count, from, to);
        self.events
            .record(EventKind::UsesReplaced)
            .pass(self.pass)
            .message(format!("{count} uses of {from} now use {to}"));
    }

    /// Destroys a node whose outputs have no remaining uses.
    pub fn destroy(&mut self, node: NodeId) -> Result<()> {
        let message = self.describe(node);
        log::debug!("{}: deleting {}", self.pass, message);
        self.graph.destroy_node(node)?;
        self.events
            .record(EventKind::NodeDestroyed)
            .pass(self.pass)
            .node(node)
            .message(message);
        Ok(())
    }

    /// Records a high-level rewrite.
    pub fn record(&self, kind: EventKind, node: NodeId, message: String) {
        self.events
            .record(kind)
            .pass(self.pass)
            .node(node)
            .message(message);
    }
}

//! The trait all rewrite passes implement.

use crate::{compiler::EventLog, ir::Graph, Result};

/// A rewrite pass over a [`Graph`].
///
/// A pass object lives for a single invocation. Analyses it needs (such as the
/// [`AliasDb`](crate::analysis::AliasDb)) are built lazily on first use, cached on the pass
/// object and discarded with it, so they always describe the graph as it was when the pass
/// started.
///
/// Passes must be `Send` so independent graphs can be optimized on different threads.
pub trait GraphPass: Send {
    /// Unique name for logging and debugging.
    fn name(&self) -> &'static str;

    /// Get a description of what this pass does.
    fn description(&self) -> &'static str {
        "No description available"
    }

    /// Runs the pass on `graph`.
    ///
    /// Returns `true` if the graph was changed. Every edit is recorded in `events`.
    ///
    /// # Errors
    ///
    /// Returns an error if an edit violates a graph invariant. Nodes that merely do not qualify
    /// for the rewrite are skipped without error.
    fn run(&mut self, graph: &mut Graph, events: &EventLog) -> Result<bool>;
}

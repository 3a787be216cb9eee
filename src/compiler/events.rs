//! Structured change tracking for the rewrite passes.
//!
//! Every graph edit a pass performs is recorded as an [`Event`] in an [`EventLog`]. The log is
//! purely observational: passes never read it back. It backs the pipeline report, the CLI
//! summary and tests that assert on what a pass did rather than on the resulting graph.
//!
//! # Example
//!
//! ```rust
//! use catopt::compiler::{EventKind, EventLog};
//!
//! let log = EventLog::new();
//! log.record(EventKind::ConcatRewritten)
//!     .pass("eliminate-common-inputs")
//!     .message("prim::VarConcat reuses n4 as prefix");
//! log.info("pipeline started");
//!
//! assert_eq!(log.len(), 2);
//! assert!(log.has(EventKind::ConcatRewritten));
//! assert_eq!(log.summary(), "1 concatenation rewritten");
//! ```

use std::{collections::HashMap, fmt, time::Duration};

use crate::ir::NodeId;

/// Categories of events that can be logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A node was inserted into a block.
    NodeInserted,
    /// A node was moved to a new position.
    NodeMoved,
    /// All uses of a value were redirected to another value.
    UsesReplaced,
    /// A node was destroyed.
    NodeDestroyed,
    /// A concatenation was replaced by a cheaper form.
    ConcatRewritten,
    /// An intermediate buffer was replaced by a view into its consumer's buffer.
    BufferFused,
    /// A list append was folded into the list construction.
    ListMutationRemoved,

    /// A pass started.
    PassStarted,
    /// A pass completed.
    PassCompleted,

    /// Informational message.
    Info,
    /// Warning (something unexpected but recoverable).
    Warning,
}

impl EventKind {
    /// Returns a human-readable description of this event kind.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::NodeInserted => "node inserted",
            Self::NodeMoved => "node moved",
            Self::UsesReplaced => "uses replaced",
            Self::NodeDestroyed => "node destroyed",
            Self::ConcatRewritten => "concatenation rewritten",
            Self::BufferFused => "buffer fused",
            Self::ListMutationRemoved => "list mutation removed",
            Self::PassStarted => "pass started",
            Self::PassCompleted => "pass completed",
            Self::Info => "info",
            Self::Warning => "warning",
        }
    }

    /// Returns true for the high-level rewrites a pass reports as its result.
    #[must_use]
    pub fn is_transformation(&self) -> bool {
        matches!(
            self,
            Self::ConcatRewritten | Self::BufferFused | Self::ListMutationRemoved
        )
    }

    /// Returns true for the individual graph edits making up a rewrite.
    #[must_use]
    pub fn is_graph_edit(&self) -> bool {
        matches!(
            self,
            Self::NodeInserted | Self::NodeMoved | Self::UsesReplaced | Self::NodeDestroyed
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A single logged event.
#[derive(Debug, Clone)]
pub struct Event {
    /// The type of event.
    pub kind: EventKind,
    /// The node the event is about, if any.
    pub node: Option<NodeId>,
    /// Human-readable description.
    pub message: String,
    /// Associated pass name (if from a pass).
    pub pass: Option<&'static str>,
}

impl Event {
    fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            node: None,
            message: message.into(),
            pass: None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pass {
            Some(pass) => write!(f, "[{}] {}: {}", self.kind, pass, self.message),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

/// Builder for creating events with a fluent API.
///
/// Created by [`EventLog::record`]. The event is added to the log when the builder is dropped.
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    kind: EventKind,
    node: Option<NodeId>,
    message: Option<String>,
    pass: Option<&'static str>,
}

impl<'a> EventBuilder<'a> {
    fn new(log: &'a EventLog, kind: EventKind) -> Self {
        Self {
            log,
            kind,
            node: None,
            message: None,
            pass: None,
        }
    }

    /// Sets the node the event is about.
    pub fn node(mut self, node: NodeId) -> Self {
        self.node = Some(node);
        self
    }

    /// Sets a custom message describing the event.
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Associates this event with a specific pass.
    pub fn pass(mut self, pass_name: &'static str) -> Self {
        self.pass = Some(pass_name);
        self
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        let message = self
            .message
            .take()
            .unwrap_or_else(|| self.kind.description().to_string());

        self.log.events.push(Event {
            kind: self.kind,
            node: self.node.take(),
            message,
            pass: self.pass.take(),
        });
    }
}

/// Collection of events recorded by passes.
///
/// This type is thread-safe: events can be appended concurrently from multiple threads using
/// shared references (`&self`), which is how batch optimization shares one log between workers.
#[derive(Debug, Default)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
}

impl Clone for EventLog {
    fn clone(&self) -> Self {
        let new_log = Self::new();
        new_log.merge(self);
        new_log
    }
}

impl EventLog {
    /// Creates an empty event log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: boxcar::Vec::new(),
        }
    }

    /// Returns true if no events have been logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.count() == 0
    }

    /// Returns the total number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// Starts building a new event of the given kind.
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder::new(self, kind)
    }

    /// Records an informational message.
    pub fn info(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Info, message));
    }

    /// Records a warning message.
    pub fn warn(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Warning, message));
    }

    /// Appends copies of all events of `other`.
    pub fn merge(&self, other: &EventLog) {
        for (_, event) in &other.events {
            self.events.push(event.clone());
        }
    }

    /// Returns true if any event of the given kind exists.
    #[must_use]
    pub fn has(&self, kind: EventKind) -> bool {
        self.events.iter().any(|(_, e)| e.kind == kind)
    }

    /// Counts events of the given kind.
    #[must_use]
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|(_, e)| e.kind == kind).count()
    }

    /// Returns an iterator over all events.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|(_, e)| e)
    }

    /// Returns an iterator over events of a specific kind.
    pub fn filter_kind(&self, kind: EventKind) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(move |e| e.kind == kind)
    }

    /// Returns an iterator over events recorded by the named pass.
    pub fn filter_pass<'a>(&'a self, pass: &'a str) -> impl Iterator<Item = &'a Event> + 'a {
        self.iter().filter(move |e| e.pass == Some(pass))
    }

    /// Counts events grouped by kind.
    #[must_use]
    pub fn count_by_kind(&self) -> HashMap<EventKind, usize> {
        let mut counts = HashMap::new();
        for (_, event) in &self.events {
            *counts.entry(event.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Generates a human-readable summary of the transformations.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "no events".to_string();
        }

        let mut parts: Vec<String> = self
            .count_by_kind()
            .iter()
            .filter(|(k, _)| k.is_transformation())
            .map(|(kind, count)| {
                let plural = if *count == 1 { "" } else { "s" };
                match kind {
                    EventKind::ConcatRewritten => format!("{count} concatenation{plural} rewritten"),
                    EventKind::BufferFused => format!("{count} buffer{plural} fused"),
                    _ => format!("{count} list mutation{plural} removed"),
                }
            })
            .collect();

        if parts.is_empty() {
            return format!("{} events", self.len());
        }

        parts.sort();
        parts.join(", ")
    }
}

/// Statistics derived from an [`EventLog`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivedStats {
    /// Number of concatenations rewritten by any pass.
    pub concats_rewritten: usize,
    /// Number of intermediate buffers fused away.
    pub buffers_fused: usize,
    /// Number of list appends folded into constructions.
    pub list_mutations_removed: usize,
    /// Number of nodes inserted.
    pub nodes_inserted: usize,
    /// Number of nodes moved.
    pub nodes_moved: usize,
    /// Number of nodes destroyed.
    pub nodes_destroyed: usize,
    /// Number of fixpoint rounds run.
    pub iterations: usize,
    /// Processing time.
    pub total_time: Duration,
}

impl DerivedStats {
    /// Computes statistics from an event log.
    #[must_use]
    pub fn from_log(log: &EventLog) -> Self {
        let counts = log.count_by_kind();
        let get = |kind: EventKind| counts.get(&kind).copied().unwrap_or(0);

        Self {
            concats_rewritten: get(EventKind::ConcatRewritten),
            buffers_fused: get(EventKind::BufferFused),
            list_mutations_removed: get(EventKind::ListMutationRemoved),
            nodes_inserted: get(EventKind::NodeInserted),
            nodes_moved: get(EventKind::NodeMoved),
            nodes_destroyed: get(EventKind::NodeDestroyed),
            iterations: 0,
            total_time: Duration::ZERO,
        }
    }

    /// Sets the total processing time.
    #[must_use]
    pub fn with_time(mut self, time: Duration) -> Self {
        self.total_time = time;
        self
    }

    /// Sets the number of iterations.
    #[must_use]
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }
}

impl fmt::Display for DerivedStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} concats rewritten, {} buffers fused, {} list mutations removed \
             ({} inserted, {} moved, {} destroyed) in {:.2?}",
            self.concats_rewritten,
            self.buffers_fused,
            self.list_mutations_removed,
            self.nodes_inserted,
            self.nodes_moved,
            self.nodes_destroyed,
            self.total_time
        )
    }
}

use thiserror::Error;

use crate::ir::NodeId;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Rewrite passes never fail because a node is ineligible for optimization; eligibility checks
/// are soft and simply leave the node alone. The variants below cover the remaining failure
/// modes: structural violations of the graph IR, textual IR that cannot be parsed, and errors
/// raised while executing a graph on the reference interpreter.
///
/// # Error Categories
///
/// ## Graph Structure Errors
/// - [`Error::Malformed`] - The graph violates a well-formedness invariant
/// - [`Error::LiveUses`] - Attempted to destroy a node whose outputs are still used
/// - [`Error::Detached`] - Operation requires a node that is placed inside a block
///
/// ## Input Errors
/// - [`Error::Parse`] - Textual IR could not be parsed
///
/// ## Execution Errors
/// - [`Error::Evaluation`] - The reference interpreter could not execute a node
///
/// # Examples
///
/// ```rust
/// use catopt::{ir::parse_graph, Error};
///
/// match parse_graph("graph(%x : Tensor(2)):\n  return (%y)\n") {
///     Ok(_) => unreachable!(),
///     Err(Error::Parse { line, message }) => {
///         eprintln!("line {line}: {message}");
///     }
///     Err(e) => eprintln!("Other error: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The graph is structurally invalid.
    ///
    /// Raised by [`crate::ir::Graph::lint`] when a use is not dominated by its definition, a
    /// use list disagrees with the node inputs, or a handle points to a destroyed entity. The
    /// error includes the source location where the violation was detected.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of the violated invariant
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A node was destroyed while at least one of its outputs still had uses.
    #[error("Cannot destroy node {0} - its outputs still have uses")]
    LiveUses(NodeId),

    /// The node is not placed in any block.
    ///
    /// Positional operations (moving, dominance queries, inserting relative to a node) need
    /// the reference node to live inside a block.
    #[error("Node {0} is not placed in a block")]
    Detached(NodeId),

    /// Textual IR could not be parsed.
    ///
    /// # Fields
    ///
    /// * `line` - 1-based line number of the offending input line
    /// * `message` - What the parser expected
    #[error("Parse error on line {line}: {message}")]
    Parse {
        /// The 1-based line of the input on which parsing failed
        line: usize,
        /// Description of the failure
        message: String,
    },

    /// The reference interpreter could not execute a node.
    #[error("Evaluation failed - {0}")]
    Evaluation(String),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}

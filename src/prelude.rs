//! # catopt Prelude
//!
//! Convenient re-exports of the most commonly used types. Import this module to build,
//! parse, optimize and execute graphs without spelling out module paths.
//!
//! ```rust
//! use catopt::prelude::*;
//!
//! let mut graph = GraphBuilder::new().build_with(|g| {
//!     let x = g.input(Type::tensor_of([3]));
//!     let dim = g.const_int(0);
//!     let list = g.list(&[x, x]);
//!     let out = g.cat(list, dim);
//!     g.ret(&[out]);
//! });
//! assert!(promote_to_variadic(&mut graph)?);
//! # Ok::<(), catopt::Error>(())
//! ```

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all catopt operations
pub use crate::Error;

/// The result type used throughout catopt
pub use crate::Result;

// ================================================================================================
// Graph IR
// ================================================================================================

/// Graph arena, handles and node data
pub use crate::ir::{Block, BlockId, Graph, Node, NodeId, Producer, Use, Value, ValueId};

/// Operations, constants and value types
pub use crate::ir::{Arity, Constant, NodeKind, OpEffects, TensorType, Type};

/// Construction and textual form
pub use crate::ir::{parse_graph, BlockBuilder, GraphBuilder};

// ================================================================================================
// Analysis
// ================================================================================================

/// Alias analysis used by the rewrites
pub use crate::analysis::AliasDb;

// ================================================================================================
// Passes and Pipeline
// ================================================================================================

/// Single-pass entry points
pub use crate::compiler::{
    eliminate_common_concat_inputs, expand_concat_and_fuse, promote_to_variadic,
    remove_list_mutation, remove_list_mutation_and_promote_to_variadic,
};

/// Pass objects and the trait they implement
pub use crate::compiler::{
    CommonInputsPass, ExpandPass, GraphPass, ListMutationPass, VariadicFixpoint, VariadicPass,
};

/// Staged execution, configuration and change tracking
pub use crate::compiler::{
    ConcatPipeline, DerivedStats, EventKind, EventLog, OptimizerConfig, PipelineReport,
};

// ================================================================================================
// Execution
// ================================================================================================

/// Reference interpreter
pub use crate::interpreter::{Interpreter, RtValue, Tensor};

//! Graph intermediate representation.
//!
//! This module provides the dataflow program representation all passes operate on:
//!
//! - [`Graph`] - arena owning every block, node and value of a program
//! - [`NodeId`], [`ValueId`], [`BlockId`] - typed handles into the arena
//! - [`NodeKind`] - the supported operations and their [`OpEffects`]
//! - [`Type`] / [`TensorType`] - value types with optional shape information
//! - [`GraphBuilder`] - closure-based construction with shape propagation
//! - [`parse_graph`] and the [`Display`](std::fmt::Display) impl of [`Graph`] - textual form
//!
//! # Design
//!
//! Nodes are placed in blocks; a block is an ordered node list terminated by a
//! [`NodeKind::Return`] node. Control flow is structured: a [`NodeKind::If`] node owns two
//! nested blocks and yields the values returned by the branch that ran. There are no jumps,
//! so dominance follows directly from block nesting and node order.
//!
//! Mutation happens in place. A node that writes memory (see [`OpEffects::WRITES_SELF`]) changes
//! the contents of its first input and of every value aliasing it, which is why rewrites consult
//! the [`AliasDb`](crate::analysis::AliasDb) before reordering or merging operations.

mod builder;
mod display;
mod graph;
mod ids;
mod kind;
mod parser;
mod types;

pub use builder::{clamp_slice_bounds, concat_shape, slice_shape, BlockBuilder, GraphBuilder};
pub use graph::{Block, Graph, Node, Producer, Use, Value};
pub use ids::{BlockId, NodeId, ValueId};
pub use kind::{Arity, Constant, NodeKind, OpEffects};
pub use parser::{parse_graph, parse_type};
pub use types::{TensorType, Type};

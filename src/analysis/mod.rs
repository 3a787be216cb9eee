//! Program analyses consulted by the rewrite passes.
//!
//! - [`AliasDb`] - alias classes, writer queries and code-motion legality
//!
//! Analyses are snapshots: they describe the graph at the moment they were built and are not
//! updated by later edits. Passes build what they need once per invocation.

mod alias;

pub use alias::AliasDb;

//! Concatenation rewrite passes.
//!
//! | Pass | Rewrite |
//! |------|---------|
//! | [`CommonInputsPass`] | Reuses an earlier variadic concatenation of all but one operand |
//! | [`ExpandPass`] | Lowers `aten::cat` to allocate/slice/copy and fuses nested buffers |
//! | [`ListMutationPass`] | Folds `aten::append` into the list's construction |
//! | [`VariadicPass`] | Promotes `aten::cat` over an unmodified list to `prim::VarConcat` |
//! | [`VariadicFixpoint`] | Alternates the previous two until nothing changes |
//!
//! Every pass collects its candidates before editing, so decisions are based on a consistent
//! view of the graph.

mod common_inputs;
mod expand;
mod list_mutation;
pub(crate) mod utils;
mod variadic;

pub use common_inputs::{eliminate_common_concat_inputs, CommonInputsPass};
pub use expand::{expand_concat_and_fuse, ExpandPass};
pub use list_mutation::{remove_list_mutation, ListMutationPass};
pub use variadic::{
    promote_to_variadic, remove_list_mutation_and_promote_to_variadic, VariadicFixpoint,
    VariadicPass,
};

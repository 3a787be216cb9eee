//! Concatenation optimization passes and their execution.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Concat Pipeline                             │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  OptimizerConfig             Stage switches, fixpoint ceiling    │
//! │                                                                  │
//! │  ConcatPipeline              Staged execution                    │
//! │    ├─ Stage 1: Common inputs  (VarConcat prefix/suffix reuse)    │
//! │    ├─ Stage 2: Expansion      (cat → empty + slice + copy_)      │
//! │    └─ Stage 3: Variadic       (append removal ⇄ promotion)       │
//! │    run_batch() spreads independent graphs over rayon workers     │
//! │                                                                  │
//! │  GraphPass trait             Interface for all passes            │
//! │    └─ run()                   Whole-graph transformation         │
//! │                                                                  │
//! │  EventLog                    Change tracking and diagnostics     │
//! │  DerivedStats                Counters for reports                │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The free functions ([`eliminate_common_concat_inputs`], [`expand_concat_and_fuse`],
//! [`promote_to_variadic`], [`remove_list_mutation`] and
//! [`remove_list_mutation_and_promote_to_variadic`]) run a single pass with a private event
//! log.

mod config;
mod events;
mod pass;
mod passes;
mod pipeline;

pub use config::OptimizerConfig;
pub use events::{DerivedStats, Event, EventBuilder, EventKind, EventLog};
pub use pass::GraphPass;
pub use passes::{
    eliminate_common_concat_inputs, expand_concat_and_fuse, promote_to_variadic,
    remove_list_mutation, remove_list_mutation_and_promote_to_variadic, CommonInputsPass,
    ExpandPass, ListMutationPass, VariadicFixpoint, VariadicPass,
};
pub use pipeline::{ConcatPipeline, PipelineReport};

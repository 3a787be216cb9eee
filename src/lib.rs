// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # catopt
//!
//! Concatenation optimizations for a dataflow graph IR of tensor programs.
//!
//! Tensor programs frequently build a result by concatenating many pieces. Naively, every
//! concatenation allocates a fresh output and copies every operand, and nested concatenations
//! copy the same data several times. `catopt` provides three rewrites that reduce this work,
//! together with the IR, alias analysis and reference interpreter they are built on.
//!
//! ## Features
//!
//! - **Common-input elimination** - a variadic concatenation sharing all but its last (or
//!   first) operand with an earlier one reuses the earlier result
//! - **Expansion with buffer fusion** - `aten::cat` with known shapes becomes one allocation,
//!   one view and one copy per operand; nested concatenations write straight into the outer
//!   buffer
//! - **Variadic promotion** - `aten::cat` over an unmodified list becomes `prim::VarConcat`,
//!   after list appends are folded into the list construction
//! - **Alias-aware** - every rewrite is guarded by [`analysis::AliasDb`]
//! - **Verifiable** - [`interpreter::Interpreter`] executes graphs on concrete tensors
//!
//! ## Quick Start
//!
//! ```rust
//! use catopt::prelude::*;
//!
//! let mut graph = parse_graph(
//!     r#"
//! graph(%x : Tensor(2, 3), %y : Tensor(4, 3)):
//!   %d : int = prim::Constant[value=0]()
//!   %l : Tensor[] = prim::ListConstruct(%x, %y)
//!   %r : Tensor(6, 3) = aten::cat(%l, %d)
//!   return (%r)
//! "#,
//! )?;
//!
//! let report = ConcatPipeline::new(OptimizerConfig::default()).run(&mut graph)?;
//! assert!(report.changed);
//! assert_eq!(graph.count_kind(NodeKind::Cat), 0);
//! println!("{graph}");
//! # Ok::<(), catopt::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`ir`] - graph arena, node kinds, types, builder, printer and parser
//! - [`analysis`] - alias analysis over a graph snapshot
//! - [`compiler`] - the rewrite passes, the pass trait, events, configuration and pipeline
//! - [`interpreter`] - reference execution with aliasing tensor views
//! - [`prelude`] - convenient re-exports
//! - [`Error`] and [`Result`] - error handling
//!
//! ## Logging
//!
//! The library logs through the [`log`](https://docs.rs/log) facade: `debug` for every
//! candidate considered and every graph edit, `trace` for full graph dumps before and after
//! each pass. Install any logger (for example `env_logger`) to see them.

#[macro_use]
mod error;

pub mod analysis;
pub mod compiler;
pub mod interpreter;
pub mod ir;
pub mod prelude;

pub use error::Error;

/// `catopt` Result type.
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// catopt - concatenation optimizations for tensor program graphs
#[derive(Debug, Parser)]
#[command(name = "catopt", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared across all subcommands.
#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Emit output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Reuse earlier variadic concatenations that share all but one operand.
    Eliminate {
        /// Path to the textual graph.
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },

    /// Expand list concatenations into allocate/slice/copy and fuse nested buffers.
    Expand {
        /// Path to the textual graph.
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },

    /// Remove list mutation and promote concatenations to variadic form until stable.
    Variadic {
        /// Path to the textual graph.
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Maximum number of fixpoint rounds.
        #[arg(long, default_value_t = 100)]
        max_iterations: usize,
    },

    /// Run all enabled stages in order: eliminate, expand, variadic.
    Pipeline {
        /// Path to the textual graph.
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Skip common-input elimination.
        #[arg(long)]
        no_eliminate: bool,

        /// Skip expansion and buffer fusion.
        #[arg(long)]
        no_expand: bool,

        /// Skip variadic promotion.
        #[arg(long)]
        no_variadic: bool,

        /// Maximum number of variadic fixpoint rounds.
        #[arg(long, default_value_t = 100)]
        max_iterations: usize,

        /// Lint the graph after every stage.
        #[arg(long)]
        verify: bool,
    },

    /// Parse, verify and pretty-print a graph.
    Print {
        /// Path to the textual graph.
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },
}

//! Staged execution of the concatenation passes.
//!
//! [`ConcatPipeline`] runs the enabled stages of an [`OptimizerConfig`] in a fixed order:
//!
//! 1. **Common inputs**: reuse of earlier variadic concatenations
//! 2. **Expansion**: allocate/slice/copy lowering with buffer fusion
//! 3. **Variadic**: list-mutation removal and variadic promotion, run to fixpoint
//!
//! Each stage is a fresh [`GraphPass`] instance, so every stage sees an alias analysis of the
//! graph as the previous stage left it.

use std::time::Instant;

use rayon::prelude::*;

use crate::{
    compiler::{
        passes::{CommonInputsPass, ExpandPass, VariadicFixpoint},
        DerivedStats, EventKind, EventLog, GraphPass, OptimizerConfig,
    },
    ir::Graph,
    Result,
};

/// The outcome of a pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    /// Whether any stage changed a graph.
    pub changed: bool,
    /// Counters derived from the recorded events.
    pub stats: DerivedStats,
    /// Every event recorded during the run.
    pub events: EventLog,
}

/// Runs the configured concatenation stages over one or many graphs.
///
/// # Examples
///
/// ```rust
/// use catopt::{
///     compiler::{ConcatPipeline, OptimizerConfig},
///     ir::{GraphBuilder, NodeKind, Type},
/// };
///
/// let mut graph = GraphBuilder::new().build_with(|g| {
///     let x = g.input(Type::tensor_of([2]));
///     let dim = g.const_int(0);
///     let list = g.list(&[x, x]);
///     let out = g.cat(list, dim);
///     g.ret(&[out]);
/// });
///
/// let pipeline = ConcatPipeline::new(OptimizerConfig::new().with_expansion(false));
/// let report = pipeline.run(&mut graph)?;
/// assert!(report.changed);
/// assert_eq!(graph.count_kind(NodeKind::VarConcat), 1);
/// # Ok::<(), catopt::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConcatPipeline {
    config: OptimizerConfig,
}

impl ConcatPipeline {
    /// Creates a pipeline for the given configuration.
    #[must_use]
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    fn warn_if_idle(&self, events: &EventLog) {
        if !self.config.any_enabled() {
            log::warn!("concat pipeline: every stage is disabled");
            events.warn("every stage is disabled");
        }
    }

    /// Runs one pass as a stage, bracketed by start/completion events.
    fn run_stage(
        &self,
        pass: &mut dyn GraphPass,
        graph: &mut Graph,
        events: &EventLog,
    ) -> Result<bool> {
        log::debug!("running stage {}: {}", pass.name(), pass.description());
        events
            .record(EventKind::PassStarted)
            .pass(pass.name())
            .message(pass.description());

        let changed = pass.run(graph, events)?;

        events
            .record(EventKind::PassCompleted)
            .pass(pass.name())
            .message(if changed { "changed" } else { "unchanged" });
        if self.config.verify_graph {
            graph.lint()?;
        }
        Ok(changed)
    }

    /// Runs all enabled stages on `graph`, returning whether it changed and the number of
    /// fixpoint rounds.
    fn optimize(&self, graph: &mut Graph, events: &EventLog) -> Result<(bool, usize)> {
        let mut changed = false;
        let mut iterations = 0;

        if self.config.enable_common_inputs {
            changed |= self.run_stage(&mut CommonInputsPass::new(), graph, events)?;
        }
        if self.config.enable_expansion {
            changed |= self.run_stage(&mut ExpandPass::new(), graph, events)?;
        }
        if self.config.enable_variadic {
            let mut fixpoint = VariadicFixpoint::new(self.config.max_fixpoint_iterations);
            changed |= self.run_stage(&mut fixpoint, graph, events)?;
            iterations = fixpoint.iterations();
        }
        Ok((changed, iterations))
    }

    /// Optimizes a single graph.
    ///
    /// # Errors
    ///
    /// Returns an error if a stage fails, or if verification is enabled and a stage leaves the
    /// graph malformed.
    pub fn run(&self, graph: &mut Graph) -> Result<PipelineReport> {
        let start = Instant::now();
        let events = EventLog::new();
        self.warn_if_idle(&events);
        if self.config.verify_graph {
            graph.lint()?;
        }

        let (changed, iterations) = self.optimize(graph, &events)?;

        let stats = DerivedStats::from_log(&events)
            .with_iterations(iterations)
            .with_time(start.elapsed());
        log::info!("concat pipeline: {stats}");
        Ok(PipelineReport {
            changed,
            stats,
            events,
        })
    }

    /// Optimizes independent graphs in parallel, sharing one event log.
    ///
    /// The reported iteration count is the highest count of any graph.
    ///
    /// # Errors
    ///
    /// Returns the first error any graph produced. Graphs processed without error keep their
    /// changes.
    pub fn run_batch(&self, graphs: &mut [Graph]) -> Result<PipelineReport> {
        let start = Instant::now();
        let events = EventLog::new();
        self.warn_if_idle(&events);

        let outcomes = graphs
            .par_iter_mut()
            .map(|graph| {
                if self.config.verify_graph {
                    graph.lint()?;
                }
                self.optimize(graph, &events)
            })
            .collect::<Result<Vec<_>>>()?;

        let changed = outcomes.iter().any(|(changed, _)| *changed);
        let iterations = outcomes.iter().map(|(_, n)| *n).max().unwrap_or(0);
        let stats = DerivedStats::from_log(&events)
            .with_iterations(iterations)
            .with_time(start.elapsed());
        log::info!("concat pipeline ({} graphs): {stats}", graphs.len());
        Ok(PipelineReport {
            changed,
            stats,
            events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{GraphBuilder, NodeKind, Type};

    fn nested_cats() -> Graph {
        GraphBuilder::new().build_with(|g| {
            let x = g.input(Type::tensor_of([2, 2]));
            let y = g.input(Type::tensor_of([1, 2]));
            let dim = g.const_int(0);
            let inner_list = g.list(&[x, y]);
            let inner = g.cat(inner_list, dim);
            let outer_list = g.list(&[inner, x]);
            let outer = g.cat(outer_list, dim);
            g.ret(&[outer]);
        })
    }

    #[test]
    fn test_disabled_pipeline_is_noop() {
        let mut graph = nested_cats();
        let before = graph.to_string();
        let report = ConcatPipeline::new(OptimizerConfig::disabled())
            .run(&mut graph)
            .unwrap();
        assert!(!report.changed);
        assert_eq!(report.events.len(), 1);
        assert!(report.events.has(EventKind::Warning));
        assert_eq!(graph.to_string(), before);

        let report = ConcatPipeline::default().run(&mut graph).unwrap();
        assert!(!report.events.has(EventKind::Warning));
    }

    #[test]
    fn test_full_pipeline_expands_and_fuses() {
        let mut graph = nested_cats();
        let config = OptimizerConfig::new().with_verification(true);
        let report = ConcatPipeline::new(config).run(&mut graph).unwrap();
        assert!(report.changed);
        assert_eq!(report.stats.buffers_fused, 1);
        assert_eq!(report.stats.iterations, 1);
        assert_eq!(graph.count_kind(NodeKind::Cat), 0);
        assert_eq!(graph.count_kind(NodeKind::Empty), 1);
        assert_eq!(report.events.count_kind(EventKind::PassStarted), 3);
    }

    #[test]
    fn test_batch_shares_event_log() {
        let mut graphs = vec![nested_cats(), nested_cats(), nested_cats()];
        let pipeline = ConcatPipeline::new(OptimizerConfig::new().with_expansion(false));
        let report = pipeline.run_batch(&mut graphs).unwrap();
        assert!(report.changed);
        assert_eq!(report.stats.concats_rewritten, 6);
        for graph in &graphs {
            assert_eq!(graph.count_kind(NodeKind::VarConcat), 2);
            assert!(graph.lint().is_ok());
        }
    }
}

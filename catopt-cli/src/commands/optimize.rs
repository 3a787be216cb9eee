use std::{path::Path, time::Instant};

use catopt::{
    compiler::{
        CommonInputsPass, ConcatPipeline, DerivedStats, EventLog, ExpandPass, GraphPass,
        OptimizerConfig, VariadicFixpoint,
    },
    ir::Graph,
};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::load_graph,
    output::{print_output, Align, TabWriter},
};

/// What to run on the loaded graph.
pub enum Stage {
    Eliminate,
    Expand,
    Variadic { max_iterations: usize },
    Pipeline(OptimizerConfig),
}

#[derive(Debug, Serialize)]
pub struct OptimizeReport {
    pub stage: String,
    pub changed: bool,
    pub nodes_before: usize,
    pub nodes_after: usize,
    pub stats: StatsInfo,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<EventInfo>,
    pub graph: String,
}

#[derive(Debug, Serialize)]
pub struct StatsInfo {
    pub concats_rewritten: usize,
    pub buffers_fused: usize,
    pub list_mutations_removed: usize,
    pub nodes_inserted: usize,
    pub nodes_moved: usize,
    pub nodes_destroyed: usize,
    pub iterations: usize,
    pub time_ms: f64,
}

impl From<&DerivedStats> for StatsInfo {
    fn from(stats: &DerivedStats) -> Self {
        Self {
            concats_rewritten: stats.concats_rewritten,
            buffers_fused: stats.buffers_fused,
            list_mutations_removed: stats.list_mutations_removed,
            nodes_inserted: stats.nodes_inserted,
            nodes_moved: stats.nodes_moved,
            nodes_destroyed: stats.nodes_destroyed,
            iterations: stats.iterations,
            time_ms: stats.total_time.as_secs_f64() * 1000.0,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EventInfo {
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    pub message: String,
}

/// Runs a single pass and derives the same statistics the pipeline reports.
fn run_pass(
    pass: &mut dyn GraphPass,
    graph: &mut Graph,
) -> anyhow::Result<(bool, EventLog, DerivedStats)> {
    let start = Instant::now();
    let events = EventLog::new();
    let changed = pass.run(graph, &events)?;
    let stats = DerivedStats::from_log(&events).with_time(start.elapsed());
    Ok((changed, events, stats))
}

pub fn run(path: &Path, stage: Stage, opts: &GlobalOptions) -> anyhow::Result<()> {
    let mut graph = load_graph(path)?;
    let nodes_before = graph.node_count();

    let (name, changed, events, stats) = match stage {
        Stage::Eliminate => {
            let (changed, events, stats) = run_pass(&mut CommonInputsPass::new(), &mut graph)?;
            (CommonInputsPass::NAME, changed, events, stats)
        }
        Stage::Expand => {
            let (changed, events, stats) = run_pass(&mut ExpandPass::new(), &mut graph)?;
            (ExpandPass::NAME, changed, events, stats)
        }
        Stage::Variadic { max_iterations } => {
            let mut fixpoint = VariadicFixpoint::new(max_iterations);
            let (changed, events, stats) = run_pass(&mut fixpoint, &mut graph)?;
            let stats = stats.with_iterations(fixpoint.iterations());
            (VariadicFixpoint::NAME, changed, events, stats)
        }
        Stage::Pipeline(config) => {
            let report = ConcatPipeline::new(config).run(&mut graph)?;
            ("pipeline", report.changed, report.events, report.stats)
        }
    };
    log::info!("{name}: {stats}");

    let report = OptimizeReport {
        stage: name.to_string(),
        changed,
        nodes_before,
        nodes_after: graph.node_count(),
        stats: StatsInfo::from(&stats),
        events: events
            .iter()
            .filter(|e| opts.verbose || !e.kind.is_graph_edit())
            .map(|e| EventInfo {
                kind: e.kind.to_string(),
                pass: e.pass.map(str::to_string),
                node: e.node.map(|n| n.to_string()),
                message: e.message.clone(),
            })
            .collect(),
        graph: graph.to_string(),
    };

    print_output(&report, opts, |report| {
        print!("{}", report.graph);
        println!();
        println!(
            "{}: {} ({} -> {} nodes)",
            report.stage,
            if report.changed { "changed" } else { "unchanged" },
            report.nodes_before,
            report.nodes_after
        );
        println!("  {}", events.summary());

        if !report.events.is_empty() {
            let mut table = TabWriter::new(&[
                ("Event", Align::Left),
                ("Pass", Align::Left),
                ("Node", Align::Right),
                ("Message", Align::Left),
            ])
            .indent("  ");
            for e in &report.events {
                table.row(vec![
                    e.kind.clone(),
                    e.pass.clone().unwrap_or_default(),
                    e.node.clone().unwrap_or_default(),
                    e.message.clone(),
                ]);
            }
            table.print();
        }
    })
}

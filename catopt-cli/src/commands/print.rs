use std::path::Path;

use catopt::ir::NodeKind;
use serde::Serialize;
use strum::IntoEnumIterator;

use crate::{
    app::GlobalOptions,
    commands::common::load_graph,
    output::{print_output, Align, TabWriter},
};

#[derive(Debug, Serialize)]
pub struct GraphInfo {
    pub inputs: usize,
    pub outputs: usize,
    pub nodes: usize,
    pub kinds: Vec<KindCount>,
    pub graph: String,
}

#[derive(Debug, Serialize)]
pub struct KindCount {
    pub kind: String,
    pub count: usize,
}

pub fn run(path: &Path, opts: &GlobalOptions) -> anyhow::Result<()> {
    let graph = load_graph(path)?;
    graph.lint()?;

    let kinds = NodeKind::iter()
        .filter(|&kind| kind != NodeKind::Return)
        .map(|kind| KindCount {
            kind: kind.to_string(),
            count: graph.count_kind(kind),
        })
        .filter(|k| k.count > 0)
        .collect();

    let info = GraphInfo {
        inputs: graph.inputs().len(),
        outputs: graph.outputs().len(),
        nodes: graph.node_count(),
        kinds,
        graph: graph.to_string(),
    };

    print_output(&info, opts, |info| {
        print!("{}", info.graph);
        println!();
        println!(
            "{} inputs, {} outputs, {} nodes",
            info.inputs, info.outputs, info.nodes
        );
        let mut table =
            TabWriter::new(&[("Kind", Align::Left), ("Count", Align::Right)]).indent("  ");
        for k in &info.kinds {
            table.row(vec![k.kind.clone(), k.count.to_string()]);
        }
        table.print();
    })
}

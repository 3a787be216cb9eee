use std::path::Path;

use anyhow::Context;
use catopt::ir::{parse_graph, Graph};

/// Read and parse a textual graph.
pub fn load_graph(path: &Path) -> anyhow::Result<Graph> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read graph: {}", path.display()))?;
    parse_graph(&text).with_context(|| format!("failed to parse graph: {}", path.display()))
}

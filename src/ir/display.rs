//! Textual form of a graph.
//!
//! ```text
//! graph(%x : Tensor(2, 3), %c : bool):
//!   %d : int = prim::Constant[value=0]()
//!   %l : Tensor[] = prim::ListConstruct(%x, %x)
//!   %r : Tensor(4, 3) = aten::cat(%l, %d)
//!   %o : Tensor(4, 3) = prim::If(%c)
//!     block0():
//!       -> (%r)
//!     block1():
//!       -> (%r)
//!   return (%o)
//! ```
//!
//! Values print as `%name` when they carry a non-numeric debug name and as `%index` otherwise,
//! so names never collide with anonymous values. The output is accepted by
//! [`parse_graph`](crate::ir::parse_graph).

use std::fmt::{self, Write};

use crate::ir::{BlockId, Graph, NodeId, NodeKind, ValueId};

impl Graph {
    /// Returns the textual name of `value`, including the leading `%`.
    #[must_use]
    pub fn value_name(&self, value: ValueId) -> String {
        match self.value(value).name() {
            Some(name) if !name.bytes().all(|b| b.is_ascii_digit()) => format!("%{name}"),
            _ => format!("%{}", value.index()),
        }
    }

    fn write_typed_values(&self, out: &mut impl Write, values: &[ValueId]) -> fmt::Result {
        for (i, &value) in values.iter().enumerate() {
            if i > 0 {
                out.write_str(", ")?;
            }
            write!(out, "{} : {}", self.value_name(value), self.value(value).ty())?;
        }
        Ok(())
    }

    fn write_value_list(&self, out: &mut impl Write, values: &[ValueId]) -> fmt::Result {
        out.write_char('(')?;
        for (i, &value) in values.iter().enumerate() {
            if i > 0 {
                out.write_str(", ")?;
            }
            out.write_str(&self.value_name(value))?;
        }
        out.write_char(')')
    }

    fn write_node(&self, out: &mut impl Write, node: NodeId, indent: usize) -> fmt::Result {
        let data = self.node(node);
        write!(out, "{:indent$}", "")?;
        if data.kind() == NodeKind::Return {
            let keyword = if indent == 2 { "return " } else { "-> " };
            out.write_str(keyword)?;
            self.write_value_list(out, data.inputs())?;
            return out.write_char('\n');
        }

        if !data.outputs().is_empty() {
            self.write_typed_values(out, data.outputs())?;
            out.write_str(" = ")?;
        }
        write!(out, "{}", data.kind())?;
        if let Some(constant) = data.constant() {
            write!(out, "[value={constant}]")?;
        }
        self.write_value_list(out, data.inputs())?;
        out.write_char('\n')?;

        for (i, &block) in data.blocks().iter().enumerate() {
            self.write_block(out, block, i, indent + 2)?;
        }
        Ok(())
    }

    fn write_block(
        &self,
        out: &mut impl Write,
        block: BlockId,
        index: usize,
        indent: usize,
    ) -> fmt::Result {
        write!(out, "{:indent$}block{index}(", "")?;
        self.write_typed_values(out, self.block(block).params())?;
        out.write_str("):\n")?;
        for &node in self.block(block).nodes() {
            self.write_node(out, node, indent + 2)?;
        }
        Ok(())
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("graph(")?;
        self.write_typed_values(f, self.inputs())?;
        f.write_str("):\n")?;
        for &node in self.block(self.root()).nodes() {
            self.write_node(f, node, 2)?;
        }
        Ok(())
    }
}

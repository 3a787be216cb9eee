//! Parser for the textual graph form produced by the printer.
//!
//! The parser is line based. Indentation is informational only: nesting is tracked through
//! `blockN(...):` headers, which open a block on the most recent node, and `-> (...)` lines,
//! which close it. Values must be defined before they are used.

use std::{collections::HashMap, str::FromStr};

use crate::{
    ir::{BlockId, Constant, Graph, NodeKind, TensorType, Type, ValueId},
    Error, Result,
};

/// Parses a graph from its textual form.
///
/// # Errors
///
/// Returns [`Error::Parse`] with the offending line if the text is not valid, and
/// [`Error::Malformed`] if the parsed graph violates a structural invariant.
///
/// # Examples
///
/// ```rust
/// use catopt::ir::{parse_graph, NodeKind};
///
/// let text = "\
/// graph(%x : Tensor(2, 3)):
///   %d : int = prim::Constant[value=1]()
///   %l : Tensor[] = prim::ListConstruct(%x, %x)
///   %r : Tensor(2, 6) = aten::cat(%l, %d)
///   return (%r)
/// ";
/// let graph = parse_graph(text)?;
/// assert_eq!(graph.count_kind(NodeKind::Cat), 1);
/// assert_eq!(graph.to_string(), text);
/// # Ok::<(), catopt::Error>(())
/// ```
pub fn parse_graph(text: &str) -> Result<Graph> {
    Parser::new().parse(text)
}

struct Parser {
    graph: Graph,
    values: HashMap<String, ValueId>,
    blocks: Vec<BlockId>,
    line: usize,
}

impl Parser {
    fn new() -> Self {
        let graph = Graph::new();
        let root = graph.root();
        Self {
            graph,
            values: HashMap::new(),
            blocks: vec![root],
            line: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::Parse {
            line: self.line,
            message: message.into(),
        }
    }

    fn parse(mut self, text: &str) -> Result<Graph> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim()))
            .filter(|(_, l)| !l.is_empty() && !l.starts_with('#'));

        let Some((line, header)) = lines.next() else {
            return Err(Error::Parse {
                line: 1,
                message: "empty input".to_string(),
            });
        };
        self.line = line;
        let params = header
            .strip_prefix("graph(")
            .and_then(|rest| rest.strip_suffix("):"))
            .ok_or_else(|| self.error("expected `graph(...):` header"))?;
        let root = self.graph.root();
        self.parse_params(params, root)?;

        let mut finished = false;
        for (line, text) in lines {
            self.line = line;
            if finished {
                return Err(self.error("unexpected content after `return`"));
            }
            if let Some(values) = text.strip_prefix("return ") {
                if self.blocks.len() != 1 {
                    return Err(self.error("`return` inside a nested block"));
                }
                let values = self.parse_value_list(values)?;
                self.graph.set_outputs(&values);
                finished = true;
            } else if let Some(values) = text.strip_prefix("-> ") {
                if self.blocks.len() < 2 {
                    return Err(self.error("`->` outside a nested block"));
                }
                let values = self.parse_value_list(values)?;
                let block = self.blocks.pop().ok_or_else(|| self.error("no open block"))?;
                self.graph.set_block_outputs(block, &values);
            } else if text.starts_with("block") {
                self.parse_block_header(text)?;
            } else {
                self.parse_node(text)?;
            }
        }

        if !finished {
            return Err(self.error("missing `return`"));
        }
        self.graph.lint()?;
        Ok(self.graph)
    }

    fn current_block(&self) -> BlockId {
        self.blocks[self.blocks.len() - 1]
    }

    fn define(&mut self, token: &str, value: ValueId) -> Result<()> {
        let name = token
            .strip_prefix('%')
            .filter(|n| !n.is_empty())
            .ok_or_else(|| self.error(format!("invalid value name `{token}`")))?;
        if self.values.insert(name.to_string(), value).is_some() {
            return Err(self.error(format!("value `%{name}` defined twice")));
        }
        if !name.bytes().all(|b| b.is_ascii_digit()) {
            self.graph.set_name(value, name);
        }
        Ok(())
    }

    fn lookup(&self, token: &str) -> Result<ValueId> {
        let name = token.trim().strip_prefix('%').unwrap_or(token);
        self.values
            .get(name)
            .copied()
            .ok_or_else(|| self.error(format!("undefined value `{}`", token.trim())))
    }

    fn parse_params(&mut self, params: &str, block: BlockId) -> Result<()> {
        for param in split_top_level(params) {
            let (name, ty) = self.parse_typed(param)?;
            let value = self.graph.add_block_param(block, ty);
            self.define(name, value)?;
        }
        Ok(())
    }

    fn parse_typed<'t>(&self, text: &'t str) -> Result<(&'t str, Type)> {
        let (name, ty) = text
            .split_once(" : ")
            .ok_or_else(|| self.error(format!("expected `%name : Type`, found `{text}`")))?;
        let ty = parse_type(ty.trim()).ok_or_else(|| self.error(format!("unknown type `{ty}`")))?;
        Ok((name.trim(), ty))
    }

    fn parse_value_list(&self, text: &str) -> Result<Vec<ValueId>> {
        let inner = text
            .trim()
            .strip_prefix('(')
            .and_then(|t| t.strip_suffix(')'))
            .ok_or_else(|| self.error("expected parenthesized value list"))?;
        split_top_level(inner)
            .into_iter()
            .map(|token| self.lookup(token))
            .collect()
    }

    fn parse_block_header(&mut self, text: &str) -> Result<()> {
        let params = text
            .find('(')
            .and_then(|open| text[open + 1..].strip_suffix("):"))
            .ok_or_else(|| self.error("expected `blockN(...):`"))?;

        let current = self.current_block();
        let owner = self
            .graph
            .block(current)
            .nodes()
            .iter()
            .rev()
            .nth(1)
            .copied()
            .filter(|&n| self.graph.node(n).kind() == NodeKind::If)
            .ok_or_else(|| self.error("block header must follow a `prim::If`"))?;
        if self.graph.node(owner).blocks().len() >= 2 {
            return Err(self.error("`prim::If` takes exactly two blocks"));
        }

        let block = self.graph.add_block(owner);
        self.parse_params(params, block)?;
        self.blocks.push(block);
        Ok(())
    }

    fn parse_node(&mut self, text: &str) -> Result<()> {
        let (outputs, call) = match text.find(" = ") {
            Some(pos) => (&text[..pos], &text[pos + 3..]),
            None => ("", text),
        };

        let mut names = Vec::new();
        let mut types = Vec::new();
        for output in split_top_level(outputs) {
            let (name, ty) = self.parse_typed(output)?;
            names.push(name);
            types.push(ty);
        }

        let open = call
            .find(['[', '('])
            .ok_or_else(|| self.error(format!("expected operation, found `{call}`")))?;
        let kind = NodeKind::from_str(&call[..open])
            .map_err(|_| self.error(format!("unknown operation `{}`", &call[..open])))?;
        let mut rest = &call[open..];

        let mut constant = None;
        if let Some(attr) = rest.strip_prefix("[value=") {
            let close = attr
                .find(']')
                .ok_or_else(|| self.error("unterminated attribute"))?;
            constant = Some(
                parse_constant(&attr[..close])
                    .ok_or_else(|| self.error(format!("invalid constant `{}`", &attr[..close])))?,
            );
            rest = &attr[close + 1..];
        }
        let inputs = self.parse_value_list(rest)?;

        let arity = kind.arity();
        if kind != NodeKind::Return
            && (!arity.accepts_inputs(inputs.len()) || !arity.accepts_outputs(types.len()))
        {
            return Err(self.error(format!(
                "{kind} expects {arity}, found {} input(s) and {} output(s)",
                inputs.len(),
                types.len()
            )));
        }

        let block = self.current_block();
        let node = match (kind, constant) {
            (NodeKind::Constant, Some(constant)) => {
                if !inputs.is_empty() || names.len() != 1 {
                    return Err(self.error("constants take no inputs and have one output"));
                }
                self.graph.create_constant(constant)
            }
            (NodeKind::Constant, None) => return Err(self.error("constant without value")),
            (NodeKind::Return, _) => return Err(self.error("use `return` or `->` to end a block")),
            (_, Some(_)) => return Err(self.error(format!("{kind} takes no attribute"))),
            (kind, None) => self.graph.create_node(kind, &inputs, types),
        };
        self.graph.append_to_block(node, block);

        let outputs = self.graph.node(node).outputs().to_vec();
        for (name, value) in names.into_iter().zip(outputs) {
            self.define(name, value)?;
        }
        Ok(())
    }
}

fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = text[start..].trim();
    if !last.is_empty() || !parts.is_empty() {
        parts.push(last);
    }
    parts
}

fn parse_constant(text: &str) -> Option<Constant> {
    match text {
        "None" => Some(Constant::None),
        "true" => Some(Constant::Bool(true)),
        "false" => Some(Constant::Bool(false)),
        other => other.parse().ok().map(Constant::Int),
    }
}

/// Parses a type in its printed form, e.g. `Tensor(2, *)`, `int[]` or `NoneType`.
#[must_use]
pub fn parse_type(text: &str) -> Option<Type> {
    if let Some(elem) = text.strip_suffix("[]") {
        return parse_type(elem).map(|elem| match elem {
            Type::Tensor(_) => Type::list_of(Type::tensor()),
            other => Type::list_of(other),
        });
    }
    match text {
        "Tensor" => Some(Type::tensor()),
        "int" => Some(Type::Int),
        "bool" => Some(Type::Bool),
        "NoneType" => Some(Type::None),
        _ => {
            let sizes = text.strip_prefix("Tensor(")?.strip_suffix(')')?;
            let sizes = split_top_level(sizes)
                .into_iter()
                .map(|s| match s {
                    "*" => Some(None),
                    s => s.parse().ok().filter(|&size: &i64| size >= 0).map(Some),
                })
                .collect::<Option<Vec<_>>>()?;
            Some(Type::Tensor(TensorType::with_partial_sizes(sizes)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IF_GRAPH: &str = "\
graph(%x : Tensor(2, 3), %y : Tensor(2, 3), %c : bool):
  %d : int = prim::Constant[value=0]()
  %l : Tensor[] = prim::ListConstruct(%x, %y)
  %r : Tensor(4, 3) = aten::cat(%l, %d)
  %o : Tensor(4, 3) = prim::If(%c)
    block0():
      -> (%r)
    block1():
      %z : Tensor(4, 3) = aten::relu(%r)
      -> (%z)
  return (%o)
";

    #[test]
    fn test_parse_and_print_round_trip() {
        let graph = parse_graph(IF_GRAPH).unwrap();
        assert_eq!(graph.inputs().len(), 3);
        assert_eq!(graph.count_kind(NodeKind::If), 1);
        assert_eq!(graph.count_kind(NodeKind::Relu), 1);
        assert_eq!(graph.to_string(), IF_GRAPH);
    }

    #[test]
    fn test_parse_numeric_names() {
        let text = "graph(%0 : int):\n  %1 : int[] = prim::ListConstruct(%0)\n  return (%1)\n";
        let graph = parse_graph(text).unwrap();
        assert_eq!(graph.count_kind(NodeKind::ListConstruct), 1);
        assert!(graph.value(graph.inputs()[0]).name().is_none());
    }

    #[test]
    fn test_parse_errors_report_line() {
        let text = "graph(%x : Tensor):\n  %y : Tensor = aten::relu(%q)\n  return (%y)\n";
        match parse_graph(text) {
            Err(Error::Parse { line, message }) => {
                assert_eq!(line, 2);
                assert!(message.contains("%q"));
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let text = "graph(%x : Tensor):\n  %y : Tensor = aten::frobnicate(%x)\n  return (%y)\n";
        assert!(matches!(parse_graph(text), Err(Error::Parse { line: 2, .. })));

        let text = "graph(%x : Tensor):\n  %x : Tensor = aten::relu(%x)\n  return (%x)\n";
        assert!(matches!(parse_graph(text), Err(Error::Parse { line: 2, .. })));

        let text = "graph(%x : Tensor):\n  %y : Tensor = aten::relu(%x)\n";
        assert!(matches!(parse_graph(text), Err(Error::Parse { .. })));

        assert!(matches!(parse_graph(""), Err(Error::Parse { line: 1, .. })));
    }

    #[test]
    fn test_parse_rejects_wrong_arity() {
        let cases = [
            "  %r : Tensor = aten::cat(%l)",
            "  %r : Tensor = aten::cat(%l, %d, %d)",
            "  %r : Tensor = prim::VarConcat()",
            "  %r : Tensor = aten::slice(%x, %d, %d, %d)",
            "  %r : Tensor = aten::copy_(%x)",
            "  %r : Tensor = aten::empty()",
            "  %r : Tensor[] = aten::append(%l)",
            "  aten::relu(%x)",
            "  %a : Tensor, %b : Tensor = aten::relu(%x)",
            "  %o : Tensor = prim::If()",
        ];
        for case in cases {
            let text = format!(
                "graph(%x : Tensor, %l : Tensor[], %d : int):\n{case}\n  return (%x)\n"
            );
            match parse_graph(&text) {
                Err(Error::Parse { line, message }) => {
                    assert_eq!(line, 2, "{case}");
                    assert!(message.contains("expects"), "{case}: {message}");
                }
                other => panic!("{case}: unexpected result {other:?}"),
            }
        }
    }

    #[test]
    fn test_parse_rejects_if_with_one_block() {
        let text = "\
graph(%x : Tensor, %c : bool):
  %o : Tensor = prim::If(%c)
    block0():
      -> (%x)
  return (%o)
";
        assert!(matches!(parse_graph(text), Err(Error::Malformed { .. })));
    }

    #[test]
    fn test_parse_block_without_if() {
        let text = "graph(%x : Tensor):\n  %y : Tensor = aten::relu(%x)\n    block0():\n";
        assert!(matches!(parse_graph(text), Err(Error::Parse { line: 3, .. })));
    }

    #[test]
    fn test_parse_type() {
        assert_eq!(parse_type("Tensor"), Some(Type::tensor()));
        assert_eq!(parse_type("Tensor(2, 3)"), Some(Type::tensor_of([2, 3])));
        assert_eq!(
            parse_type("Tensor(*, 3)"),
            Some(Type::Tensor(TensorType::with_partial_sizes(vec![None, Some(3)])))
        );
        assert_eq!(parse_type("Tensor()"), Some(Type::tensor_of([])));
        assert_eq!(parse_type("int[]"), Some(Type::list_of(Type::Int)));
        assert_eq!(parse_type("Tensor[]"), Some(Type::list_of(Type::tensor())));
        assert_eq!(parse_type("float"), None);
        assert_eq!(parse_type("Tensor(-1, 3)"), None);
    }

    #[test]
    fn test_split_top_level() {
        assert_eq!(
            split_top_level("%x : Tensor(2, 3), %y : int"),
            vec!["%x : Tensor(2, 3)", "%y : int"]
        );
        assert!(split_top_level("").is_empty());
        assert!(split_top_level("   ").is_empty());
    }
}

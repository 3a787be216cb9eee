//! Reference interpreter for the graph IR.
//!
//! [`Interpreter`] executes a [`Graph`] on concrete inputs. It exists to check that rewrites
//! preserve meaning: run a graph, optimize a copy, run the copy, compare the results.
//!
//! # Memory Model
//!
//! Tensors are views over shared storage (see [`Tensor`]) and lists are shared, growable
//! vectors of values. Views, in-place writes and list appends therefore alias exactly as the
//! IR's effect flags describe, so a rewrite that breaks an aliasing assumption produces
//! different results here.
//!
//! # Examples
//!
//! ```rust
//! use catopt::{
//!     interpreter::{Interpreter, RtValue, Tensor},
//!     ir::{GraphBuilder, Type},
//! };
//!
//! let graph = GraphBuilder::new().build_with(|g| {
//!     let x = g.input(Type::tensor_of([2]));
//!     let dim = g.const_int(0);
//!     let list = g.list(&[x, x]);
//!     let out = g.cat(list, dim);
//!     g.ret(&[out]);
//! });
//!
//! let x = Tensor::from_vec(&[2], vec![1.0, 2.0])?;
//! let outputs = Interpreter::run(&graph, vec![RtValue::Tensor(x)])?;
//! assert_eq!(outputs[0].as_tensor()?.to_vec()?, vec![1.0, 2.0, 1.0, 2.0]);
//! # Ok::<(), catopt::Error>(())
//! ```

mod tensor;

use std::{
    fmt,
    sync::{Arc, RwLock},
};

pub use tensor::Tensor;

use crate::{
    ir::{BlockId, Constant, Graph, NodeId, NodeKind, ValueId},
    Error, Result,
};

/// A runtime value.
#[derive(Clone)]
pub enum RtValue {
    /// A tensor view.
    Tensor(Tensor),
    /// An integer scalar.
    Int(i64),
    /// A boolean scalar.
    Bool(bool),
    /// The `None` constant.
    None,
    /// A shared list; appends are visible through every handle.
    List(Arc<RwLock<Vec<RtValue>>>),
}

impl RtValue {
    /// Creates a list value.
    #[must_use]
    pub fn list(elements: Vec<RtValue>) -> Self {
        Self::List(Arc::new(RwLock::new(elements)))
    }

    /// Returns the tensor held by this value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Evaluation`] for non-tensor values.
    pub fn as_tensor(&self) -> Result<&Tensor> {
        match self {
            Self::Tensor(t) => Ok(t),
            other => Err(Error::Evaluation(format!("expected tensor, got {other}"))),
        }
    }

    /// Returns the integer held by this value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Evaluation`] for non-integer values.
    pub fn as_int(&self) -> Result<i64> {
        match self {
            Self::Int(v) => Ok(*v),
            other => Err(Error::Evaluation(format!("expected int, got {other}"))),
        }
    }

    /// Returns a snapshot of the list elements.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Evaluation`] for non-list values.
    pub fn list_elements(&self) -> Result<Vec<RtValue>> {
        match self {
            Self::List(list) => list
                .read()
                .map(|elements| elements.clone())
                .map_err(|_| Error::Evaluation("list lock poisoned".to_string())),
            other => Err(Error::Evaluation(format!("expected list, got {other}"))),
        }
    }
}

impl fmt::Display for RtValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RtValue::Tensor(t) => write!(f, "tensor{:?}", t.sizes()),
            RtValue::Int(v) => write!(f, "{v}"),
            RtValue::Bool(v) => write!(f, "{v}"),
            RtValue::None => write!(f, "None"),
            RtValue::List(_) => write!(f, "list"),
        }
    }
}

impl fmt::Debug for RtValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RtValue::Tensor(t) => write!(f, "{t:?}"),
            RtValue::List(_) => match self.list_elements() {
                Ok(elements) => f.debug_list().entries(elements).finish(),
                Err(_) => write!(f, "list<poisoned>"),
            },
            other => write!(f, "{other}"),
        }
    }
}

/// Executes graphs on concrete values.
pub struct Interpreter<'g> {
    graph: &'g Graph,
    env: Vec<Option<RtValue>>,
}

impl<'g> Interpreter<'g> {
    /// Runs `graph` on `inputs` and returns the graph outputs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Evaluation`] if the number of inputs is wrong or a node cannot be
    /// executed on the values it receives (shape mismatch, wrong value kind, bad axis).
    pub fn run(graph: &'g Graph, inputs: Vec<RtValue>) -> Result<Vec<RtValue>> {
        if inputs.len() != graph.inputs().len() {
            return Err(Error::Evaluation(format!(
                "graph takes {} inputs, {} given",
                graph.inputs().len(),
                inputs.len()
            )));
        }

        let mut interpreter = Interpreter {
            graph,
            env: vec![None; graph.value_capacity()],
        };
        for (&param, value) in graph.inputs().iter().zip(inputs) {
            interpreter.bind(param, value);
        }
        interpreter.run_block(graph.root())
    }

    fn bind(&mut self, value: ValueId, rt: RtValue) {
        self.env[value.index()] = Some(rt);
    }

    fn get(&self, value: ValueId) -> Result<&RtValue> {
        self.env
            .get(value.index())
            .and_then(Option::as_ref)
            .ok_or_else(|| Error::Evaluation(format!("{value} used before definition")))
    }

    fn tensor(&self, value: ValueId) -> Result<&Tensor> {
        self.get(value)?.as_tensor()
    }

    fn int(&self, value: ValueId) -> Result<i64> {
        self.get(value)?.as_int()
    }

    /// Executes a block and returns the values it yields.
    fn run_block(&mut self, block: BlockId) -> Result<Vec<RtValue>> {
        let graph = self.graph;
        for &node in graph.block(block).nodes() {
            if graph.node(node).kind() == NodeKind::Return {
                break;
            }
            let results = self.execute(node)?;
            for (&output, value) in graph.node(node).outputs().iter().zip(results) {
                self.bind(output, value);
            }
        }
        graph
            .block_outputs(block)
            .iter()
            .map(|&v| self.get(v).cloned())
            .collect()
    }

    fn execute(&mut self, node: NodeId) -> Result<Vec<RtValue>> {
        let graph = self.graph;
        let data = graph.node(node);
        let inputs = data.inputs();
        let result = match data.kind() {
            NodeKind::Constant => match data.constant() {
                Some(Constant::Int(v)) => RtValue::Int(*v),
                Some(Constant::Bool(v)) => RtValue::Bool(*v),
                Some(Constant::None) | None => RtValue::None,
            },
            NodeKind::ListConstruct => {
                let elements = inputs
                    .iter()
                    .map(|&v| self.get(v).cloned())
                    .collect::<Result<Vec<_>>>()?;
                RtValue::list(elements)
            }
            NodeKind::ListAppend => {
                let list = self.get(inputs[0])?.clone();
                let element = self.get(inputs[1])?.clone();
                match &list {
                    RtValue::List(elements) => elements
                        .write()
                        .map_err(|_| Error::Evaluation("list lock poisoned".to_string()))?
                        .push(element),
                    other => {
                        return Err(Error::Evaluation(format!("append to {other}")));
                    }
                }
                list
            }
            NodeKind::Cat => {
                let tensors = self
                    .get(inputs[0])?
                    .list_elements()?
                    .iter()
                    .map(|v| v.as_tensor().cloned())
                    .collect::<Result<Vec<_>>>()?;
                RtValue::Tensor(Tensor::cat(&tensors, self.int(inputs[1])?)?)
            }
            NodeKind::VarConcat => {
                let (&dim, operands) = inputs
                    .split_last()
                    .ok_or_else(|| Error::Evaluation(format!("{node} has no axis")))?;
                let tensors = operands
                    .iter()
                    .map(|&v| self.tensor(v).cloned())
                    .collect::<Result<Vec<_>>>()?;
                RtValue::Tensor(Tensor::cat(&tensors, self.int(dim)?)?)
            }
            NodeKind::Empty => {
                let sizes = self
                    .get(inputs[0])?
                    .list_elements()?
                    .iter()
                    .map(|v| {
                        let size = v.as_int()?;
                        usize::try_from(size)
                            .map_err(|_| Error::Evaluation(format!("negative size {size}")))
                    })
                    .collect::<Result<Vec<_>>>()?;
                RtValue::Tensor(Tensor::zeros(&sizes))
            }
            NodeKind::Slice => {
                let view = self.tensor(inputs[0])?.slice(
                    self.int(inputs[1])?,
                    self.int(inputs[2])?,
                    self.int(inputs[3])?,
                    self.int(inputs[4])?,
                )?;
                RtValue::Tensor(view)
            }
            NodeKind::Copy => {
                let dst = self.tensor(inputs[0])?;
                dst.copy_from(self.tensor(inputs[1])?)?;
                RtValue::Tensor(dst.clone())
            }
            NodeKind::Add => {
                let sum = self.tensor(inputs[0])?.add(self.tensor(inputs[1])?)?;
                RtValue::Tensor(sum)
            }
            NodeKind::AddInPlace => {
                let dst = self.tensor(inputs[0])?;
                dst.add_assign(self.tensor(inputs[1])?)?;
                RtValue::Tensor(dst.clone())
            }
            NodeKind::Relu => RtValue::Tensor(self.tensor(inputs[0])?.relu()?),
            NodeKind::If => {
                let cond = match self.get(inputs[0])? {
                    RtValue::Bool(b) => *b,
                    other => {
                        return Err(Error::Evaluation(format!("if condition is {other}")));
                    }
                };
                let [then_block, else_block] = data.blocks() else {
                    return Err(Error::Evaluation(format!("{node} needs two blocks")));
                };
                let branch = if cond { *then_block } else { *else_block };
                return self.run_block(branch);
            }
            NodeKind::Return => {
                return Err(Error::Evaluation(format!("{node} executed as a node")));
            }
        };
        Ok(vec![result])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{GraphBuilder, Type};

    fn tensor(sizes: &[usize], data: &[f32]) -> RtValue {
        RtValue::Tensor(Tensor::from_vec(sizes, data.to_vec()).unwrap())
    }

    #[test]
    fn test_in_place_write_through_view() {
        let graph = GraphBuilder::new().build_with(|g| {
            let x = g.input(Type::tensor_of([4]));
            let y = g.input(Type::tensor_of([2]));
            let view = g.slice_const(x, 0, 1, 3);
            let _ = g.add_(view, y);
            g.ret(&[x]);
        });
        let out = Interpreter::run(
            &graph,
            vec![tensor(&[4], &[0.0, 1.0, 2.0, 3.0]), tensor(&[2], &[10.0, 10.0])],
        )
        .unwrap();
        assert_eq!(
            out[0].as_tensor().unwrap().to_vec().unwrap(),
            vec![0.0, 11.0, 12.0, 3.0]
        );
    }

    #[test]
    fn test_append_visible_through_list() {
        let graph = GraphBuilder::new().build_with(|g| {
            let x = g.input(Type::tensor_of([1]));
            let dim = g.const_int(0);
            let list = g.list(&[x]);
            let _ = g.append(list, x);
            let out = g.cat(list, dim);
            g.ret(&[out]);
        });
        let out = Interpreter::run(&graph, vec![tensor(&[1], &[5.0])]).unwrap();
        assert_eq!(out[0].as_tensor().unwrap().to_vec().unwrap(), vec![5.0, 5.0]);
    }

    #[test]
    fn test_if_selects_branch() {
        let graph = GraphBuilder::new().build_with(|g| {
            let x = g.input(Type::tensor_of([2]));
            let cond = g.input(Type::Bool);
            let out = g.if_else(
                cond,
                vec![Type::tensor_of([2])],
                |b| vec![b.relu(x)],
                |_| vec![x],
            );
            g.ret(&out);
        });
        let x = || tensor(&[2], &[-1.0, 1.0]);
        let taken = Interpreter::run(&graph, vec![x(), RtValue::Bool(true)]).unwrap();
        let skipped = Interpreter::run(&graph, vec![x(), RtValue::Bool(false)]).unwrap();
        assert_eq!(taken[0].as_tensor().unwrap().to_vec().unwrap(), vec![0.0, 1.0]);
        assert_eq!(skipped[0].as_tensor().unwrap().to_vec().unwrap(), vec![-1.0, 1.0]);
    }

    #[test]
    fn test_wrong_input_count() {
        let graph = GraphBuilder::new().build_with(|g| {
            let x = g.input(Type::tensor_of([1]));
            g.ret(&[x]);
        });
        assert!(matches!(
            Interpreter::run(&graph, vec![]),
            Err(Error::Evaluation(_))
        ));
    }
}

//! Node kinds, their side-effect summaries and constant payloads.

use std::fmt;

use bitflags::bitflags;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::ir::Type;

bitflags! {
    /// Memory effects of a node kind, as seen by alias analysis and code motion.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpEffects: u8 {
        /// The node writes into the memory of its first input.
        const WRITES_SELF = 0b0001;
        /// The first output refers to the same memory as the first input.
        const ALIASES_SELF = 0b0010;
        /// The node allocates fresh memory for its output.
        const ALLOCATES = 0b0100;
        /// The node owns nested blocks and transfers control into them.
        const CONTROL_FLOW = 0b1000;
    }
}

/// The operation performed by a node.
///
/// The textual names follow the `namespace::op` convention used by the IR printer and parser.
///
/// | Kind | Inputs | Output |
/// |------|--------|--------|
/// | `Constant` | - | the constant |
/// | `ListConstruct` | elements | list |
/// | `ListAppend` | list, element | the same list |
/// | `Cat` | list, axis | fresh tensor |
/// | `VarConcat` | tensors..., axis | fresh tensor |
/// | `Empty` | size list | fresh uninitialized tensor |
/// | `Slice` | tensor, axis, start, end, step | view of the tensor |
/// | `Copy` | dst, src | `dst`, after writing `src` into it |
/// | `Add` / `Relu` | tensors | fresh tensor |
/// | `AddInPlace` | self, other | `self`, after adding `other` into it |
/// | `If` | condition | block results |
/// | `Return` | block results | - |
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString, IntoStaticStr,
)]
pub enum NodeKind {
    /// A compile-time constant.
    #[strum(to_string = "prim::Constant")]
    Constant,
    /// Packages its inputs into a list value.
    #[strum(to_string = "prim::ListConstruct")]
    ListConstruct,
    /// Appends an element to a list in place.
    #[strum(to_string = "aten::append")]
    ListAppend,
    /// Concatenates the tensors of a list along an axis.
    #[strum(to_string = "aten::cat")]
    Cat,
    /// Concatenates its tensor inputs along the axis given as last input.
    #[strum(to_string = "prim::VarConcat")]
    VarConcat,
    /// Allocates an uninitialized tensor of the given sizes.
    #[strum(to_string = "aten::empty")]
    Empty,
    /// Creates a strided view along one axis.
    #[strum(to_string = "aten::slice")]
    Slice,
    /// Copies `src` into `dst` in place.
    #[strum(to_string = "aten::copy_")]
    Copy,
    /// Element-wise addition.
    #[strum(to_string = "aten::add")]
    Add,
    /// In-place element-wise addition into the first input.
    #[strum(to_string = "aten::add_")]
    AddInPlace,
    /// Element-wise rectified linear unit.
    #[strum(to_string = "aten::relu")]
    Relu,
    /// Two-way conditional with one nested block per branch.
    #[strum(to_string = "prim::If")]
    If,
    /// Terminates a block and yields its results.
    #[strum(to_string = "prim::Return")]
    Return,
}

impl NodeKind {
    /// Returns the memory effects of this kind.
    #[must_use]
    pub fn effects(self) -> OpEffects {
        match self {
            Self::ListAppend | Self::Copy | Self::AddInPlace => {
                OpEffects::WRITES_SELF | OpEffects::ALIASES_SELF
            }
            Self::Slice => OpEffects::ALIASES_SELF,
            Self::Cat | Self::VarConcat | Self::Empty | Self::Add | Self::Relu => {
                OpEffects::ALLOCATES
            }
            Self::If => OpEffects::CONTROL_FLOW,
            Self::Constant | Self::ListConstruct | Self::Return => OpEffects::empty(),
        }
    }

    /// Returns the number of inputs, outputs and nested blocks a node of this kind must have.
    #[must_use]
    pub const fn arity(self) -> Arity {
        match self {
            Self::Constant => Arity::fixed(0, 1),
            Self::ListConstruct => Arity::at_least(0, 1),
            Self::ListAppend | Self::Cat | Self::Copy | Self::Add | Self::AddInPlace => {
                Arity::fixed(2, 1)
            }
            Self::VarConcat => Arity::at_least(1, 1),
            Self::Empty | Self::Relu => Arity::fixed(1, 1),
            Self::Slice => Arity::fixed(5, 1),
            Self::If => Arity {
                min_inputs: 1,
                max_inputs: Some(1),
                outputs: None,
                blocks: 2,
            },
            Self::Return => Arity::at_least(0, 0),
        }
    }

    /// Returns `true` if a node of this kind may be repositioned freely, as long as its
    /// inputs stay available: it neither writes memory nor transfers control.
    #[must_use]
    pub fn is_movable(self) -> bool {
        !self.effects().intersects(OpEffects::WRITES_SELF | OpEffects::CONTROL_FLOW)
            && self != Self::Return
    }
}

/// The shape of a node's signature: how many inputs, outputs and nested blocks it takes.
///
/// Checked by [`Graph::lint`](crate::ir::Graph::lint) and the parser, so passes can index the
/// inputs of a well-formed node directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    /// Minimum number of inputs.
    pub min_inputs: usize,
    /// Maximum number of inputs, `None` if unbounded.
    pub max_inputs: Option<usize>,
    /// Exact number of outputs, `None` if each node decides (`prim::If`).
    pub outputs: Option<usize>,
    /// Exact number of nested blocks.
    pub blocks: usize,
}

impl Arity {
    const fn fixed(inputs: usize, outputs: usize) -> Self {
        Self {
            min_inputs: inputs,
            max_inputs: Some(inputs),
            outputs: Some(outputs),
            blocks: 0,
        }
    }

    const fn at_least(inputs: usize, outputs: usize) -> Self {
        Self {
            min_inputs: inputs,
            max_inputs: None,
            outputs: Some(outputs),
            blocks: 0,
        }
    }

    /// Returns `true` if `count` inputs are allowed.
    #[must_use]
    pub fn accepts_inputs(&self, count: usize) -> bool {
        count >= self.min_inputs && self.max_inputs.map_or(true, |max| count <= max)
    }

    /// Returns `true` if `count` outputs are allowed.
    #[must_use]
    pub fn accepts_outputs(&self, count: usize) -> bool {
        self.outputs.map_or(true, |n| n == count)
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max_inputs {
            Some(max) if max == self.min_inputs => write!(f, "{max} input(s)")?,
            Some(max) => write!(f, "{}..={max} inputs", self.min_inputs)?,
            None => write!(f, "at least {} input(s)", self.min_inputs)?,
        }
        if let Some(outputs) = self.outputs {
            write!(f, ", {outputs} output(s)")?;
        }
        if self.blocks > 0 {
            write!(f, ", {} blocks", self.blocks)?;
        }
        Ok(())
    }
}

/// The payload of a [`NodeKind::Constant`] node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    /// The `None` value.
    None,
    /// An integer.
    Int(i64),
    /// A boolean.
    Bool(bool),
}

impl Constant {
    /// Returns the type of the constant's output value.
    #[must_use]
    pub fn ty(&self) -> Type {
        match self {
            Self::None => Type::None,
            Self::Int(_) => Type::Int,
            Self::Bool(_) => Type::Bool,
        }
    }

    /// Returns the integer payload, if any.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
        }
    }
}

//! Value types of the graph IR.
//!
//! The type system is intentionally small: tensors with optional shape information, a few
//! scalar types and homogeneous lists. Shapes are the only type facts the concatenation
//! passes rely on.

use std::fmt;

/// Shape information of a tensor value.
///
/// Both the rank and each individual axis size may be unknown. A tensor type is *complete*
/// when the rank and every axis size are known.
///
/// # Examples
///
/// ```rust
/// use catopt::ir::TensorType;
///
/// let full = TensorType::with_sizes([2, 3]);
/// assert!(full.is_complete());
/// assert_eq!(full.concrete_sizes(), Some(vec![2, 3]));
///
/// let partial = TensorType::with_partial_sizes(vec![None, Some(3)]);
/// assert_eq!(partial.rank(), Some(2));
/// assert!(!partial.is_complete());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TensorType {
    sizes: Option<Vec<Option<i64>>>,
}

impl TensorType {
    /// A tensor of unknown rank.
    #[must_use]
    pub const fn unknown() -> Self {
        Self { sizes: None }
    }

    /// A tensor whose every axis size is known.
    #[must_use]
    pub fn with_sizes(sizes: impl IntoIterator<Item = i64>) -> Self {
        Self {
            sizes: Some(sizes.into_iter().map(Some).collect()),
        }
    }

    /// A tensor of known rank with some axis sizes possibly unknown.
    #[must_use]
    pub fn with_partial_sizes(sizes: Vec<Option<i64>>) -> Self {
        Self { sizes: Some(sizes) }
    }

    /// Returns the rank, if known.
    #[must_use]
    pub fn rank(&self) -> Option<usize> {
        self.sizes.as_ref().map(Vec::len)
    }

    /// Returns the per-axis sizes, if the rank is known.
    #[must_use]
    pub fn sizes(&self) -> Option<&[Option<i64>]> {
        self.sizes.as_deref()
    }

    /// Returns the size of one axis, if both the rank and that axis are known.
    #[must_use]
    pub fn size(&self, axis: usize) -> Option<i64> {
        self.sizes.as_ref().and_then(|s| s.get(axis).copied().flatten())
    }

    /// Returns `true` if the rank and all axis sizes are known.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.sizes
            .as_ref()
            .is_some_and(|s| s.iter().all(Option::is_some))
    }

    /// Returns the concrete sizes of a complete tensor type.
    #[must_use]
    pub fn concrete_sizes(&self) -> Option<Vec<i64>> {
        self.sizes.as_ref()?.iter().copied().collect()
    }

    /// Normalizes a possibly negative axis against the known rank.
    ///
    /// Returns `None` if the rank is unknown or the axis is out of range.
    #[must_use]
    pub fn normalize_axis(&self, axis: i64) -> Option<usize> {
        let rank = i64::try_from(self.rank()?).ok()?;
        let axis = if axis < 0 { axis + rank } else { axis };
        if (0..rank).contains(&axis) {
            usize::try_from(axis).ok()
        } else {
            None
        }
    }
}

impl fmt::Display for TensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor")?;
        if let Some(sizes) = &self.sizes {
            write!(f, "(")?;
            for (i, size) in sizes.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                match size {
                    Some(s) => write!(f, "{s}")?,
                    None => write!(f, "*")?,
                }
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// The type of a value in the graph IR.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// A tensor with optional shape information.
    Tensor(TensorType),
    /// A 64-bit signed integer scalar.
    Int,
    /// A boolean scalar.
    Bool,
    /// The type of the `None` constant.
    None,
    /// A homogeneous list.
    List(Box<Type>),
}

impl Type {
    /// A tensor of unknown shape.
    #[must_use]
    pub const fn tensor() -> Self {
        Self::Tensor(TensorType::unknown())
    }

    /// A tensor with fully known sizes.
    #[must_use]
    pub fn tensor_of(sizes: impl IntoIterator<Item = i64>) -> Self {
        Self::Tensor(TensorType::with_sizes(sizes))
    }

    /// A list of `elem`.
    #[must_use]
    pub fn list_of(elem: Type) -> Self {
        Self::List(Box::new(elem))
    }

    /// Returns the tensor type if this is a tensor.
    #[must_use]
    pub fn as_tensor(&self) -> Option<&TensorType> {
        match self {
            Self::Tensor(t) => Some(t),
            _ => None,
        }
    }

    /// Returns `true` for tensors.
    #[must_use]
    pub const fn is_tensor(&self) -> bool {
        matches!(self, Self::Tensor(_))
    }

    /// Returns `true` for types whose values refer to mutable memory (tensors and lists).
    #[must_use]
    pub const fn is_mutable_type(&self) -> bool {
        matches!(self, Self::Tensor(_) | Self::List(_))
    }

    /// Returns `true` if the shape of a value of this type is statically known.
    ///
    /// Non-tensor types trivially qualify. Tensors must be complete and have rank of at
    /// least one.
    #[must_use]
    pub fn shape_is_known(&self) -> bool {
        match self {
            Self::Tensor(t) => t.is_complete() && t.rank() != Some(0),
            _ => true,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tensor(t) => write!(f, "{t}"),
            Self::Int => write!(f, "int"),
            Self::Bool => write!(f, "bool"),
            Self::None => write!(f, "NoneType"),
            Self::List(elem) => match elem.as_ref() {
                Self::Tensor(_) => write!(f, "Tensor[]"),
                other => write!(f, "{other}[]"),
            },
        }
    }
}

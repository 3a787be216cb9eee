//! Strided `f32` tensors over shared storage.
//!
//! A [`Tensor`] is a view: an offset, sizes and strides into a storage buffer that may be
//! shared with other views. Slicing creates a new view over the same storage, so a write
//! through one view is visible through every overlapping view, exactly as the graph IR
//! models aliasing.

use std::{
    fmt,
    sync::{Arc, RwLock},
};

use crate::{Error, Result};

type Storage = Arc<RwLock<Vec<f32>>>;

fn evaluation_error(message: impl Into<String>) -> Error {
    Error::Evaluation(message.into())
}

/// A strided view over shared `f32` storage.
#[derive(Clone)]
pub struct Tensor {
    storage: Storage,
    offset: usize,
    sizes: Vec<usize>,
    strides: Vec<usize>,
}

fn contiguous_strides(sizes: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; sizes.len()];
    for i in (0..sizes.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * sizes[i + 1];
    }
    strides
}

impl Tensor {
    /// Creates a contiguous tensor from row-major data.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Evaluation`] if `data` does not hold exactly one element per position.
    pub fn from_vec(sizes: &[usize], data: Vec<f32>) -> Result<Self> {
        let numel: usize = sizes.iter().product();
        if numel != data.len() {
            return Err(evaluation_error(format!(
                "{} values for a tensor of shape {:?}",
                data.len(),
                sizes
            )));
        }
        Ok(Self {
            storage: Arc::new(RwLock::new(data)),
            offset: 0,
            sizes: sizes.to_vec(),
            strides: contiguous_strides(sizes),
        })
    }

    /// Creates a zero-filled contiguous tensor.
    #[must_use]
    pub fn zeros(sizes: &[usize]) -> Self {
        let numel = sizes.iter().product();
        Self {
            storage: Arc::new(RwLock::new(vec![0.0; numel])),
            offset: 0,
            sizes: sizes.to_vec(),
            strides: contiguous_strides(sizes),
        }
    }

    /// Returns the sizes.
    #[must_use]
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// Returns the number of elements.
    #[must_use]
    pub fn numel(&self) -> usize {
        self.sizes.iter().product()
    }

    /// Returns `true` if both tensors view the same storage.
    #[must_use]
    pub fn shares_storage(&self, other: &Tensor) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    /// Storage offsets of every element, in row-major order.
    fn element_offsets(&self) -> Vec<usize> {
        let mut offsets = vec![self.offset];
        for (&size, &stride) in self.sizes.iter().zip(&self.strides) {
            offsets = offsets
                .iter()
                .flat_map(|&base| (0..size).map(move |i| base + i * stride))
                .collect();
        }
        offsets
    }

    /// Reads the elements in row-major order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Evaluation`] if the storage lock is poisoned.
    pub fn to_vec(&self) -> Result<Vec<f32>> {
        let storage = self
            .storage
            .read()
            .map_err(|_| evaluation_error("tensor storage lock poisoned"))?;
        Ok(self.element_offsets().iter().map(|&o| storage[o]).collect())
    }

    fn write(&self, values: &[f32]) -> Result<()> {
        let offsets = self.element_offsets();
        let mut storage = self
            .storage
            .write()
            .map_err(|_| evaluation_error("tensor storage lock poisoned"))?;
        for (&o, &v) in offsets.iter().zip(values) {
            storage[o] = v;
        }
        Ok(())
    }

    /// Resolves a possibly negative axis.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Evaluation`] if the axis is out of range.
    pub fn axis(&self, dim: i64) -> Result<usize> {
        let rank = i64::try_from(self.sizes.len()).unwrap_or(i64::MAX);
        let resolved = if dim < 0 { dim + rank } else { dim };
        usize::try_from(resolved)
            .ok()
            .filter(|&a| a < self.sizes.len())
            .ok_or_else(|| evaluation_error(format!("axis {dim} out of range for rank {rank}")))
    }

    /// Returns the view `self[start:end:step]` along `dim`.
    ///
    /// Negative bounds count from the end; bounds are clamped to the extent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Evaluation`] for an invalid axis or a non-positive step.
    pub fn slice(&self, dim: i64, start: i64, end: i64, step: i64) -> Result<Tensor> {
        let axis = self.axis(dim)?;
        if step <= 0 {
            return Err(evaluation_error(format!("slice step {step} must be positive")));
        }
        let extent = i64::try_from(self.sizes[axis])
            .map_err(|_| evaluation_error("tensor extent too large"))?;
        let (start, end) = crate::ir::clamp_slice_bounds(extent, start, end);
        // clamped bounds lie in 0..=extent
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let (start, end, step) = (start as usize, end as usize, step as usize);

        let mut view = self.clone();
        view.offset += start * self.strides[axis];
        view.sizes[axis] = (end - start).div_ceil(step);
        view.strides[axis] *= step;
        Ok(view)
    }

    fn check_same_shape(&self, other: &Tensor, op: &str) -> Result<()> {
        if self.sizes == other.sizes {
            Ok(())
        } else {
            Err(evaluation_error(format!(
                "{op}: shape {:?} does not match {:?}",
                self.sizes, other.sizes
            )))
        }
    }

    /// Writes the elements of `src` into this view.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Evaluation`] if the shapes differ.
    pub fn copy_from(&self, src: &Tensor) -> Result<()> {
        self.check_same_shape(src, "copy_")?;
        let values = src.to_vec()?;
        self.write(&values)
    }

    /// Returns the elementwise sum as a new tensor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Evaluation`] if the shapes differ.
    pub fn add(&self, other: &Tensor) -> Result<Tensor> {
        self.check_same_shape(other, "add")?;
        let sum = self
            .to_vec()?
            .into_iter()
            .zip(other.to_vec()?)
            .map(|(a, b)| a + b)
            .collect();
        Tensor::from_vec(&self.sizes, sum)
    }

    /// Adds `other` into this view.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Evaluation`] if the shapes differ.
    pub fn add_assign(&self, other: &Tensor) -> Result<()> {
        let sum = self.add(other)?;
        self.write(&sum.to_vec()?)
    }

    /// Returns `max(x, 0)` elementwise as a new tensor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Evaluation`] if the storage lock is poisoned.
    pub fn relu(&self) -> Result<Tensor> {
        let data = self.to_vec()?.into_iter().map(|x| x.max(0.0)).collect();
        Tensor::from_vec(&self.sizes, data)
    }

    /// Concatenates `tensors` along `dim` into a new tensor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Evaluation`] for an empty operand list, an invalid axis or operands
    /// whose other extents differ.
    pub fn cat(tensors: &[Tensor], dim: i64) -> Result<Tensor> {
        let first = tensors
            .first()
            .ok_or_else(|| evaluation_error("cat of an empty tensor list"))?;
        let axis = first.axis(dim)?;

        let mut sizes = first.sizes.clone();
        sizes[axis] = 0;
        for t in tensors {
            let compatible = t.sizes.len() == sizes.len()
                && t.sizes
                    .iter()
                    .zip(&first.sizes)
                    .enumerate()
                    .all(|(i, (a, b))| i == axis || a == b);
            if !compatible {
                return Err(evaluation_error(format!(
                    "cat: shape {:?} incompatible with {:?} along axis {axis}",
                    t.sizes, first.sizes
                )));
            }
            sizes[axis] += t.sizes[axis];
        }

        let out = Tensor::zeros(&sizes);
        let mut start = 0;
        for t in tensors {
            let end = start + t.sizes[axis];
            let lo = i64::try_from(start).map_err(|_| evaluation_error("extent too large"))?;
            let hi = i64::try_from(end).map_err(|_| evaluation_error("extent too large"))?;
            out.slice(dim, lo, hi, 1)?.copy_from(t)?;
            start = end;
        }
        Ok(out)
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_vec() {
            Ok(data) => write!(f, "Tensor{:?}{:?}", self.sizes, data),
            Err(_) => write!(f, "Tensor{:?}<poisoned>", self.sizes),
        }
    }
}

use slotmap::{SlotMap, new_key_type};
use std::collections::HashMap;
use thiserror::Error;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

new_key_type! {
    pub struct TensorId;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Shape {shape:?} holds {expected} values but {actual} were supplied")]
pub struct ShapeError {
    pub shape: Vec<usize>,
    pub expected: usize,
    pub actual: usize,
}

/// A dense `f32` tensor with a value buffer and a same-sized gradient buffer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
    diff: Vec<f32>,
}

impl Tensor {
    /// Creates a zero-filled tensor.
    ///
    /// # Arguments
    ///
    /// * `shape` - Extent of each axis; the element count is their product.
    pub fn zeros(shape: Vec<usize>) -> Self {
        let count = shape.iter().product();
        Self {
            shape,
            data: vec![0.0; count],
            diff: vec![0.0; count],
        }
    }

    /// Creates a tensor holding `data`, with a zeroed gradient.
    ///
    /// # Errors
    ///
    /// Returns [`ShapeError`] if `data.len()` differs from the product of `shape`.
    pub fn from_data(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, ShapeError> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(ShapeError {
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            diff: vec![0.0; expected],
            shape,
            data,
        })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn count(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn diff(&self) -> &[f32] {
        &self.diff
    }

    pub fn diff_mut(&mut self) -> &mut [f32] {
        &mut self.diff
    }

    /// Borrows the value and gradient buffers at the same time.
    pub fn data_and_diff_mut(&mut self) -> (&mut [f32], &mut [f32]) {
        (&mut self.data, &mut self.diff)
    }

    pub fn zero_diff(&mut self) {
        self.diff.fill(0.0);
    }

    /// Replaces the values, keeping the shape.
    ///
    /// # Errors
    ///
    /// Returns [`ShapeError`] if `values` has the wrong length.
    pub fn set_data(&mut self, values: &[f32]) -> Result<(), ShapeError> {
        if values.len() != self.data.len() {
            return Err(ShapeError {
                shape: self.shape.clone(),
                expected: self.data.len(),
                actual: values.len(),
            });
        }
        self.data.copy_from_slice(values);
        Ok(())
    }

    /// Applies the accumulated step in place: `data -= diff`.
    pub fn update(&mut self) {
        #[cfg(feature = "parallel")]
        self.data
            .par_iter_mut()
            .zip(self.diff.par_iter())
            .for_each(|(value, step)| *value -= *step);

        #[cfg(not(feature = "parallel"))]
        self.data
            .iter_mut()
            .zip(self.diff.iter())
            .for_each(|(value, step)| *value -= *step);
    }
}

/// Named tensor storage owned by a network.
///
/// Tensors are addressed by a stable [`TensorId`]; names are unique and kept in
/// insertion order so that enumeration matches the network's blob order.
#[derive(Debug, Clone, Default)]
pub struct TensorStore {
    tensors: SlotMap<TensorId, Tensor>,
    names: HashMap<String, TensorId>,
    order: Vec<(String, TensorId)>,
}

impl TensorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a tensor under `name`, replacing any tensor that already had it.
    ///
    /// # Return
    ///
    /// The id of the stored tensor.
    pub fn insert(&mut self, name: &str, tensor: Tensor) -> TensorId {
        if let Some(&id) = self.names.get(name) {
            self.tensors[id] = tensor;
            return id;
        }
        let id = self.tensors.insert(tensor);
        self.names.insert(name.to_string(), id);
        self.order.push((name.to_string(), id));
        id
    }

    pub fn id(&self, name: &str) -> Option<TensorId> {
        self.names.get(name).copied()
    }

    pub fn get(&self, id: TensorId) -> Option<&Tensor> {
        self.tensors.get(id)
    }

    pub fn get_mut(&mut self, id: TensorId) -> Option<&mut Tensor> {
        self.tensors.get_mut(id)
    }

    pub fn by_name(&self, name: &str) -> Option<&Tensor> {
        self.id(name).and_then(|id| self.tensors.get(id))
    }

    /// Tensor names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

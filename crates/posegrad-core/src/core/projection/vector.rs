use super::layout::{FlatLayout, FlatSlot, ProjectionError};
use crate::core::models::shape::ConfShape;

/// A hierarchical configuration addressable as one flat vector of `f64`.
///
/// Implementors only describe their shape and how to reach the scalar behind a
/// resolved [`FlatSlot`]; indexing, bulk copies and comparison are derived from
/// the shared [`FlatLayout`]. The plain getters build the layout on every call;
/// sweeps over an unchanged shape should build it once with
/// [`FlatVector::layout`] and use the `*_in` getters.
pub trait FlatVector {
    /// Orientation scalars per ligand (4 for poses, 3 for differentials).
    const ORIENTATION_WIDTH: usize;

    fn shape(&self) -> ConfShape;

    fn slot_value(&self, slot: &FlatSlot) -> f64;

    fn slot_value_mut(&mut self, slot: &FlatSlot) -> &mut f64;

    fn layout(&self) -> FlatLayout {
        FlatLayout::new(&self.shape(), Self::ORIENTATION_WIDTH)
    }

    fn num_floats(&self) -> usize {
        self.shape().num_floats(3 + Self::ORIENTATION_WIDTH)
    }

    fn get(&self, index: usize) -> Result<f64, ProjectionError> {
        self.get_in(&self.layout(), index)
    }

    fn get_mut(&mut self, index: usize) -> Result<&mut f64, ProjectionError> {
        let layout = self.layout();
        self.get_mut_in(&layout, index)
    }

    /// The scalar at `index` together with the node it perturbs.
    fn get_with_node_idx(&self, index: usize) -> Result<(f64, usize), ProjectionError> {
        self.get_with_node_idx_in(&self.layout(), index)
    }

    /// [`FlatVector::get`] against a prebuilt layout of this vector's shape.
    fn get_in(&self, layout: &FlatLayout, index: usize) -> Result<f64, ProjectionError> {
        debug_assert_eq!(layout.len(), self.num_floats(), "layout of a different shape");
        let slot = layout.locate(index)?;
        Ok(self.slot_value(&slot))
    }

    fn get_mut_in(&mut self, layout: &FlatLayout, index: usize) -> Result<&mut f64, ProjectionError> {
        debug_assert_eq!(layout.len(), self.num_floats(), "layout of a different shape");
        let slot = layout.locate(index)?;
        Ok(self.slot_value_mut(&slot))
    }

    fn get_with_node_idx_in(
        &self,
        layout: &FlatLayout,
        index: usize,
    ) -> Result<(f64, usize), ProjectionError> {
        debug_assert_eq!(layout.len(), self.num_floats(), "layout of a different shape");
        let slot = layout.locate(index)?;
        Ok((self.slot_value(&slot), slot.node))
    }

    fn to_flat(&self) -> Vec<f64> {
        self.layout()
            .slots()
            .map(|slot| self.slot_value(&slot))
            .collect()
    }

    fn copy_from_flat(&mut self, values: &[f64]) -> Result<(), ProjectionError> {
        let layout = self.layout();
        if values.len() != layout.len() {
            return Err(ProjectionError::LengthMismatch {
                expected: layout.len(),
                actual: values.len(),
            });
        }
        for slot in layout.slots() {
            *self.slot_value_mut(&slot) = values[slot.index];
        }
        Ok(())
    }

    /// Element-wise equality over the flat projection.
    ///
    /// # Panics
    ///
    /// Panics if the two vectors have different flat lengths; comparing
    /// differently shaped configurations is a caller bug.
    fn flat_eq(&self, other: &Self) -> bool
    where
        Self: Sized,
    {
        let n = self.num_floats();
        assert_eq!(
            other.num_floats(),
            n,
            "cannot compare configurations of different flat lengths"
        );
        if self.shape() == other.shape() {
            return self
                .layout()
                .slots()
                .all(|slot| self.slot_value(&slot) == other.slot_value(&slot));
        }
        self.to_flat() == other.to_flat()
    }

    /// # Panics
    ///
    /// Panics if the two vectors have different shapes.
    fn dot(&self, other: &Self) -> f64
    where
        Self: Sized,
    {
        let shape = self.shape();
        assert_eq!(shape, other.shape(), "dot product of mismatched shapes");
        self.layout()
            .slots()
            .map(|slot| self.slot_value(&slot) * other.slot_value(&slot))
            .sum()
    }
}

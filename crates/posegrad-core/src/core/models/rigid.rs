use crate::core::utils::geometry::{quaternion_increment, random_in_box, random_orientation};
use nalgebra::{UnitQuaternion, Vector3};
use rand::Rng;

/// Storage slot in `Quaternion::coords` (`[i, j, k, w]`) for each flat orientation
/// component, which is ordered `w, i, j, k`.
const ORIENTATION_STORAGE: [usize; 4] = [3, 0, 1, 2];

/// Scalar access to a rigid block in flat order: three position components,
/// then the orientation components.
pub trait RigidBlock {
    /// Number of orientation scalars exposed to the flat projection.
    const ORIENTATION_WIDTH: usize;
    /// Total scalars in the block.
    const WIDTH: usize = 3 + Self::ORIENTATION_WIDTH;

    fn component(&self, offset: usize) -> f64;
    fn component_mut(&mut self, offset: usize) -> &mut f64;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidConf {
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
}

impl Default for RigidConf {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
        }
    }
}

impl RigidConf {
    pub fn new(position: Vector3<f64>, orientation: UnitQuaternion<f64>) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// Raw quaternion component `w, i, j, k` for `index` 0..4.
    ///
    /// This is only meant for flat-vector addressing; everything else should go
    /// through `orientation`. Writes through [`RigidBlock::component_mut`] bypass
    /// the unit-norm invariant, which the caller restores with
    /// [`RigidConf::renormalize`].
    pub fn orientation_component(&self, index: usize) -> f64 {
        self.orientation.quaternion().coords[ORIENTATION_STORAGE[index]]
    }

    pub fn renormalize(&mut self) {
        self.orientation.renormalize();
    }

    pub fn increment(&mut self, change: &RigidChange, factor: f64) {
        self.position += change.position * factor;
        quaternion_increment(&mut self.orientation, &(change.orientation * factor));
    }

    pub fn randomize<R: Rng + ?Sized>(
        &mut self,
        corner1: &Vector3<f64>,
        corner2: &Vector3<f64>,
        rng: &mut R,
    ) {
        self.position = random_in_box(corner1, corner2, rng);
        self.orientation = random_orientation(rng);
    }
}

impl RigidBlock for RigidConf {
    const ORIENTATION_WIDTH: usize = 4;

    fn component(&self, offset: usize) -> f64 {
        if offset < 3 {
            self.position[offset]
        } else {
            self.orientation_component(offset - 3)
        }
    }

    fn component_mut(&mut self, offset: usize) -> &mut f64 {
        if offset < 3 {
            &mut self.position[offset]
        } else {
            &mut self.orientation.as_mut_unchecked().coords[ORIENTATION_STORAGE[offset - 3]]
        }
    }
}

/// Differential of a rigid pose: translation plus a rotation vector in the
/// tangent space at the current orientation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RigidChange {
    pub position: Vector3<f64>,
    pub orientation: Vector3<f64>,
}

impl RigidChange {
    pub fn new(position: Vector3<f64>, orientation: Vector3<f64>) -> Self {
        Self {
            position,
            orientation,
        }
    }
}

impl RigidBlock for RigidChange {
    const ORIENTATION_WIDTH: usize = 3;

    fn component(&self, offset: usize) -> f64 {
        if offset < 3 {
            self.position[offset]
        } else {
            self.orientation[offset - 3]
        }
    }

    fn component_mut(&mut self, offset: usize) -> &mut f64 {
        if offset < 3 {
            &mut self.position[offset]
        } else {
            &mut self.orientation[offset - 3]
        }
    }
}

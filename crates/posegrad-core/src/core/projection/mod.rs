//! # Flat Vector Projection
//!
//! Maps hierarchical configurations onto a single canonical index space so that
//! generic numeric optimizers (gradient descent, quasi-Newton, genetic operators)
//! can treat them as plain vectors, while every index can still be traced back to
//! the ligand, residue, rigid body or torsion it belongs to.
//!
//! The ordering is: for each ligand, 3 position scalars, then its orientation
//! scalars (4 raw quaternion components `w, i, j, k` for a `Conf`, 3 rotation
//! vector components for a `Change`), then its torsions; then the torsions of each
//! flexible residue. Node indices count one node per rigid body and one per
//! torsion, which is the granularity used when accumulating per-node forces.

mod layout;
mod table;
mod vector;

pub use layout::{Component, FlatLayout, FlatSlot, Owner, ProjectionError};
pub use table::write_flat_table;
pub use vector::FlatVector;

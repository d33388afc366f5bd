//! # Core Module
//!
//! Stateless building blocks for docking-pose optimization: the conformation data
//! model and its projection onto flat numeric vectors.
//!
//! ## Architecture
//!
//! - **Conformation Models** ([`models`]) - Rigid poses, torsion sets, ligand and
//!   residue configurations, and their differentials
//! - **Flat Projection** ([`projection`]) - Canonical flat ordering, node
//!   bookkeeping, and tabular export
//! - **Utilities** ([`utils`]) - Angle and quaternion helpers built on `nalgebra`

pub mod models;
pub mod projection;
pub mod utils;

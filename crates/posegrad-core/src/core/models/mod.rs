//! # Conformation Models
//!
//! Value types describing the pose of a docking system and its differentials.
//!
//! ## Overview
//!
//! A [`conf::Conf`] holds every ligand's rigid pose and torsions plus the torsions
//! of every flexible receptor residue. A [`change::Change`] mirrors it entry for
//! entry, but rotates through a 3-component rotation vector rather than a
//! quaternion, because an infinitesimal rotation has three degrees of freedom.
//!
//! ## Key Components
//!
//! - [`rigid`] - Rigid poses (`RigidConf`) and rigid differentials (`RigidChange`)
//! - [`conf`] - Ligand, residue and full-system configurations
//! - [`change`] - Their differential counterparts
//! - [`shape`] - Torsion-count descriptor used to pair configurations with changes
//!
//! Both top-level types implement [`crate::core::projection::FlatVector`], which
//! is how numerical optimizers see them.
//!
//! ```ignore
//! use posegrad::core::models::{conf::Conf, change::Change, shape::ConfShape};
//! use posegrad::core::projection::FlatVector;
//!
//! let shape = ConfShape::new(vec![3], vec![2]);
//! let mut conf = Conf::from_shape(&shape);
//! let mut step = Change::zeroed(&shape);
//! *step.get_mut(9)? = 0.1; // third torsion of ligand 0
//! conf.increment(&step, 1.0);
//! ```

pub mod change;
pub mod conf;
pub mod rigid;
pub mod shape;

//! # posegrad Core Library
//!
//! Conformation bookkeeping for docking search, and a momentum solver that
//! optimizes a scoring network's *input* grid instead of its weights.
//!
//! ## Architectural Philosophy
//!
//! The library keeps the same three-layer split throughout:
//!
//! - **[`core`]: The Foundation.** Stateless value types: rigid poses, torsion sets,
//!   ligand and residue configurations, their differentials, and the canonical
//!   flat-vector projection that lets generic optimizers address every degree of
//!   freedom by index while still knowing which node it perturbs.
//!
//! - **[`engine`]: The Logic Core.** The stateful input-optimizing solver together
//!   with its collaborators: the scoring-network abstraction, named tensors,
//!   execution backends for the element-wise update work, learning-rate schedules,
//!   checkpoints, and the cooperative stop/snapshot signal.
//!
//! - **[`workflows`]: The Public API.** End-to-end procedures that wire the engine
//!   together, such as running an optimization with optional resume and returning a
//!   summary suitable for reporting.

pub mod core;
pub mod engine;
pub mod workflows;

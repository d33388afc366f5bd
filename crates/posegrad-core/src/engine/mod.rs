//! # Engine Module
//!
//! The stateful side of posegrad: a momentum gradient-descent solver whose only
//! trainable parameter is the input grid of a fixed scoring network.
//!
//! ## Overview
//!
//! A pretrained network scores a 3D molecular grid. Instead of fitting the
//! network's weights, the solver repeatedly runs it forward from the layer after
//! the input, back-propagates to the `data` tensor, and steps that tensor with
//! clipped momentum updates, optionally clamping the non-protected channels to
//! non-negative density afterwards.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Solver parameters, grid channel layout and builder
//! - **Network Abstraction** ([`network`], [`tensor`]) - The scoring-network contract and
//!   the named tensors it owns
//! - **Execution Backends** ([`backend`]) - Element-wise update kernels per execution mode
//! - **Schedules** ([`schedule`]) - Learning-rate policies and loss smoothing
//! - **Checkpoints** ([`checkpoint`]) - Binary and structured solver-state files
//! - **Solver** ([`solver`]) - The optimization loop itself
//! - **Control** ([`action`], [`progress`]) - Stop/snapshot requests and progress callbacks
//! - **Reference Network** ([`reference`]) - A small target-density network for driving
//!   the solver end to end
//! - **Error Handling** ([`error`]) - Engine-specific error types

pub mod action;
pub mod backend;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod network;
pub mod progress;
pub mod reference;
pub mod schedule;
pub mod solver;
pub mod tensor;

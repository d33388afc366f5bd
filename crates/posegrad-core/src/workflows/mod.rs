//! # Workflows Module
//!
//! High-level entry points that assemble the engine into complete procedures.
//!
//! ## Overview
//!
//! A workflow takes a scoring network and a validated configuration, runs the
//! whole procedure (including resume and progress reporting) and returns a plain
//! result value that front ends can print or serialize.
//!
//! - **Optimization Workflow** ([`optimize`]) - Input-grid optimization against a
//!   fixed scoring network, with optional resume from a saved solver state.

pub mod optimize;

//! This crate contains the generic building blocks for monotone dataflow
//! analyses: a trait for control flow graphs with dense node indices, a
//! collection of join semi-lattices to build abstract domains from, and a
//! worklist-based fixed-point solver with forward and backward modes.
//!
//! The crate is independent of any concrete intermediate representation;
//! look at the oat-lib crate for analyses defined on top of these helpers.

/// Trait for defining a control flow graph over dense node indices, and a
/// Graphviz printer for debugging.
pub mod cfg;

/// A curated collection of semi-lattices: a flat constant lattice, map
/// lattices, and power sets.
pub mod domains;

/// Fixed-point iteration over a control flow graph using a FIFO worklist.
pub mod solvers;

#[cfg(test)]
mod cfg_tests;

#[cfg(test)]
mod solvers_tests;
